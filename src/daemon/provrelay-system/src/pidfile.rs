use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const DEFAULT_PID_FILE: &str = "/run/provenance-service.pid";

/// PID file written at registration and removed when dropped
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id as decimal text
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove PID file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Read the pid recorded in `path`, `None` if the file does not exist
pub fn read_pid(path: &Path) -> io::Result<Option<u32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    contents
        .trim()
        .parse()
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.pid");

        let pid_file = PidFile::create(&path).unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(std::process::id()));
        assert_eq!(fs::read_to_string(&path).unwrap(), std::process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
        assert_eq!(read_pid(&path).unwrap(), None);
    }

    #[test]
    fn test_garbage_pid_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.pid");
        fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_pid(&path).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        assert!(PidFile::create(dir.path().join("missing").join("relay.pid")).is_err());
    }
}
