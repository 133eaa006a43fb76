use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Registration and shutdown failures
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to mark process opaque: {0}")]
    Opaque(#[source] io::Error),
    #[error("{found} cpus found, at most {max} are supported")]
    TooManyCpus { found: usize, max: usize },
    #[error("Could not open {}: {source}", path.display())]
    OpenChannel {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create worker pool: {0}")]
    Pool(#[source] io::Error),
    #[error("Failed setting cpu affinity for cpu {cpu}: {source}")]
    Affinity {
        cpu: usize,
        #[source]
        source: io::Error,
    },
    #[error("Reader startup failed: {0}")]
    ReaderStartup(String),
    #[error("Failed to write PID file {}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} readers did not exit within the stop timeout")]
    StopTimeout(usize),
}

pub type Result<T> = std::result::Result<T, RelayError>;
