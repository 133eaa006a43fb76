//! Excluding the relay process from the trace it consumes
//!
//! The relay's own reads would otherwise generate provenance that it then
//! reads again. The kernel module accepts a process configuration write on
//! its securityfs `self` file; setting the opaque flag hides the writer.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use provrelay_core::SHORT_RECORD_SIZE;
use tracing::debug;

pub const DEFAULT_SELF_FILE: &str = "/sys/kernel/security/provenance/self";

/// Operation code selecting the opaque flag in a process configuration
const PROV_SET_OPAQUE: u8 = 0x02;
/// Opaque bit within the record header flags
const OPAQUE_FLAG: u32 = 1 << 1;
/// Node record, op byte, padding, vpid
const PROCESS_CONFIG_LEN: usize = SHORT_RECORD_SIZE + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfExclusion {
    /// Write the opaque flag to the given securityfs self file
    SecurityFs(PathBuf),
    /// Leave the process traced
    Disabled,
}

impl Default for SelfExclusion {
    fn default() -> Self {
        SelfExclusion::SecurityFs(PathBuf::from(DEFAULT_SELF_FILE))
    }
}

impl SelfExclusion {
    pub fn mark_opaque(&self) -> io::Result<()> {
        match self {
            SelfExclusion::SecurityFs(path) => {
                let mut file = OpenOptions::new().write(true).open(path)?;
                file.write_all(&opaque_config())?;
                debug!("Marked process opaque through {}", path.display());
                Ok(())
            }
            SelfExclusion::Disabled => Ok(()),
        }
    }
}

fn opaque_config() -> [u8; PROCESS_CONFIG_LEN] {
    let mut config = [0u8; PROCESS_CONFIG_LEN];
    // header flags sit right after the 32-byte identifier
    config[32..36].copy_from_slice(&OPAQUE_FLAG.to_le_bytes());
    config[SHORT_RECORD_SIZE] = PROV_SET_OPAQUE;
    config
}
