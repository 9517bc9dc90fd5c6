//! Per-run output directory.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Identifies one run: its timestamp and the directory all its artifacts go to.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub timestamp: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Local>,
}

impl RunContext {
    /// Creates `<output_root>/<timestamp>`. A second run within the same second gets a
    /// numeric suffix instead of sharing the directory.
    pub fn create(output_root: &Path) -> io::Result<Self> {
        let started_at = Local::now();
        let base = started_at.format(TIMESTAMP_FORMAT).to_string();
        std::fs::create_dir_all(output_root)?;

        let mut attempt = 1u32;
        loop {
            let timestamp = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let run_dir = output_root.join(&timestamp);
            match std::fs::create_dir(&run_dir) {
                Ok(()) => {
                    return Ok(Self {
                        timestamp,
                        run_dir,
                        started_at,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}
