use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::Lsn;

/// Error type for log manager operations
#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Configuration for the log sink
#[derive(Debug, Clone)]
pub struct LogManagerConfig {
    /// Path to the log directory
    pub log_dir: PathBuf,

    /// Base name for the log file
    pub log_file_name: String,
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_file_name: "tarndb_log".to_string(),
        }
    }
}

/// Append-only log sink. The storage core carries it for forward
/// compatibility; nothing in the core writes through it yet.
///
/// Records are length-prefixed; the returned LSN is a monotonic record
/// sequence number.
pub struct LogManager {
    log_file: Mutex<File>,
    next_lsn: AtomicU64,
}

impl LogManager {
    pub fn new(config: LogManagerConfig) -> Result<Self, LogManagerError> {
        std::fs::create_dir_all(&config.log_dir)?;
        let path = config.log_dir.join(&config.log_file_name);
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            log_file: Mutex::new(file),
            next_lsn: AtomicU64::new(1),
        })
    }

    /// Append a record to the log and return its LSN.
    pub fn append_log_record(&self, record: &[u8]) -> Result<Lsn, LogManagerError> {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);

        let mut header = [0u8; 12];
        LittleEndian::write_u64(&mut header[0..8], lsn);
        LittleEndian::write_u32(&mut header[8..12], record.len() as u32);

        let mut file = self.log_file.lock();
        file.write_all(&header)?;
        file.write_all(record)?;
        file.flush()?;

        Ok(lsn)
    }

    /// LSN the next append will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_returns_monotonic_lsn() {
        let dir = TempDir::new().unwrap();
        let config = LogManagerConfig {
            log_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let log_manager = LogManager::new(config).unwrap();

        let first = log_manager.append_log_record(b"begin").unwrap();
        let second = log_manager.append_log_record(b"commit").unwrap();
        assert!(second > first);
        assert_eq!(log_manager.next_lsn(), second + 1);
    }
}
