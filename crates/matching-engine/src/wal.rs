//! Write-ahead log: append-only, crash-safe journal with monotonic LSNs.
//!
//! Every state-changing event is durably recorded here before it becomes
//! observable to any other component (publish, ack, DB write). The log is
//! newline-delimited JSON so a partially-written tail entry can be detected
//! and discarded on the next open instead of corrupting the whole file.

use crate::error::{ObmError, ObmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalTable {
    Order,
    Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub lsn: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: WalOp,
    pub table: WalTable,
    pub data: Value,
}

/// An append-only, fsync'd journal. Owned exclusively by the command
/// consumer loop; `append` is the latency floor of the whole pipeline.
pub struct Wal {
    path: PathBuf,
    file: File,
    next_lsn: u64,
}

impl Wal {
    /// Opens (creating if missing) the WAL at `path`, creating its parent
    /// directory if needed, and scans the existing file to determine the
    /// next LSN to assign.
    #[instrument(skip(path))]
    pub fn open<P: AsRef<Path>>(path: P) -> ObmResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ObmError::Wal(format!("creating WAL directory: {e}")))?;
            }
        }

        let next_lsn = Self::scan_next_lsn(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ObmError::Wal(format!("opening WAL file {path:?}: {e}")))?;

        info!(path = ?path, next_lsn, "WAL opened");
        Ok(Self { path, file, next_lsn })
    }

    /// Reads the existing file tail to determine the max well-formed LSN.
    /// A trailing malformed line is silently ignored here; `RecoveryManager`
    /// is responsible for the fatal-vs-truncation distinction during replay.
    fn scan_next_lsn(path: &Path) -> ObmResult<u64> {
        if !path.exists() {
            return Ok(0);
        }
        let file = File::open(path).map_err(|e| ObmError::Wal(format!("reading WAL file {path:?}: {e}")))?;
        let mut max_lsn: Option<u64> = None;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ObmError::Wal(format!("reading WAL file {path:?}: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalRecord>(&line) {
                Ok(record) => {
                    max_lsn = Some(max_lsn.map_or(record.lsn, |m| m.max(record.lsn)));
                }
                Err(_) => continue,
            }
        }
        Ok(max_lsn.map_or(0, |m| m + 1))
    }

    /// Appends one entry, assigning it the next LSN, and fsyncs before
    /// returning. An I/O failure here must abort the whole command: no
    /// downstream effect (publish, ack) may occur.
    pub fn append(&mut self, operation: WalOp, table: WalTable, data: Value) -> ObmResult<u64> {
        let lsn = self.next_lsn;
        let record = WalRecord { lsn, timestamp: Utc::now(), operation, table, data };

        let mut line =
            serde_json::to_vec(&record).map_err(|e| ObmError::Wal(format!("serializing WAL record: {e}")))?;
        line.push(b'\n');

        self.file.write_all(&line).map_err(|e| ObmError::Wal(format!("writing WAL record: {e}")))?;
        self.file.flush().map_err(|e| ObmError::Wal(format!("flushing WAL: {e}")))?;
        self.file.sync_data().map_err(|e| ObmError::Wal(format!("fsyncing WAL: {e}")))?;

        self.next_lsn += 1;
        Ok(lsn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Flushes and fsyncs once more before the pipeline releases its
    /// handle, ensuring every appended record is stable on restart.
    pub fn close(&mut self) -> ObmResult<()> {
        self.file.flush().map_err(|e| ObmError::Wal(format!("flushing WAL on close: {e}")))?;
        self.file.sync_data().map_err(|e| ObmError::Wal(format!("fsyncing WAL on close: {e}")))?;
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error closing WAL on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn lsns_increase_from_zero() {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path().join("wal.log")).unwrap();
        let lsn0 = wal.append(WalOp::Insert, WalTable::Order, json!({"id": "a"})).unwrap();
        let lsn1 = wal.append(WalOp::Insert, WalTable::Order, json!({"id": "b"})).unwrap();
        assert_eq!(lsn0, 0);
        assert_eq!(lsn1, 1);
    }

    #[test]
    fn reopen_resumes_lsn_after_last_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(WalOp::Insert, WalTable::Order, json!({"id": "a"})).unwrap();
            wal.append(WalOp::Insert, WalTable::Order, json!({"id": "b"})).unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        assert_eq!(wal.next_lsn(), 2);
    }

    #[test]
    fn missing_file_starts_at_zero() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path().join("missing/wal.log")).unwrap();
        assert_eq!(wal.next_lsn(), 0);
    }

    #[test]
    fn trailing_garbage_does_not_crash_lsn_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(WalOp::Insert, WalTable::Order, json!({"id": "a"})).unwrap();
        }
        {
            use std::io::Write as _;
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            write!(f, "{{\"lsn\": 1, \"truncat").unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        assert_eq!(wal.next_lsn(), 1);
    }
}
