// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Write-ahead log for the write-behind path.
//!
//! The page-level write-behind channel (`crate::page`) acknowledges an
//! insert in memory well before its leaf page reaches disk. If the process
//! dies in that window the mutation is lost (the source accepts this, see
//! `SPEC_FULL.md` §7, §9). This module adds a small append-only journal so
//! `Tree::open` can replay any inserts that outran their page flush.
//!
//! ## Entry Format
//!
//! ```text
//! ┌───────┬──────────────┬───────────┬────────────────┬─────────────┬───────────┐
//! │ tag:u8│ key_len:u32 BE│ key bytes │ value_len:u32 BE│ value bytes │ crc32:u32 BE│
//! │  = 1  │               │           │                 │             │             │
//! └───────┴──────────────┴───────────┴────────────────┴─────────────┴───────────┘
//! ```
//!
//! The CRC32 covers every byte before it, including the tag and the two
//! length prefixes.
//!
//! ## Error Conditions
//! - Replay stops, without error, at the first truncated read, length
//!   overflow, or checksum mismatch. That is exactly what a crash mid-append
//!   leaves behind, not a condition a caller should see surfaced as an error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;

use crate::error::{BtreeError, BtreeResult};

const INSERT_TAG: u8 = 1;

pub(crate) struct WriteAheadLog {
    file: File,
}

impl WriteAheadLog {
    /// Opens (creating if absent) the journal file at `path` in append mode.
    ///
    /// ## Error Conditions
    /// - `BtreeError::Io`: the file cannot be created, opened, or read.
    pub(crate) fn open(path: &Path) -> BtreeResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| BtreeError::Io {
                operation: "open_wal",
                reason: e.to_string(),
            })?;
        Ok(WriteAheadLog { file })
    }

    /// Appends one insert entry.
    ///
    /// ## Input
    /// - `key`, `value`: the raw bytes being inserted, not yet encoded into
    ///   a row; widths are the caller's responsibility.
    ///
    /// ## Error Conditions
    /// - `BtreeError::Io`: the append write fails.
    pub(crate) fn log_insert(&mut self, key: &[u8], value: &[u8]) -> BtreeResult<()> {
        let mut buf = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len() + 4);
        buf.push(INSERT_TAG);
        buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        buf.extend_from_slice(value);

        let mut hasher = Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_be_bytes());

        self.file.write_all(&buf).map_err(|e| BtreeError::Io {
            operation: "write_wal_insert",
            reason: e.to_string(),
        })
    }

    pub(crate) fn sync(&mut self) -> BtreeResult<()> {
        self.file.sync_data().map_err(|e| BtreeError::Io {
            operation: "sync_wal",
            reason: e.to_string(),
        })
    }

    /// Replays every well-formed entry in the log, in append order.
    ///
    /// ## Output
    /// - `Ok(entries)`: the decoded `(key, value)` pairs in append order;
    ///   empty if the log is empty or every entry failed validation.
    ///
    /// ## Error Conditions
    /// - `BtreeError::Io`: cloning the file handle or seeking to the start
    ///   fails. A truncated or checksum-failing entry is not an error here
    ///   (see module docs); it simply ends the returned list early.
    pub(crate) fn replay(&self) -> BtreeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut file = self.file.try_clone().map_err(|e| BtreeError::Io {
            operation: "clone_wal_handle",
            reason: e.to_string(),
        })?;
        file.seek(SeekFrom::Start(0)).map_err(|e| BtreeError::Io {
            operation: "seek_wal",
            reason: e.to_string(),
        })?;

        let mut entries = Vec::new();
        loop {
            let mut tag = [0u8; 1];
            if file.read_exact(&mut tag).is_err() {
                break;
            }
            if tag[0] != INSERT_TAG {
                break;
            }

            let mut key_len_buf = [0u8; 4];
            if file.read_exact(&mut key_len_buf).is_err() {
                break;
            }
            let key_len = u32::from_be_bytes(key_len_buf) as usize;
            let mut key = vec![0u8; key_len];
            if file.read_exact(&mut key).is_err() {
                break;
            }

            let mut value_len_buf = [0u8; 4];
            if file.read_exact(&mut value_len_buf).is_err() {
                break;
            }
            let value_len = u32::from_be_bytes(value_len_buf) as usize;
            let mut value = vec![0u8; value_len];
            if file.read_exact(&mut value).is_err() {
                break;
            }

            let mut checksum_buf = [0u8; 4];
            if file.read_exact(&mut checksum_buf).is_err() {
                break;
            }
            let stored = u32::from_be_bytes(checksum_buf);

            let mut hasher = Hasher::new();
            hasher.update(&tag);
            hasher.update(&key_len_buf);
            hasher.update(&key);
            hasher.update(&value_len_buf);
            hasher.update(&value);
            if hasher.finalize() != stored {
                break;
            }

            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Truncates the log after a clean drain + fsync of the page file.
    pub(crate) fn truncate(&mut self) -> BtreeResult<()> {
        self.file.set_len(0).map_err(|e| BtreeError::Io {
            operation: "truncate_wal",
            reason: e.to_string(),
        })?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| BtreeError::Io {
                operation: "seek_wal",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_logged_inserts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.wal");
        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.log_insert(b"0001", b"aaaa").unwrap();
        wal.log_insert(b"0002", b"bbbb").unwrap();
        wal.sync().unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(entries, vec![(b"0001".to_vec(), b"aaaa".to_vec()), (b"0002".to_vec(), b"bbbb".to_vec())]);
    }

    #[test]
    fn truncate_clears_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.wal");
        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.log_insert(b"0001", b"aaaa").unwrap();
        wal.truncate().unwrap();
        assert!(wal.replay().unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_truncated_trailing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.wal");
        {
            let mut wal = WriteAheadLog::open(&path).unwrap();
            wal.log_insert(b"0001", b"aaaa").unwrap();
        }
        // Simulate a crash mid-append: truncate off the tail of the second entry.
        {
            let mut wal = WriteAheadLog::open(&path).unwrap();
            wal.log_insert(b"0002", b"bbbb").unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let wal = WriteAheadLog::open(&path).unwrap();
        let entries = wal.replay().unwrap();
        assert_eq!(entries, vec![(b"0001".to_vec(), b"aaaa".to_vec())]);
    }
}
