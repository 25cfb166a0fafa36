// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Page geometry, file I/O, and the background write-behind worker.
//!
//! Pages are fixed width and addressed by `page_number * page_size`. Each
//! page holds exactly one leaf: a 30-byte info region (page number,
//! next-leaf-page-or -1, row count, key width, value width, and branching
//! factor, each a length-prefixed 5-byte field) followed by up to
//! `2M - 1` fixed-width rows and a trailing CRC32 checksum.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crc32fast::Hasher;

use crate::config::TreeConfig;
use crate::error::{BtreeError, BtreeResult};
use crate::leaf::Leaf;
use crate::wal::WriteAheadLog;

/// Width of each leading page-info field.
const FIELD_WIDTH: usize = 5;
/// Width of the page-info region: page number, next-leaf-or -1, row count,
/// key width, value width, and branching factor (six 5-byte fields). The
/// trailing three let `read_page_header` catch a tree reopened with the
/// wrong geometry instead of silently misreading every row
/// (`BtreeError::GeometryMismatch`); the original design did not store
/// them and left a mismatch undetected.
pub(crate) const PAGE_INFO_LEN: usize = 6 * FIELD_WIDTH;
/// Trailing CRC32 checksum over a page's row bytes.
const CHECKSUM_LEN: usize = 4;

fn encode_field(value: i64) -> [u8; FIELD_WIDTH] {
    let bytes = (value as i32).to_be_bytes();
    [4, bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn decode_field(buf: &[u8]) -> i64 {
    i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as i64
}

/// Point-in-time counters exposed for diagnostics and tests. See
/// `SPEC_FULL.md` §11.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageManagerStats {
    pub pages_allocated: u32,
    pub pages_written: u64,
    pub pages_read: u64,
    pub writer_backlog: usize,
}

struct OpenState {
    file: File,
    path: PathBuf,
    save_tx: Sender<Arc<Leaf>>,
    worker: JoinHandle<()>,
    wal: WriteAheadLog,
}

/// Owns the backing file, the monotonic page counter, and the write-behind
/// worker. See `SPEC_FULL.md` §4.5.
pub struct PageManager {
    config: TreeConfig,
    next_page: AtomicU32,
    open: Mutex<Option<OpenState>>,
    sticky_error: Mutex<Option<BtreeError>>,
    pages_written: AtomicU64,
    pages_read: AtomicU64,
    backlog: Arc<AtomicU64>,
}

impl PageManager {
    /// A page manager with no backing file, for tests and purely in-memory
    /// trees. `open`/`close` still work normally against a real path.
    pub fn in_memory(config: TreeConfig) -> Self {
        PageManager {
            config,
            next_page: AtomicU32::new(0),
            open: Mutex::new(None),
            sticky_error: Mutex::new(None),
            pages_written: AtomicU64::new(0),
            pages_read: AtomicU64::new(0),
            backlog: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        PAGE_INFO_LEN + self.config.row_width() as usize * self.config.rows_per_page() as usize + CHECKSUM_LEN
    }

    /// Post-increment of the page counter. Never reuses a page number.
    pub(crate) fn allocate_page(&self) -> u32 {
        self.next_page.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn set_next_page(&self, value: u32) {
        self.next_page.store(value, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.lock().unwrap().is_some()
    }

    /// Number of pages currently present in the backing file.
    pub fn pages_count(&self) -> BtreeResult<u32> {
        let guard = self.open.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            return Ok(0);
        };
        let len = state.file.metadata().map_err(|e| BtreeError::Io {
            operation: "stat",
            reason: e.to_string(),
        })?.len();
        Ok((len as usize / self.page_size()) as u32)
    }

    pub fn stats(&self) -> PageManagerStats {
        PageManagerStats {
            pages_allocated: self.next_page.load(Ordering::SeqCst),
            pages_written: self.pages_written.load(Ordering::SeqCst),
            pages_read: self.pages_read.load(Ordering::SeqCst),
            writer_backlog: self.backlog.load(Ordering::SeqCst) as usize,
        }
    }

    /// Creates or opens the backing file and starts the write-behind worker.
    ///
    /// ## Input
    /// - `path`: the backing file; created if absent. A sibling WAL file is
    ///   opened alongside it at `<path>.wal`.
    ///
    /// ## Output
    /// - `Ok(())`: the file and its WAL are open and the write-behind worker
    ///   thread is running; `next_page` is seeded from the file's current
    ///   length.
    ///
    /// ## Error Conditions
    /// - `BtreeError::AlreadyOpen`: this manager already has a file open.
    /// - `BtreeError::Io`: the backing file or WAL cannot be created, opened,
    ///   cloned, or stat'd.
    pub fn open(self: &Arc<Self>, path: &Path) -> BtreeResult<()> {
        let mut guard = self.open.lock().unwrap();
        if guard.is_some() {
            return Err(BtreeError::AlreadyOpen {
                path: path.to_path_buf(),
            });
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| BtreeError::Io {
                operation: "open_file",
                reason: e.to_string(),
            })?;

        let wal_path = wal_path_for(path);
        let wal = WriteAheadLog::open(&wal_path)?;

        let (tx, rx) = mpsc::channel::<Arc<Leaf>>();
        let worker_pages = self.clone();
        let worker_file = file.try_clone().map_err(|e| BtreeError::Io {
            operation: "clone_file_handle",
            reason: e.to_string(),
        })?;
        let worker = std::thread::spawn(move || {
            for leaf in rx {
                if let Err(err) = worker_pages.write_leaf_to_file(&worker_file, &leaf) {
                    let mut sticky = worker_pages.sticky_error.lock().unwrap();
                    if sticky.is_none() {
                        *sticky = Some(err);
                    }
                }
            }
        });

        let len = file.metadata().map_err(|e| BtreeError::Io {
            operation: "stat",
            reason: e.to_string(),
        })?.len();
        self.set_next_page((len as usize / self.page_size()) as u32);

        *guard = Some(OpenState {
            file,
            path: path.to_path_buf(),
            save_tx: tx,
            worker,
            wal,
        });
        Ok(())
    }

    /// Drains the write-behind channel, fsyncs, closes the file. Safe to
    /// call on a tree that was never opened.
    pub fn close(&self) -> BtreeResult<()> {
        let mut guard = self.open.lock().unwrap();
        let Some(mut state) = guard.take() else {
            return Ok(());
        };
        drop(state.save_tx);
        // Dropping the sender closes the channel; join blocks until the
        // worker has drained it and exited.
        state.worker.join().ok();

        state.file.sync_all().map_err(|e| BtreeError::Io {
            operation: "fsync",
            reason: e.to_string(),
        })?;
        state.wal.truncate()?;

        if let Some(err) = self.sticky_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn enqueue_save(&self, leaf: Arc<Leaf>) {
        let guard = self.open.lock().unwrap();
        if let Some(state) = guard.as_ref() {
            self.backlog.fetch_add(1, Ordering::SeqCst);
            let _ = state.save_tx.send(leaf);
        }
    }

    pub(crate) fn wal_log_insert(&self, key: &[u8], value: &[u8]) -> BtreeResult<()> {
        let mut guard = self.open.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            state.wal.log_insert(key, value)?;
            state.wal.sync()?;
        }
        Ok(())
    }

    pub(crate) fn wal_truncate(&self) -> BtreeResult<()> {
        let mut guard = self.open.lock().unwrap();
        if let Some(state) = guard.as_mut() {
            state.wal.truncate()?;
        }
        Ok(())
    }

    /// Replays any WAL entries left over from an unclean shutdown. Returns
    /// the decoded `(key, value)` pairs in log order; the caller
    /// (`Tree::open`) re-inserts them through the normal insert path.
    pub(crate) fn wal_replay(&self) -> BtreeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let guard = self.open.lock().unwrap();
        match guard.as_ref() {
            Some(state) => state.wal.replay(),
            None => Ok(Vec::new()),
        }
    }

    fn write_leaf_to_file(&self, file: &File, leaf: &Leaf) -> BtreeResult<()> {
        if !leaf.is_dirty() {
            return Ok(());
        }
        let page = leaf.page_number();
        let (rows, count, next_page) = leaf.snapshot()?;
        leaf.clear_dirty();

        let bytes = self.encode_page(page, next_page, count, &rows);
        let offset = page as u64 * self.page_size() as u64;
        file.write_at(&bytes, offset).map_err(|e| BtreeError::Io {
            operation: "write_leaf",
            reason: e.to_string(),
        })?;
        self.pages_written.fetch_add(1, Ordering::SeqCst);
        self.backlog.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn encode_page(&self, page: u32, next_page: i64, count: u32, rows: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.page_size());
        buf.extend_from_slice(&encode_field(page as i64));
        buf.extend_from_slice(&encode_field(next_page));
        buf.extend_from_slice(&encode_field(count as i64));
        buf.extend_from_slice(&encode_field(self.config.key_width() as i64));
        buf.extend_from_slice(&encode_field(self.config.value_width() as i64));
        buf.extend_from_slice(&encode_field(self.config.branching_factor() as i64));
        buf.extend_from_slice(rows);
        buf.resize(PAGE_INFO_LEN + self.config.row_width() as usize * self.config.rows_per_page() as usize, 0);

        let mut hasher = Hasher::new();
        hasher.update(&buf[PAGE_INFO_LEN..]);
        let checksum = hasher.finalize();
        buf.extend_from_slice(&checksum.to_be_bytes());
        buf
    }

    /// Reads a page's full row bytes, used by `Leaf::ensure_loaded`.
    pub(crate) fn read_leaf(&self, page: u32) -> BtreeResult<(Vec<u8>, u32)> {
        let guard = self.open.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            return Err(BtreeError::Io {
                operation: "read_leaf",
                reason: "no file open".to_string(),
            });
        };
        let page_size = self.page_size();
        let mut buf = vec![0u8; page_size];
        let offset = page as u64 * page_size as u64;
        let n = state.file.read_at(&mut buf, offset).map_err(|e| BtreeError::Io {
            operation: "read_leaf",
            reason: e.to_string(),
        })?;
        if n != page_size {
            return Err(BtreeError::ShortIo {
                operation: "read_leaf",
                expected: page_size,
                actual: n,
            });
        }
        self.validate_checksum(page, &buf)?;
        self.validate_geometry(&buf)?;
        self.pages_read.fetch_add(1, Ordering::SeqCst);

        let count = decode_field(&buf[10..15]) as u32;
        let row_width = self.config.row_width() as usize;
        let rows = buf[PAGE_INFO_LEN..PAGE_INFO_LEN + row_width * count as usize].to_vec();
        Ok((rows, count))
    }

    /// Reads only the page header and first-key prefix, used by the loader
    /// to reconstruct the leaf chain and branch separators without
    /// decoding full row arrays.
    pub(crate) fn read_page_header(&self, page: u32) -> BtreeResult<(i64, u32, Vec<u8>)> {
        let guard = self.open.lock().unwrap();
        let Some(state) = guard.as_ref() else {
            return Err(BtreeError::Io {
                operation: "read_page_header",
                reason: "no file open".to_string(),
            });
        };
        let page_size = self.page_size();
        let mut buf = vec![0u8; page_size];
        let offset = page as u64 * page_size as u64;
        let n = state.file.read_at(&mut buf, offset).map_err(|e| BtreeError::Io {
            operation: "read_page_header",
            reason: e.to_string(),
        })?;
        if n != page_size {
            return Err(BtreeError::ShortIo {
                operation: "read_page_header",
                expected: page_size,
                actual: n,
            });
        }
        self.validate_checksum(page, &buf)?;
        self.validate_geometry(&buf)?;

        let next_page = decode_field(&buf[5..10]);
        let count = decode_field(&buf[10..15]) as u32;
        let key_width = self.config.key_width() as usize;
        let first_key = if count > 0 {
            crate::key::row_key(&buf[PAGE_INFO_LEN..PAGE_INFO_LEN + self.config.row_width() as usize], key_width)
                .to_vec()
        } else {
            Vec::new()
        };
        Ok((next_page, count, first_key))
    }

    /// Checks the key width, value width, and branching factor recorded in
    /// a page header against the geometry this manager was opened with.
    fn validate_geometry(&self, buf: &[u8]) -> BtreeResult<()> {
        let stored_key_width = decode_field(&buf[15..20]) as u32;
        let stored_value_width = decode_field(&buf[20..25]) as u32;
        let stored_branching_factor = decode_field(&buf[25..30]) as u32;

        if stored_key_width != self.config.key_width() as u32 {
            return Err(BtreeError::GeometryMismatch {
                field: "key_width",
                expected: stored_key_width,
                actual: self.config.key_width() as u32,
            });
        }
        if stored_value_width != self.config.value_width() as u32 {
            return Err(BtreeError::GeometryMismatch {
                field: "value_width",
                expected: stored_value_width,
                actual: self.config.value_width() as u32,
            });
        }
        if stored_branching_factor != self.config.branching_factor() as u32 {
            return Err(BtreeError::GeometryMismatch {
                field: "branching_factor",
                expected: stored_branching_factor,
                actual: self.config.branching_factor() as u32,
            });
        }
        Ok(())
    }

    fn validate_checksum(&self, page: u32, buf: &[u8]) -> BtreeResult<()> {
        let rows_end = buf.len() - CHECKSUM_LEN;
        let stored = u32::from_be_bytes([
            buf[rows_end],
            buf[rows_end + 1],
            buf[rows_end + 2],
            buf[rows_end + 3],
        ]);
        let mut hasher = Hasher::new();
        hasher.update(&buf[PAGE_INFO_LEN..rows_end]);
        let computed = hasher.finalize();
        if computed != stored {
            return Err(BtreeError::Corrupt {
                page,
                reason: format!("checksum mismatch: stored {stored}, computed {computed}"),
            });
        }
        Ok(())
    }
}

fn wal_path_for(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let mut name = p.file_name().unwrap_or_default().to_os_string();
    name.push(".wal");
    p.set_file_name(name);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_matches_geometry() {
        let config = TreeConfig::new(4, 4, 2).unwrap();
        let pages = PageManager::in_memory(config);
        // 30 info bytes + 3 rows * 16 bytes + 4 checksum bytes
        assert_eq!(pages.page_size(), 30 + 3 * 16 + 4);
    }

    #[test]
    fn field_codec_round_trips() {
        let encoded = encode_field(1234);
        assert_eq!(decode_field(&encoded), 1234);
        let encoded_neg = encode_field(-1);
        assert_eq!(decode_field(&encoded_neg), -1);
    }

    #[test]
    fn open_close_round_trips_through_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.btree");
        let config = TreeConfig::new(4, 4, 2).unwrap();
        let pages = Arc::new(PageManager::in_memory(config));
        pages.open(&path).unwrap();
        assert!(pages.is_open());
        pages.close().unwrap();
        assert!(!pages.is_open());
    }

    #[test]
    fn open_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.btree");
        let config = TreeConfig::new(4, 4, 2).unwrap();
        let pages = Arc::new(PageManager::in_memory(config));
        pages.open(&path).unwrap();
        assert!(pages.open(&path).is_err());
        pages.close().unwrap();
    }
}
