// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the B+-tree index.

use std::fmt;
use std::path::PathBuf;

/// Errors that can surface from `Tree::open`, `Tree::close`, and the
/// background write-behind worker.
///
/// Only `open` and `close` return `Result` directly; a failure observed by
/// the write-behind worker is recorded as a sticky error and returned from
/// the next `close`, `insert`, or `find` call that notices it.
#[derive(Debug)]
pub enum BtreeError {
    /// `open` was called on a tree that already has a file open.
    AlreadyOpen { path: PathBuf },
    /// A read, write, seek, or mmap operation failed.
    Io { operation: &'static str, reason: String },
    /// A read or write touched fewer bytes than the page geometry requires.
    ShortIo {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A page failed its checksum or magic-number validation on load.
    Corrupt { page: u32, reason: String },
    /// The key/value widths recorded in the file header disagree with the
    /// widths the caller opened the tree with.
    GeometryMismatch {
        field: &'static str,
        expected: u32,
        actual: u32,
    },
    /// A `TreeConfig` was constructed with an invalid parameter.
    InvalidConfig { reason: String },
}

impl fmt::Display for BtreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BtreeError::AlreadyOpen { path } => {
                write!(f, "tree already open on {}", path.display())
            }
            BtreeError::Io { operation, reason } => {
                write!(f, "I/O error during {operation}: {reason}")
            }
            BtreeError::ShortIo {
                operation,
                expected,
                actual,
            } => write!(
                f,
                "short I/O during {operation}: expected {expected} bytes, got {actual}"
            ),
            BtreeError::Corrupt { page, reason } => {
                write!(f, "page {page} failed validation: {reason}")
            }
            BtreeError::GeometryMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "geometry mismatch on {field}: file has {expected}, tree opened with {actual}"
            ),
            BtreeError::InvalidConfig { reason } => write!(f, "invalid tree config: {reason}"),
        }
    }
}

impl std::error::Error for BtreeError {}

/// Convenience alias used throughout the crate.
pub type BtreeResult<T> = Result<T, BtreeError>;
