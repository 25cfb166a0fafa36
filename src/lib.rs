// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A disk-backed B+-tree index with fixed-width keys and values.
//!
//! Records are inserted and looked up by an exact-width key; ranges are
//! walked in either direction via the leaf chain. Leaves are mutated
//! synchronously in memory and durably written by a background
//! write-behind worker; a write-ahead log covers the gap between an
//! acknowledged insert and its page reaching disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                       Tree                          │
//! │   root, first_leaf/last_leaf, height, rows_count     │
//! └───────────────────────┬──────────────────────────────┘
//!                         │ insert / find / scan
//!                         ▼
//!              ┌─────────────────────┐
//!              │       Branch        │  in-memory only,
//!              │  keys[] + items[]   │  rebuilt on open
//!              └──────────┬──────────┘
//!                         │
//!                         ▼
//!              ┌─────────────────────┐
//!              │        Leaf         │  prev/next chain,
//!              │   rows[], dirty     │  one page on disk
//!              └──────────┬──────────┘
//!                         │ enqueue_save
//!                         ▼
//!              ┌─────────────────────┐      ┌─────────────┐
//!              │    PageManager      │ ───► │ WriteAheadLog│
//!              │ write-behind worker │      │  (replayed   │
//!              │                     │      │  on open)    │
//!              └─────────────────────┘      └─────────────┘
//! ```
//!
//! Branches hold no page of their own: they are not persisted, and are
//! reconstructed from the leaf chain (see [`Tree::open`]) every time a tree
//! is opened, the same way the index was walked before it was closed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bptree::{Tree, TreeConfig};
//!
//! let config = TreeConfig::new(4, 8, 64)?;
//! let tree = Tree::new(config);
//! tree.open("index.btree")?;
//!
//! tree.insert(b"0001", b"payload1")?;
//! let value = tree.find(b"0001")?;
//! assert_eq!(value.as_deref(), Some(b"payload1".as_slice()));
//!
//! tree.close()?;
//! # Ok::<(), bptree::BtreeError>(())
//! ```

mod branch;
mod config;
mod error;
mod key;
mod leaf;
mod loader;
mod page;
mod tree;
mod wal;

pub use config::TreeConfig;
pub use error::{BtreeError, BtreeResult};
pub use key::ROW_HEADER_LEN;
pub use leaf::Leaf;
pub use page::PageManagerStats;
pub use tree::Tree;
