// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! `Tree`: the public façade over root, height, size, insert, find, and
//! scan. See `SPEC_FULL.md` §4.4.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::branch::{Branch, Node};
use crate::config::TreeConfig;
use crate::error::BtreeResult;
use crate::key::encode_row;
use crate::leaf::Leaf;
use crate::loader;
use crate::page::{PageManager, PageManagerStats};

/// An ordered, persistent key-value index with fixed-width records.
pub struct Tree {
    config: TreeConfig,
    pages: Arc<PageManager>,
    root: Mutex<Option<Node>>,
    first_leaf: Mutex<Option<Arc<Leaf>>>,
    last_leaf: Mutex<Option<Arc<Leaf>>>,
    rows_count: AtomicU64,
    height: AtomicU32,
}

impl Tree {
    /// Binds geometry (`Init(K, D)` in the source design). Does not touch
    /// disk; call `open` separately.
    pub fn new(config: TreeConfig) -> Arc<Tree> {
        Arc::new(Tree {
            pages: Arc::new(PageManager::in_memory(config)),
            config,
            root: Mutex::new(None),
            first_leaf: Mutex::new(None),
            last_leaf: Mutex::new(None),
            rows_count: AtomicU64::new(0),
            height: AtomicU32::new(0),
        })
    }

    /// Creates or opens the backing file.
    ///
    /// ## Input
    /// - `path`: the backing file; created if absent.
    ///
    /// ## Output
    /// - `Ok(())`: an existing tree is loaded (rebuilding the branch spine
    ///   from the leaf chain) or, for a fresh file, the tree is left empty.
    ///   Any write-ahead-log entries left over from an unclean shutdown are
    ///   then replayed and the log truncated.
    ///
    /// ## Error Conditions
    /// - `BtreeError::AlreadyOpen`: this tree already has a file open.
    /// - `BtreeError::GeometryMismatch`: the file was created with a
    ///   different key width, value width, or branching factor.
    /// - `BtreeError::Corrupt`: the leaf chain on disk is inconsistent (a
    ///   dangling `next` pointer, or not exactly one tail leaf).
    /// - `BtreeError::Io`: the backing file or its write-ahead log cannot be
    ///   opened or read.
    pub fn open(self: &Arc<Self>, path: impl AsRef<Path>) -> BtreeResult<()> {
        self.pages.open(path.as_ref())?;

        if let Some(loaded) = loader::load(&self.pages)? {
            *self.root.lock().unwrap() = Some(loaded.root);
            *self.first_leaf.lock().unwrap() = Some(loaded.first_leaf);
            *self.last_leaf.lock().unwrap() = Some(loaded.last_leaf);
            self.height.store(loaded.height, Ordering::SeqCst);
            self.rows_count.store(loaded.rows_count, Ordering::SeqCst);
        }

        let replay = self.pages.wal_replay()?;
        let replayed_any = !replay.is_empty();
        for (key, value) in replay {
            self.insert_row(&encode_row(&key, &value))?;
        }
        if replayed_any {
            self.pages.wal_truncate()?;
        }

        Ok(())
    }

    /// Drains the write-behind worker, fsyncs, and closes the file. Safe to
    /// call on a tree that was never opened.
    pub fn close(&self) -> BtreeResult<()> {
        self.pages.close()
    }

    /// Inserts or overwrites `value` under `key`.
    ///
    /// ## Input
    /// - `key`, `value`: raw bytes, each must match this tree's configured
    ///   `key_width`/`value_width`.
    ///
    /// ## Output
    /// - `Ok(())`: the key/value pair is logged to the write-ahead log and
    ///   applied to the in-memory tree. The affected leaf (and its sibling,
    ///   if this insert triggered a split) is scheduled with the
    ///   write-behind worker; this call does not block on disk.
    ///
    /// ## Error Conditions
    /// - `BtreeError::Io`: the write-ahead log append fails.
    ///
    /// ## Example
    /// ```
    /// use bptree::{Tree, TreeConfig};
    ///
    /// let config = TreeConfig::new(4, 8, 64)?;
    /// let tree = Tree::new(config);
    /// tree.insert(b"0001", b"payload1")?;
    /// assert_eq!(tree.find(b"0001")?.as_deref(), Some(b"payload1".as_slice()));
    /// # Ok::<(), bptree::BtreeError>(())
    /// ```
    pub fn insert(&self, key: &[u8], value: &[u8]) -> BtreeResult<()> {
        self.pages.wal_log_insert(key, value)?;
        let row = encode_row(key, value);
        self.insert_row(&row)
    }

    fn insert_row(&self, row: &[u8]) -> BtreeResult<()> {
        let mut root_guard = self.root.lock().unwrap();
        let key_width = self.config.key_width() as usize;

        match root_guard.take() {
            None => {
                let page = self.pages.allocate_page();
                let leaf = Leaf::new_empty(page, self.pages.clone());
                let result = leaf.insert_and_split(row)?;
                debug_assert!(result.split_up.is_none(), "a fresh leaf cannot overflow on its first insert");
                *self.first_leaf.lock().unwrap() = Some(leaf.clone());
                *self.last_leaf.lock().unwrap() = Some(leaf.clone());
                self.height.store(1, Ordering::SeqCst);
                if result.was_new {
                    self.rows_count.fetch_add(1, Ordering::SeqCst);
                }
                *root_guard = Some(Node::Leaf(leaf));
            }
            Some(Node::Leaf(leaf)) => {
                let result = leaf.insert_and_split(row)?;
                if let Some(new_tail) = result.new_tail {
                    *self.last_leaf.lock().unwrap() = Some(new_tail);
                }
                if result.was_new {
                    self.rows_count.fetch_add(1, Ordering::SeqCst);
                }
                *root_guard = Some(match result.split_up {
                    Some((promoted_key, new_node)) => {
                        let mut wrapper = Branch::wrap(Node::Leaf(leaf));
                        wrapper.keys.push(promoted_key);
                        wrapper.items.push(new_node);
                        self.height.fetch_add(1, Ordering::SeqCst);
                        Node::Branch(Box::new(wrapper))
                    }
                    None => Node::Leaf(leaf),
                });
            }
            Some(Node::Branch(mut branch)) => {
                let effect = branch.insert(row, key_width, &self.config)?;
                if let Some(new_tail) = effect.new_tail {
                    *self.last_leaf.lock().unwrap() = Some(new_tail);
                }
                if effect.was_new {
                    self.rows_count.fetch_add(1, Ordering::SeqCst);
                }
                *root_guard = Some(match effect.split_up {
                    Some((promoted_key, new_node)) => {
                        let mut wrapper = Branch::wrap(Node::Branch(branch));
                        wrapper.keys.push(promoted_key);
                        wrapper.items.push(new_node);
                        self.height.fetch_add(1, Ordering::SeqCst);
                        Node::Branch(Box::new(wrapper))
                    }
                    None => Node::Branch(branch),
                });
            }
        }
        Ok(())
    }

    /// Exact-match lookup. Returns the raw row bytes (header + key + value)
    /// on a hit; callers generally want [`Tree::find`] instead.
    pub fn find_row(&self, key: &[u8]) -> BtreeResult<Option<Vec<u8>>> {
        match root_ref(&self.root) {
            Some(node) => node.find(key),
            None => Ok(None),
        }
    }

    /// Exact-match lookup returning just the stored value.
    pub fn find(&self, key: &[u8]) -> BtreeResult<Option<Vec<u8>>> {
        let key_width = self.config.key_width();
        Ok(self
            .find_row(key)?
            .map(|row| crate::key::row_value(&row, key_width as usize).to_vec()))
    }

    /// Ordered traversal of every row; `f` returning `false` halts the scan.
    pub fn scan_rows(&self, asc: bool, mut f: impl FnMut(&[u8]) -> bool) -> BtreeResult<()> {
        if let Some(node) = root_ref(&self.root) {
            node.scan_rows(asc, &mut f)?;
        }
        Ok(())
    }

    /// Leaf-level ordered traversal; `f` returning `false` halts the scan.
    pub fn scan_leafs(&self, asc: bool, mut f: impl FnMut(&Arc<Leaf>) -> bool) -> BtreeResult<()> {
        let mut cur = if asc {
            self.first_leaf.lock().unwrap().clone()
        } else {
            self.last_leaf.lock().unwrap().clone()
        };
        while let Some(leaf) = cur {
            if !f(&leaf) {
                break;
            }
            cur = if asc { leaf.next() } else { leaf.prev() };
        }
        Ok(())
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn rows_count(&self) -> u64 {
        self.rows_count.load(Ordering::SeqCst)
    }

    pub fn pages_count(&self) -> BtreeResult<u32> {
        self.pages.pages_count()
    }

    pub fn stats(&self) -> PageManagerStats {
        self.pages.stats()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }
}

fn root_ref(root: &Mutex<Option<Node>>) -> Option<NodeGuard<'_>> {
    let guard = root.lock().unwrap();
    if guard.is_some() {
        Some(NodeGuard(guard))
    } else {
        None
    }
}

/// Thin wrapper so callers can call `.find`/`.scan_rows` on the locked root
/// without a lifetime escaping the guard.
struct NodeGuard<'a>(std::sync::MutexGuard<'a, Option<Node>>);

impl<'a> NodeGuard<'a> {
    fn find(&self, key: &[u8]) -> BtreeResult<Option<Vec<u8>>> {
        self.0.as_ref().unwrap().find(key)
    }

    fn scan_rows(&self, asc: bool, f: &mut dyn FnMut(&[u8]) -> bool) -> BtreeResult<bool> {
        self.0.as_ref().unwrap().scan_rows(asc, f)
    }
}
