// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Branches: in-memory-only internal nodes holding separator keys and child
//! references. Never persisted; rebuilt from the leaf chain on open (see
//! `crate::loader`).

use std::sync::Arc;

use crate::config::TreeConfig;
use crate::error::BtreeResult;
use crate::key::compare_keys;
use crate::leaf::Leaf;

/// A child of a branch: either another branch or a leaf page.
pub(crate) enum Node {
    Leaf(Arc<Leaf>),
    Branch(Box<Branch>),
}

impl Node {
    pub(crate) fn find(&self, key: &[u8]) -> BtreeResult<Option<Vec<u8>>> {
        match self {
            Node::Leaf(leaf) => leaf.find(key),
            Node::Branch(branch) => branch.find(key),
        }
    }

    /// Leftmost leaf reachable from this node, used to compute tree height
    /// and to locate `firstLeaf` after loader reconstruction.
    pub(crate) fn leftmost_leaf(&self) -> &Arc<Leaf> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Branch(branch) => branch.items[0].leftmost_leaf(),
        }
    }

    pub(crate) fn scan_rows(
        &self,
        asc: bool,
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> BtreeResult<bool> {
        match self {
            Node::Leaf(leaf) => leaf.scan_rows(asc, f),
            Node::Branch(branch) => branch.scan_rows(asc, f),
        }
    }
}

/// Effect of an insert that descended through a branch: whether the key was
/// new, whether the tail of the leaf chain moved, and whether this branch
/// itself overflowed and must be spliced into its own parent.
pub(crate) struct InsertEffect {
    pub was_new: bool,
    pub new_tail: Option<Arc<Leaf>>,
    pub split_up: Option<(Vec<u8>, Node)>,
}

/// An internal node: ordered separator keys `K0 < K1 < ... < K(c-2)` and `c`
/// children, where child `i` covers `[K(i-1), K(i))`.
pub struct Branch {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) items: Vec<Node>,
}

impl Branch {
    pub(crate) fn new(keys: Vec<Vec<u8>>, items: Vec<Node>) -> Self {
        debug_assert_eq!(items.len(), keys.len() + 1);
        Branch { keys, items }
    }

    /// Wraps a single child with no separators. Used by `Tree::insert` when
    /// growing the root.
    pub(crate) fn wrap(child: Node) -> Self {
        Branch {
            keys: Vec::new(),
            items: vec![child],
        }
    }

    pub(crate) fn is_full(&self, config: &TreeConfig) -> bool {
        self.keys.len() as u32 > config.rows_per_page()
    }

    /// Index of the child covering `key`: the smallest `i` with
    /// `key < keys[i]`, or `keys.len()` if none.
    fn child_index(&self, key: &[u8]) -> usize {
        for (i, sep) in self.keys.iter().enumerate() {
            if compare_keys(key, sep) == std::cmp::Ordering::Less {
                return i;
            }
        }
        self.keys.len()
    }

    pub fn find(&self, key: &[u8]) -> BtreeResult<Option<Vec<u8>>> {
        let idx = self.child_index(key);
        self.items[idx].find(key)
    }

    pub(crate) fn scan_rows(
        &self,
        asc: bool,
        f: &mut dyn FnMut(&[u8]) -> bool,
    ) -> BtreeResult<bool> {
        if asc {
            for item in &self.items {
                if !item.scan_rows(true, f)? {
                    return Ok(false);
                }
            }
        } else {
            for item in self.items.iter().rev() {
                if !item.scan_rows(false, f)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Inserts `row`, descending to the covering child, splicing in any
    /// child split, then reporting whether this branch itself now overflows.
    ///
    /// ## Input
    /// - `row`: a full encoded row (header + key + value); the covering
    ///   child is chosen by its key.
    /// - `key_width`, `config`: geometry needed to locate the key within
    ///   `row` and to decide whether this branch has overflowed.
    ///
    /// ## Output
    /// - `InsertEffect.was_new`: `true` unless the key already existed.
    /// - `InsertEffect.new_tail`: `Some(leaf)` if a split moved the tail of
    ///   the leaf chain, propagated up from the descent.
    /// - `InsertEffect.split_up`: `Some((promoted_key, new_node))` if this
    ///   branch itself overflowed and must be spliced into its parent (for
    ///   the caller one level up to handle, and possibly split itself).
    pub(crate) fn insert(&mut self, row: &[u8], key_width: usize, config: &TreeConfig) -> BtreeResult<InsertEffect> {
        let key = crate::key::row_key(row, key_width);
        let idx = self.child_index(key);

        let (was_new, new_tail, spliced) = match &mut self.items[idx] {
            Node::Leaf(leaf) => {
                let leaf = leaf.clone();
                let result = leaf.insert_and_split(row)?;
                (
                    result.was_new,
                    result.new_tail,
                    result.split_up.map(|(k, l)| (k, Node::Leaf(l))),
                )
            }
            Node::Branch(child) => {
                let effect = child.insert(row, key_width, config)?;
                (effect.was_new, effect.new_tail, effect.split_up)
            }
        };

        if let Some((promoted_key, new_node)) = spliced {
            self.keys.insert(idx, promoted_key);
            self.items.insert(idx + 1, new_node);
        }

        let split_up = if self.is_full(config) {
            Some(self.split(config))
        } else {
            None
        };

        Ok(InsertEffect {
            was_new,
            new_tail,
            split_up,
        })
    }

    /// Splits this branch in half, promoting the median separator key to
    /// the caller (removed from both children, unlike a leaf split which
    /// copies its separator).
    pub(crate) fn split(&mut self, config: &TreeConfig) -> (Vec<u8>, Node) {
        let m = config.branching_factor() as usize;
        let promoted_key = self.keys[m - 1].clone();

        let right_keys = self.keys.split_off(m);
        self.keys.truncate(m - 1);
        let right_items = self.items.split_off(m);

        let right = Branch::new(right_keys, right_items);
        (promoted_key, Node::Branch(Box::new(right)))
    }
}
