// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Reconstructs the leaf chain and the branch spine from a backing file on
//! open. See `SPEC_FULL.md` §4.6.

use std::sync::Arc;

use crate::branch::{Branch, Node};
use crate::error::{BtreeError, BtreeResult};
use crate::leaf::Leaf;
use crate::page::PageManager;

/// Everything `Tree::open` needs to resume an existing file.
pub(crate) struct LoadedTree {
    pub root: Node,
    pub first_leaf: Arc<Leaf>,
    pub last_leaf: Arc<Leaf>,
    pub height: u32,
    pub rows_count: u64,
}

/// Reads every page, links the leaf chain, and rebuilds a balanced branch
/// spine over the chain order.
///
/// ## Output
/// - `Ok(None)`: the file has no pages yet.
/// - `Ok(Some(LoadedTree))`: every page read back a consistent leaf chain.
///
/// ## Error Conditions
/// - `BtreeError::Corrupt`: a page's stored `next` points outside the file,
///   or the chain does not have exactly one tail leaf (`next == -1`). Both
///   are reachable from a crash between a split's two leaf writes, since
///   the write-ahead log covers logical inserts, not page-flush ordering.
/// - `BtreeError::GeometryMismatch`, `BtreeError::Io`: propagated from
///   `PageManager::read_page_header`.
pub(crate) fn load(pages: &Arc<PageManager>) -> BtreeResult<Option<LoadedTree>> {
    let page_count = pages.pages_count()?;
    if page_count == 0 {
        return Ok(None);
    }

    let mut leaves = Vec::with_capacity(page_count as usize);
    let mut nexts = Vec::with_capacity(page_count as usize);
    let mut first_keys = Vec::with_capacity(page_count as usize);
    let mut rows_count: u64 = 0;

    for page in 0..page_count {
        let (next_page, count, first_key) = pages.read_page_header(page)?;
        leaves.push(Leaf::new_unloaded(page, pages.clone(), count));
        nexts.push(next_page);
        first_keys.push(first_key);
        rows_count += count as u64;
    }

    if page_count == 1 {
        let leaf = leaves.into_iter().next().unwrap();
        return Ok(Some(LoadedTree {
            root: Node::Leaf(leaf.clone()),
            first_leaf: leaf.clone(),
            last_leaf: leaf,
            height: 1,
            rows_count,
        }));
    }

    let mut last_leaf = None;
    let mut tail_count = 0u32;
    for (i, &next) in nexts.iter().enumerate() {
        if next != -1 {
            if next < 0 || next as usize >= leaves.len() {
                return Err(BtreeError::Corrupt {
                    page: i as u32,
                    reason: format!("next page {next} is out of range for a {page_count}-page file"),
                });
            }
            let next_idx = next as usize;
            leaves[i].set_next(Some(leaves[next_idx].clone()));
            leaves[next_idx].set_prev(Some(Arc::downgrade(&leaves[i])));
        } else {
            tail_count += 1;
            last_leaf = Some(leaves[i].clone());
        }
    }
    let last_leaf = match (tail_count, last_leaf) {
        (1, Some(leaf)) => leaf,
        (0, _) => {
            return Err(BtreeError::Corrupt {
                page: page_count.saturating_sub(1),
                reason: "no leaf page claims the tail slot (next = -1)".to_string(),
            });
        }
        _ => {
            return Err(BtreeError::Corrupt {
                page: page_count.saturating_sub(1),
                reason: format!("{tail_count} leaf pages claim the tail slot (next = -1), expected exactly one"),
            });
        }
    };

    let mut first_leaf = last_leaf.clone();
    while let Some(prev) = first_leaf.prev() {
        first_leaf = prev;
    }

    let mut chain_order = Vec::with_capacity(page_count as usize);
    let mut cur = Some(first_leaf.clone());
    while let Some(leaf) = cur {
        chain_order.push(leaf.page_number());
        cur = leaf.next();
    }
    debug_assert_eq!(chain_order.len(), page_count as usize);

    let items_in_branch = pages.config().rows_per_page();
    let root = reconstruct(&chain_order, &leaves, &first_keys, 0, chain_order.len(), items_in_branch);

    let mut height = 1;
    let mut node = &root;
    while let Node::Branch(b) = node {
        height += 1;
        node = &b.items[0];
    }

    Ok(Some(LoadedTree {
        root,
        first_leaf,
        last_leaf,
        height,
        rows_count,
    }))
}

fn reconstruct(
    chain_order: &[u32],
    leaves: &[Arc<Leaf>],
    first_keys: &[Vec<u8>],
    lo: usize,
    hi: usize,
    items_in_branch: u32,
) -> Node {
    let len = (hi - lo) as u32;
    let chunk_size = div_ceil(len, items_in_branch);
    let chunks_count = div_ceil(len, chunk_size);

    let mut keys = Vec::with_capacity(chunks_count as usize - 1);
    let mut items = Vec::with_capacity(chunks_count as usize);

    for i in 0..chunks_count {
        let start = lo + (i * chunk_size) as usize;
        let end = std::cmp::min(lo + ((i + 1) * chunk_size) as usize, hi);

        let child = if chunk_size == 1 {
            Node::Leaf(leaves[chain_order[start] as usize].clone())
        } else {
            reconstruct(chain_order, leaves, first_keys, start, end, items_in_branch)
        };
        items.push(child);

        if i > 0 {
            keys.push(first_keys[chain_order[start] as usize].clone());
        }
    }

    Node::Branch(Box::new(Branch::new(keys, items)))
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}
