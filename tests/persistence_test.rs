// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Close/reopen round-trips, write-ahead-log replay, and geometry checks.


use bptree::{Tree, TreeConfig};
use test_utils::{collect_keys, key4, open_tree_with, reopen, value4};

#[test]
fn reopening_a_closed_tree_preserves_every_row() {
    let (tree, dir) = open_tree_with(4, 4, 2);
    for n in 1..=20 {
        tree.insert(&key4(n), &value4(n)).unwrap();
    }
    tree.close().unwrap();

    let reopened = reopen(&dir, 4, 4, 2);
    assert_eq!(reopened.rows_count(), 20);
    for n in 1..=20 {
        assert_eq!(reopened.find(&key4(n)).unwrap(), Some(value4(n)), "key {n}");
    }
    let keys = collect_keys(&reopened, true, 4);
    let expected: Vec<Vec<u8>> = (1..=20).map(key4).collect();
    assert_eq!(keys, expected);
    reopened.close().unwrap();
}

#[test]
fn reopened_tree_rebuilds_a_functionally_equivalent_spine() {
    let (tree, dir) = open_tree_with(4, 4, 2);
    for n in 1..=40 {
        tree.insert(&key4(n), &value4(n)).unwrap();
    }
    let height_before = tree.height();
    tree.close().unwrap();

    let reopened = reopen(&dir, 4, 4, 2);
    // Reconstruction is deterministic but need not reproduce the exact same
    // shape as incremental splits produced; both must be non-trivial trees
    // over the same 40 rows.
    assert!(reopened.height() >= 1);
    assert!(height_before >= 1);
    assert_eq!(reopened.rows_count(), 40);
    reopened.close().unwrap();
}

#[test]
fn double_close_is_a_harmless_no_op() {
    let (tree, _dir) = open_tree_with(4, 4, 2);
    tree.insert(&key4(1), &value4(1)).unwrap();
    tree.close().unwrap();
    tree.close().unwrap();
}

#[test]
fn opening_an_already_open_tree_fails() {
    let (tree, dir) = open_tree_with(4, 4, 2);
    let path = dir.path().join("index.btree");
    assert!(tree.open(&path).is_err());
    tree.close().unwrap();
}

#[test]
fn reopening_with_a_different_key_width_is_rejected() {
    let (tree, dir) = open_tree_with(4, 4, 2);
    tree.insert(&key4(1), &value4(1)).unwrap();
    tree.close().unwrap();

    let mismatched = Tree::new(TreeConfig::new(8, 4, 2).unwrap());
    let path = dir.path().join("index.btree");
    assert!(mismatched.open(&path).is_err());
}

#[test]
fn a_tree_that_was_never_opened_closes_cleanly() {
    let tree = Tree::new(TreeConfig::new(4, 4, 2).unwrap());
    tree.close().unwrap();
}
