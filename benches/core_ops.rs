// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Core index operation benchmarks.
//!
//! Measures:
//! - sequential insert throughput at a realistic branching factor
//! - point lookup latency against a populated tree
//! - ascending scan throughput

use bptree::{Tree, TreeConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn key(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

fn value(n: u32) -> [u8; 8] {
    (n as u64).to_be_bytes()
}

fn populated_tree(rows: u32) -> (std::sync::Arc<Tree>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = TreeConfig::new(4, 8, 64).unwrap();
    let tree = Tree::new(config);
    tree.open(dir.path().join("bench.btree")).unwrap();
    for n in 0..rows {
        tree.insert(&key(n), &value(n)).unwrap();
    }
    (tree, dir)
}

fn bench_sequential_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_insert");

    for rows in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &rows| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let config = TreeConfig::new(4, 8, 64).unwrap();
                    let tree = Tree::new(config);
                    tree.open(dir.path().join("bench.btree")).unwrap();
                    (tree, dir)
                },
                |(tree, _dir)| {
                    for n in 0..rows {
                        black_box(tree.insert(&key(n), &value(n)).unwrap());
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_lookup");

    for rows in [1_000, 10_000, 100_000].iter() {
        let (tree, _dir) = populated_tree(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, &rows| {
            b.iter(|| {
                black_box(tree.find(&key(rows / 2)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_ascending_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("ascending_scan");

    for rows in [1_000, 10_000].iter() {
        let (tree, _dir) = populated_tree(*rows);
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| {
                let mut count = 0u64;
                tree.scan_rows(true, |_row| {
                    count += 1;
                    true
                })
                .unwrap();
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_insert, bench_point_lookup, bench_ascending_scan);
criterion_main!(benches);
