// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Benchmarks for the ORAM clients.

extern crate criterion;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use oram_client::test_utils::{
    counting_oram_lb, counting_path_oram, sequential_blocks, CountingOramLb, CountingPathOram,
};
use oram_client::{BlockKey, Oram};

const CAPACITIES_TO_BENCHMARK: [usize; 2] = [64, 256];
const NUM_OPERATIONS_TO_RUN: usize = 64;

trait Instrumented {
    fn physical_reads(&self) -> u64;
    fn physical_writes(&self) -> u64;
    fn short_name() -> String;
}

impl<const B: usize> Instrumented for CountingPathOram<B> {
    fn physical_reads(&self) -> u64 {
        self.channel.read_count()
    }

    fn physical_writes(&self) -> u64 {
        self.channel.write_count()
    }

    fn short_name() -> String {
        "PathOram".into()
    }
}

impl<const B: usize> Instrumented for CountingOramLb<B> {
    fn physical_reads(&self) -> u64 {
        self.channel.read_count()
    }

    fn physical_writes(&self) -> u64 {
        self.channel.write_count()
    }

    fn short_name() -> String {
        "OramLb".into()
    }
}

fn benchmark_read_evict<const B: usize, T: Oram<B> + Instrumented>(
    c: &mut Criterion,
    mut make_oram: impl FnMut(usize) -> T,
) {
    let mut group = c.benchmark_group(format!("{}::read_evict", T::short_name()));
    for capacity in CAPACITIES_TO_BENCHMARK {
        let mut oram = make_oram(capacity);
        oram.setup(sequential_blocks::<B>(capacity)).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let mut key = 0;
                b.iter(|| {
                    oram.read(key as BlockKey).unwrap();
                    oram.evict().unwrap();
                    key = (key + 1) % capacity;
                });
            },
        );
    }
    group.finish();
}

fn print_physical_access_counts<const B: usize, T: Oram<B> + Instrumented>(
    mut make_oram: impl FnMut(usize) -> T,
) {
    for capacity in CAPACITIES_TO_BENCHMARK {
        let mut oram = make_oram(capacity);
        oram.setup(sequential_blocks::<B>(capacity)).unwrap();
        let (setup_reads, setup_writes) = (oram.physical_reads(), oram.physical_writes());

        for key in 0..NUM_OPERATIONS_TO_RUN {
            oram.read((key % capacity) as BlockKey).unwrap();
            oram.evict().unwrap();
        }

        println!(
            "{} (N = {capacity}): setup wrote {setup_writes} pages; {NUM_OPERATIONS_TO_RUN} accesses read {} and wrote {} pages",
            T::short_name(),
            oram.physical_reads() - setup_reads,
            oram.physical_writes() - setup_writes,
        );
    }
}

fn benchmarks(c: &mut Criterion) {
    benchmark_read_evict::<64, _>(c, |capacity| counting_path_oram::<64>(capacity, 0));
    benchmark_read_evict::<64, _>(c, |capacity| counting_oram_lb::<64>(capacity, 0));

    print_physical_access_counts::<64, _>(|capacity| counting_path_oram::<64>(capacity, 0));
    print_physical_access_counts::<64, _>(|capacity| counting_oram_lb::<64>(capacity, 0));
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
