// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common utilities for this crate's tests and benchmarks.

use crate::{
    bucket::Block,
    channel::{BucketChannel, CountingChannel, MemoryChannel},
    crypto::EncryptionKey,
    oram_lb::OramLbClient,
    path_oram::PathOramClient,
    BlockKey, BlockSize,
};
use rand::{rngs::StdRng, SeedableRng};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::collections::{BTreeMap, BTreeSet};

/// Initializes a terminal logger, once; later calls are no-ops.
pub fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// A Path ORAM client over an in-memory channel.
pub type MemoryPathOram<const B: BlockSize> = PathOramClient<B, MemoryChannel, StdRng>;
/// A large-bucket client over an in-memory channel.
pub type MemoryOramLb<const B: BlockSize> = OramLbClient<B, MemoryChannel, StdRng>;
/// A Path ORAM client whose channel counts physical accesses.
pub type CountingPathOram<const B: BlockSize> =
    PathOramClient<B, CountingChannel<MemoryChannel>, StdRng>;
/// A large-bucket client whose channel counts physical accesses.
pub type CountingOramLb<const B: BlockSize> =
    OramLbClient<B, CountingChannel<MemoryChannel>, StdRng>;

/// The fixed key every test client encrypts under.
pub fn test_key() -> EncryptionKey {
    EncryptionKey::from_bytes([0x07; 32])
}

/// A deterministic Path ORAM client for `capacity` blocks.
pub fn memory_path_oram<const B: BlockSize>(capacity: usize, seed: u64) -> MemoryPathOram<B> {
    let channel = MemoryChannel::new(MemoryPathOram::<B>::ENC_BUCKET_LEN);
    PathOramClient::construct(capacity, channel, &test_key(), StdRng::seed_from_u64(seed))
        .expect("test channel page size always matches")
}

/// A deterministic large-bucket client for `capacity` blocks.
pub fn memory_oram_lb<const B: BlockSize>(capacity: usize, seed: u64) -> MemoryOramLb<B> {
    let channel = MemoryChannel::new(MemoryOramLb::<B>::PAGE_LEN);
    OramLbClient::construct(capacity, channel, &test_key(), StdRng::seed_from_u64(seed))
        .expect("test channel page size always matches")
}

/// [`memory_path_oram`] behind a counting channel.
pub fn counting_path_oram<const B: BlockSize>(capacity: usize, seed: u64) -> CountingPathOram<B> {
    let channel = CountingChannel::new(MemoryChannel::new(CountingPathOram::<B>::ENC_BUCKET_LEN));
    PathOramClient::construct(capacity, channel, &test_key(), StdRng::seed_from_u64(seed))
        .expect("test channel page size always matches")
}

/// [`memory_oram_lb`] behind a counting channel.
pub fn counting_oram_lb<const B: BlockSize>(capacity: usize, seed: u64) -> CountingOramLb<B> {
    let channel = CountingChannel::new(MemoryChannel::new(CountingOramLb::<B>::PAGE_LEN));
    OramLbClient::construct(capacity, channel, &test_key(), StdRng::seed_from_u64(seed))
        .expect("test channel page size always matches")
}

/// Blocks with keys `0..count`, each valued at its key's little-endian bytes.
pub fn sequential_blocks<const B: BlockSize>(count: usize) -> Vec<Block<B>> {
    (0..count as BlockKey)
        .map(|key| Block::new(key, key_payload::<B>(key)))
        .collect()
}

/// The payload [`sequential_blocks`] stores under `key`.
pub fn key_payload<const B: BlockSize>(key: BlockKey) -> [u8; B] {
    let mut value = [0u8; B];
    let bytes = key.to_le_bytes();
    let n = B.min(bytes.len());
    value[..n].copy_from_slice(&bytes[..n]);
    value
}

/// Half the L1 distance between two equal-mass histograms, in `[0, 1]`.
pub fn total_variation<K: Ord + Copy>(a: &BTreeMap<K, u64>, b: &BTreeMap<K, u64>) -> f64 {
    let mass: u64 = a.values().sum();
    assert_eq!(mass, b.values().sum::<u64>(), "histograms of unequal mass");

    let keys: BTreeSet<K> = a.keys().chain(b.keys()).copied().collect();
    let mut distance = 0.0;
    for key in keys {
        let x = *a.get(&key).unwrap_or(&0) as f64;
        let y = *b.get(&key).unwrap_or(&0) as f64;
        distance += (x - y).abs();
    }
    distance / (2.0 * mass as f64)
}

/// Reads every key in `0..count` back, evicting after each access, and checks
/// the payloads.
pub fn check_read_back<const B: BlockSize, T: crate::Oram<B>>(oram: &mut T, count: usize) {
    for key in 0..count as BlockKey {
        let block = oram.read(key).expect("inserted key must read back");
        assert_eq!(block.key, key);
        assert_eq!(block.value, key_payload::<B>(key));
        oram.evict().expect("eviction after a single read");
    }
}

/// Generates a read-back correctness test for a client constructor from this
/// module and a `(payload width, capacity)` pair.
#[macro_export]
macro_rules! create_read_back_tests {
    ($client_fn:ident, $b:literal, $n:literal) => {
        paste::paste! {
            #[test]
            fn [<read_back_ $client_fn _ $b _ $n>]() {
                $crate::test_utils::init_logger();
                let mut oram = $crate::test_utils::$client_fn::<$b>($n, 0);
                let blocks = $crate::test_utils::sequential_blocks::<$b>($n);
                $crate::Oram::setup(&mut oram, blocks).unwrap();
                $crate::test_utils::check_read_back::<$b, _>(&mut oram, $n);
            }
        }
    };
}
