// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The Path ORAM client.
//!
//! Each logical block is assigned a uniformly random leaf; the block lives
//! either in the client-side stash or in some bucket on the path from the
//! root to that leaf. An access fetches the whole path into the stash and
//! remaps the block; a later eviction repacks the stash into every bucket
//! touched since the last eviction and writes them back encrypted.

use crate::{
    bucket::{Block, Bucket},
    channel::BucketChannel,
    crypto::{ciphertext_len, BucketCipher, EncryptionKey},
    position_map::PositionMap,
    stash::Stash,
    tree::TreeGeometry,
    BlockKey, BlockSize, BucketId, Leaf, OramError, TreeHeight, BLOCKS_PER_BUCKET,
};
use log::debug;
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::thread;

/// A Path ORAM client over a [`BucketChannel`].
///
/// `B` is the payload width of a block in bytes. All operations are
/// synchronous and the client is single-threaded; only the one-shot parallel
/// setup fans out.
pub struct PathOramClient<const B: BlockSize, C: BucketChannel, R: RngCore + CryptoRng> {
    geometry: TreeGeometry,
    positions: PositionMap,
    stash: Stash<B>,
    /// Bucket ids touched since the last eviction. Every path that has been
    /// read lies entirely in here.
    cache: BTreeSet<BucketId>,
    cipher: BucketCipher,
    /// The server channel. Public for tests and benchmarks.
    pub channel: C,
    rng: R,
    max_stash: usize,
    initialized: bool,
}

impl<const B: BlockSize, C: BucketChannel, R: RngCore + CryptoRng> PathOramClient<B, C, R> {
    /// The encrypted wire size of one bucket page.
    pub const ENC_BUCKET_LEN: usize = ciphertext_len(Bucket::<B>::WIRE_LEN);

    /// Binds a client for `capacity` blocks to `channel`. Performs no I/O.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn construct(
        capacity: usize,
        channel: C,
        key: &EncryptionKey,
        rng: R,
    ) -> Result<Self, OramError> {
        assert!(capacity > 0);

        let geometry = TreeGeometry::new(capacity);
        if channel.page_len() != Self::ENC_BUCKET_LEN {
            return Err(OramError::PageSizeMismatch {
                got: channel.page_len(),
                expected: Self::ENC_BUCKET_LEN,
            });
        }

        let max_stash = 2 * BLOCKS_PER_BUCKET * geometry.height() as usize;
        debug!(
            "constructing Path ORAM client: N = {capacity}, B = {B}, height = {}, encrypted bucket = {} bytes",
            geometry.height(),
            Self::ENC_BUCKET_LEN
        );

        Ok(Self {
            geometry,
            positions: PositionMap::new(),
            stash: Stash::new(),
            cache: BTreeSet::new(),
            cipher: BucketCipher::new(key),
            channel,
            rng,
            max_stash,
            initialized: false,
        })
    }

    /// The declared capacity of this ORAM in blocks.
    pub fn block_capacity(&self) -> usize {
        self.geometry.capacity()
    }

    /// The height of the bucket tree.
    pub fn height(&self) -> TreeHeight {
        self.geometry.height()
    }

    /// The number of blocks currently held in the stash.
    pub fn stash_len(&self) -> usize {
        self.stash.len()
    }

    /// One-time load of at most `block_capacity` blocks, then a single
    /// eviction to spread them over the whole tree.
    pub fn setup(&mut self, blocks: Vec<Block<B>>) -> Result<(), OramError> {
        self.begin_setup(blocks.len())?;

        for block in &blocks {
            let leaf = self.geometry.random_leaf(&mut self.rng);
            self.positions.set(block.key, leaf);
        }

        // Eviction walks the cache, so seed it with every bucket id a leaf
        // path can touch.
        for id in 0..self.geometry.bucket_count() as BucketId {
            self.cache.insert(id);
        }

        self.stash.extend(blocks);
        debug!("sequential setup staged {} blocks", self.stash.len());
        self.finish_setup()
    }

    /// [`PathOramClient::setup`] with leaf assignment fanned out over
    /// `workers` threads.
    ///
    /// Each worker draws leaves for a contiguous range of blocks into a
    /// per-worker buffer and records its share of the bucket-id range in the
    /// cache under a mutex; the buffers are merged serially before the final
    /// eviction.
    pub fn par_setup(&mut self, blocks: Vec<Block<B>>, workers: usize) -> Result<(), OramError> {
        self.begin_setup(blocks.len())?;
        let workers = workers.clamp(1, blocks.len().max(1));
        debug!(
            "parallel setup: {} blocks across {workers} workers",
            blocks.len()
        );

        let geometry = self.geometry;
        let cache = Mutex::new(std::mem::take(&mut self.cache));
        let assignments: Vec<Vec<(BlockKey, Leaf)>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for tid in 0..workers {
                let start = tid * blocks.len() / workers;
                let end = (tid + 1) * blocks.len() / workers;
                let slice = &blocks[start..end];
                let cache = &cache;
                handles.push(scope.spawn(move || {
                    let mut rng = StdRng::from_entropy();
                    let assigned: Vec<(BlockKey, Leaf)> = slice
                        .iter()
                        .map(|block| (block.key, geometry.random_leaf(&mut rng)))
                        .collect();

                    let cache_start = 2 * start;
                    let mut cache_end = 2 * end;
                    // The last worker trims the bound so the range ends on the
                    // final bucket id.
                    if tid == workers - 1 {
                        cache_end = cache_end.saturating_sub(1);
                    }
                    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    cache.extend((cache_start..cache_end).map(|id| id as BucketId));

                    assigned
                }));
            }
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(assigned) => assigned,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        self.cache = cache
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, leaf) in assignments.into_iter().flatten() {
            self.positions.set(key, leaf);
        }
        self.stash.extend(blocks);
        self.finish_setup()
    }

    /// Obliviously reads the block stored under `key`, remapping it to a
    /// fresh random leaf.
    pub fn read(&mut self, key: BlockKey) -> Result<Block<B>, OramError> {
        self.fetch_path_for(key)?;
        self.remap(key);

        let (block, found) = self.stash.ct_read(key);
        if !bool::from(found) {
            return Err(OramError::KeyNotFound(key));
        }
        Ok(block)
    }

    /// Obliviously overwrites the payload stored under `key` in place,
    /// remapping it to a fresh random leaf.
    pub fn write(&mut self, key: BlockKey, value: [u8; B]) -> Result<(), OramError> {
        self.fetch_path_for(key)?;
        self.remap(key);

        let found = self.stash.ct_overwrite(key, &value);
        if !bool::from(found) {
            return Err(OramError::KeyNotFound(key));
        }
        Ok(())
    }

    /// Repacks the stash into the buckets touched since the last eviction and
    /// writes them back in one batched, encrypted request.
    ///
    /// Levels are processed leaves first. A stash block lands in the deepest
    /// cached bucket on its assigned path that still has room; blocks with no
    /// such bucket stay in the stash for a later round.
    pub fn evict(&mut self) -> Result<(), OramError> {
        if self.cache.is_empty() {
            return Ok(());
        }

        let mut to_write: BTreeMap<BucketId, Bucket<B>> = BTreeMap::new();
        for level in (0..=self.geometry.height()).rev() {
            let (low, high) = self.geometry.level_range(level);
            for id in self.cache.range(low..=high) {
                to_write.insert(*id, Bucket::default());
            }

            let level_offset = (self.geometry.height() - level) as usize;
            let positions = &self.positions;
            let geometry = &self.geometry;
            self.stash.retain(|block| {
                let Some(leaf) = positions.get(block.key) else {
                    debug_assert!(false, "stash block {} has no assigned leaf", block.key);
                    return true;
                };
                let path = geometry.path_for_leaf(leaf);
                let target = path[level_offset];
                // A target outside this level's allocation waits for a level
                // (or a later eviction) where its path is cached.
                match to_write.get_mut(&target) {
                    Some(bucket) => !bucket.try_push(block),
                    None => true,
                }
            });
            debug!(
                "evicted level {level}: cached range [{low}, {high}], stash now {}",
                self.stash.len()
            );
        }

        if self.initialized && self.stash.len() > self.max_stash {
            return Err(OramError::StashOverflow {
                len: self.stash.len(),
                limit: self.max_stash,
            });
        }

        let mut pages = BTreeMap::new();
        for (id, bucket) in &to_write {
            pages.insert(*id, self.cipher.seal(&bucket.serialize(), &mut self.rng)?);
        }
        self.channel.write_buckets(pages)?;
        self.cache.clear();
        debug!(
            "eviction wrote {} buckets; stash holds {}",
            to_write.len(),
            self.stash.len()
        );
        Ok(())
    }

    fn begin_setup(&self, count: usize) -> Result<(), OramError> {
        if self.initialized {
            return Err(OramError::AlreadyInitialized);
        }
        if count > self.geometry.capacity() {
            return Err(OramError::TooManyBlocks {
                given: count,
                capacity: self.geometry.capacity(),
            });
        }
        Ok(())
    }

    fn finish_setup(&mut self) -> Result<(), OramError> {
        // The whole dataset is being packed at once, so the stash bound is
        // not enforced until this eviction completes.
        self.evict()?;
        self.initialized = true;
        Ok(())
    }

    /// Fetches the whole path for `key`'s current leaf into the stash. A key
    /// that was never inserted walks a freshly drawn random path, so the
    /// channel sees the same traffic either way.
    fn fetch_path_for(&mut self, key: BlockKey) -> Result<(), OramError> {
        let leaf = match self.positions.get(key) {
            Some(leaf) => leaf,
            None => self.geometry.random_leaf(&mut self.rng),
        };
        let ids = self.geometry.path_for_leaf(leaf);
        self.read_path(&ids)?;
        // The ids join the eviction cache only once their contents are in the
        // stash; eviction rewrites every cached bucket from the stash alone.
        self.cache.extend(ids.iter().copied());
        Ok(())
    }

    /// Remaps `key` to a fresh random leaf. This happens whether or not the
    /// enclosing access succeeds; repeated accesses of one key must look
    /// independent from the server's side.
    fn remap(&mut self, key: BlockKey) {
        let fresh = self.geometry.random_leaf(&mut self.rng);
        self.positions.set(key, fresh);
    }

    /// Reads, decrypts, and deserializes the buckets for `ids`, appending
    /// their occupied blocks to the stash. Appends all of them or none: a
    /// failure mid-path must not leave half a path behind.
    fn read_path(&mut self, ids: &[BucketId]) -> Result<(), OramError> {
        let pages = self.channel.read_buckets(ids)?;

        let mut incoming = Vec::new();
        for page in &pages {
            if page.len() != Self::ENC_BUCKET_LEN {
                return Err(OramError::PageLength {
                    got: page.len(),
                    expected: Self::ENC_BUCKET_LEN,
                });
            }
            // A bucket that was never written comes back as a zero page;
            // there is nothing in it.
            if page.iter().all(|byte| *byte == 0) {
                continue;
            }
            let plaintext = self.cipher.open(page)?;
            if plaintext.len() != Bucket::<B>::WIRE_LEN {
                return Err(OramError::PlaintextLength {
                    got: plaintext.len(),
                    expected: Bucket::<B>::WIRE_LEN,
                });
            }
            let bucket = Bucket::<B>::deserialize(&plaintext)?;
            if bucket.is_empty() {
                continue;
            }
            incoming.extend_from_slice(bucket.occupied());
        }
        self.stash.extend(incoming);
        Ok(())
    }
}
