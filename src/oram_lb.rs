// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Path ORAM with large buckets.
//!
//! Every subtree of [`LEVELS_PER_PAGE`] levels is packed into one "large
//! bucket": a single opaque page holding `2^LPP - 1` encrypted small buckets
//! in breadth-first order. A path of `height + 1` buckets then costs only
//! `ceil((height + 1) / LPP)` page fetches instead of one per level.
//!
//! The transform between small-bucket ids and `(virtual id, offset)` pairs is
//! 1-based: the original tree's root converts at the client boundary as
//! `id + 1` and lands at virtual id 1, offset 0.

use crate::{
    bucket::{Block, Bucket},
    channel::BucketChannel,
    crypto::{ciphertext_len, BucketCipher, EncryptionKey},
    position_map::PositionMap,
    stash::Stash,
    tree::TreeGeometry,
    BlockKey, BlockSize, Leaf, OramError, TreeHeight, BLOCKS_PER_BUCKET,
};
use log::debug;
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use static_assertions::const_assert;
use std::collections::{BTreeMap, BTreeSet};
use std::thread;

/// The numeric type of large-bucket page identifiers (breadth-first, root = 1).
pub type VirtualBucketId = u32;

/// "Levels per page": the height of the subtree packed into one large bucket.
pub const LEVELS_PER_PAGE: u32 = 4;

// The packed-subtree offset must fit the id arithmetic comfortably.
const_assert!(LEVELS_PER_PAGE >= 1 && LEVELS_PER_PAGE <= 8);

/// The shape of the virtual tree of large buckets laid over an original tree.
#[derive(Clone, Copy, Debug)]
pub struct VirtualGeometry {
    levels_per_page: u32,
    virtual_height: u32,
}

impl VirtualGeometry {
    /// The virtual tree covering an original tree of `height + 1` levels,
    /// packing `levels_per_page` levels into each page.
    pub fn new(height: TreeHeight, levels_per_page: u32) -> Self {
        assert!(levels_per_page > 0);
        // ceil((height + 1) / levels_per_page)
        let virtual_height = (height + levels_per_page) / levels_per_page;
        Self {
            levels_per_page,
            virtual_height,
        }
    }

    /// The number of virtual levels.
    pub fn virtual_height(&self) -> u32 {
        self.virtual_height
    }

    /// The number of small buckets each page holds.
    pub fn buckets_per_page(&self) -> usize {
        (1usize << self.levels_per_page) - 1
    }

    /// The number of pages on virtual levels `0..=vlevel`.
    fn pages_through_level(&self, vlevel: u32) -> u64 {
        let mut total = 0u64;
        for level in 0..=vlevel {
            total += 1u64 << (self.levels_per_page * level);
        }
        total
    }

    /// The total number of pages in the virtual tree.
    pub fn total_pages(&self) -> u64 {
        self.pages_through_level(self.virtual_height - 1)
    }

    /// The inclusive range of page ids on virtual level `vlevel`.
    pub fn level_page_range(&self, vlevel: u32) -> (VirtualBucketId, VirtualBucketId) {
        let first = if vlevel == 0 {
            1
        } else {
            1 + self.pages_through_level(vlevel - 1)
        };
        let last = first + (1u64 << (self.levels_per_page * vlevel)) - 1;
        (first as VirtualBucketId, last as VirtualBucketId)
    }

    /// The virtual level of a 1-based original bucket id.
    pub fn virtual_level_of(&self, bucket: u64) -> u32 {
        debug_assert!(bucket >= 1);
        bucket.ilog2() / self.levels_per_page
    }

    /// Maps a 1-based original bucket id to its page and its breadth-first
    /// offset within that page's packed subtree.
    pub fn to_virtual(&self, bucket: u64) -> (VirtualBucketId, u32) {
        debug_assert!(bucket >= 1);
        let node_level = bucket.ilog2();
        let vnode_level = node_level / self.levels_per_page;
        let subtree_level = node_level % self.levels_per_page;

        // Horizontal index within the original level, then within the level's
        // stride of packed subtrees.
        let level_index = bucket - (1u64 << node_level);
        let stride = 1u64 << subtree_level;
        let page_index = level_index / stride;

        let (first, _) = self.level_page_range(vnode_level);
        let vid = u64::from(first) + page_index;
        let offset = (1u64 << subtree_level) + (level_index % stride) - 1;
        (vid as VirtualBucketId, offset as u32)
    }

    /// The inverse of [`VirtualGeometry::to_virtual`]. `vid` must name a page
    /// of this virtual tree.
    pub fn to_bucket(&self, vid: VirtualBucketId, offset: u32) -> u64 {
        debug_assert!((offset as usize) < self.buckets_per_page());
        debug_assert!(u64::from(vid) >= 1 && u64::from(vid) <= self.total_pages());
        let slot = u64::from(offset) + 1;
        let subtree_level = slot.ilog2();
        let within_level = slot - (1u64 << subtree_level);

        let mut vlevel = 0;
        let first = loop {
            let (first, last) = self.level_page_range(vlevel);
            if vid >= first && vid <= last {
                break first;
            }
            vlevel += 1;
        };
        let page_index = u64::from(vid) - u64::from(first);

        let node_level = vlevel * self.levels_per_page + subtree_level;
        let level_index = page_index * (1u64 << subtree_level) + within_level;
        (1u64 << node_level) + level_index
    }
}

/// A Path ORAM client whose server pages are whole packed subtrees.
///
/// State and algorithms mirror [`crate::PathOramClient`]; the cache holds
/// *virtual* page ids, and every path fetch and eviction goes through the
/// coordinate transform.
pub struct OramLbClient<const B: BlockSize, C: BucketChannel, R: RngCore + CryptoRng> {
    geometry: TreeGeometry,
    vgeometry: VirtualGeometry,
    positions: PositionMap,
    stash: Stash<B>,
    cache: BTreeSet<VirtualBucketId>,
    cipher: BucketCipher,
    /// The server channel. Public for tests and benchmarks.
    pub channel: C,
    rng: R,
    max_stash: usize,
    initialized: bool,
}

impl<const B: BlockSize, C: BucketChannel, R: RngCore + CryptoRng> OramLbClient<B, C, R> {
    /// The encrypted wire size of one small bucket.
    pub const ENC_BUCKET_LEN: usize = ciphertext_len(Bucket::<B>::WIRE_LEN);

    /// The wire size of one large-bucket page: `2^LPP - 1` encrypted small
    /// buckets, concatenated breadth-first.
    pub const PAGE_LEN: usize = ((1usize << LEVELS_PER_PAGE) - 1) * Self::ENC_BUCKET_LEN;

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
        let vgeometry = VirtualGeometry::new(geometry.height(), LEVELS_PER_PAGE);
        if channel.page_len() != Self::PAGE_LEN {
            return Err(OramError::PageSizeMismatch {
                got: channel.page_len(),
                expected: Self::PAGE_LEN,
            });
        }

        let max_stash = 2 * BLOCKS_PER_BUCKET * geometry.height() as usize;
        debug!(
            "constructing ORAMLB client: N = {capacity}, B = {B}, height = {}, virtual height = {}, page = {} bytes",
            geometry.height(),
            vgeometry.virtual_height(),
            Self::PAGE_LEN
        );

        Ok(Self {
            geometry,
            vgeometry,
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

    /// The height of the original bucket tree.
    pub fn height(&self) -> TreeHeight {
        self.geometry.height()
    }

    /// The virtual-tree shape this client packs pages with.
    pub fn virtual_geometry(&self) -> VirtualGeometry {
        self.vgeometry
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
        self.seed_full_cache();
        self.stash.extend(blocks);
        debug!("sequential setup staged {} blocks", self.stash.len());
        self.finish_setup()
    }

    /// [`OramLbClient::setup`] with leaf assignment fanned out over `workers`
    /// threads, merged serially before the final eviction.
    pub fn par_setup(&mut self, blocks: Vec<Block<B>>, workers: usize) -> Result<(), OramError> {
        self.begin_setup(blocks.len())?;
        let workers = workers.clamp(1, blocks.len().max(1));
        debug!(
            "parallel setup: {} blocks across {workers} workers",
            blocks.len()
        );

        let geometry = self.geometry;
        let assignments: Vec<Vec<(BlockKey, Leaf)>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for tid in 0..workers {
                let start = tid * blocks.len() / workers;
                let end = (tid + 1) * blocks.len() / workers;
                let slice = &blocks[start..end];
                handles.push(scope.spawn(move || {
                    let mut rng = StdRng::from_entropy();
                    slice
                        .iter()
                        .map(|block| (block.key, geometry.random_leaf(&mut rng)))
                        .collect::<Vec<(BlockKey, Leaf)>>()
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

        for (key, leaf) in assignments.into_iter().flatten() {
            self.positions.set(key, leaf);
        }
        self.seed_full_cache();
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

    /// Repacks the stash into the pages touched since the last eviction and
    /// writes them back in one batched, encrypted request.
    ///
    /// Virtual levels are processed leaves first. Within the current level's
    /// band a block tries the buckets on its path deepest first.
    pub fn evict(&mut self) -> Result<(), OramError> {
        if self.cache.is_empty() {
            return Ok(());
        }

        let buckets_per_page = self.vgeometry.buckets_per_page();
        let mut to_write: BTreeMap<VirtualBucketId, Vec<Bucket<B>>> = BTreeMap::new();
        for vlevel in (0..self.vgeometry.virtual_height()).rev() {
            let (first, last) = self.vgeometry.level_page_range(vlevel);
            for vid in self.cache.range(first..=last) {
                to_write.insert(*vid, vec![Bucket::default(); buckets_per_page]);
            }

            let positions = &self.positions;
            let geometry = &self.geometry;
            let vgeometry = &self.vgeometry;
            self.stash.retain(|block| {
                let Some(leaf) = positions.get(block.key) else {
                    debug_assert!(false, "stash block {} has no assigned leaf", block.key);
                    return true;
                };
                for id in geometry.path_for_leaf(leaf) {
                    let one_based = u64::from(id) + 1;
                    if vgeometry.virtual_level_of(one_based) != vlevel {
                        continue;
                    }
                    let (vid, offset) = vgeometry.to_virtual(one_based);
                    let Some(page) = to_write.get_mut(&vid) else {
                        continue;
                    };
                    if page[offset as usize].try_push(block) {
                        return false;
                    }
                }
                true
            });
            debug!(
                "evicted virtual level {vlevel}: page range [{first}, {last}], stash now {}",
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
        for (vid, buckets) in &to_write {
            let mut page = Vec::with_capacity(Self::PAGE_LEN);
            for bucket in buckets {
                page.extend_from_slice(&self.cipher.seal(&bucket.serialize(), &mut self.rng)?);
            }
            pages.insert(*vid, page);
        }
        self.channel.write_buckets(pages)?;
        self.cache.clear();
        debug!(
            "eviction wrote {} pages; stash holds {}",
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

    /// Setup evicts into every page of the virtual tree.
    fn seed_full_cache(&mut self) {
        for vid in 1..=self.vgeometry.total_pages() {
            self.cache.insert(vid as VirtualBucketId);
        }
    }

    fn finish_setup(&mut self) -> Result<(), OramError> {
        // The whole dataset is being packed at once, so the stash bound is
        // not enforced until this eviction completes.
        self.evict()?;
        self.initialized = true;
        Ok(())
    }

    /// Fetches the pages covering `key`'s current path into the stash. A key
    /// that was never inserted walks a freshly drawn random path, so the
    /// channel sees the same traffic either way.
    fn fetch_path_for(&mut self, key: BlockKey) -> Result<(), OramError> {
        let leaf = match self.positions.get(key) {
            Some(leaf) => leaf,
            None => self.geometry.random_leaf(&mut self.rng),
        };
        let vids = self.virtual_path(leaf);
        self.read_path(&vids)?;
        // The pages join the eviction cache only once their contents are in
        // the stash; eviction rewrites every cached page from the stash alone.
        self.cache.extend(vids.iter().copied());
        Ok(())
    }

    /// Remaps `key` to a fresh random leaf, success or not.
    fn remap(&mut self, key: BlockKey) {
        let fresh = self.geometry.random_leaf(&mut self.rng);
        self.positions.set(key, fresh);
    }

    /// The page ids covering the path for `leaf`, deduplicated preserving
    /// leaf-to-root order.
    fn virtual_path(&self, leaf: Leaf) -> Vec<VirtualBucketId> {
        let mut vids = Vec::with_capacity(self.vgeometry.virtual_height() as usize);
        for id in self.geometry.path_for_leaf(leaf) {
            let (vid, _) = self.vgeometry.to_virtual(u64::from(id) + 1);
            if !vids.contains(&vid) {
                vids.push(vid);
            }
        }
        vids
    }

    /// Reads the pages for `vids`, decrypts each page's constituent buckets
    /// in order, and appends their occupied blocks to the stash. Appends all
    /// of them or none.
    fn read_path(&mut self, vids: &[VirtualBucketId]) -> Result<(), OramError> {
        let pages = self.channel.read_buckets(vids)?;

        let mut incoming = Vec::new();
        for page in &pages {
            if page.len() != Self::PAGE_LEN {
                return Err(OramError::PageLength {
                    got: page.len(),
                    expected: Self::PAGE_LEN,
                });
            }
            for chunk in page.chunks_exact(Self::ENC_BUCKET_LEN) {
                // A page (or sub-bucket) that was never written reads as
                // zeros; there is nothing in it.
                if chunk.iter().all(|byte| *byte == 0) {
                    continue;
                }
                let plaintext = self.cipher.open(chunk)?;
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
        }
        self.stash.extend(incoming);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_logger, key_payload, memory_oram_lb, sequential_blocks};
    use std::collections::HashSet;

    #[test]
    fn the_transform_is_a_bijection() {
        // Three full bands of four levels: ids 1..=2^12 - 1.
        let vgeometry = VirtualGeometry::new(11, LEVELS_PER_PAGE);
        let mut seen = HashSet::new();
        for bucket in 1u64..(1 << 12) {
            let (vid, offset) = vgeometry.to_virtual(bucket);
            assert!((offset as usize) < vgeometry.buckets_per_page());
            assert!(seen.insert((vid, offset)), "collision at bucket {bucket}");
            assert_eq!(vgeometry.to_bucket(vid, offset), bucket);
        }
    }

    #[test]
    fn the_transform_covers_a_1024_block_tree() {
        let vgeometry = VirtualGeometry::new(TreeGeometry::new(1024).height(), LEVELS_PER_PAGE);
        let mut seen = HashSet::new();
        for bucket in 1u64..1024 {
            let (vid, offset) = vgeometry.to_virtual(bucket);
            assert!(seen.insert((vid, offset)));
            assert_eq!(vgeometry.to_bucket(vid, offset), bucket);
        }
    }

    #[test]
    fn the_zero_based_root_converts_to_page_one() {
        let vgeometry = VirtualGeometry::new(10, LEVELS_PER_PAGE);
        // Bucket id 0 in client coordinates enters the transform as 1.
        let root = u64::from(0u32) + 1;
        assert_eq!(vgeometry.to_virtual(root), (1, 0));
        assert_eq!(vgeometry.to_bucket(1, 0), 1);
    }

    #[test]
    fn pages_pack_subtrees_breadth_first() {
        let vgeometry = VirtualGeometry::new(11, 4);
        // The root page holds original levels 0..=3: ids 1..=15, offsets 0..=14.
        for bucket in 1u64..=15 {
            assert_eq!(vgeometry.to_virtual(bucket), (1, bucket as u32 - 1));
        }
        // Level 4 starts the second virtual level: one page per subtree root.
        assert_eq!(vgeometry.to_virtual(16), (2, 0));
        assert_eq!(vgeometry.to_virtual(17), (3, 0));
        assert_eq!(vgeometry.to_virtual(31), (17, 0));
        // Children of id 16 sit in the same page at the next subtree level.
        assert_eq!(vgeometry.to_virtual(32), (2, 1));
        assert_eq!(vgeometry.to_virtual(33), (2, 2));
    }

    #[test]
    fn virtual_levels_have_the_expected_ranges() {
        let vgeometry = VirtualGeometry::new(10, 4);
        assert_eq!(vgeometry.virtual_height(), 3);
        assert_eq!(vgeometry.buckets_per_page(), 15);
        assert_eq!(vgeometry.level_page_range(0), (1, 1));
        assert_eq!(vgeometry.level_page_range(1), (2, 17));
        assert_eq!(vgeometry.level_page_range(2), (18, 273));
        assert_eq!(vgeometry.total_pages(), 273);
    }

    #[test]
    fn insert_evict_and_read_back_five_hundred_keys() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(1024, 21);
        oram.setup(sequential_blocks::<8>(500)).unwrap();

        for key in 0..500 {
            let block = oram.read(key).unwrap();
            assert_eq!(block.key, key);
            assert_eq!(block.value, key_payload::<8>(key));
            oram.evict().unwrap();
        }
    }

    #[test]
    fn writes_overwrite_in_place() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(64, 22);
        oram.setup(sequential_blocks::<8>(64)).unwrap();

        oram.write(10, [0xAA; 8]).unwrap();
        oram.evict().unwrap();
        assert_eq!(oram.read(10).unwrap().value, [0xAA; 8]);
        oram.evict().unwrap();
        assert_eq!(oram.read(11).unwrap().value, key_payload::<8>(11));
    }

    #[test]
    fn parallel_setup_reads_back_every_key() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(256, 23);
        oram.par_setup(sequential_blocks::<8>(256), 4).unwrap();

        for key in 0..256 {
            assert_eq!(oram.read(key).unwrap().value, key_payload::<8>(key));
            oram.evict().unwrap();
        }
    }

    #[test]
    fn unknown_keys_fail_without_poisoning_the_client() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(64, 24);
        oram.setup(sequential_blocks::<8>(32)).unwrap();

        assert!(matches!(oram.read(9999), Err(OramError::KeyNotFound(9999))));
        oram.evict().unwrap();
        assert_eq!(oram.read(5).unwrap().value, key_payload::<8>(5));
    }

    #[test]
    fn a_path_costs_one_page_per_virtual_level() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(1024, 25);
        oram.setup(sequential_blocks::<8>(100)).unwrap();

        let leaf = oram.geometry.min_leaf();
        let vids = oram.virtual_path(leaf);
        assert_eq!(vids.len(), oram.vgeometry.virtual_height() as usize);
        // Deepest page first, root page last.
        assert_eq!(*vids.last().unwrap(), 1);
    }

    #[test]
    fn stash_stays_within_its_bound() {
        init_logger();
        let mut oram = memory_oram_lb::<8>(256, 26);
        oram.setup(sequential_blocks::<8>(256)).unwrap();

        let bound = 2 * BLOCKS_PER_BUCKET * oram.height() as usize;
        for round in 0..bound {
            oram.read((round % 256) as BlockKey).unwrap();
            oram.evict().unwrap();
            assert!(oram.stash_len() <= bound, "round {round}");
        }
    }

    /// Runs `accesses` against a fresh counting client per trial, returning
    /// the `(virtual level, page length)` histogram and the read counts of
    /// the deepest virtual level's pages accumulated over every trial.
    fn observed_traffic(
        accesses: &[BlockKey],
        trials: u64,
    ) -> (
        BTreeMap<(u32, usize), u64>,
        BTreeMap<VirtualBucketId, u64>,
    ) {
        let mut shape = BTreeMap::new();
        let mut deepest = BTreeMap::new();
        for trial in 0..trials {
            let mut oram = crate::test_utils::counting_oram_lb::<8>(64, 2000 + trial);
            oram.setup(sequential_blocks::<8>(64)).unwrap();
            let vgeometry = oram.vgeometry;
            let (deep_first, deep_last) =
                vgeometry.level_page_range(vgeometry.virtual_height() - 1);

            let mark = oram.channel.read_log().len();
            for &key in accesses {
                oram.read(key).unwrap();
                oram.evict().unwrap();
            }
            for (vid, len) in &oram.channel.read_log()[mark..] {
                let vlevel = (0..vgeometry.virtual_height())
                    .find(|v| {
                        let (first, last) = vgeometry.level_page_range(*v);
                        *vid >= first && *vid <= last
                    })
                    .expect("logged page id belongs to the virtual tree");
                *shape.entry((vlevel, *len)).or_insert(0) += 1;
                if *vid >= deep_first && *vid <= deep_last {
                    *deepest.entry(*vid).or_insert(0) += 1;
                }
            }
        }
        (shape, deepest)
    }

    #[test]
    fn equal_length_access_sequences_are_indistinguishable_on_the_wire() {
        init_logger();
        // Two different sequences of 64 accesses over 8 distinct keys each:
        // round-robin over keys 0..8 versus runs of 8 over keys 8..16.
        let round_robin: Vec<BlockKey> = (0..64u32).map(|i| i % 8).collect();
        let batched: Vec<BlockKey> = (0..64u32).map(|i| 8 + i / 8).collect();

        let (shape_a, deepest_a) = observed_traffic(&round_robin, 20);
        let (shape_b, deepest_b) = observed_traffic(&batched, 20);

        // Bucketed by virtual level and ciphertext length the histograms
        // agree exactly: every access reads one constant-size page per level.
        assert_eq!(shape_a, shape_b);

        // The deepest-level page of each access is determined by a uniform
        // leaf draw; over many trials the empirical histograms stay close in
        // total variation.
        let distance = crate::test_utils::total_variation(&deepest_a, &deepest_b);
        assert!(distance < 0.5, "deepest-page histograms diverge: {distance}");
    }
}
