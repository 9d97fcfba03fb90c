// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Geometry of the complete binary bucket tree.
//!
//! Buckets are numbered breadth-first from the root (id 0); the parent of a
//! bucket `b > 0` is `(b - 1) / 2`. Leaves occupy `min_leaf..=max_leaf`.

use crate::{BucketId, Leaf, TreeHeight};
use rand::{CryptoRng, Rng, RngCore};

/// Bucket ids are 32 bits, which caps the tree height.
pub const MAXIMUM_TREE_HEIGHT: TreeHeight = 31;

/// The shape of a bucket tree with a given block capacity.
#[derive(Clone, Copy, Debug)]
pub struct TreeGeometry {
    capacity: usize,
    height: TreeHeight,
    min_leaf: Leaf,
    max_leaf: Leaf,
}

impl TreeGeometry {
    /// The geometry of a tree able to hold `capacity` blocks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or too large for 32-bit bucket ids.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ORAM capacity must be nonzero");
        let height = capacity.next_power_of_two().ilog2();
        assert!(height <= MAXIMUM_TREE_HEIGHT);

        let min_leaf = (1u32 << height) - 1;
        let max_leaf = 2 * min_leaf;
        Self {
            capacity,
            height,
            min_leaf,
            max_leaf,
        }
    }

    /// The declared capacity in blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `ceil(log2(capacity))`; the root sits at level 0 and the leaves at
    /// level `height`.
    pub fn height(&self) -> TreeHeight {
        self.height
    }

    /// The smallest leaf id, `2^height - 1`.
    pub fn min_leaf(&self) -> Leaf {
        self.min_leaf
    }

    /// The largest leaf id, `2 * min_leaf`.
    pub fn max_leaf(&self) -> Leaf {
        self.max_leaf
    }

    /// The number of bucket ids setup seeds into the eviction cache,
    /// `2 * capacity - 1`: the whole tree when the capacity is a power of
    /// two. Blocks whose leaf falls outside it pack into upper levels until
    /// later accesses cache their true paths.
    pub fn bucket_count(&self) -> usize {
        2 * self.capacity - 1
    }

    /// The ids from `leaf` up to and including the root. Length is always
    /// `height + 1`.
    pub fn path_for_leaf(&self, leaf: Leaf) -> Vec<BucketId> {
        debug_assert!(leaf >= self.min_leaf && leaf <= self.max_leaf);

        let mut path = Vec::with_capacity(self.height as usize + 1);
        let mut id = leaf;
        loop {
            path.push(id);
            if id == 0 {
                break;
            }
            id = (id - 1) / 2;
        }
        path
    }

    /// The inclusive id range `[2^level - 1, 2 * (2^level - 1)]` of buckets at
    /// `level`.
    pub fn level_range(&self, level: TreeHeight) -> (BucketId, BucketId) {
        debug_assert!(level <= self.height);
        let low = (1u32 << level) - 1;
        (low, 2 * low)
    }

    /// A uniformly random leaf in `[min_leaf, min_leaf + capacity)`.
    pub fn random_leaf<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Leaf {
        self.min_leaf + rng.gen_range(0..self.capacity as Leaf)
    }
}
