// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client-side stash: blocks in transit between path reads and evictions.

use crate::{bucket::Block, BlockKey, BlockSize};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

/// An unordered reservoir of blocks. Lookups that service `read`/`write` scan
/// every entry with constant-time selection, so the scan's access pattern does
/// not reveal which slot (if any) matched.
#[derive(Debug, Default)]
pub(crate) struct Stash<const B: BlockSize> {
    blocks: Vec<Block<B>>,
}

impl<const B: BlockSize> Stash<B> {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn push(&mut self, block: Block<B>) {
        self.blocks.push(block);
    }

    pub fn extend<I: IntoIterator<Item = Block<B>>>(&mut self, blocks: I) {
        self.blocks.extend(blocks);
    }

    pub fn blocks(&self) -> &[Block<B>] {
        &self.blocks
    }

    /// Keeps the blocks for which `keep` returns `true`, compacting at the
    /// end. The eviction scan removes mid-iteration through this, so no
    /// survivor is ever skipped.
    pub fn retain<F: FnMut(&Block<B>) -> bool>(&mut self, keep: F) {
        self.blocks.retain(keep);
    }

    /// Scans for `key` and returns a copy of the matching block along with a
    /// found-flag. The scan touches every entry identically.
    pub fn ct_read(&self, key: BlockKey) -> (Block<B>, Choice) {
        let mut result = Block::empty();
        let mut found = Choice::from(0);
        for block in &self.blocks {
            let matches = block.key.ct_eq(&key);
            result.conditional_assign(block, matches);
            found |= matches;
        }
        (result, found)
    }

    /// Scans for `key` and overwrites the matching block's payload in place,
    /// returning a found-flag. The scan touches every entry identically.
    pub fn ct_overwrite(&mut self, key: BlockKey, value: &[u8; B]) -> Choice {
        let mut found = Choice::from(0);
        for block in self.blocks.iter_mut() {
            let matches = block.key.ct_eq(&key);
            for i in 0..B {
                block.value[i] = u8::conditional_select(&block.value[i], &value[i], matches);
            }
            found |= matches;
        }
        found
    }
}
