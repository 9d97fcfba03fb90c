// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Fixed-size blocks, buckets, and their wire codec.

use crate::{BlockKey, BlockSize, OramError, BLOCKS_PER_BUCKET};
use static_assertions::const_assert;
use std::mem::size_of;
use subtle::{Choice, ConditionallySelectable};

// The `fill` counter is serialized as a single byte.
const_assert!(BLOCKS_PER_BUCKET <= u8::MAX as usize);

/// The key denoting an unoccupied block slot.
pub const EMPTY_KEY: BlockKey = BlockKey::MAX;

/// The user-visible unit of storage: a logical key and `B` payload bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block<const B: BlockSize> {
    /// The logical key, or [`EMPTY_KEY`] for an unoccupied slot.
    pub key: BlockKey,
    /// The payload bytes. The client imposes no semantics on them.
    pub value: [u8; B],
}

impl<const B: BlockSize> Block<B> {
    /// Serialized size: a little-endian key followed by the raw payload.
    pub const WIRE_LEN: usize = size_of::<BlockKey>() + B;

    /// A block holding `value` under `key`.
    pub fn new(key: BlockKey, value: [u8; B]) -> Self {
        Self { key, value }
    }

    /// An unoccupied block.
    pub fn empty() -> Self {
        Self {
            key: EMPTY_KEY,
            value: [0u8; B],
        }
    }

    /// Whether this block is an unoccupied slot.
    pub fn is_empty(&self) -> bool {
        self.key == EMPTY_KEY
    }

    fn write_wire(&self, buf: &mut [u8]) {
        buf[..size_of::<BlockKey>()].copy_from_slice(&self.key.to_le_bytes());
        buf[size_of::<BlockKey>()..Self::WIRE_LEN].copy_from_slice(&self.value);
    }

    fn read_wire(buf: &[u8]) -> Result<Self, OramError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(OramError::ShortBuffer {
                got: buf.len(),
                need: Self::WIRE_LEN,
            });
        }
        let mut key_bytes = [0u8; size_of::<BlockKey>()];
        key_bytes.copy_from_slice(&buf[..size_of::<BlockKey>()]);
        let mut value = [0u8; B];
        value.copy_from_slice(&buf[size_of::<BlockKey>()..Self::WIRE_LEN]);
        Ok(Self {
            key: BlockKey::from_le_bytes(key_bytes),
            value,
        })
    }
}

impl<const B: BlockSize> Default for Block<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const B: BlockSize> ConditionallySelectable for Block<B> {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut result = Block::empty();
        result.key = BlockKey::conditional_select(&a.key, &b.key, choice);
        for i in 0..B {
            result.value[i] = u8::conditional_select(&a.value[i], &b.value[i], choice);
        }
        result
    }
}

/// A fixed-capacity container of [`BLOCKS_PER_BUCKET`] blocks stored at one
/// tree node.
///
/// `fill` counts the occupied slots; slots past `fill` carry no meaning but
/// are serialized anyway, so the wire size never depends on the contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket<const B: BlockSize> {
    /// The number of occupied slots, in `0..=BLOCKS_PER_BUCKET`.
    pub fill: u8,
    /// The block slots.
    pub blocks: [Block<B>; BLOCKS_PER_BUCKET],
}

impl<const B: BlockSize> Bucket<B> {
    /// Serialized size: the `fill` byte followed by every slot, occupied or not.
    pub const WIRE_LEN: usize = 1 + BLOCKS_PER_BUCKET * Block::<B>::WIRE_LEN;

    /// Serializes the bucket to its constant-size wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::WIRE_LEN];
        buf[0] = self.fill;
        for (slot, chunk) in self
            .blocks
            .iter()
            .zip(buf[1..].chunks_exact_mut(Block::<B>::WIRE_LEN))
        {
            slot.write_wire(chunk);
        }
        buf
    }

    /// The byte-for-byte inverse of [`Bucket::serialize`]. Validates only the
    /// buffer length and the fill counter's range, never the slot contents.
    pub fn deserialize(buf: &[u8]) -> Result<Self, OramError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(OramError::ShortBuffer {
                got: buf.len(),
                need: Self::WIRE_LEN,
            });
        }
        let fill = buf[0];
        if fill as usize > BLOCKS_PER_BUCKET {
            return Err(OramError::InvalidFill(fill));
        }
        let mut blocks = [Block::<B>::empty(); BLOCKS_PER_BUCKET];
        for (slot, chunk) in blocks
            .iter_mut()
            .zip(buf[1..].chunks_exact(Block::<B>::WIRE_LEN))
        {
            *slot = Block::read_wire(chunk)?;
        }
        Ok(Self { fill, blocks })
    }

    /// Places `block` in the next free slot. Returns `false` when full.
    pub fn try_push(&mut self, block: &Block<B>) -> bool {
        if self.fill as usize == BLOCKS_PER_BUCKET {
            return false;
        }
        self.blocks[self.fill as usize] = *block;
        self.fill += 1;
        true
    }

    /// The occupied slots.
    pub fn occupied(&self) -> &[Block<B>] {
        &self.blocks[..self.fill as usize]
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }
}

impl<const B: BlockSize> Default for Bucket<B> {
    fn default() -> Self {
        Self {
            fill: 0,
            blocks: [Block::<B>::empty(); BLOCKS_PER_BUCKET],
        }
    }
}
