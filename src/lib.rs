// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A client for Path ORAM and its large-bucket variant.
//!
//! The client obliviously reads and writes a logical array of fixed-size
//! blocks held encrypted on an untrusted storage server: the server observes
//! which bucket pages are touched, but learns nothing about which logical
//! block an access was for. [`PathOramClient`] is the classic tree ORAM;
//! [`OramLbClient`] packs whole subtrees into single pages to cut the number
//! of server round-trips per access.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

pub mod bucket;
pub mod channel;
pub mod crypto;
pub mod oram_lb;
pub mod path_oram;
pub(crate) mod position_map;
pub(crate) mod stash;
pub mod test_utils;
pub mod tree;

pub use bucket::{Block, Bucket};
pub use channel::{BucketChannel, CountingChannel, FileChannel, MemoryChannel};
pub use crypto::EncryptionKey;
pub use oram_lb::OramLbClient;
pub use path_oram::PathOramClient;

use duplicate::duplicate_item;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// The numeric type of logical block keys.
pub type BlockKey = u32;
/// The numeric type of leaf identifiers in the bucket tree.
pub type Leaf = u32;
/// The numeric type of bucket identifiers (breadth-first, root = 0).
pub type BucketId = u32;
/// The numeric type used to specify the payload width of a block in bytes.
pub type BlockSize = usize;
/// The numeric type of tree heights and levels.
pub type TreeHeight = u32;

/// The parameter "Z" from the Path ORAM literature that sets the number of blocks per bucket; typical values are 3 or 4.
/// Here we adopt the more conservative setting of 4.
pub const BLOCKS_PER_BUCKET: usize = 4;

/// The error type of every fallible ORAM operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OramError {
    /// The requested key was not found in the stash after fetching its path.
    /// The client remains usable.
    #[error("block {0} is not stored in this ORAM")]
    KeyNotFound(BlockKey),
    /// The stash grew past its bound after setup. Fatal.
    #[error("stash holds {len} blocks, exceeding the bound of {limit}")]
    StashOverflow {
        /// Observed stash size in blocks.
        len: usize,
        /// The `2 * Z * height` bound that was exceeded.
        limit: usize,
    },
    /// The bucket cipher rejected a page (authentication or format failure). Fatal.
    #[error("bucket cipher rejected a page")]
    Crypto,
    /// A decrypted bucket had an unexpected length. Fatal.
    #[error("decrypted bucket is {got} bytes, expected {expected}")]
    PlaintextLength {
        /// Length the cipher produced.
        got: usize,
        /// The fixed bucket wire length.
        expected: usize,
    },
    /// The channel returned a page of the wrong size, or was handed one.
    #[error("channel page is {got} bytes, expected {expected}")]
    PageLength {
        /// Observed page length.
        got: usize,
        /// The channel's fixed page length.
        expected: usize,
    },
    /// Underlying server I/O failed. Retryable at the caller's discretion;
    /// client state stays consistent.
    #[error("storage channel failure")]
    Channel(#[from] std::io::Error),
    /// A serialized bucket was too short to parse.
    #[error("bucket buffer is {got} bytes, at least {need} required")]
    ShortBuffer {
        /// Bytes available.
        got: usize,
        /// Bytes required.
        need: usize,
    },
    /// A parsed bucket claimed more occupied slots than a bucket holds.
    #[error("bucket fill count {0} exceeds the bucket capacity")]
    InvalidFill(u8),
    /// `setup` was called on an already-initialized client.
    #[error("setup may only run once per client")]
    AlreadyInitialized,
    /// `setup` was handed more blocks than the declared capacity.
    #[error("{given} setup blocks exceed the declared capacity of {capacity}")]
    TooManyBlocks {
        /// Number of blocks supplied.
        given: usize,
        /// Declared block capacity of the client.
        capacity: usize,
    },
    /// The channel's page size does not match this client's bucket page size.
    #[error("channel pages are {got} bytes but this client requires {expected}")]
    PageSizeMismatch {
        /// The channel's page length.
        got: usize,
        /// The page length the client's parameters imply.
        expected: usize,
    },
}

/// The operations an ORAM client offers its consumers.
///
/// Higher layers (oblivious maps, dictionaries, indices) program against this
/// trait and compose [`Block`] payloads into their own structures; the client
/// imposes no semantics on the payload bytes.
pub trait Oram<const B: BlockSize> {
    /// One-time ingest of at most `block_capacity` blocks.
    fn setup(&mut self, blocks: Vec<Block<B>>) -> Result<(), OramError>;
    /// Obliviously reads the block stored under `key` and remaps it to a
    /// fresh random leaf.
    fn read(&mut self, key: BlockKey) -> Result<Block<B>, OramError>;
    /// Obliviously overwrites the payload stored under `key` in place and
    /// remaps it to a fresh random leaf.
    fn write(&mut self, key: BlockKey, value: [u8; B]) -> Result<(), OramError>;
    /// Flushes every bucket touched since the last eviction back to the server.
    fn evict(&mut self) -> Result<(), OramError>;
    /// The declared capacity of this ORAM in blocks.
    fn block_capacity(&self) -> usize;
}

#[duplicate_item(
    client_type;
    [PathOramClient];
    [OramLbClient];
)]
impl<const B: BlockSize, C: BucketChannel, R: RngCore + CryptoRng> Oram<B> for client_type<B, C, R> {
    fn setup(&mut self, blocks: Vec<Block<B>>) -> Result<(), OramError> {
        client_type::setup(self, blocks)
    }

    fn read(&mut self, key: BlockKey) -> Result<Block<B>, OramError> {
        client_type::read(self, key)
    }

    fn write(&mut self, key: BlockKey, value: [u8; B]) -> Result<(), OramError> {
        client_type::write(self, key, value)
    }

    fn evict(&mut self) -> Result<(), OramError> {
        client_type::evict(self)
    }

    fn block_capacity(&self) -> usize {
        client_type::block_capacity(self)
    }
}
