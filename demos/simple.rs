// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A very simple demonstration of the use of the ORAM client.

extern crate oram_client;

use oram_client::{Block, EncryptionKey, MemoryChannel, OramError, PathOramClient};
use rand::rngs::StdRng;
use rand::SeedableRng;

type Client = PathOramClient<8, MemoryChannel, StdRng>;

fn main() -> Result<(), OramError> {
    let mut rng = StdRng::from_entropy();
    let key = EncryptionKey::generate(&mut rng);
    let channel = MemoryChannel::new(Client::ENC_BUCKET_LEN);
    let mut oram = Client::construct(64, channel, &key, rng)?;

    let blocks = (0..64)
        .map(|k| Block::new(k, u64::from(k).to_le_bytes()))
        .collect();
    oram.setup(blocks)?;

    oram.write(3, [0xAB; 8])?;
    oram.evict()?;

    let block = oram.read(3)?;
    println!("key 3 now holds {:02x?}", block.value);
    Ok(())
}
