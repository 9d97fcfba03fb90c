// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A thin adapter over the bucket cipher.
//!
//! One bucket (or one sub-bucket of a large-bucket page) is one AEAD message
//! under AES-256-GCM. A page is laid out as `nonce || ciphertext || tag`, so
//! the encrypted size is a pure function of the plaintext size and the
//! server-visible traffic never depends on bucket contents.

use crate::OramError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes, prepended to every page.
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes, trailing every page.
pub const TAG_LEN: usize = 16;

/// The encrypted size of a `plaintext_len`-byte message.
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    NONCE_LEN + plaintext_len + TAG_LEN
}

/// A bucket encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// A fresh random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps externally provisioned key material.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

/// Encrypts and decrypts whole bucket pages.
pub(crate) struct BucketCipher {
    cipher: Aes256Gcm,
}

impl BucketCipher {
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0)),
        }
    }

    /// Encrypts `plaintext` under a nonce drawn from `rng`, returning the
    /// full page.
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, OramError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| OramError::Crypto)?;

        let mut page = Vec::with_capacity(ciphertext_len(plaintext.len()));
        page.extend_from_slice(&nonce);
        page.extend_from_slice(&ciphertext);
        Ok(page)
    }

    /// Decrypts a page produced by [`BucketCipher::seal`]. Authentication
    /// failure is fatal to the operation.
    pub fn open(&self, page: &[u8]) -> Result<Vec<u8>, OramError> {
        if page.len() < NONCE_LEN + TAG_LEN {
            return Err(OramError::ShortBuffer {
                got: page.len(),
                need: NONCE_LEN + TAG_LEN,
            });
        }
        let (nonce, ciphertext) = page.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| OramError::Crypto)
    }
}
