//! Content hashing utilities for Shardio
//!
//! Delta parts are content-addressed by SHA-256; this module provides
//! one-shot and streaming calculation plus file verification.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Streaming SHA-256 content hasher
pub struct ContentHasher {
    sha256: Sha256,
}

impl ContentHasher {
    /// Create a new hasher
    #[must_use]
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
    }

    /// Finalize and return the lowercase hex digest
    #[must_use]
    pub fn finalize(self) -> String {
        hex::encode(self.sha256.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the lowercase hex SHA-256 of a byte slice
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the lowercase hex SHA-256 of a file's content
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = ContentHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Verify a file's content against an expected lowercase hex SHA-256
pub fn verify_file(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = hash_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}
