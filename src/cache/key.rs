//! Cache keys derived from a function signature and its arguments.

use std::fmt;

/// A 256-bit key identifying one memoized call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Start a key for the function identified by `signature`.
    pub fn builder(signature: &[u8]) -> CacheKeyBuilder {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(signature.len() as u64).to_le_bytes());
        hasher.update(signature);
        CacheKeyBuilder { hasher }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", blake3::Hash::from(self.0).to_hex())
    }
}

/// Incrementally hashes the arguments that take part in a key.
///
/// Arguments not fed to the builder do not affect the key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    hasher: blake3::Hasher,
}

impl CacheKeyBuilder {
    /// Hash a set of indices. Order does not matter.
    pub fn indices(mut self, indices: &[usize]) -> Self {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        self.hasher.update(&(sorted.len() as u64).to_le_bytes());
        for i in sorted {
            self.hasher.update(&(i as u64).to_le_bytes());
        }
        self
    }

    /// Hash raw bytes.
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn finish(self) -> CacheKey {
        CacheKey(*self.hasher.finalize().as_bytes())
    }
}
