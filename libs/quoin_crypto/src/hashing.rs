//! Hashing traits and a default SHA3-256 implementation.
//!
//! `Hashable` abstracts how a type contributes bytes to a hash function;
//! `HashFunction` exposes a minimal update/finalize API so the concrete
//! algorithm stays swappable in tests.

use sha3::{Digest, Sha3_256};

use crate::types::StdByteArray;

/// A trait for objects with a canonical digest.
///
/// Implementors should call `hasher.update(...)` for each field to include
/// and then return `hasher.digest()`.
pub trait Hashable {
    fn hash(&self, hasher: &mut impl HashFunction) -> Result<StdByteArray, std::io::Error>;
}

/// A hash function that accumulates data and produces a 32-byte digest.
pub trait HashFunction {
    /// Feed `data` into the hash state.
    fn update(&mut self, data: impl AsRef<[u8]>);

    /// Finalize the computation and reset the state.
    ///
    /// Returns `std::io::ErrorKind::InvalidInput` if nothing was fed in
    /// before finalizing.
    fn digest(&mut self) -> Result<StdByteArray, std::io::Error>;
}

/// SHA3-256 backed implementation of [`HashFunction`].
pub struct DefaultHash {
    hasher: Sha3_256,
    // number of update calls since the last digest
    n_parameters: usize,
}

impl Default for DefaultHash {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultHash {
    pub fn new() -> Self {
        DefaultHash {
            hasher: Sha3_256::new(),
            n_parameters: 0,
        }
    }
}

impl HashFunction for DefaultHash {
    fn update(&mut self, data: impl AsRef<[u8]>) {
        self.hasher.update(data);
        self.n_parameters += 1;
    }

    fn digest(&mut self) -> Result<StdByteArray, std::io::Error> {
        if self.n_parameters == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "No data has been added to the hasher",
            ));
        }
        let result = Ok(self.hasher.clone().finalize().into());
        self.hasher.reset();
        self.n_parameters = 0;
        result
    }
}

impl Clone for DefaultHash {
    fn clone(&self) -> Self {
        DefaultHash {
            hasher: self.hasher.clone(),
            n_parameters: self.n_parameters,
        }
    }
}

impl Hashable for StdByteArray {
    fn hash(&self, hasher: &mut impl HashFunction) -> Result<StdByteArray, std::io::Error> {
        hasher.update(self.as_ref());
        hasher.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_requires_input() {
        let mut hasher = DefaultHash::new();
        assert!(hasher.digest().is_err());
        hasher.update([1u8, 2, 3]);
        assert!(hasher.digest().is_ok());
    }

    #[test]
    fn test_digest_resets_state() {
        let mut hasher = DefaultHash::new();
        hasher.update([1u8, 2, 3]);
        let first = hasher.digest().unwrap();
        hasher.update([1u8, 2, 3]);
        let second = hasher.digest().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_byte_array_hash_is_stable() {
        let bytes: StdByteArray = [5u8; 32];
        let mut hasher = DefaultHash::new();
        let a = bytes.hash(&mut hasher).unwrap();
        let b = bytes.hash(&mut hasher).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, bytes);
    }
}
