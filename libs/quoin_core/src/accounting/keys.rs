use quoin_crypto::{
    hashing::{DefaultHash, Hashable},
    types::StdByteArray,
};

/// Derives the ledger index for a public key.
///
/// The account key is the SHA3-256 digest of the key's canonical 32-byte
/// encoding. It is stable for the lifetime of the public key, so callers
/// compute it once per session and cache it rather than re-deriving on
/// every operation.
pub fn derive_account_key(public_key: &StdByteArray) -> StdByteArray {
    public_key
        .hash(&mut DefaultHash::new())
        .expect("Hashing failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let public_key = [7u8; 32];
        assert_eq!(derive_account_key(&public_key), derive_account_key(&public_key));
    }

    #[test]
    fn test_distinct_keys_for_distinct_public_keys() {
        assert_ne!(derive_account_key(&[1u8; 32]), derive_account_key(&[2u8; 32]));
    }

    #[test]
    fn test_key_differs_from_public_key() {
        let public_key = [9u8; 32];
        assert_ne!(derive_account_key(&public_key), public_key);
    }
}
