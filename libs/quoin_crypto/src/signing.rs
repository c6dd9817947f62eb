use ed25519::signature::SignerMut;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::types::StdByteArray;

/// A trait for an object that has a canonical byte encoding to sign over.
pub trait Signable<const S: usize> {
    fn signing_bytes(&self) -> impl AsRef<[u8]>;
}

/// A trait for signing functions.
///
/// # Generics
///
/// * `K` - The size of the private key in bytes.
/// * `P` - The size of the public key in bytes.
/// * `S` - The size of the signature in bytes.
pub trait SigFunction<const K: usize, const P: usize, const S: usize> {
    /// Sign the canonical bytes of `data` with the held private key.
    fn sign(&mut self, data: &impl Signable<S>) -> [u8; S];

    /// Byte representation of the signing function, usually a private key.
    fn to_bytes(&self) -> [u8; K];

    /// The verifying counterpart of this signer.
    fn get_verifying_function(&self) -> impl SigVerFunction<P, S>;

    fn generate_random() -> Self;
}

/// A trait for verifying signatures.
pub trait SigVerFunction<const K: usize, const S: usize> {
    /// `true` when `signature` authenticates `target`'s canonical bytes.
    fn verify(&self, signature: &[u8; S], target: &impl Signable<S>) -> bool;

    fn to_bytes(&self) -> [u8; K];

    fn from_bytes(bytes: &[u8; K]) -> Self;
}

/// Default signer is the ed25519 signing function
pub struct DefaultSigner {
    private_key: SigningKey,
}

/// Default verifier is the ed25519 verifying function
pub struct DefaultVerifier {
    public_key: VerifyingKey,
}

impl DefaultSigner {
    pub fn new(private_key: StdByteArray) -> Self {
        DefaultSigner {
            private_key: SigningKey::from_bytes(&private_key),
        }
    }
}

impl DefaultVerifier {
    pub fn new(public_key: StdByteArray) -> Self {
        DefaultVerifier {
            public_key: VerifyingKey::from_bytes(&public_key).expect("Invalid public key"),
        }
    }
}

impl Clone for DefaultSigner {
    fn clone(&self) -> Self {
        DefaultSigner {
            private_key: self.private_key.clone(),
        }
    }
}

impl SigFunction<32, 32, 64> for DefaultSigner {
    fn sign(&mut self, data: &impl Signable<64>) -> [u8; 64] {
        self.private_key.sign(data.signing_bytes().as_ref()).to_bytes()
    }

    fn to_bytes(&self) -> StdByteArray {
        self.private_key.to_bytes()
    }

    fn get_verifying_function(&self) -> impl SigVerFunction<32, 64> {
        DefaultVerifier::new(self.private_key.verifying_key().to_bytes())
    }

    fn generate_random() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        DefaultSigner {
            private_key: signing_key,
        }
    }
}

impl SigVerFunction<32, 64> for DefaultVerifier {
    fn verify(&self, signature: &[u8; 64], target: &impl Signable<64>) -> bool {
        let signature = ed25519::Signature::from_bytes(signature);

        self.public_key
            .verify_strict(target.signing_bytes().as_ref(), &signature)
            .is_ok()
    }

    fn to_bytes(&self) -> StdByteArray {
        self.public_key.to_bytes()
    }

    fn from_bytes(bytes: &StdByteArray) -> Self {
        DefaultVerifier::new(*bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob(Vec<u8>);

    impl Signable<64> for Blob {
        fn signing_bytes(&self) -> impl AsRef<[u8]> {
            &self.0
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let mut signer = DefaultSigner::generate_random();
        let blob = Blob(vec![7u8; 48]);
        let signature = signer.sign(&blob);
        let verifier = signer.get_verifying_function();
        assert!(verifier.verify(&signature, &blob));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let mut signer = DefaultSigner::generate_random();
        let signature = signer.sign(&Blob(vec![7u8; 48]));
        let verifier = signer.get_verifying_function();
        assert!(!verifier.verify(&signature, &Blob(vec![8u8; 48])));
    }

    #[test]
    fn test_verifier_round_trips_through_bytes() {
        let mut signer = DefaultSigner::generate_random();
        let blob = Blob(b"channel state".to_vec());
        let signature = signer.sign(&blob);
        let restored = DefaultVerifier::from_bytes(&signer.get_verifying_function().to_bytes());
        assert!(restored.verify(&signature, &blob));
    }
}
