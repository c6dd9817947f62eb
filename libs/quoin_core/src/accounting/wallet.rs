//! Wallet wrapper around an ed25519 keypair with convenience methods.
use quoin_crypto::{
    signing::{DefaultSigner, DefaultVerifier, SigFunction, SigVerFunction, Signable},
    types::StdByteArray,
};

use crate::accounting::keys::derive_account_key;

/// A local wallet that can sign data and exposes its public address.
///
/// The ledger index for the address is derived once at construction and
/// cached, so protocol operations never re-hash the public key.
#[derive(Clone)]
pub struct Wallet {
    pub address: StdByteArray,
    account_key: StdByteArray,
    signing_key: DefaultSigner,
}

impl Wallet {
    /// Construct a wallet from a public address and private signing key.
    pub fn new(address: StdByteArray, signing_key: DefaultSigner) -> Self {
        Wallet {
            address,
            account_key: derive_account_key(&address),
            signing_key,
        }
    }

    /// Rebuild a wallet from its 32-byte private key.
    pub fn from_private_key(private_key: StdByteArray) -> Self {
        let signer = DefaultSigner::new(private_key);
        let address = signer.get_verifying_function().to_bytes();
        Wallet::new(address, signer)
    }

    /// Return the private key bytes (32) of this wallet.
    pub fn get_private_key(&self) -> StdByteArray {
        self.to_bytes()
    }

    /// The cached ledger index for this wallet's address.
    pub fn account_key(&self) -> StdByteArray {
        self.account_key
    }
}

impl SigFunction<32, 32, 64> for Wallet {
    fn sign(&mut self, data: &impl Signable<64>) -> [u8; 64] {
        self.signing_key.sign(data)
    }

    fn to_bytes(&self) -> StdByteArray {
        self.signing_key.to_bytes()
    }

    fn get_verifying_function(&self) -> impl SigVerFunction<32, 64> {
        DefaultVerifier::new(self.address)
    }

    /// Generate a new random wallet using a freshly generated ed25519 keypair.
    fn generate_random() -> Self {
        let signer = DefaultSigner::generate_random();
        let address = signer.get_verifying_function().to_bytes();
        Wallet::new(address, signer)
    }
}
