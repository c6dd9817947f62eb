//! Cryptographic primitives for the quoin collateral ledger.
//!
//! This crate provides the pure building blocks the protocol layer is
//! assembled from:
//! - Hashing traits and a SHA3-256 default hasher
//! - A fixed-depth sparse Merkle balance map and its witnesses
//! - Signing/verification (ed25519) abstractions and defaults
//! - Fixed-size byte array types used across the project
//!
//! None of the public APIs in this crate perform network or filesystem I/O.

/// Reusable hashing traits and a default SHA3-256 hasher.
pub mod hashing;
/// Fixed-depth sparse Merkle map for account balances.
pub mod merkle_map;
/// Signature traits and default ed25519 signer/verifier.
pub mod signing;
/// Common type aliases and constants used by this crate.
pub mod types;
