//! Common type aliases used across cryptographic components.

/// Standard byte array length used for hashes and keys (32 bytes).
pub const STANDARD_ARRAY_LENGTH: usize = 32;

/// Fixed-size 32-byte array (commonly used for hashes and public keys).
pub type StdByteArray = [u8; STANDARD_ARRAY_LENGTH];

/// Render a 32-byte array as lowercase hex, the form keys take on the wire.
pub fn to_hex(bytes: &StdByteArray) -> String {
    hex::encode(bytes)
}

/// Parse a lowercase hex string back into a 32-byte array.
pub fn from_hex(s: &str) -> Result<StdByteArray, std::io::Error> {
    let decoded = hex::decode(s).map_err(std::io::Error::other)?;
    decoded
        .try_into()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "expected 32 bytes"))
}
