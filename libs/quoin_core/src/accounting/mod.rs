pub mod channel;
pub mod keys;
pub mod wallet;
