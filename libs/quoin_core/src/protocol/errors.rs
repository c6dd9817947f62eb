use std::fmt::Display;

use crate::{
    accounting::channel::ChannelError,
    net::{oracle::OracleError, store::RemoteStoreError},
    protocol::settlement::{FetchError, SettlementError},
};

/// Umbrella error for game-round operations. Every failure is surfaced to
/// the caller; nothing in the protocol retries or recovers silently.
#[derive(Debug)]
pub enum ProtocolError {
    /// The account does not exist on-chain
    AccountNotFound,
    /// The fetched contract account carries no ledger root field
    MissingContractState,
    /// The local channel record rejected the operation
    Channel(ChannelError),
    /// The settlement layer rejected the submitted call
    Settlement(SettlementError),
    /// Talking to the snapshot store failed
    RemoteStore(RemoteStoreError),
    /// Talking to the randomness oracle failed
    Oracle(OracleError),
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::AccountNotFound => write!(f, "Account not found on-chain"),
            ProtocolError::MissingContractState => {
                write!(f, "Contract account has no ledger root")
            }
            ProtocolError::Channel(err) => write!(f, "Channel error: {err}"),
            ProtocolError::Settlement(err) => write!(f, "Settlement error: {err}"),
            ProtocolError::RemoteStore(err) => write!(f, "Remote store error: {err}"),
            ProtocolError::Oracle(err) => write!(f, "Oracle error: {err}"),
        }
    }
}

impl From<ChannelError> for ProtocolError {
    fn from(err: ChannelError) -> Self {
        ProtocolError::Channel(err)
    }
}

impl From<SettlementError> for ProtocolError {
    fn from(err: SettlementError) -> Self {
        ProtocolError::Settlement(err)
    }
}

impl From<RemoteStoreError> for ProtocolError {
    fn from(err: RemoteStoreError) -> Self {
        ProtocolError::RemoteStore(err)
    }
}

impl From<OracleError> for ProtocolError {
    fn from(err: OracleError) -> Self {
        ProtocolError::Oracle(err)
    }
}

impl From<FetchError> for ProtocolError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::AccountNotFound => ProtocolError::AccountNotFound,
            FetchError::Transport(reason) => {
                ProtocolError::Settlement(SettlementError::Transport(reason))
            }
        }
    }
}
