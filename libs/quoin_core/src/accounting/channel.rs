use std::fmt::Display;

use quoin_crypto::{
    signing::{DefaultVerifier, SigFunction, SigVerFunction, Signable},
    types::StdByteArray,
};

use crate::accounting::keys::derive_account_key;

/// The tuple a channel signature commits to: the player's ledger index, the
/// running delta, and the channel nonce. Changing any of the three
/// invalidates the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub account: StdByteArray,
    pub delta: i64,
    pub nonce: u64,
}

impl Signable<64> for ChannelState {
    fn signing_bytes(&self) -> impl AsRef<[u8]> {
        let mut bytes = Vec::with_capacity(48);
        bytes.extend_from_slice(&self.account);
        bytes.extend_from_slice(&self.delta.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }
}

#[derive(Debug)]
pub enum ChannelError {
    /// An operation needed a bound player but none has deposited yet
    Unbound,
    /// A second public key tried to attach to an already-bound channel
    PlayerMismatch(StdByteArray, StdByteArray),
    /// The presented (delta, nonce) pair does not match the recorded channel state
    StaleChannelState {
        recorded_delta: i64,
        recorded_nonce: u64,
        presented_delta: i64,
        presented_nonce: u64,
    },
    /// The signature does not authenticate the recorded channel state
    InvalidSignature,
    /// The claimed delta would drive the settled balance below zero
    Overdraw(u64, i64),
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Unbound => write!(f, "Channel has no bound player"),
            ChannelError::PlayerMismatch(bound, presented) => {
                write!(f, "Channel is bound to {bound:?}, not {presented:?}")
            }
            ChannelError::StaleChannelState {
                recorded_delta,
                recorded_nonce,
                presented_delta,
                presented_nonce,
            } => {
                write!(
                    f,
                    "Stale channel state: recorded (delta {recorded_delta}, nonce {recorded_nonce}), presented (delta {presented_delta}, nonce {presented_nonce})"
                )
            }
            ChannelError::InvalidSignature => write!(f, "Channel signature is invalid"),
            ChannelError::Overdraw(balance, delta) => {
                write!(f, "Delta {delta} overdraws balance {balance}")
            }
        }
    }
}

/// Running off-chain balance between a player and the trusted executor.
///
/// Created at session init with (delta 0, nonce 0) and no player. The first
/// deposit binds the player's public key; each flip moves the delta by the
/// round outcome and advances the nonce by exactly one; a successful
/// withdrawal resets the whole record. The channel is owned by a single
/// session and never shared.
pub struct ChannelBalance {
    player: Option<StdByteArray>,
    executor: StdByteArray,
    delta: i64,
    nonce: u64,
    latest_signature: Option<[u8; 64]>,
}

impl ChannelBalance {
    /// Fresh channel against `executor`'s verifying key.
    pub fn new(executor: StdByteArray) -> Self {
        ChannelBalance {
            player: None,
            executor,
            delta: 0,
            nonce: 0,
            latest_signature: None,
        }
    }

    pub fn player(&self) -> Option<StdByteArray> {
        self.player
    }

    pub fn executor(&self) -> StdByteArray {
        self.executor
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn latest_signature(&self) -> Option<[u8; 64]> {
        self.latest_signature
    }

    /// Attach the depositing player's public key. Idempotent for the same
    /// key; any other key is rejected.
    pub fn bind_player(&mut self, public_key: StdByteArray) -> Result<(), ChannelError> {
        match self.player {
            None => {
                self.player = Some(public_key);
                Ok(())
            }
            Some(bound) if bound == public_key => Ok(()),
            Some(bound) => Err(ChannelError::PlayerMismatch(bound, public_key)),
        }
    }

    /// The signing tuple for the current (delta, nonce) pair.
    pub fn state(&self) -> Result<ChannelState, ChannelError> {
        let player = self.player.ok_or(ChannelError::Unbound)?;
        Ok(ChannelState {
            account: derive_account_key(&player),
            delta: self.delta,
            nonce: self.nonce,
        })
    }

    /// Produce and record a fresh executor signature over the current state.
    /// The recorded signature is the only one that authorizes the next
    /// operation; whatever was stored before is discarded.
    pub fn sign_current(
        &mut self,
        executor: &mut impl SigFunction<32, 32, 64>,
    ) -> Result<[u8; 64], ChannelError> {
        let state = self.state()?;
        let signature = executor.sign(&state);
        self.latest_signature = Some(signature);
        Ok(signature)
    }

    /// Apply a settled flip outcome: move the delta, advance the nonce by
    /// exactly one, and re-sign the new state.
    pub fn apply_flip(
        &mut self,
        outcome: i64,
        executor: &mut impl SigFunction<32, 32, 64>,
    ) -> Result<(), ChannelError> {
        if self.player.is_none() {
            return Err(ChannelError::Unbound);
        }
        self.delta += outcome;
        self.nonce += 1;
        self.sign_current(executor)?;
        Ok(())
    }

    /// Mirror of the settlement layer's acceptance rule: a presented
    /// signature passes only when its (delta, nonce) pair equals the
    /// recorded values exactly and the signature authenticates that tuple
    /// under the executor's key.
    pub fn verify_presented(
        &self,
        delta: i64,
        nonce: u64,
        signature: &[u8; 64],
    ) -> Result<(), ChannelError> {
        if delta != self.delta || nonce != self.nonce {
            return Err(ChannelError::StaleChannelState {
                recorded_delta: self.delta,
                recorded_nonce: self.nonce,
                presented_delta: delta,
                presented_nonce: nonce,
            });
        }
        let state = self.state()?;
        let verifier = DefaultVerifier::from_bytes(&self.executor);
        if !verifier.verify(signature, &state) {
            return Err(ChannelError::InvalidSignature);
        }
        Ok(())
    }

    /// Tear the channel down after a successful withdrawal: back to
    /// (delta 0, nonce 0), unbound, with no recorded signature.
    pub fn reset(&mut self) {
        self.player = None;
        self.delta = 0;
        self.nonce = 0;
        self.latest_signature = None;
    }
}
