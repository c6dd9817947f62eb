//! The settlement seam.
//!
//! The prover/settlement layer is an external collaborator: it takes a
//! bundled call (ledger witness, channel signature, round randomness),
//! proves and submits it, and either returns a transaction hash or rejects.
//! The trait below is injected into the session at construction time, so the
//! orchestration layer never reaches for a concrete chain binding.
//!
//! [`LocalSettlement`] is the in-process stand-in: it applies the same
//! acceptance rules the chain does (witness must authenticate against the
//! recorded root, channel signature must match the recorded (delta, nonce)
//! exactly) and maintains on-chain balances and the authoritative root.

use std::{collections::HashMap, fmt::Display};

use quoin_crypto::{
    hashing::{DefaultHash, HashFunction},
    merkle_map::{LedgerWitness, MerkleMap},
    signing::{DefaultVerifier, SigVerFunction},
    types::StdByteArray,
};

use crate::{accounting::channel::ChannelState, net::oracle::OracleResult};

pub type TxHash = StdByteArray;

/// Account state as read from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainAccount {
    pub balance: u64,
    pub nonce: u64,
    /// The authoritative ledger root, present only on the contract account.
    pub ledger_root: Option<StdByteArray>,
}

#[derive(Debug)]
pub enum FetchError {
    /// The account is absent on-chain
    AccountNotFound,
    /// The chain endpoint could not be reached
    Transport(String),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::AccountNotFound => write!(f, "Account not found"),
            FetchError::Transport(reason) => write!(f, "Account fetch failed: {reason}"),
        }
    }
}

#[derive(Debug)]
pub enum SettlementError {
    /// The witness does not authenticate against the recorded root
    MerkleWitnessInvalid,
    /// The presented (delta, nonce) does not match the recorded channel state
    StaleChannelState,
    /// The call was rejected for any other reason (bad proof, bad signature, funds)
    Rejected(String),
    /// The settlement endpoint could not be reached
    Transport(String),
}

impl Display for SettlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementError::MerkleWitnessInvalid => {
                write!(f, "Witness does not match the recorded ledger root")
            }
            SettlementError::StaleChannelState => {
                write!(f, "Channel signature is for a stale (delta, nonce) pair")
            }
            SettlementError::Rejected(reason) => write!(f, "Settlement rejected the call: {reason}"),
            SettlementError::Transport(reason) => write!(f, "Settlement transport error: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepositCall {
    pub account: StdByteArray,
    pub player: StdByteArray,
    pub amount: u64,
    pub previous_balance: u64,
    pub witness: LedgerWitness,
}

#[derive(Debug, Clone)]
pub struct WithdrawCall {
    pub account: StdByteArray,
    pub player: StdByteArray,
    pub balance: u64,
    pub witness: LedgerWitness,
    pub delta: i64,
    pub nonce: u64,
    pub signature: [u8; 64],
}

#[derive(Debug, Clone)]
pub struct FlipCall {
    pub account: StdByteArray,
    pub player: StdByteArray,
    pub balance: u64,
    pub witness: LedgerWitness,
    pub delta: i64,
    pub nonce: u64,
    pub signature: [u8; 64],
    pub wager: u64,
    pub randomness: OracleResult,
}

/// A settled flip: the submission hash and the signed payout movement for
/// the round (`+wager` on a win, `-wager` on a loss).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipResult {
    pub tx: TxHash,
    pub outcome: i64,
}

/// Injected prover/settlement interface.
pub trait SettlementLayer {
    fn fetch_account(
        &self,
        address: &StdByteArray,
    ) -> impl std::future::Future<Output = Result<OnChainAccount, FetchError>> + Send;
    fn submit_deposit(
        &mut self,
        call: DepositCall,
    ) -> impl std::future::Future<Output = Result<TxHash, SettlementError>> + Send;
    fn submit_withdraw(
        &mut self,
        call: WithdrawCall,
    ) -> impl std::future::Future<Output = Result<TxHash, SettlementError>> + Send;
    fn submit_flip(
        &mut self,
        call: FlipCall,
    ) -> impl std::future::Future<Output = Result<FlipResult, SettlementError>> + Send;
}

/// The round outcome a draw resolves to: even parity of the ciphertext
/// digest wins the wager, odd loses it.
pub fn draw_outcome(randomness: &OracleResult, wager: u64) -> i64 {
    let mut hasher = DefaultHash::new();
    for limb in &randomness.cipher_text {
        hasher.update(limb.as_bytes());
    }
    let digest = hasher.digest().expect("Hashing failed");
    if digest[0] & 1 == 0 {
        wager as i64
    } else {
        -(wager as i64)
    }
}

/// In-process settlement that mirrors the chain's validation rules.
pub struct LocalSettlement {
    contract_address: StdByteArray,
    executor: StdByteArray,
    accounts: HashMap<StdByteArray, OnChainAccount>,
    // recorded channel state per account key; default (0, 0)
    channels: HashMap<StdByteArray, (i64, u64)>,
    tx_counter: u64,
}

impl LocalSettlement {
    /// A fresh chain whose contract account commits to the empty ledger.
    pub fn new(contract_address: StdByteArray, executor: StdByteArray) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            contract_address,
            OnChainAccount {
                balance: 0,
                nonce: 0,
                ledger_root: Some(MerkleMap::new().root()),
            },
        );
        LocalSettlement {
            contract_address,
            executor,
            accounts,
            channels: HashMap::new(),
            tx_counter: 0,
        }
    }

    /// Create (or top up) a player account, as a faucet would.
    pub fn fund_account(&mut self, address: StdByteArray, balance: u64) {
        let account = self.accounts.entry(address).or_insert(OnChainAccount {
            balance: 0,
            nonce: 0,
            ledger_root: None,
        });
        account.balance += balance;
    }

    /// The authoritative root the contract currently commits to.
    pub fn ledger_root(&self) -> StdByteArray {
        self.accounts[&self.contract_address]
            .ledger_root
            .expect("Contract account always carries a root")
    }

    fn next_tx(&mut self, label: &str) -> TxHash {
        self.tx_counter += 1;
        let mut hasher = DefaultHash::new();
        hasher.update(label.as_bytes());
        hasher.update(self.tx_counter.to_le_bytes());
        hasher.digest().expect("Hashing failed")
    }

    fn verify_witness(
        &self,
        witness: &LedgerWitness,
        account: &StdByteArray,
        balance: u64,
    ) -> Result<(), SettlementError> {
        if witness.key != *account {
            return Err(SettlementError::MerkleWitnessInvalid);
        }
        let mut hasher = DefaultHash::new();
        if !witness.verify(balance, self.ledger_root(), &mut hasher) {
            return Err(SettlementError::MerkleWitnessInvalid);
        }
        Ok(())
    }

    fn verify_channel(
        &self,
        account: StdByteArray,
        delta: i64,
        nonce: u64,
        signature: &[u8; 64],
    ) -> Result<(), SettlementError> {
        let recorded = self.channels.get(&account).copied().unwrap_or((0, 0));
        if (delta, nonce) != recorded {
            return Err(SettlementError::StaleChannelState);
        }
        let state = ChannelState {
            account,
            delta,
            nonce,
        };
        let verifier = DefaultVerifier::from_bytes(&self.executor);
        if !verifier.verify(signature, &state) {
            return Err(SettlementError::Rejected(
                "channel signature does not verify under the executor key".to_string(),
            ));
        }
        Ok(())
    }

    fn commit_root(&mut self, root: StdByteArray) {
        self.accounts
            .get_mut(&self.contract_address)
            .expect("Contract account always exists")
            .ledger_root = Some(root);
    }
}

impl SettlementLayer for LocalSettlement {
    async fn fetch_account(&self, address: &StdByteArray) -> Result<OnChainAccount, FetchError> {
        self.accounts
            .get(address)
            .cloned()
            .ok_or(FetchError::AccountNotFound)
    }

    async fn submit_deposit(&mut self, call: DepositCall) -> Result<TxHash, SettlementError> {
        self.verify_witness(&call.witness, &call.account, call.previous_balance)?;
        let player = self
            .accounts
            .get_mut(&call.player)
            .ok_or_else(|| SettlementError::Rejected("depositing account is not funded".to_string()))?;
        if player.balance < call.amount {
            return Err(SettlementError::Rejected(
                "deposit exceeds on-chain balance".to_string(),
            ));
        }
        player.balance -= call.amount;
        player.nonce += 1;

        let mut hasher = DefaultHash::new();
        let new_root = call
            .witness
            .compute_root(call.previous_balance + call.amount, &mut hasher)
            .ok_or(SettlementError::MerkleWitnessInvalid)?;
        self.commit_root(new_root);
        self.accounts
            .get_mut(&self.contract_address)
            .expect("Contract account always exists")
            .balance += call.amount;
        Ok(self.next_tx("deposit"))
    }

    async fn submit_withdraw(&mut self, call: WithdrawCall) -> Result<TxHash, SettlementError> {
        self.verify_witness(&call.witness, &call.account, call.balance)?;
        self.verify_channel(call.account, call.delta, call.nonce, &call.signature)?;
        let payout = call.balance as i128 + call.delta as i128;
        if payout < 0 {
            return Err(SettlementError::Rejected(
                "claimed delta overdraws the collateral".to_string(),
            ));
        }
        let payout = payout as u64;

        let mut hasher = DefaultHash::new();
        let new_root = call
            .witness
            .compute_root(0, &mut hasher)
            .ok_or(SettlementError::MerkleWitnessInvalid)?;
        self.commit_root(new_root);
        let contract = self
            .accounts
            .get_mut(&self.contract_address)
            .expect("Contract account always exists");
        contract.balance = contract.balance.saturating_sub(payout);
        if let Some(player) = self.accounts.get_mut(&call.player) {
            player.balance += payout;
        }
        self.channels.insert(call.account, (0, 0));
        Ok(self.next_tx("withdraw"))
    }

    async fn submit_flip(&mut self, call: FlipCall) -> Result<FlipResult, SettlementError> {
        self.verify_witness(&call.witness, &call.account, call.balance)?;
        self.verify_channel(call.account, call.delta, call.nonce, &call.signature)?;
        let worst_case = call.balance as i128 + call.delta as i128 - call.wager as i128;
        if worst_case < 0 {
            return Err(SettlementError::Rejected(
                "wager is not covered by the collateral".to_string(),
            ));
        }
        let outcome = draw_outcome(&call.randomness, call.wager);
        self.channels
            .insert(call.account, (call.delta + outcome, call.nonce + 1));
        Ok(FlipResult {
            tx: self.next_tx("flip"),
            outcome,
        })
    }
}
