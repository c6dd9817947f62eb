//! Game-round orchestration.
//!
//! A [`GameSession`] is the explicit context one player's session runs in:
//! it owns the collateral ledger, the channel record, the player wallet, the
//! executor signing key, and handles to the snapshot store, oracle and
//! settlement layer. Nothing here is shared or ambient; every operation
//! takes the session by reference.
//!
//! The session assumes a single writer per account. Operations are async
//! because every external call suspends, but there is no internal locking:
//! callers that interleave deposit/withdraw/flip for the same account get
//! lost updates, because a witness computed against one root may be stale by
//! the time the settlement call resolves.

use std::time::Duration;

use quoin_crypto::{
    merkle_map::MerkleMap,
    signing::{DefaultSigner, SigFunction, SigVerFunction},
    types::{self, StdByteArray},
};
use tracing::instrument;

use crate::{
    accounting::{
        channel::{ChannelBalance, ChannelError},
        wallet::Wallet,
    },
    ledger::sync::LedgerSync,
    net::{oracle::RandomnessOracle, store::SnapshotStore},
    protocol::{
        errors::ProtocolError,
        settlement::{
            DepositCall, FetchError, FlipCall, FlipResult, OnChainAccount, SettlementLayer,
            TxHash, WithdrawCall,
        },
    },
};

/// The amount a withdrawal settles: collateral plus the running channel
/// delta. Kept as a standalone function so the computation is testable away
/// from any session plumbing.
pub fn net_balance(ledger_balance: u64, delta: i64) -> Result<u64, ChannelError> {
    let total = ledger_balance as i128 + delta as i128;
    if total < 0 {
        return Err(ChannelError::Overdraw(ledger_balance, delta));
    }
    u64::try_from(total).map_err(|_| ChannelError::Overdraw(ledger_balance, delta))
}

pub struct GameSession<S, O, T>
where
    S: SettlementLayer,
    O: RandomnessOracle,
    T: SnapshotStore,
{
    wallet: Wallet,
    executor: DefaultSigner,
    contract_address: StdByteArray,
    snapshot_slot: String,
    ledger: MerkleMap,
    channel: ChannelBalance,
    sync: LedgerSync<T>,
    oracle: O,
    settlement: S,
}

impl<S, O, T> GameSession<S, O, T>
where
    S: SettlementLayer,
    O: RandomnessOracle,
    T: SnapshotStore,
{
    /// Start a session: read the contract account, pull the ledger snapshot
    /// the on-chain root points at, and open a fresh channel at (0, 0).
    #[instrument(skip_all, fields(contract = %types::to_hex(&contract_address)))]
    pub async fn init(
        wallet: Wallet,
        executor: DefaultSigner,
        contract_address: StdByteArray,
        snapshot_slot: String,
        sync: LedgerSync<T>,
        oracle: O,
        settlement: S,
    ) -> Result<Self, ProtocolError> {
        let contract = settlement.fetch_account(&contract_address).await?;
        let root = contract
            .ledger_root
            .ok_or(ProtocolError::MissingContractState)?;
        let ledger = sync
            .pull(&compose_snapshot_key(&snapshot_slot, &root))
            .await?;
        if ledger.root() != root {
            // the store lost (or never had) the snapshot for this root;
            // witnesses built from this ledger will be rejected on-chain
            tracing::warn!(
                "Pulled ledger root {} does not match on-chain root {}",
                types::to_hex(&ledger.root()),
                types::to_hex(&root)
            );
        }
        let executor_key = executor.get_verifying_function().to_bytes();
        tracing::info!("Session opened with {} ledger entries", ledger.len());
        Ok(GameSession {
            wallet,
            executor,
            contract_address,
            snapshot_slot,
            ledger,
            channel: ChannelBalance::new(executor_key),
            sync,
            oracle,
            settlement,
        })
    }

    pub fn ledger(&self) -> &MerkleMap {
        &self.ledger
    }

    pub fn contract_address(&self) -> StdByteArray {
        self.contract_address
    }

    pub fn channel(&self) -> &ChannelBalance {
        &self.channel
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn settlement(&self) -> &S {
        &self.settlement
    }

    fn snapshot_key(&self, root: &StdByteArray) -> String {
        compose_snapshot_key(&self.snapshot_slot, root)
    }

    /// Collateral plus channel delta for this session's account.
    pub fn current_net_balance(&self) -> Result<u64, ChannelError> {
        net_balance(
            self.ledger.get(&self.wallet.account_key()),
            self.channel.delta(),
        )
    }

    pub async fn fetch_account(
        &self,
        address: &StdByteArray,
    ) -> Result<OnChainAccount, FetchError> {
        self.settlement.fetch_account(address).await
    }

    /// On-chain balances for a list of addresses, in order.
    pub async fn load_balances(
        &self,
        addresses: &[StdByteArray],
    ) -> Result<Vec<u64>, ProtocolError> {
        let mut balances = Vec::with_capacity(addresses.len());
        for address in addresses {
            let account = self.settlement.fetch_account(address).await?;
            balances.push(account.balance);
        }
        Ok(balances)
    }

    /// Delete every persisted snapshot. Administrative/test-only.
    pub async fn flush_store(&self) -> Result<(), ProtocolError> {
        self.sync.flush().await?;
        Ok(())
    }

    /// Poll until `address` exists on-chain, then return its state.
    ///
    /// Retries on a fixed interval forever; there is no bound, no timeout,
    /// and no escape hatch other than success. For an account that never
    /// gets funded this future stays pending indefinitely, pinning whatever
    /// awaits it.
    #[instrument(skip(self), fields(address = %types::to_hex(address)))]
    pub async fn wait_for_funding(
        &self,
        address: &StdByteArray,
        interval: Duration,
    ) -> OnChainAccount {
        loop {
            match self.settlement.fetch_account(address).await {
                Ok(account) => {
                    tracing::info!("Account funded with balance {}", account.balance);
                    return account;
                }
                Err(FetchError::AccountNotFound) => {
                    tracing::debug!("Account not funded yet, polling again");
                }
                Err(FetchError::Transport(reason)) => {
                    tracing::warn!("Account fetch failed, polling again: {reason}");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Move `amount` of the player's on-chain funds into the collateral
    /// ledger. Local state and the remote snapshot change only after the
    /// settlement layer accepts the call.
    #[instrument(skip(self))]
    pub async fn deposit(&mut self, amount: u64) -> Result<TxHash, ProtocolError> {
        let account = self.wallet.account_key();
        let witness = self.ledger.witness(&account);
        let previous_balance = self.ledger.get(&account);
        let call = DepositCall {
            account,
            player: self.wallet.address,
            amount,
            previous_balance,
            witness,
        };
        let tx = self.settlement.submit_deposit(call).await?;

        let new_root = self.ledger.set(account, previous_balance + amount);
        self.channel.bind_player(self.wallet.address)?;
        self.channel.sign_current(&mut self.executor)?;
        self.sync
            .push(&self.ledger, &self.snapshot_key(&new_root))
            .await?;
        tracing::info!(
            "Deposited {amount}, collateral now {}",
            previous_balance + amount
        );
        Ok(tx)
    }

    /// Settle the collateral plus the accumulated channel delta back to the
    /// player's on-chain account, zero the ledger entry, and reset the
    /// channel to (0, 0).
    #[instrument(skip(self))]
    pub async fn withdraw(&mut self) -> Result<TxHash, ProtocolError> {
        let account = self.wallet.account_key();
        let witness = self.ledger.witness(&account);
        let balance = self.ledger.get(&account);
        let signature = self
            .channel
            .latest_signature()
            .ok_or(ProtocolError::Channel(ChannelError::Unbound))?;
        let call = WithdrawCall {
            account,
            player: self.wallet.address,
            balance,
            witness,
            delta: self.channel.delta(),
            nonce: self.channel.nonce(),
            signature,
        };
        let tx = self.settlement.submit_withdraw(call).await?;

        let new_root = self.ledger.set(account, 0);
        self.channel.reset();
        self.sync
            .push(&self.ledger, &self.snapshot_key(&new_root))
            .await?;
        tracing::info!("Withdrawal settled");
        Ok(tx)
    }

    /// Play one round: fetch a fresh oracle draw, submit it with the current
    /// witness and channel signature, and on acceptance move the delta by
    /// the outcome and advance the nonce by one under a fresh executor
    /// signature.
    #[instrument(skip(self))]
    pub async fn flip_coin(&mut self, wager: u64) -> Result<FlipResult, ProtocolError> {
        let account = self.wallet.account_key();
        let witness = self.ledger.witness(&account);
        let balance = self.ledger.get(&account);
        let signature = self
            .channel
            .latest_signature()
            .ok_or(ProtocolError::Channel(ChannelError::Unbound))?;
        let executor_address = types::to_hex(&self.channel.executor());
        let randomness = self.oracle.random_number(&executor_address).await?;
        let call = FlipCall {
            account,
            player: self.wallet.address,
            balance,
            witness,
            delta: self.channel.delta(),
            nonce: self.channel.nonce(),
            signature,
            wager,
            randomness,
        };
        let result = self.settlement.submit_flip(call).await?;

        self.channel.apply_flip(result.outcome, &mut self.executor)?;
        tracing::info!(
            "Flip settled with outcome {}, channel now (delta {}, nonce {})",
            result.outcome,
            self.channel.delta(),
            self.channel.nonce()
        );
        Ok(result)
    }
}

fn compose_snapshot_key(slot: &str, root: &StdByteArray) -> String {
    format!("{slot}:{}", types::to_hex(root))
}
