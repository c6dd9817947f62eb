//! Snapshot persistence for the collateral ledger.
//!
//! A snapshot is the full entry map of a [`MerkleMap`] serialized as a JSON
//! object of hex account key to decimal balance, written to the remote store
//! under a caller-chosen key. Reconciliation is last-writer-wins: there is
//! no merge, no optimistic-concurrency check, and no version vector, so two
//! sessions pushing the same key silently lose one writer's update. That is
//! the store's contract, not an accident to be papered over here.

use std::collections::BTreeMap;

use quoin_crypto::{merkle_map::MerkleMap, types};

use crate::net::store::{RemoteStoreError, SnapshotStore};

pub struct LedgerSync<S: SnapshotStore> {
    store: S,
}

impl<S: SnapshotStore> LedgerSync<S> {
    pub fn new(store: S) -> Self {
        LedgerSync { store }
    }

    /// Fetch the snapshot at `snapshot_key` and replay every entry into a
    /// fresh ledger. An absent snapshot yields an empty ledger with the
    /// default root.
    pub async fn pull(&self, snapshot_key: &str) -> Result<MerkleMap, RemoteStoreError> {
        let mut ledger = MerkleMap::new();
        let Some(raw) = self.store.fetch(snapshot_key).await? else {
            tracing::debug!("No snapshot under {snapshot_key}, starting from an empty ledger");
            return Ok(ledger);
        };
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| RemoteStoreError::Decode(e.to_string()))?;
        for (key, balance) in entries {
            let key = types::from_hex(&key).map_err(|e| RemoteStoreError::Decode(e.to_string()))?;
            let balance: u64 = balance
                .parse()
                .map_err(|e: std::num::ParseIntError| RemoteStoreError::Decode(e.to_string()))?;
            ledger.set(key, balance);
        }
        tracing::debug!("Pulled {} ledger entries from {snapshot_key}", ledger.len());
        Ok(ledger)
    }

    /// Serialize every known entry and overwrite the remote value at
    /// `snapshot_key`.
    pub async fn push(
        &self,
        ledger: &MerkleMap,
        snapshot_key: &str,
    ) -> Result<(), RemoteStoreError> {
        let mut entries = BTreeMap::new();
        for (key, balance) in ledger.entries() {
            entries.insert(types::to_hex(key), balance.to_string());
        }
        let body =
            serde_json::to_string(&entries).map_err(|e| RemoteStoreError::Decode(e.to_string()))?;
        tracing::debug!("Pushing {} ledger entries to {snapshot_key}", entries.len());
        self.store.store(snapshot_key, body).await
    }

    /// Delete every persisted snapshot. Administrative/test-only.
    pub async fn flush(&self) -> Result<(), RemoteStoreError> {
        self.store.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::store::MemoryStore;
    use quoin_crypto::types::StdByteArray;

    fn key(tag: u8) -> StdByteArray {
        let mut k = [0u8; 32];
        k[0] = tag;
        k
    }

    #[tokio::test]
    async fn test_pull_of_missing_snapshot_is_empty() {
        let sync = LedgerSync::new(MemoryStore::new());
        let ledger = sync.pull("nothing-here").await.unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.root(), MerkleMap::new().root());
    }

    #[tokio::test]
    async fn test_push_then_pull_reproduces_entries_and_root() {
        let sync = LedgerSync::new(MemoryStore::new());
        let mut ledger = MerkleMap::new();
        ledger.set(key(1), 1000);
        ledger.set(key(2), 25);

        sync.push(&ledger, "snap").await.unwrap();
        let restored = sync.pull("snap").await.unwrap();
        assert_eq!(restored.get(&key(1)), 1000);
        assert_eq!(restored.get(&key(2)), 25);
        assert_eq!(restored.root(), ledger.root());
    }

    #[tokio::test]
    async fn test_concurrent_pushes_lose_the_earlier_writer() {
        let store = MemoryStore::new();
        let sync_a = LedgerSync::new(store.clone());
        let sync_b = LedgerSync::new(store);

        let mut first = MerkleMap::new();
        first.set(key(1), 100);
        let mut second = MerkleMap::new();
        second.set(key(1), 200);

        sync_a.push(&first, "shared").await.unwrap();
        sync_b.push(&second, "shared").await.unwrap();

        // last writer wins outright; the earlier balance is gone, not merged
        let observed = sync_a.pull("shared").await.unwrap();
        assert_eq!(observed.get(&key(1)), 200);
        assert_eq!(observed.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_removes_all_snapshots() {
        let sync = LedgerSync::new(MemoryStore::new());
        let mut ledger = MerkleMap::new();
        ledger.set(key(3), 7);
        sync.push(&ledger, "a").await.unwrap();
        sync.push(&ledger, "b").await.unwrap();
        sync.flush().await.unwrap();
        assert!(sync.pull("a").await.unwrap().is_empty());
        assert!(sync.pull("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pull_rejects_malformed_snapshot() {
        let store = MemoryStore::new();
        store
            .store("bad", "{\"zz\": \"not-a-number\"}".to_string())
            .await
            .unwrap();
        let sync = LedgerSync::new(store);
        assert!(matches!(
            sync.pull("bad").await,
            Err(RemoteStoreError::Decode(_))
        ));
    }
}
