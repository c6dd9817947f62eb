//! Client for the remote key-value snapshot store.
//!
//! The store is a dumb get/set/flush service speaking JSON over HTTP with a
//! static bearer token. It performs no merging and no versioning; whoever
//! writes a key last owns it.

use std::{collections::HashMap, fmt::Display, sync::Arc};

use serde::Deserialize;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum RemoteStoreError {
    /// The transport failed (connection refused, timeout, TLS, ...)
    Transport(String),
    /// The store answered with a non-success status
    Status(u16),
    /// The response body was not in the expected shape
    Decode(String),
}

impl Display for RemoteStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteStoreError::Transport(reason) => write!(f, "Store transport error: {reason}"),
            RemoteStoreError::Status(code) => write!(f, "Store rejected the request: HTTP {code}"),
            RemoteStoreError::Decode(reason) => write!(f, "Malformed store response: {reason}"),
        }
    }
}

/// The store wraps every reply in a result envelope; a missing key comes
/// back as an explicit null rather than a 404.
#[derive(Debug, Deserialize)]
struct ServerResult {
    result: Option<String>,
}

/// Backend seam for snapshot persistence. The HTTP client and the in-memory
/// store used by local play both satisfy it.
pub trait SnapshotStore {
    fn fetch(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RemoteStoreError>> + Send;
    fn store(
        &self,
        key: &str,
        value: String,
    ) -> impl std::future::Future<Output = Result<(), RemoteStoreError>> + Send;
    fn flush(&self) -> impl std::future::Future<Output = Result<(), RemoteStoreError>> + Send;
}

/// HTTP client for the hosted store.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        StoreClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn decode(response: reqwest::Response) -> Result<Option<String>, RemoteStoreError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteStoreError::Status(status.as_u16()));
        }
        let envelope: ServerResult = response
            .json()
            .await
            .map_err(|e| RemoteStoreError::Decode(e.to_string()))?;
        Ok(envelope.result)
    }
}

impl SnapshotStore for StoreClient {
    async fn fetch(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        let url = format!("{}/get/{}", self.base_url, key);
        tracing::debug!("Fetching snapshot at {url}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn store(&self, key: &str, value: String) -> Result<(), RemoteStoreError> {
        let url = format!("{}/set/{}", self.base_url, key);
        tracing::debug!("Writing snapshot at {url}");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .body(value)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Transport(e.to_string()))?;
        Self::decode(response).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), RemoteStoreError> {
        let url = format!("{}/flushdb/", self.base_url);
        tracing::warn!("Flushing every snapshot in the remote store");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteStoreError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// In-process store with the same last-writer-wins behavior as the hosted
/// one. Local play and tests run against this.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            values: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl SnapshotStore for MemoryStore {
    async fn fetch(&self, key: &str) -> Result<Option<String>, RemoteStoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: String) -> Result<(), RemoteStoreError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn flush(&self) -> Result<(), RemoteStoreError> {
        self.values.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch("missing").await.unwrap(), None);
        store.store("k", "v".to_string()).await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_last_writer_wins() {
        let store = MemoryStore::new();
        store.store("k", "first".to_string()).await.unwrap();
        store.store("k", "second".to_string()).await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_flush_clears_everything() {
        let store = MemoryStore::new();
        store.store("a", "1".to_string()).await.unwrap();
        store.store("b", "2".to_string()).await.unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.fetch("a").await.unwrap(), None);
        assert_eq!(store.fetch("b").await.unwrap(), None);
    }
}
