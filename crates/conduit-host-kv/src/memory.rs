use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Store, StoreError};

/// In-memory store.
///
/// Suitable for the CLI and for tests. Contents are lost when the process
/// exits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
  data: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of stored entries.
  pub async fn len(&self) -> usize {
    self.data.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.data.read().await.is_empty()
  }
}

#[async_trait]
impl Store for InMemoryStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
    Ok(self.data.read().await.get(key).cloned())
  }

  async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
    self.data.write().await.insert(key.to_string(), value);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.data.write().await.remove(key);
    Ok(())
  }
}
