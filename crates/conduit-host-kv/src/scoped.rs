use std::sync::Arc;

use async_trait::async_trait;

use crate::{Store, StoreError};

/// View over another store that prefixes every key.
#[derive(Clone)]
pub struct ScopedStore {
  inner: Arc<dyn Store>,
  prefix: String,
}

impl ScopedStore {
  pub fn new(inner: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
    Self {
      inner,
      prefix: prefix.into(),
    }
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  fn key(&self, key: &str) -> String {
    format!("{}/{}", self.prefix, key)
  }
}

#[async_trait]
impl Store for ScopedStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
    self.inner.get(&self.key(key)).await
  }

  async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
    self.inner.put(&self.key(key), value).await
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.inner.delete(&self.key(key)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::InMemoryStore;
  use serde_json::json;

  #[tokio::test]
  async fn test_scopes_are_isolated() {
    let backing = Arc::new(InMemoryStore::new());
    let a = ScopedStore::new(backing.clone(), "flow_a");
    let b = ScopedStore::new(backing.clone(), "flow_b");

    a.put("count", json!(1)).await.unwrap();
    assert_eq!(a.get("count").await.unwrap(), Some(json!(1)));
    assert_eq!(b.get("count").await.unwrap(), None);
    assert_eq!(backing.get("flow_a/count").await.unwrap(), Some(json!(1)));
  }
}
