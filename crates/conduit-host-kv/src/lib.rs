//! Conduit Host KV
//!
//! The [`Store`] trait is the only persistence surface the engine touches.
//! Loop executors keep per-iteration pause records in it and block actions
//! get a flow-scoped view of it.
//!
//! - [`InMemoryStore`] keeps everything in a process-local map.
//! - [`FsStore`] keeps everything in a JSON file on local disk.
//! - [`HttpStore`] talks to the server's store-entries API.
//! - [`ScopedStore`] prefixes every key so callers cannot see each other's
//!   entries.

mod fs;
mod http;
mod memory;
mod scoped;

pub use fs::FsStore;
pub use http::HttpStore;
pub use memory::InMemoryStore;
pub use scoped::ScopedStore;

use async_trait::async_trait;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The entry exceeds the size the server accepts. Reported to the user.
  #[error("failed to store '{key}': storage limit exceeded")]
  StorageLimit { key: String },

  /// The backend failed or answered with something unexpected.
  #[error("storage error: {message}")]
  Storage { message: String },
}

impl StoreError {
  pub fn storage(message: impl Into<String>) -> Self {
    Self::Storage {
      message: message.into(),
    }
  }

  /// User errors are safe to show verbatim in a step's error message.
  pub fn is_user_error(&self) -> bool {
    matches!(self, Self::StorageLimit { .. })
  }
}

/// Async JSON key-value store.
#[async_trait]
pub trait Store: Send + Sync {
  /// Get a value by key. Missing keys are `Ok(None)`.
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

  /// Set a value, replacing any previous one.
  async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

  /// Delete a value. Deleting a missing key is not an error.
  async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
