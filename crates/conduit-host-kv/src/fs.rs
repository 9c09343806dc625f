use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Store, StoreError};

/// Store kept in a single JSON file.
///
/// Entries survive between processes, so a CLI run can resume a loop paused
/// by an earlier invocation. The whole file is read and rewritten on every
/// change. Writes go to a sibling temp file first and are renamed into
/// place.
#[derive(Debug)]
pub struct FsStore {
  path: PathBuf,
  lock: Mutex<()>,
}

impl FsStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      lock: Mutex::new(()),
    }
  }

  async fn load(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
    match fs::read(&self.path).await {
      Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
      Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
        StoreError::storage(format!("failed to parse {}: {}", self.path.display(), e))
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
      Err(e) => Err(io_error(&self.path, e)),
    }
  }

  async fn save(&self, entries: &BTreeMap<String, serde_json::Value>) -> Result<(), StoreError> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| io_error(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::storage(e.to_string()))?;
    let tmp = self.path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await.map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, &self.path)
      .await
      .map_err(|e| io_error(&self.path, e))?;
    debug!(path = %self.path.display(), entries = entries.len(), "store_saved");
    Ok(())
  }
}

fn io_error(path: &std::path::Path, e: std::io::Error) -> StoreError {
  StoreError::storage(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl Store for FsStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
    let _guard = self.lock.lock().await;
    Ok(self.load().await?.remove(key))
  }

  async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
    let _guard = self.lock.lock().await;
    let mut entries = self.load().await?;
    entries.insert(key.to_string(), value);
    self.save(&entries).await
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let _guard = self.lock.lock().await;
    let mut entries = self.load().await?;
    if entries.remove(key).is_some() {
      self.save(&entries).await?;
    }
    Ok(())
  }
}
