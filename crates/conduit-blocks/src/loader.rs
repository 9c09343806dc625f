use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::block::Block;
use crate::error::BlockError;

/// Supplies block implementations by name and version.
#[async_trait]
pub trait BlockLoader: Send + Sync {
  /// Load a block. `None` (or an empty version) selects the latest version.
  async fn load(&self, name: &str, version: Option<&str>) -> Result<Arc<Block>, BlockError>;
}

/// Loader over blocks registered in memory.
#[derive(Default)]
pub struct InMemoryBlockLoader {
  blocks: RwLock<HashMap<String, Vec<Arc<Block>>>>,
}

impl InMemoryBlockLoader {
  pub fn new() -> Self {
    Self::default()
  }

  /// A loader with every built-in block registered.
  pub async fn with_builtins() -> Self {
    let loader = Self::new();
    for block in crate::builtin::all() {
      loader.register(block).await;
    }
    loader
  }

  /// Register a block, replacing an existing registration of the same
  /// name and version.
  pub async fn register(&self, block: Block) {
    let mut blocks = self.blocks.write().await;
    let versions = blocks.entry(block.name().to_string()).or_default();
    versions.retain(|b| b.version() != block.version());
    versions.push(Arc::new(block));
    versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
  }
}

#[async_trait]
impl BlockLoader for InMemoryBlockLoader {
  async fn load(&self, name: &str, version: Option<&str>) -> Result<Arc<Block>, BlockError> {
    let blocks = self.blocks.read().await;
    let versions = blocks.get(name).ok_or_else(|| BlockError::BlockNotFound {
      name: name.to_string(),
    })?;

    let requested = version
      .map(|v| v.trim_start_matches(['^', '~', '=']).trim())
      .filter(|v| !v.is_empty());

    match requested {
      // Versions are kept newest first.
      None => versions.first().cloned().ok_or_else(|| BlockError::BlockNotFound {
        name: name.to_string(),
      }),
      Some(v) => versions
        .iter()
        .find(|b| b.version() == v)
        .cloned()
        .ok_or_else(|| BlockError::VersionNotFound {
          name: name.to_string(),
          version: v.to_string(),
        }),
    }
  }
}

/// Compare dotted versions numerically segment by segment, falling back to
/// string order for non-numeric segments.
fn compare_versions(a: &str, b: &str) -> Ordering {
  let mut left = a.split('.');
  let mut right = b.split('.');
  loop {
    match (left.next(), right.next()) {
      (None, None) => return Ordering::Equal,
      (Some(_), None) => return Ordering::Greater,
      (None, Some(_)) => return Ordering::Less,
      (Some(l), Some(r)) => {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
          (Ok(l), Ok(r)) => l.cmp(&r),
          _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
          return ordering;
        }
      }
    }
  }
}
