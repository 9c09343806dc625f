//! Writes code step sources to disk for the sandbox.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conduit_config::SourceCode;
use tracing::info;

use crate::error::EngineError;

/// Entry file name of a prepared code module.
pub const ENTRY_FILE: &str = "index.lua";

/// Source of one code step.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeArtifact {
  pub flow_version_id: String,
  pub step_name: String,
  pub source_code: SourceCode,
}

/// Makes code step sources loadable by the code sandbox.
#[async_trait]
pub trait CodeBuilder: Send + Sync {
  /// Prepare every artifact and return their entry files, in order.
  async fn prepare(&self, artifacts: &[CodeArtifact]) -> Result<Vec<PathBuf>, EngineError>;
}

/// Lays sources out as `{codes_dir}/{flow_version_id}/{step_name}/index.lua`.
#[derive(Debug, Clone)]
pub struct FsCodeBuilder {
  codes_dir: PathBuf,
}

impl FsCodeBuilder {
  pub fn new(codes_dir: impl Into<PathBuf>) -> Self {
    Self {
      codes_dir: codes_dir.into(),
    }
  }

  pub fn codes_dir(&self) -> &Path {
    &self.codes_dir
  }

  fn entry_path(&self, artifact: &CodeArtifact) -> Result<PathBuf, EngineError> {
    let version = path_segment(&artifact.step_name, &artifact.flow_version_id)?;
    let step = path_segment(&artifact.step_name, &artifact.step_name)?;
    Ok(self.codes_dir.join(version).join(step).join(ENTRY_FILE))
  }

  async fn prepare_one(&self, artifact: &CodeArtifact) -> Result<PathBuf, EngineError> {
    if artifact.source_code.code.trim().is_empty() {
      return Err(EngineError::CodePreparation {
        step_name: artifact.step_name.clone(),
        message: "source code is empty".to_string(),
      });
    }

    let entry = self.entry_path(artifact)?;
    let io_error = |e: std::io::Error| EngineError::CodePreparation {
      step_name: artifact.step_name.clone(),
      message: e.to_string(),
    };

    // Rewriting an unchanged file would only churn the module cache.
    if let Ok(existing) = tokio::fs::read_to_string(&entry).await
      && existing == artifact.source_code.code
    {
      return Ok(entry);
    }

    if let Some(dir) = entry.parent() {
      tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    }
    tokio::fs::write(&entry, &artifact.source_code.code)
      .await
      .map_err(io_error)?;

    info!(
      step_name = %artifact.step_name,
      path = %entry.display(),
      "code_prepared"
    );
    Ok(entry)
  }
}

#[async_trait]
impl CodeBuilder for FsCodeBuilder {
  async fn prepare(&self, artifacts: &[CodeArtifact]) -> Result<Vec<PathBuf>, EngineError> {
    let mut entries = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
      entries.push(self.prepare_one(artifact).await?);
    }
    Ok(entries)
  }
}

/// Reject names that would escape the codes directory.
fn path_segment<'a>(step_name: &str, segment: &'a str) -> Result<&'a str, EngineError> {
  let invalid = segment.is_empty()
    || segment == "."
    || segment == ".."
    || segment.contains(['/', '\\', '\0']);
  if invalid {
    return Err(EngineError::CodePreparation {
      step_name: step_name.to_string(),
      message: format!("'{}' is not a valid path segment", segment),
    });
  }
  Ok(segment)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn artifact(step_name: &str, code: &str) -> CodeArtifact {
    CodeArtifact {
      flow_version_id: "fv_1".to_string(),
      step_name: step_name.to_string(),
      source_code: SourceCode {
        code: code.to_string(),
      },
    }
  }

  #[tokio::test]
  async fn test_writes_entry_file() {
    let dir = tempfile::tempdir().unwrap();
    let builder = FsCodeBuilder::new(dir.path());

    let entries = builder
      .prepare(&[artifact("step_1", "return function() return 1 end")])
      .await
      .unwrap();

    assert_eq!(entries, vec![dir.path().join("fv_1/step_1/index.lua")]);
    let written = std::fs::read_to_string(&entries[0]).unwrap();
    assert_eq!(written, "return function() return 1 end");
  }

  #[tokio::test]
  async fn test_overwrites_changed_source() {
    let dir = tempfile::tempdir().unwrap();
    let builder = FsCodeBuilder::new(dir.path());

    builder.prepare(&[artifact("step_1", "return 1")]).await.unwrap();
    let entries = builder.prepare(&[artifact("step_1", "return 2")]).await.unwrap();

    assert_eq!(std::fs::read_to_string(&entries[0]).unwrap(), "return 2");
  }

  #[tokio::test]
  async fn test_empty_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let builder = FsCodeBuilder::new(dir.path());

    let err = builder.prepare(&[artifact("step_1", "  ")]).await.unwrap_err();
    assert!(matches!(err, EngineError::CodePreparation { .. }));
  }

  #[tokio::test]
  async fn test_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let builder = FsCodeBuilder::new(dir.path());

    let err = builder.prepare(&[artifact("..", "return 1")]).await.unwrap_err();
    assert!(matches!(err, EngineError::CodePreparation { .. }));
  }
}
