//! Sandbox error types.

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
  /// The module ran longer than the configured limit.
  #[error("code execution timed out after {limit_ms}ms")]
  Timeout { limit_ms: u64 },

  /// The user code raised an error or returned something unusable.
  #[error("{message}")]
  Script { message: String },

  /// The module file could not be read.
  #[error("failed to read module '{path}': {message}")]
  ModuleLoad { path: String, message: String },

  /// An expression failed to compile or evaluate.
  #[error("failed to evaluate expression '{expression}': {message}")]
  Expression { expression: String, message: String },

  /// The VM or the worker thread failed.
  #[error("sandbox failure: {message}")]
  Internal { message: String },
}

impl SandboxError {
  pub fn script(message: impl Into<String>) -> Self {
    Self::Script {
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// Errors caused by the code being run rather than the sandbox itself.
  pub fn is_user_error(&self) -> bool {
    matches!(
      self,
      Self::Script { .. } | Self::Expression { .. } | Self::Timeout { .. }
    )
  }
}
