//! Engine error types.

use conduit_blocks::BlockError;
use conduit_context::FlowExecutorContext;
use conduit_host_kv::StoreError;
use conduit_resolver::ResolveError;
use conduit_sandbox::SandboxError;
use tracing::error;

/// Message stored on a step when the real cause is an infrastructure fault.
pub const INTERNAL_STEP_MESSAGE: &str = "An internal error occurred while running this step";

/// Who an error is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Caused by the flow, its inputs or its connections. Shown verbatim.
  User,
  /// Infrastructure fault. Logged with its cause, sanitized for the user.
  Engine,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The caller cancelled the run.
  #[error("execution cancelled")]
  Cancelled,

  /// The run outlived its time budget.
  #[error("run exceeded the time limit of {limit_secs}s")]
  Timeout { limit_secs: u64 },

  /// A test run executed a block action more often than allowed.
  #[error("execution limit of {limit} reached for action '{action_name}' of '{block_name}'")]
  ExecutionLimitReached {
    block_name: String,
    action_name: String,
    limit: u32,
  },

  /// Source code could not be written out for the sandbox.
  #[error("failed to prepare code for step '{step_name}': {message}")]
  CodePreparation { step_name: String, message: String },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Sandbox(#[from] SandboxError),

  #[error(transparent)]
  Block(#[from] BlockError),

  #[error(transparent)]
  Store(#[from] StoreError),

  /// An operation payload was malformed or referenced something missing.
  #[error("invalid operation: {message}")]
  InvalidOperation { message: String },

  #[error("internal error: {message}")]
  Internal { message: String },

  /// An error that ended a flow walk, with the context the walk had
  /// reached when it stopped.
  #[error("{error}")]
  Interrupted {
    error: Box<EngineError>,
    ctx: Box<FlowExecutorContext>,
  },
}

impl EngineError {
  pub fn invalid_operation(message: impl Into<String>) -> Self {
    Self::InvalidOperation {
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// Attach the context a walk had reached. An error that already carries
  /// one keeps it, since inner walks stop later than outer ones.
  pub fn interrupted(self, ctx: FlowExecutorContext) -> Self {
    match self {
      Self::Interrupted { .. } => self,
      error => Self::Interrupted {
        error: Box::new(error),
        ctx: Box::new(ctx),
      },
    }
  }

  /// The underlying error and the context attached by [`Self::interrupted`].
  pub fn into_parts(self) -> (Self, Option<FlowExecutorContext>) {
    match self {
      Self::Interrupted { error, ctx } => (*error, Some(*ctx)),
      error => (error, None),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    let user = match self {
      Self::Interrupted { error, .. } => return error.kind(),
      Self::Cancelled | Self::Timeout { .. } => false,
      Self::ExecutionLimitReached { .. } => true,
      Self::CodePreparation { .. } => true,
      Self::Resolve(e) => e.is_user_error(),
      Self::Sandbox(e) => e.is_user_error(),
      Self::Block(e) => e.is_user_error(),
      Self::Store(e) => e.is_user_error(),
      Self::InvalidOperation { .. } => true,
      Self::Internal { .. } => false,
    };
    if user { ErrorKind::User } else { ErrorKind::Engine }
  }

  /// Fatal errors abort the whole run and are never retried.
  pub fn is_fatal(&self) -> bool {
    match self {
      Self::Interrupted { error, .. } => error.is_fatal(),
      _ => matches!(self, Self::Cancelled | Self::Timeout { .. }),
    }
  }

  /// Text safe to store in a step output.
  pub fn step_message(&self) -> String {
    match self.kind() {
      ErrorKind::User => self.to_string(),
      ErrorKind::Engine => {
        error!(error = %self, "step_engine_error");
        INTERNAL_STEP_MESSAGE.to_string()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use conduit_resolver::ConnectionError;

  #[test]
  fn test_user_errors_kept_verbatim() {
    let err = EngineError::from(ResolveError::from(ConnectionError::NotFound {
      name: "gmail".to_string(),
    }));
    assert_eq!(err.kind(), ErrorKind::User);
    assert_eq!(err.step_message(), "connection 'gmail' not found");
  }

  #[test]
  fn test_engine_errors_sanitized() {
    let err = EngineError::from(StoreError::storage("connection refused to 10.0.0.3"));
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert_eq!(err.step_message(), INTERNAL_STEP_MESSAGE);

    let err = EngineError::from(ResolveError::from(ConnectionError::Loading {
      name: "gmail".to_string(),
      message: "503".to_string(),
    }));
    assert_eq!(err.step_message(), INTERNAL_STEP_MESSAGE);
  }

  #[test]
  fn test_fatal_errors() {
    assert!(EngineError::Timeout { limit_secs: 1 }.is_fatal());
    assert!(EngineError::Cancelled.is_fatal());
    assert!(!EngineError::internal("x").is_fatal());
  }

  #[test]
  fn test_interrupted_keeps_innermost_context() {
    let inner = FlowExecutorContext::empty().increase_task().increase_task();
    let outer = FlowExecutorContext::empty();
    let err = EngineError::Timeout { limit_secs: 1 }
      .interrupted(inner)
      .interrupted(outer);

    assert!(err.is_fatal());
    assert_eq!(err.to_string(), "run exceeded the time limit of 1s");
    let (error, ctx) = err.into_parts();
    assert!(matches!(error, EngineError::Timeout { limit_secs: 1 }));
    assert_eq!(ctx.unwrap().tasks(), 2);
  }
}
