//! Block error types.

use conduit_host_kv::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BlockError {
  #[error("block '{name}' not found")]
  BlockNotFound { name: String },

  #[error("block '{name}' has no version '{version}'")]
  VersionNotFound { name: String, version: String },

  #[error("action '{action}' not found in block '{block}'")]
  ActionNotFound { block: String, action: String },

  #[error("trigger '{trigger}' not found in block '{block}'")]
  TriggerNotFound { block: String, trigger: String },

  #[error("property '{property}' has no options")]
  PropertyNotFound { property: String },

  /// Props failed validation. `errors` is a JSON object of messages keyed
  /// by property name.
  #[error("{errors}")]
  PropsValidation { errors: String },

  /// The action or trigger itself reported a failure.
  #[error("{message}")]
  Execution { message: String },

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl BlockError {
  pub fn execution(message: impl Into<String>) -> Self {
    Self::Execution {
      message: message.into(),
    }
  }

  /// Storage faults are infrastructure errors. Everything else is caused by
  /// the flow or block configuration and is shown to the user.
  pub fn is_user_error(&self) -> bool {
    match self {
      Self::Store(e) => e.is_user_error(),
      _ => true,
    }
  }
}
