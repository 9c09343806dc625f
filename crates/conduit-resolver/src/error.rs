use thiserror::Error;

/// Errors raised while fetching a connection value.
#[derive(Debug, Error)]
pub enum ConnectionError {
  #[error("connection '{name}' not found")]
  NotFound { name: String },

  #[error("connection '{name}' has expired, reconnect it and try again")]
  Expired { name: String },

  /// Transport failure or an unexpected server answer.
  #[error("failed to load connection '{name}': {message}")]
  Loading { name: String, message: String },
}

impl ConnectionError {
  /// Not-found and expired connections are actionable by the flow author.
  pub fn is_user_error(&self) -> bool {
    matches!(self, Self::NotFound { .. } | Self::Expired { .. })
  }
}

/// Errors that can occur during input resolution.
///
/// Expression failures are not errors; they resolve to an empty string.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error(transparent)]
  Connection(#[from] ConnectionError),
}

impl ResolveError {
  pub fn is_user_error(&self) -> bool {
    match self {
      Self::Connection(e) => e.is_user_error(),
    }
  }
}
