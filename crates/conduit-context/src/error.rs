//! Context error types.

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
  /// An encoded step path could not be decoded.
  #[error("invalid step path '{path}': {message}")]
  InvalidPath { path: String, message: String },
}
