//! Step input definitions.
//!
//! Inputs are arbitrary JSON trees. Any string inside the tree may contain
//! `{{ ... }}` tokens that the resolver evaluates against the run state:
//!
//! ```json
//! {
//!   "email": "{{ fetch_user.email }}",
//!   "items": "{{ fetch_user.orders }}",
//!   "message": "Hello {{ fetch_user.name }}!",
//!   "static_value": 42
//! }
//! ```
//!
//! A string that is exactly one token keeps the native type of the expression
//! (`"items"` above resolves to an array); embedded tokens are substituted as
//! text.

/// Unresolved step input, keyed by property name.
pub type InputMap = serde_json::Map<String, serde_json::Value>;
