use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An inbound HTTP request as seen by the engine: a webhook delivered to a
/// trigger, or the callback that resumes a paused run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
  #[serde(default)]
  pub body: serde_json::Value,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub query_params: BTreeMap<String, String>,
}

impl RequestPayload {
  pub fn query_param(&self, name: &str) -> Option<&str> {
    self.query_params.get(name).map(String::as_str)
  }
}
