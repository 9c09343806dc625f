use std::collections::BTreeMap;

use conduit_config::StepType;
use serde::{Deserialize, Serialize};

/// Step outputs keyed by step name. Ordered so serialized snapshots are
/// stable.
pub type StepMap = BTreeMap<String, StepOutput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
  Succeeded,
  Failed,
  Paused,
}

/// Recorded result of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
  #[serde(rename = "type")]
  pub step_type: StepType,
  pub status: StepStatus,
  /// Censored input, safe to persist and display.
  #[serde(default)]
  pub input: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  /// Per-iteration scopes. Only set on loop steps.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub iterations: Option<Vec<StepMap>>,
}

impl StepOutput {
  pub fn succeeded(step_type: StepType, input: serde_json::Value, output: serde_json::Value) -> Self {
    Self {
      step_type,
      status: StepStatus::Succeeded,
      input,
      output: Some(output),
      error_message: None,
      iterations: None,
    }
  }

  pub fn failed(step_type: StepType, input: serde_json::Value, message: impl Into<String>) -> Self {
    Self {
      step_type,
      status: StepStatus::Failed,
      input,
      output: None,
      error_message: Some(message.into()),
      iterations: None,
    }
  }

  pub fn paused(step_type: StepType, input: serde_json::Value) -> Self {
    Self {
      step_type,
      status: StepStatus::Paused,
      input,
      output: None,
      error_message: None,
      iterations: None,
    }
  }

  /// Empty loop record used as the parent of iteration scopes.
  pub fn loop_scope() -> Self {
    Self {
      step_type: StepType::LoopOnItems,
      status: StepStatus::Succeeded,
      input: serde_json::Value::Null,
      output: None,
      error_message: None,
      iterations: Some(Vec::new()),
    }
  }

  pub fn with_status(mut self, status: StepStatus) -> Self {
    self.status = status;
    self
  }

  pub fn with_output(mut self, output: serde_json::Value) -> Self {
    self.output = Some(output);
    self
  }

  /// True for SUCCEEDED and PAUSED, the two states the dispatcher skips.
  pub fn is_completed(&self) -> bool {
    matches!(self.status, StepStatus::Succeeded | StepStatus::Paused)
  }
}
