use serde::{Deserialize, Serialize};

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
  #[default]
  Running,
  Succeeded,
  Failed,
  Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseType {
  Delay,
  Webhook,
}

/// How and when a paused run expects to be resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseMetadata {
  #[serde(rename = "type")]
  pub pause_type: PauseType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resume_date_time: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub execution_correlation_id: Option<String>,
}

impl PauseMetadata {
  pub fn webhook(request_id: Option<String>) -> Self {
    Self {
      pause_type: PauseType::Webhook,
      resume_date_time: None,
      request_id,
      response: None,
      execution_correlation_id: None,
    }
  }

  pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
    self.execution_correlation_id = Some(id.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStep {
  pub name: String,
  pub display_name: String,
  pub message: String,
}

/// Structured reason attached to a non-running verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
  tag = "reason",
  rename_all = "SCREAMING_SNAKE_CASE",
  rename_all_fields = "camelCase"
)]
pub enum VerdictResponse {
  Paused {
    pause_metadata: PauseMetadata,
  },
  Stopped {
    response: serde_json::Value,
  },
  Failed {
    failed_step: FailedStep,
  },
  ExecutionLimitReached {
    block_name: String,
    action_name: String,
    limit: u32,
  },
  InternalError {
    message: String,
  },
}
