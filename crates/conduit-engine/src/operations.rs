//! Operation payloads and the engine's response envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use conduit_config::{
  ExecutionType, FlowVersion, ProgressUpdateType, RequestPayload, RunEnvironment,
  TestRunActionLimits,
};
use conduit_context::StepMap;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Everything the engine can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineOperationType {
  ExtractBlockMetadata,
  ExecuteFlow,
  ExecuteProperty,
  ExecuteTriggerHook,
  ExecuteStep,
  ExecuteValidateAuth,
}

impl EngineOperationType {
  pub const ALL: [EngineOperationType; 6] = [
    Self::ExtractBlockMetadata,
    Self::ExecuteFlow,
    Self::ExecuteProperty,
    Self::ExecuteTriggerHook,
    Self::ExecuteStep,
    Self::ExecuteValidateAuth,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::ExtractBlockMetadata => "EXTRACT_BLOCK_METADATA",
      Self::ExecuteFlow => "EXECUTE_FLOW",
      Self::ExecuteProperty => "EXECUTE_PROPERTY",
      Self::ExecuteTriggerHook => "EXECUTE_TRIGGER_HOOK",
      Self::ExecuteStep => "EXECUTE_STEP",
      Self::ExecuteValidateAuth => "EXECUTE_VALIDATE_AUTH",
    }
  }
}

impl fmt::Display for EngineOperationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EngineOperationType {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| EngineError::invalid_operation(format!("unknown operation type '{}'", s)))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineResponseStatus {
  Ok,
  Error,
}

/// Envelope returned for every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
  pub status: EngineResponseStatus,
  pub response: serde_json::Value,
}

impl EngineResponse {
  pub fn ok(response: serde_json::Value) -> Self {
    Self {
      status: EngineResponseStatus::Ok,
      response,
    }
  }

  /// Error envelope. Messages holding JSON are passed through as
  /// structured values.
  pub fn error(message: &str) -> Self {
    let response = match serde_json::from_str::<serde_json::Value>(message) {
      Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => value,
      _ => serde_json::Value::String(message.to_string()),
    };
    Self {
      status: EngineResponseStatus::Error,
      response,
    }
  }

  pub fn is_ok(&self) -> bool {
    self.status == EngineResponseStatus::Ok
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractBlockMetadataOperation {
  pub block_name: String,
  #[serde(default)]
  pub block_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteFlowOperation {
  pub flow_version: FlowVersion,
  pub flow_run_id: String,
  #[serde(default)]
  pub execution_type: ExecutionType,
  #[serde(default)]
  pub run_environment: RunEnvironment,
  #[serde(default)]
  pub progress_update_type: ProgressUpdateType,
  #[serde(default)]
  pub worker_handler_id: Option<String>,
  #[serde(default)]
  pub execution_correlation_id: Option<String>,
  /// Output of the trigger for a fresh run.
  #[serde(default)]
  pub trigger_payload: serde_json::Value,
  /// Persisted steps of the paused run being resumed.
  #[serde(default)]
  pub steps: StepMap,
  /// Request that resumes the run.
  #[serde(default)]
  pub resume_payload: Option<RequestPayload>,
  #[serde(default)]
  pub test_run_action_limits: TestRunActionLimits,
  /// Counts reported by the paused leg of a test run.
  #[serde(default)]
  pub action_execution_counts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStepOperation {
  pub flow_version: FlowVersion,
  pub step_name: String,
  /// Outputs of earlier steps, keyed by step name.
  #[serde(default)]
  pub sample_data: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub test_run_action_limits: TestRunActionLimits,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePropertyOperation {
  pub block_name: String,
  #[serde(default)]
  pub block_version: Option<String>,
  pub action_or_trigger_name: String,
  pub property_name: String,
  /// Current, unresolved values of the step's props.
  #[serde(default)]
  pub input: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub sample_data: BTreeMap<String, serde_json::Value>,
  #[serde(default)]
  pub flow_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerHookType {
  OnEnable,
  OnDisable,
  Run,
  Test,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTriggerHookOperation {
  pub hook_type: TriggerHookType,
  pub flow_version: FlowVersion,
  #[serde(default)]
  pub webhook_url: String,
  #[serde(default)]
  pub trigger_payload: RequestPayload,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteValidateAuthOperation {
  pub block_name: String,
  #[serde(default)]
  pub block_version: Option<String>,
  pub auth: serde_json::Value,
}
