use serde::{Deserialize, Serialize};

/// Whether a run starts fresh or re-enters a paused run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
  #[default]
  Begin,
  Resume,
}

/// Environment the run executes in. Action limits only apply to test runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEnvironment {
  #[default]
  Production,
  Testing,
}

/// Lifecycle state of a flow version.
///
/// Draft versions are still being edited, so their code modules must be
/// re-imported on every run. Locked versions are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowVersionState {
  #[default]
  Draft,
  Locked,
}

/// How the caller wants to be told about run progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressUpdateType {
  #[default]
  None,
  WebhookResponse,
  TestFlow,
}
