use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::enums::FlowVersionState;
use crate::input::InputMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
  Empty,
  Block,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSettings {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub block_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub block_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_name: Option<String>,
  #[serde(default)]
  pub input: InputMap,
}

/// Entry point of a flow. Its output is seeded into the context before the
/// first action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(rename = "type")]
  pub trigger_type: TriggerType,
  #[serde(default)]
  pub settings: TriggerSettings,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

/// A versioned flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
  pub id: String,
  pub flow_id: String,
  #[serde(default)]
  pub display_name: String,
  pub trigger: Trigger,
  #[serde(default)]
  pub state: FlowVersionState,
}

impl FlowVersion {
  /// Find an action anywhere in the graph by name.
  pub fn find_step(&self, step_name: &str) -> Option<&Action> {
    self.trigger.next_action.as_deref()?.find_step(step_name)
  }

  /// Locked versions may reuse cached code modules.
  pub fn is_locked(&self) -> bool {
    self.state == FlowVersionState::Locked
  }
}

/// Cap on executions of one block action during a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLimit {
  pub block_name: String,
  pub action_name: String,
  pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunActionLimits {
  #[serde(default)]
  pub is_enabled: bool,
  #[serde(default)]
  pub limits: Vec<ActionLimit>,
}

impl TestRunActionLimits {
  /// Limit configured for the pair, if limits are enabled.
  pub fn limit_for(&self, block_name: &str, action_name: &str) -> Option<u32> {
    if !self.is_enabled {
      return None;
    }
    self
      .limits
      .iter()
      .find(|l| l.block_name == block_name && l.action_name == action_name)
      .map(|l| l.limit)
  }
}
