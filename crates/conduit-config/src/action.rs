use serde::{Deserialize, Serialize};

use crate::condition::{BranchCondition, SplitBranchType, SplitExecutionType};
use crate::input::InputMap;

/// A node in the action graph.
///
/// Every action owns its successor (`next_action`) and, for control
/// structures, the chains it dispatches into. Names are unique within a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
  /// Runs user supplied code inside the sandbox.
  Code(CodeActionDef),
  /// Runs an action exported by a block.
  Block(BlockActionDef),
  /// Runs `first_loop_action` once per item.
  LoopOnItems(LoopOnItemsActionDef),
  /// Runs one of two chains depending on a condition.
  Branch(BranchActionDef),
  /// Routes into zero or more branch chains.
  Split(SplitActionDef),
}

/// Discriminant of an [`Action`], used for executor dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
  Code,
  Block,
  LoopOnItems,
  Branch,
  Split,
}

/// Type tag recorded on a step output. Covers triggers as well as actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
  Code,
  Block,
  LoopOnItems,
  Branch,
  Split,
  EmptyTrigger,
  BlockTrigger,
}

impl From<ActionType> for StepType {
  fn from(value: ActionType) -> Self {
    match value {
      ActionType::Code => StepType::Code,
      ActionType::Block => StepType::Block,
      ActionType::LoopOnItems => StepType::LoopOnItems,
      ActionType::Branch => StepType::Branch,
      ActionType::Split => StepType::Split,
    }
  }
}

/// Failure policy shared by code and block actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingOptions {
  /// Keep the run going when this step fails.
  #[serde(default)]
  pub continue_on_failure: bool,
  /// Retry the step's execution with exponential backoff.
  #[serde(default)]
  pub retry_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCode {
  pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSettings {
  pub source_code: SourceCode,
  #[serde(default)]
  pub input: InputMap,
  #[serde(default)]
  pub error_handling_options: ErrorHandlingOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeActionDef {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  pub settings: CodeSettings,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSettings {
  /// Block name, e.g. "@conduit/block-approval"
  pub block_name: String,
  /// Version constraint. The latest installed version is used when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub block_version: Option<String>,
  /// Name of the action export within the block.
  pub action_name: String,
  #[serde(default)]
  pub input: InputMap,
  #[serde(default)]
  pub error_handling_options: ErrorHandlingOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockActionDef {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  pub settings: BlockSettings,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSettings {
  /// Template, JSON-encoded string, scalar or array.
  #[serde(default)]
  pub items: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOnItemsActionDef {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub settings: LoopSettings,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_loop_action: Option<Box<Action>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSettings {
  /// OR of AND-groups.
  #[serde(default)]
  pub conditions: Vec<Vec<BranchCondition>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchActionDef {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub settings: BranchSettings,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub on_success_action: Option<Box<Action>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub on_failure_action: Option<Box<Action>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitBranch {
  pub branch_name: String,
  pub branch_type: SplitBranchType,
  #[serde(default)]
  pub conditions: Vec<Vec<BranchCondition>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitSettings {
  #[serde(default)]
  pub execution_type: SplitExecutionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitActionDef {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub settings: SplitSettings,
  #[serde(default)]
  pub branches: Vec<SplitBranch>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_action: Option<Box<Action>>,
}

impl Action {
  pub fn name(&self) -> &str {
    match self {
      Action::Code(a) => &a.name,
      Action::Block(a) => &a.name,
      Action::LoopOnItems(a) => &a.name,
      Action::Branch(a) => &a.name,
      Action::Split(a) => &a.name,
    }
  }

  pub fn display_name(&self) -> &str {
    match self {
      Action::Code(a) => &a.display_name,
      Action::Block(a) => &a.display_name,
      Action::LoopOnItems(a) => &a.display_name,
      Action::Branch(a) => &a.display_name,
      Action::Split(a) => &a.display_name,
    }
  }

  pub fn action_type(&self) -> ActionType {
    match self {
      Action::Code(_) => ActionType::Code,
      Action::Block(_) => ActionType::Block,
      Action::LoopOnItems(_) => ActionType::LoopOnItems,
      Action::Branch(_) => ActionType::Branch,
      Action::Split(_) => ActionType::Split,
    }
  }

  pub fn next_action(&self) -> Option<&Action> {
    let next = match self {
      Action::Code(a) => &a.next_action,
      Action::Block(a) => &a.next_action,
      Action::LoopOnItems(a) => &a.next_action,
      Action::Branch(a) => &a.next_action,
      Action::Split(a) => &a.next_action,
    };
    next.as_deref()
  }

  /// Failure policy of this action. Control structures never retry and
  /// never continue past a failure.
  pub fn error_handling(&self) -> ErrorHandlingOptions {
    match self {
      Action::Code(a) => a.settings.error_handling_options,
      Action::Block(a) => a.settings.error_handling_options,
      _ => ErrorHandlingOptions::default(),
    }
  }

  /// Chains owned by this action, excluding `next_action`.
  pub fn children(&self) -> Vec<&Action> {
    match self {
      Action::LoopOnItems(a) => a.first_loop_action.as_deref().into_iter().collect(),
      Action::Branch(a) => a
        .on_success_action
        .as_deref()
        .into_iter()
        .chain(a.on_failure_action.as_deref())
        .collect(),
      Action::Split(a) => a
        .branches
        .iter()
        .filter_map(|b| b.first_action.as_deref())
        .collect(),
      Action::Code(_) | Action::Block(_) => Vec::new(),
    }
  }

  /// Depth-first search for a step by name, starting at this action and
  /// following both child chains and `next_action`.
  pub fn find_step(&self, step_name: &str) -> Option<&Action> {
    let mut current = Some(self);
    while let Some(action) = current {
      if action.name() == step_name {
        return Some(action);
      }
      if let Some(found) = action
        .children()
        .into_iter()
        .find_map(|child| child.find_step(step_name))
      {
        return Some(found);
      }
      current = action.next_action();
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn sample_graph() -> Action {
    serde_json::from_value(json!({
      "type": "LOOP_ON_ITEMS",
      "name": "loop_1",
      "settings": { "items": "{{ trigger.items }}" },
      "firstLoopAction": {
        "type": "BRANCH",
        "name": "branch_1",
        "settings": { "conditions": [] },
        "onSuccessAction": {
          "type": "CODE",
          "name": "step_inner",
          "settings": { "sourceCode": { "code": "return function(i) return i end" } }
        }
      },
      "nextAction": {
        "type": "BLOCK",
        "name": "step_after",
        "settings": { "blockName": "@conduit/block-store", "actionName": "put" }
      }
    }))
    .unwrap()
  }

  #[test]
  fn test_deserialize_tagged_graph() {
    let action = sample_graph();
    assert_eq!(action.action_type(), ActionType::LoopOnItems);
    assert_eq!(action.name(), "loop_1");
    assert_eq!(action.next_action().unwrap().name(), "step_after");
    assert_eq!(action.children().len(), 1);
  }

  #[test]
  fn test_find_nested_step() {
    let action = sample_graph();
    let inner = action.find_step("step_inner").unwrap();
    assert_eq!(inner.action_type(), ActionType::Code);
    assert!(action.find_step("step_after").is_some());
    assert!(action.find_step("missing").is_none());
  }

  #[test]
  fn test_error_handling_defaults() {
    let action = sample_graph();
    let block = action.next_action().unwrap();
    assert_eq!(block.error_handling(), ErrorHandlingOptions::default());
  }
}
