use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::StepPath;
use crate::step::{StepMap, StepOutput};
use crate::verdict::{Verdict, VerdictResponse};

/// Snapshot of a run.
///
/// All mutators consume the context and return the updated one. Cloning is
/// the only way to keep an earlier snapshot around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecutorContext {
  #[serde(default)]
  steps: StepMap,
  #[serde(default)]
  current_path: StepPath,
  #[serde(default)]
  tasks: u32,
  #[serde(default)]
  verdict: Verdict,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  verdict_response: Option<VerdictResponse>,
  pause_id: String,
  #[serde(default)]
  action_execution_counts: BTreeMap<String, u32>,
}

impl Default for FlowExecutorContext {
  fn default() -> Self {
    Self::empty()
  }
}

impl FlowExecutorContext {
  /// A fresh context for a BEGIN run.
  pub fn empty() -> Self {
    Self {
      steps: StepMap::new(),
      current_path: StepPath::new(),
      tasks: 0,
      verdict: Verdict::Running,
      verdict_response: None,
      pause_id: uuid::Uuid::new_v4().to_string(),
      action_execution_counts: BTreeMap::new(),
    }
  }

  /// Hydrate from a persisted step map for a RESUME run.
  pub fn from_steps(steps: StepMap) -> Self {
    Self {
      steps,
      ..Self::empty()
    }
  }

  pub fn steps(&self) -> &StepMap {
    &self.steps
  }

  pub fn current_path(&self) -> &StepPath {
    &self.current_path
  }

  pub fn tasks(&self) -> u32 {
    self.tasks
  }

  pub fn verdict(&self) -> Verdict {
    self.verdict
  }

  pub fn verdict_response(&self) -> Option<&VerdictResponse> {
    self.verdict_response.as_ref()
  }

  pub fn pause_id(&self) -> &str {
    &self.pause_id
  }

  pub fn is_running(&self) -> bool {
    self.verdict == Verdict::Running
  }

  /// Step output in the scope named by the current path.
  pub fn get_step_output(&self, step_name: &str) -> Option<&StepOutput> {
    self.scope()?.get(step_name)
  }

  /// Whether the step is SUCCEEDED or PAUSED in the current scope.
  pub fn is_completed(&self, step_name: &str) -> bool {
    self
      .get_step_output(step_name)
      .is_some_and(StepOutput::is_completed)
  }

  /// Insert or replace a step output in the current scope, creating the
  /// iteration scopes the current path names when they do not exist yet.
  pub fn upsert_step(mut self, step_name: impl Into<String>, output: StepOutput) -> Self {
    let scope = scope_mut(&mut self.steps, &self.current_path);
    scope.insert(step_name.into(), output);
    self
  }

  pub fn set_verdict(mut self, verdict: Verdict, response: Option<VerdictResponse>) -> Self {
    self.verdict = verdict;
    self.verdict_response = response;
    self
  }

  pub fn set_current_path(mut self, path: StepPath) -> Self {
    self.current_path = path;
    self
  }

  pub fn set_pause_id(mut self, pause_id: impl Into<String>) -> Self {
    self.pause_id = pause_id.into();
    self
  }

  pub fn increase_task(mut self) -> Self {
    self.tasks += 1;
    self
  }

  /// Executions per `block:action` so far in this test run.
  pub fn action_execution_counts(&self) -> &BTreeMap<String, u32> {
    &self.action_execution_counts
  }

  /// Carry the counts of an earlier leg of the run over a pause.
  pub fn with_action_execution_counts(mut self, counts: BTreeMap<String, u32>) -> Self {
    self.action_execution_counts = counts;
    self
  }

  pub fn action_execution_count(&self, block_name: &str, action_name: &str) -> u32 {
    self
      .action_execution_counts
      .get(&count_key(block_name, action_name))
      .copied()
      .unwrap_or(0)
  }

  pub fn increment_action_execution_count(mut self, block_name: &str, action_name: &str) -> Self {
    *self
      .action_execution_counts
      .entry(count_key(block_name, action_name))
      .or_insert(0) += 1;
    self
  }

  /// Values visible to templates: every step output from the top level down
  /// through the iteration scopes on the current path. Inner scopes shadow
  /// outer ones.
  pub fn current_state(&self) -> serde_json::Value {
    let mut state = serde_json::Map::new();
    let mut scope = Some(&self.steps);
    merge_outputs(&mut state, scope);
    for (loop_name, index) in self.current_path.iter() {
      scope = scope
        .and_then(|s| s.get(loop_name))
        .and_then(|l| l.iterations.as_ref())
        .and_then(|iterations| iterations.get(*index));
      merge_outputs(&mut state, scope);
    }
    serde_json::Value::Object(state)
  }

  fn scope(&self) -> Option<&StepMap> {
    let mut scope = &self.steps;
    for (loop_name, index) in self.current_path.iter() {
      scope = scope.get(loop_name)?.iterations.as_ref()?.get(*index)?;
    }
    Some(scope)
  }
}

fn scope_mut<'a>(steps: &'a mut StepMap, path: &StepPath) -> &'a mut StepMap {
  let mut scope = steps;
  for (loop_name, index) in path.iter() {
    let loop_output = scope
      .entry(loop_name.clone())
      .or_insert_with(StepOutput::loop_scope);
    let iterations = loop_output.iterations.get_or_insert_with(Vec::new);
    if iterations.len() <= *index {
      iterations.resize_with(index + 1, StepMap::new);
    }
    scope = &mut iterations[*index];
  }
  scope
}

fn merge_outputs(state: &mut serde_json::Map<String, serde_json::Value>, scope: Option<&StepMap>) {
  let Some(scope) = scope else {
    return;
  };
  for (name, output) in scope {
    state.insert(
      name.clone(),
      output.output.clone().unwrap_or(serde_json::Value::Null),
    );
  }
}

fn count_key(block_name: &str, action_name: &str) -> String {
  format!("{}:{}", block_name, action_name)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::step::StepStatus;
  use conduit_config::StepType;
  use serde_json::json;

  fn code_output(value: serde_json::Value) -> StepOutput {
    StepOutput::succeeded(StepType::Code, json!({}), value)
  }

  #[test]
  fn test_mutators_leave_original_untouched() {
    let original = FlowExecutorContext::empty().upsert_step("trigger", code_output(json!(1)));
    let updated = original
      .clone()
      .upsert_step("step_1", code_output(json!(2)))
      .increase_task();

    assert_eq!(original.steps().len(), 1);
    assert_eq!(original.tasks(), 0);
    assert_eq!(updated.steps().len(), 2);
    assert_eq!(updated.tasks(), 1);
  }

  #[test]
  fn test_upsert_creates_iteration_scope() {
    let ctx = FlowExecutorContext::empty()
      .set_current_path(StepPath::new().push("loop_1", 2))
      .upsert_step("inner", code_output(json!("x")));

    let loop_output = ctx.steps().get("loop_1").unwrap();
    let iterations = loop_output.iterations.as_ref().unwrap();
    assert_eq!(iterations.len(), 3);
    assert!(iterations[0].is_empty());
    assert!(iterations[2].contains_key("inner"));
    assert!(ctx.is_completed("inner"));

    let ctx = ctx.set_current_path(StepPath::new());
    assert!(!ctx.is_completed("inner"));
  }

  #[test]
  fn test_current_state_projects_path() {
    let ctx = FlowExecutorContext::empty()
      .upsert_step("trigger", code_output(json!({ "items": [1, 2] })))
      .upsert_step(
        "loop_1",
        StepOutput::loop_scope().with_output(json!({ "item": 2, "index": 1 })),
      )
      .set_current_path(StepPath::new().push("loop_1", 1))
      .upsert_step("inner", code_output(json!("done")));

    let state = ctx.current_state();
    assert_eq!(state["trigger"]["items"], json!([1, 2]));
    assert_eq!(state["loop_1"]["item"], json!(2));
    assert_eq!(state["inner"], json!("done"));
  }

  #[test]
  fn test_paused_counts_as_completed() {
    let ctx = FlowExecutorContext::empty()
      .upsert_step("approve", StepOutput::paused(StepType::Block, json!({})))
      .upsert_step(
        "broken",
        StepOutput::failed(StepType::Code, json!({}), "boom"),
      );
    assert!(ctx.is_completed("approve"));
    assert!(!ctx.is_completed("broken"));
    assert_eq!(
      ctx.get_step_output("broken").unwrap().status,
      StepStatus::Failed
    );
  }

  #[test]
  fn test_action_execution_counts() {
    let ctx = FlowExecutorContext::empty()
      .increment_action_execution_count("@conduit/block-store", "put")
      .increment_action_execution_count("@conduit/block-store", "put");
    assert_eq!(ctx.action_execution_count("@conduit/block-store", "put"), 2);
    assert_eq!(ctx.action_execution_count("@conduit/block-store", "get"), 0);

    let resumed = FlowExecutorContext::from_steps(ctx.steps().clone())
      .with_action_execution_counts(ctx.action_execution_counts().clone())
      .increment_action_execution_count("@conduit/block-store", "put");
    assert_eq!(resumed.action_execution_count("@conduit/block-store", "put"), 3);
  }

  #[test]
  fn test_serde_round_trip_keeps_nested_scopes() {
    let ctx = FlowExecutorContext::empty()
      .set_current_path(StepPath::new().push("loop_1", 0))
      .upsert_step("inner", code_output(json!(true)))
      .set_verdict(Verdict::Succeeded, None);
    let value = serde_json::to_value(&ctx).unwrap();
    assert_eq!(value["verdict"], json!("SUCCEEDED"));
    let parsed: FlowExecutorContext = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, ctx);
  }
}
