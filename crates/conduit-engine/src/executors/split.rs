use async_trait::async_trait;
use conduit_config::{
  Action, BranchCondition, SplitBranch, SplitBranchType, SplitExecutionType, StepType,
};
use conduit_context::{FlowExecutorContext, StepOutput, StepStatus};
use serde_json::json;
use tracing::debug;

use super::{ActionHandler, FlowExecutor, evaluate_conditions, fail_step, wrong_action};
use crate::constants::EngineConstants;
use crate::error::EngineError;

/// Routes into the branches whose conditions hold.
///
/// With EXECUTE_FIRST_MATCH only the first matching branch runs, with
/// EXECUTE_ALL_MATCH every matching branch runs in declaration order. When
/// nothing matches the first FALLBACK branch runs. Selected branch names are
/// recorded and replayed like a branch outcome.
pub(crate) struct SplitExecutor;

#[async_trait]
impl ActionHandler for SplitExecutor {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    let Action::Split(def) = action else {
      return Err(wrong_action("split", action));
    };

    let recorded: Option<Vec<String>> = ctx
      .get_step_output(&def.name)
      .filter(|output| output.status == StepStatus::Succeeded)
      .and_then(|output| output.output.as_ref())
      .and_then(|output| output.get("selectedBranches"))
      .and_then(|selected| serde_json::from_value(selected.clone()).ok());

    let (mut ctx, selected) = match recorded {
      Some(selected) => {
        debug!(step_name = %def.name, "split_replayed");
        (ctx, selected)
      }
      None => {
        let conditions: Vec<&Vec<Vec<BranchCondition>>> =
          def.branches.iter().map(|branch| &branch.conditions).collect();
        let unresolved = serde_json::to_value(&conditions)
          .map_err(|e| EngineError::internal(format!("failed to encode conditions: {}", e)))?;
        let resolved = match executor
          .services()
          .resolver
          .resolve(&unresolved, &ctx.current_state())
          .await
        {
          Ok(resolved) => resolved,
          Err(e) => return fail_step(ctx, action, unresolved, e.into()),
        };
        let groups: Vec<Vec<Vec<BranchCondition>>> =
          match serde_json::from_value(resolved.resolved_input) {
            Ok(groups) => groups,
            Err(e) => {
              return fail_step(
                ctx,
                action,
                resolved.censored_input,
                EngineError::invalid_operation(format!("invalid split conditions: {}", e)),
              );
            }
          };

        let evaluations: Vec<bool> = def
          .branches
          .iter()
          .zip(&groups)
          .map(|(branch, groups)| {
            branch.branch_type == SplitBranchType::Condition && evaluate_conditions(groups)
          })
          .collect();
        let selected = select_branches(&def.branches, &evaluations, def.settings.execution_type);
        debug!(step_name = %def.name, selected = ?selected, "split_evaluated");

        let output = json!({
          "evaluations": def
            .branches
            .iter()
            .zip(&evaluations)
            .map(|(branch, evaluation)| json!({
              "branchName": branch.branch_name,
              "evaluation": evaluation,
            }))
            .collect::<Vec<_>>(),
          "selectedBranches": selected,
        });
        let ctx = ctx.upsert_step(
          &def.name,
          StepOutput::succeeded(StepType::Split, resolved.censored_input, output),
        );
        (ctx, selected)
      }
    };

    if constants.single_step {
      return Ok(ctx);
    }

    for name in &selected {
      let Some(branch) = def.branches.iter().find(|branch| &branch.branch_name == name) else {
        continue;
      };
      ctx = executor
        .execute_from_action(branch.first_action.as_deref(), ctx, constants)
        .await?;
      if !ctx.is_running() {
        break;
      }
    }
    Ok(ctx)
  }
}

/// Names of the branches to run, in declaration order.
fn select_branches(
  branches: &[SplitBranch],
  evaluations: &[bool],
  execution_type: SplitExecutionType,
) -> Vec<String> {
  let mut matched = branches
    .iter()
    .zip(evaluations)
    .filter(|(_, matched)| **matched)
    .map(|(branch, _)| branch.branch_name.clone());

  let selected: Vec<String> = match execution_type {
    SplitExecutionType::ExecuteFirstMatch => matched.next().into_iter().collect(),
    SplitExecutionType::ExecuteAllMatch => matched.collect(),
  };
  if !selected.is_empty() {
    return selected;
  }

  branches
    .iter()
    .find(|branch| branch.branch_type == SplitBranchType::Fallback)
    .map(|branch| vec![branch.branch_name.clone()])
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn branch(name: &str, branch_type: SplitBranchType) -> SplitBranch {
    SplitBranch {
      branch_name: name.to_string(),
      branch_type,
      conditions: Vec::new(),
      first_action: None,
    }
  }

  fn branches() -> Vec<SplitBranch> {
    vec![
      branch("a", SplitBranchType::Condition),
      branch("b", SplitBranchType::Condition),
      branch("otherwise", SplitBranchType::Fallback),
    ]
  }

  #[test]
  fn test_first_match() {
    let selected = select_branches(&branches(), &[true, true, false], SplitExecutionType::ExecuteFirstMatch);
    assert_eq!(selected, vec!["a"]);
  }

  #[test]
  fn test_all_match() {
    let selected = select_branches(&branches(), &[true, true, false], SplitExecutionType::ExecuteAllMatch);
    assert_eq!(selected, vec!["a", "b"]);
  }

  #[test]
  fn test_fallback_when_nothing_matches() {
    let selected = select_branches(&branches(), &[false, false, false], SplitExecutionType::ExecuteAllMatch);
    assert_eq!(selected, vec!["otherwise"]);

    let without_fallback = &branches()[..2];
    let selected = select_branches(without_fallback, &[false, false], SplitExecutionType::ExecuteFirstMatch);
    assert!(selected.is_empty());
  }
}
