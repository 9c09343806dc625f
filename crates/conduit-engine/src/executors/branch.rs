use async_trait::async_trait;
use conduit_config::{Action, BranchCondition, StepType};
use conduit_context::{FlowExecutorContext, StepOutput, StepStatus};
use serde_json::json;
use tracing::debug;

use super::{ActionHandler, FlowExecutor, evaluate_conditions, fail_step, wrong_action};
use crate::constants::EngineConstants;
use crate::error::EngineError;

/// Evaluates the branch conditions and runs the matching chain.
///
/// The outcome is recorded as `{condition: bool}`. When the branch already
/// has a recorded outcome the same chain is taken again without
/// re-evaluating, so a resumed run follows the path it paused on.
pub(crate) struct BranchExecutor;

#[async_trait]
impl ActionHandler for BranchExecutor {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    let Action::Branch(def) = action else {
      return Err(wrong_action("branch", action));
    };

    let recorded = ctx
      .get_step_output(&def.name)
      .filter(|output| output.status == StepStatus::Succeeded)
      .and_then(|output| output.output.as_ref())
      .and_then(|output| output.get("condition"))
      .and_then(serde_json::Value::as_bool);

    let (ctx, condition) = match recorded {
      Some(condition) => {
        debug!(step_name = %def.name, condition = condition, "branch_replayed");
        (ctx, condition)
      }
      None => {
        let unresolved = serde_json::to_value(&def.settings.conditions)
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
        let groups: Vec<Vec<BranchCondition>> =
          match serde_json::from_value(resolved.resolved_input) {
            Ok(groups) => groups,
            Err(e) => {
              return fail_step(
                ctx,
                action,
                resolved.censored_input,
                EngineError::invalid_operation(format!("invalid branch conditions: {}", e)),
              );
            }
          };

        let condition = evaluate_conditions(&groups);
        debug!(step_name = %def.name, condition = condition, "branch_evaluated");
        let ctx = ctx.upsert_step(
          &def.name,
          StepOutput::succeeded(
            StepType::Branch,
            resolved.censored_input,
            json!({ "condition": condition }),
          ),
        );
        (ctx, condition)
      }
    };

    if constants.single_step {
      return Ok(ctx);
    }

    let chain = if condition {
      def.on_success_action.as_deref()
    } else {
      def.on_failure_action.as_deref()
    };
    match chain {
      Some(first) => executor.execute_from_action(Some(first), ctx, constants).await,
      None => Ok(ctx),
    }
  }
}
