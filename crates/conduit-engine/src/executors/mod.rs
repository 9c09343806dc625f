//! Per-action executors and the flow walker that dispatches to them.

mod block;
mod branch;
mod code;
mod conditions;
mod flow;
mod loop_on_items;
mod split;

pub use conditions::{evaluate_condition, evaluate_conditions};
pub use flow::FlowExecutor;
pub use loop_on_items::{IterationRecord, loop_store_prefix, normalize_items};

use async_trait::async_trait;
use conduit_config::{Action, ActionType, StepType};
use conduit_context::{FailedStep, FlowExecutorContext, StepOutput, Verdict, VerdictResponse};
use tracing::warn;

use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::retry::continue_if_failure_handler;

/// Executes one kind of action.
///
/// Handlers take the context by value and return the next one. Control
/// structures call back into the [`FlowExecutor`] for their child chains.
#[async_trait]
pub trait ActionHandler: Send + Sync {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError>;
}

pub(crate) fn handler_for(action_type: ActionType) -> &'static dyn ActionHandler {
  match action_type {
    ActionType::Code => &code::CodeExecutor,
    ActionType::Block => &block::BlockExecutor,
    ActionType::LoopOnItems => &loop_on_items::LoopOnItemsExecutor,
    ActionType::Branch => &branch::BranchExecutor,
    ActionType::Split => &split::SplitExecutor,
  }
}

/// Record `error` as the outcome of `action`.
///
/// Fatal errors are handed back unchanged so they abort the run.
pub(crate) fn fail_step(
  ctx: FlowExecutorContext,
  action: &Action,
  input: serde_json::Value,
  error: EngineError,
) -> Result<FlowExecutorContext, EngineError> {
  if error.is_fatal() {
    return Err(error);
  }

  let message = error.step_message();
  warn!(step_name = %action.name(), error = %message, "step_failed");

  let step_type = StepType::from(action.action_type());
  let ctx = ctx.upsert_step(
    action.name(),
    StepOutput::failed(step_type, input, message.clone()),
  );

  // A spent test-run budget ends the run even when the step may fail.
  if let EngineError::ExecutionLimitReached {
    block_name,
    action_name,
    limit,
  } = error
  {
    return Ok(ctx.set_verdict(
      Verdict::Failed,
      Some(VerdictResponse::ExecutionLimitReached {
        block_name,
        action_name,
        limit,
      }),
    ));
  }

  let ctx = ctx.set_verdict(
    Verdict::Failed,
    Some(VerdictResponse::Failed {
      failed_step: FailedStep {
        name: action.name().to_string(),
        display_name: action.display_name().to_string(),
        message,
      },
    }),
  );
  Ok(continue_if_failure_handler(ctx, action))
}

fn wrong_action(expected: &str, action: &Action) -> EngineError {
  EngineError::internal(format!(
    "step '{}' dispatched to the {} executor",
    action.name(),
    expected
  ))
}
