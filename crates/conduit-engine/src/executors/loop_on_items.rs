//! Loop executor.
//!
//! Every iteration runs the loop body under its own path (`loop,index`) and
//! with a fresh pause id, so each iteration can pause on its own. The
//! iteration list is kept in the host store so a later resume request can
//! re-enter exactly the iteration named by its `path` query parameter.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::{Action, LoopOnItemsActionDef};
use conduit_context::{
  FlowExecutorContext, PauseMetadata, StepOutput, StepPath, StepStatus, Verdict, VerdictResponse,
};
use conduit_host_kv::{ScopedStore, Store};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{ActionHandler, FlowExecutor, fail_step, wrong_action};
use crate::constants::EngineConstants;
use crate::error::EngineError;

const ITERATIONS_KEY: &str = "iterations";

/// Persisted state of one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
  pub index: usize,
  pub item: Value,
  pub is_paused: bool,
}

/// Store prefix of a loop's iteration records: `Loop_{flowRunId}_{path}`,
/// where the path is the loop's own position including enclosing
/// iterations.
pub fn loop_store_prefix(flow_run_id: &str, path: &StepPath, loop_name: &str) -> String {
  if path.is_empty() {
    format!("Loop_{}_{}", flow_run_id, loop_name)
  } else {
    format!("Loop_{}_{},{}", flow_run_id, path, loop_name)
  }
}

/// Turn a resolved `items` value into the list to iterate.
///
/// Arrays are used as-is, strings holding JSON are parsed first, null and
/// the empty string give no items and any other value is a single item.
pub fn normalize_items(value: Value) -> Vec<Value> {
  let value = match value {
    Value::String(s) if s.trim().is_empty() => return Vec::new(),
    Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
    other => other,
  };
  match value {
    Value::Array(items) => items,
    Value::Null => Vec::new(),
    other => vec![other],
  }
}

pub(crate) struct LoopOnItemsExecutor;

#[async_trait]
impl ActionHandler for LoopOnItemsExecutor {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    let Action::LoopOnItems(def) = action else {
      return Err(wrong_action("loop", action));
    };

    match ctx.get_step_output(&def.name).map(|output| output.status) {
      Some(StepStatus::Succeeded) => {
        debug!(step_name = %def.name, "step_skipped");
        Ok(ctx)
      }
      Some(StepStatus::Paused) if constants.is_resume() => {
        resume(executor, action, def, ctx, constants).await
      }
      Some(StepStatus::Paused) => {
        debug!(step_name = %def.name, "step_skipped");
        Ok(ctx)
      }
      Some(StepStatus::Failed) | None => first_pass(executor, action, def, ctx, constants).await,
    }
  }
}

async fn first_pass(
  executor: &FlowExecutor,
  action: &Action,
  def: &LoopOnItemsActionDef,
  ctx: FlowExecutorContext,
  constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
  let services = executor.services();
  let unresolved = json!({ "items": def.settings.items });
  let resolved = match services
    .resolver
    .resolve(&unresolved, &ctx.current_state())
    .await
  {
    Ok(resolved) => resolved,
    Err(e) => return fail_step(ctx, action, unresolved, e.into()),
  };
  let items = normalize_items(
    resolved
      .resolved_input
      .get("items")
      .cloned()
      .unwrap_or(Value::Null),
  );

  let mut record = StepOutput::loop_scope();
  record.input = resolved.censored_input.clone();
  let ctx = ctx.upsert_step(&def.name, record);

  let first_action = match def.first_loop_action.as_deref() {
    Some(first) if !constants.single_step => first,
    _ => {
      let first_item = items.first().cloned().unwrap_or(Value::Null);
      return Ok(set_loop_output(ctx, &def.name, &first_item, 0).increase_task());
    }
  };

  info!(step_name = %def.name, items = items.len(), "loop_started");

  let base_path = ctx.current_path().clone();
  let base_pause_id = ctx.pause_id().to_string();
  let store = loop_store(executor, constants, &base_path, &def.name);

  let mut ctx = ctx;
  let mut records = Vec::with_capacity(items.len());
  let mut pause_metadata: Option<PauseMetadata> = None;

  for (index, item) in items.into_iter().enumerate() {
    ctx = set_loop_output(ctx, &def.name, &item, index);
    ctx = run_iteration(executor, def, first_action, ctx, constants, &base_path, &base_pause_id, index).await?;

    let verdict = ctx.verdict();
    records.push(IterationRecord {
      index,
      item,
      is_paused: verdict == Verdict::Paused,
    });

    match verdict {
      Verdict::Running => {}
      Verdict::Paused => {
        if pause_metadata.is_none() {
          pause_metadata = paused_with(&ctx);
        }
        ctx = ctx.set_verdict(Verdict::Running, None);
      }
      Verdict::Failed => {
        if let Err(e) = save_records(&store, &records).await {
          return fail_step(ctx, action, resolved.censored_input, e);
        }
        return Ok(mark_loop(ctx, &def.name, StepStatus::Failed));
      }
      Verdict::Succeeded => {
        // The body stopped the run.
        if let Err(e) = save_records(&store, &records).await {
          return fail_step(ctx, action, resolved.censored_input, e);
        }
        return Ok(ctx.increase_task());
      }
    }
  }

  if let Err(e) = save_records(&store, &records).await {
    return fail_step(ctx, action, resolved.censored_input, e);
  }
  Ok(finish(ctx, &def.name, &base_pause_id, pause_metadata, &records).increase_task())
}

async fn resume(
  executor: &FlowExecutor,
  action: &Action,
  def: &LoopOnItemsActionDef,
  ctx: FlowExecutorContext,
  constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
  let input = ctx
    .get_step_output(&def.name)
    .map(|output| output.input.clone())
    .unwrap_or(Value::Null);
  let Some(first_action) = def.first_loop_action.as_deref() else {
    return Ok(ctx);
  };

  let encoded = constants.resume_path().unwrap_or_default();
  let Some(index) = StepPath::iteration_for(encoded, &def.name) else {
    return fail_step(
      ctx,
      action,
      input,
      EngineError::invalid_operation(format!(
        "resume path '{}' does not name an iteration of '{}'",
        encoded, def.name
      )),
    );
  };

  let base_path = ctx.current_path().clone();
  let base_pause_id = ctx.pause_id().to_string();
  let store = loop_store(executor, constants, &base_path, &def.name);

  let mut records = match load_records(&store).await {
    Ok(records) => records,
    Err(e) => return fail_step(ctx, action, input, e),
  };
  let Some(record) = records.get(index).cloned() else {
    return fail_step(
      ctx,
      action,
      input,
      EngineError::invalid_operation(format!(
        "loop '{}' has no iteration {}",
        def.name, index
      )),
    );
  };

  info!(step_name = %def.name, index = index, "loop_resumed");

  let ctx = set_loop_output(ctx, &def.name, &record.item, index);
  let ctx = run_iteration(executor, def, first_action, ctx, constants, &base_path, &base_pause_id, index).await?;
  let verdict = ctx.verdict();
  records[index].is_paused = verdict == Verdict::Paused;

  if let Err(e) = save_records(&store, &records).await {
    return fail_step(ctx, action, input, e);
  }

  match verdict {
    Verdict::Failed => Ok(mark_loop(ctx, &def.name, StepStatus::Failed)),
    Verdict::Succeeded => Ok(ctx.increase_task()),
    Verdict::Paused => {
      let pause_metadata = paused_with(&ctx);
      let ctx = ctx.set_verdict(Verdict::Running, None);
      Ok(finish(ctx, &def.name, &base_pause_id, pause_metadata, &records))
    }
    Verdict::Running => Ok(finish(ctx, &def.name, &base_pause_id, None, &records).increase_task()),
  }
}

/// Run the loop body for iteration `index` and restore the loop's own path
/// and pause id afterwards. The body's verdict is kept.
#[allow(clippy::too_many_arguments)]
async fn run_iteration(
  executor: &FlowExecutor,
  def: &LoopOnItemsActionDef,
  first_action: &Action,
  ctx: FlowExecutorContext,
  constants: &EngineConstants,
  base_path: &StepPath,
  base_pause_id: &str,
  index: usize,
) -> Result<FlowExecutorContext, EngineError> {
  debug!(step_name = %def.name, index = index, "loop_iteration");
  let ctx = ctx
    .set_current_path(base_path.clone().push(def.name.clone(), index))
    .set_pause_id(uuid::Uuid::new_v4().to_string());
  let ctx = executor
    .execute_from_action(Some(first_action), ctx, constants)
    .await?;
  Ok(
    ctx
      .set_current_path(base_path.clone())
      .set_pause_id(base_pause_id),
  )
}

/// Settle the loop once its iterations ran: PAUSED while any iteration is
/// paused, SUCCEEDED with the last item otherwise.
fn finish(
  ctx: FlowExecutorContext,
  loop_name: &str,
  base_pause_id: &str,
  pause_metadata: Option<PauseMetadata>,
  records: &[IterationRecord],
) -> FlowExecutorContext {
  if records.iter().any(|record| record.is_paused) {
    let pause_metadata = pause_metadata
      .unwrap_or_else(|| PauseMetadata::webhook(None))
      .with_correlation_id(base_pause_id);
    info!(step_name = %loop_name, "loop_paused");
    return mark_loop(ctx, loop_name, StepStatus::Paused).set_verdict(
      Verdict::Paused,
      Some(VerdictResponse::Paused { pause_metadata }),
    );
  }

  let ctx = match records.last() {
    Some(last) => set_loop_output(ctx, loop_name, &last.item, last.index),
    None => set_loop_output(ctx, loop_name, &Value::Null, 0),
  };
  mark_loop(ctx, loop_name, StepStatus::Succeeded)
}

fn paused_with(ctx: &FlowExecutorContext) -> Option<PauseMetadata> {
  match ctx.verdict_response() {
    Some(VerdictResponse::Paused { pause_metadata }) => Some(pause_metadata.clone()),
    _ => None,
  }
}

/// Update the loop's `{item, index}` output, keeping its iterations.
fn set_loop_output(
  ctx: FlowExecutorContext,
  loop_name: &str,
  item: &Value,
  index: usize,
) -> FlowExecutorContext {
  let record = ctx
    .get_step_output(loop_name)
    .cloned()
    .unwrap_or_else(StepOutput::loop_scope)
    .with_output(json!({ "item": item, "index": index }));
  ctx.upsert_step(loop_name, record)
}

fn mark_loop(ctx: FlowExecutorContext, loop_name: &str, status: StepStatus) -> FlowExecutorContext {
  let mut record = ctx
    .get_step_output(loop_name)
    .cloned()
    .unwrap_or_else(StepOutput::loop_scope)
    .with_status(status);
  if status == StepStatus::Failed {
    record.error_message = match ctx.verdict_response() {
      Some(VerdictResponse::Failed { failed_step }) => Some(failed_step.message.clone()),
      _ => Some("loop iteration failed".to_string()),
    };
  }
  ctx.upsert_step(loop_name, record)
}

fn loop_store(
  executor: &FlowExecutor,
  constants: &EngineConstants,
  base_path: &StepPath,
  loop_name: &str,
) -> ScopedStore {
  ScopedStore::new(
    Arc::clone(&executor.services().store),
    loop_store_prefix(&constants.flow_run_id, base_path, loop_name),
  )
}

async fn save_records(store: &ScopedStore, records: &[IterationRecord]) -> Result<(), EngineError> {
  let value = serde_json::to_value(records)
    .map_err(|e| EngineError::internal(format!("failed to encode loop iterations: {}", e)))?;
  store.put(ITERATIONS_KEY, value).await?;
  Ok(())
}

async fn load_records(store: &ScopedStore) -> Result<Vec<IterationRecord>, EngineError> {
  let Some(value) = store.get(ITERATIONS_KEY).await? else {
    return Err(EngineError::invalid_operation(format!(
      "no iterations recorded under '{}'",
      store.prefix()
    )));
  };
  serde_json::from_value(value)
    .map_err(|e| EngineError::internal(format!("failed to decode loop iterations: {}", e)))
}
