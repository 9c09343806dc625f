use std::sync::Arc;

use async_trait::async_trait;
use conduit_blocks::{ActionContext, HookOutcome, RunInfo, process_props};
use conduit_config::{Action, BlockActionDef, StepType};
use conduit_context::{FlowExecutorContext, StepOutput, StepStatus, Verdict, VerdictResponse};
use conduit_host_kv::ScopedStore;
use tracing::{debug, info};

use super::{ActionHandler, FlowExecutor, fail_step, wrong_action};
use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::guard::check_timeout;
use crate::retry::{check_action_limit, count_action_execution};
use crate::services::EngineServices;

/// Runs a block action.
pub(crate) struct BlockExecutor;

#[async_trait]
impl ActionHandler for BlockExecutor {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    let Action::Block(def) = action else {
      return Err(wrong_action("block", action));
    };

    // A paused step only runs again when the run is being resumed.
    match ctx.get_step_output(&def.name).map(|output| output.status) {
      Some(StepStatus::Succeeded) => {
        debug!(step_name = %def.name, "step_skipped");
        return Ok(ctx);
      }
      Some(StepStatus::Paused) if !constants.is_resume() => {
        debug!(step_name = %def.name, "step_skipped");
        return Ok(ctx);
      }
      _ => {}
    }

    let settings = &def.settings;
    let unresolved = serde_json::Value::Object(settings.input.clone());
    if let Err(e) = check_action_limit(&ctx, constants, &settings.block_name, &settings.action_name) {
      return fail_step(ctx, action, unresolved, e);
    }
    let ctx = count_action_execution(ctx, constants, &settings.block_name, &settings.action_name);

    let services = executor.services();
    let resolved = match services
      .resolver
      .resolve(&unresolved, &ctx.current_state())
      .await
    {
      Ok(resolved) => resolved,
      Err(e) => return fail_step(ctx, action, unresolved, e.into()),
    };
    let censored_input = resolved.censored_input;

    let (output, outcome) =
      match run_block_action(services, def, resolved.resolved_input, &ctx, constants).await {
        Ok(result) => result,
        Err(e) => return fail_step(ctx, action, censored_input, e),
      };

    let ctx = match outcome {
      None => ctx.upsert_step(
        &def.name,
        StepOutput::succeeded(StepType::Block, censored_input, output),
      ),
      Some(HookOutcome::Paused(mut pause_metadata)) => {
        info!(step_name = %def.name, pause_id = %ctx.pause_id(), "step_paused");
        if pause_metadata.request_id.is_none() {
          pause_metadata.request_id = Some(ctx.pause_id().to_string());
        }
        let pause_metadata = pause_metadata.with_correlation_id(ctx.pause_id());
        ctx
          .upsert_step(
            &def.name,
            StepOutput::paused(StepType::Block, censored_input).with_output(output),
          )
          .set_verdict(
            Verdict::Paused,
            Some(VerdictResponse::Paused { pause_metadata }),
          )
      }
      Some(HookOutcome::Stopped(response)) => {
        info!(step_name = %def.name, "run_stopped");
        ctx
          .upsert_step(
            &def.name,
            StepOutput::succeeded(StepType::Block, censored_input, output),
          )
          .set_verdict(Verdict::Succeeded, Some(VerdictResponse::Stopped { response }))
      }
    };
    Ok(ctx.increase_task())
  }
}

/// Load the block, validate props and run the action once. Returns the
/// action output and any pause or stop request it made.
async fn run_block_action(
  services: &EngineServices,
  def: &BlockActionDef,
  mut resolved_input: serde_json::Value,
  ctx: &FlowExecutorContext,
  constants: &EngineConstants,
) -> Result<(serde_json::Value, Option<HookOutcome>), EngineError> {
  let settings = &def.settings;
  let block = services
    .blocks
    .load(&settings.block_name, settings.block_version.as_deref())
    .await?;
  let block_action = block.get_action(&settings.action_name)?;

  let auth = resolved_input
    .as_object_mut()
    .and_then(|input| input.remove("auth"))
    .filter(|auth| !auth.is_null());
  let props = process_props(&block_action.metadata().props, &resolved_input)?;

  let store = Arc::new(ScopedStore::new(
    services.store.clone(),
    format!("flow_{}", constants.flow_id),
  ));
  let run = RunInfo {
    flow_id: constants.flow_id.clone(),
    flow_version_id: constants.flow_version_id.clone(),
    flow_run_id: constants.flow_run_id.clone(),
    step_name: def.name.clone(),
    pause_id: ctx.pause_id().to_string(),
    step_path: ctx.current_path().to_string(),
    execution_type: constants.execution_type,
    resume_payload: constants.resume_payload.clone(),
    public_url: constants.public_url.clone(),
  };
  let action_ctx = ActionContext::new(props, auth, store, run);

  check_timeout(constants)?;
  let output = block_action.run(action_ctx.clone()).await?;
  Ok((output, action_ctx.hook_outcome()))
}
