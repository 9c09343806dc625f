use async_trait::async_trait;
use conduit_config::{Action, StepType};
use conduit_context::{FlowExecutorContext, StepOutput};
use conduit_sandbox::RunCodeModule;
use tracing::debug;

use super::{ActionHandler, FlowExecutor, fail_step, wrong_action};
use crate::code_builder::CodeArtifact;
use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::guard::check_timeout;
use crate::retry::run_with_exponential_backoff;

/// Runs a code step in the code sandbox.
pub(crate) struct CodeExecutor;

#[async_trait]
impl ActionHandler for CodeExecutor {
  async fn handle(
    &self,
    executor: &FlowExecutor,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    let Action::Code(code) = action else {
      return Err(wrong_action("code", action));
    };
    if ctx.is_completed(&code.name) {
      debug!(step_name = %code.name, "step_skipped");
      return Ok(ctx);
    }

    let services = executor.services();
    let unresolved = serde_json::Value::Object(code.settings.input.clone());

    let artifact = CodeArtifact {
      flow_version_id: constants.flow_version_id.clone(),
      step_name: code.name.clone(),
      source_code: code.settings.source_code.clone(),
    };
    let code_file = match services
      .code_builder
      .prepare(std::slice::from_ref(&artifact))
      .await
      .and_then(|mut entries| {
        entries
          .pop()
          .ok_or_else(|| EngineError::internal("code builder returned no entry file"))
      }) {
      Ok(path) => path,
      Err(e) => return fail_step(ctx, action, unresolved, e),
    };

    let resolved = match services
      .resolver
      .resolve(&unresolved, &ctx.current_state())
      .await
    {
      Ok(resolved) => resolved,
      Err(e) => return fail_step(ctx, action, unresolved, e.into()),
    };
    let censored_input = resolved.censored_input;

    let request = RunCodeModule {
      is_fresh_import: constants.is_fresh_import(),
      code_file,
      inputs: resolved.resolved_input,
    };
    let sandbox = services.sandbox.code();
    let result = run_with_exponential_backoff(
      &services.config.retry,
      code.settings.error_handling_options.retry_on_failure,
      |e: &EngineError| !e.is_fatal(),
      || {
        let request = request.clone();
        async move {
          check_timeout(constants)?;
          sandbox
            .run_code_module(request)
            .await
            .map_err(EngineError::from)
        }
      },
    )
    .await;

    match result {
      Ok(output) => Ok(
        ctx
          .upsert_step(
            &code.name,
            StepOutput::succeeded(StepType::Code, censored_input, output),
          )
          .increase_task(),
      ),
      Err(e) => fail_step(ctx, action, censored_input, e),
    }
  }
}
