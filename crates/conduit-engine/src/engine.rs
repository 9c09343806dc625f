use std::collections::BTreeMap;
use std::sync::Arc;

use conduit_blocks::{
  BlockLoader, InMemoryBlockLoader, PropertyContext, TriggerContext, process_props,
};
use conduit_config::{ExecutionType, FlowVersion, RunEnvironment, StepType, TriggerType};
use conduit_context::{FlowExecutorContext, StepOutput, StepStatus};
use conduit_host_kv::{InMemoryStore, ScopedStore, Store};
use conduit_resolver::{ConnectionService, PropsResolver, StaticConnectionService};
use conduit_sandbox::{ExpressionSandbox, LuaSandbox, Sandbox};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::code_builder::{CodeBuilder, FsCodeBuilder};
use crate::config::EngineConfig;
use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::executors::FlowExecutor;
use crate::operations::{
  EngineOperationType, EngineResponse, ExecuteFlowOperation, ExecutePropertyOperation,
  ExecuteStepOperation, ExecuteTriggerHookOperation, ExecuteValidateAuthOperation,
  ExtractBlockMetadataOperation, TriggerHookType,
};
use crate::progress::{ProgressReporter, ProgressSink, RunDetails, TracingProgressSink};
use crate::services::EngineServices;

/// Entry point: dispatches operations and wraps their results in an
/// [`EngineResponse`].
#[derive(Clone)]
pub struct Engine {
  executor: FlowExecutor,
}

impl Engine {
  pub fn builder(config: EngineConfig) -> EngineBuilder {
    EngineBuilder::new(config)
  }

  pub fn executor(&self) -> &FlowExecutor {
    &self.executor
  }

  fn services(&self) -> &EngineServices {
    self.executor.services()
  }

  pub async fn execute(&self, operation_type: EngineOperationType, operation: Value) -> EngineResponse {
    self
      .execute_with_cancel(operation_type, operation, CancellationToken::new())
      .await
  }

  /// Run an operation. Cancelling `cancel` stops a flow run at the next
  /// step boundary.
  #[instrument(name = "engine_operation", skip(self, operation, cancel), fields(operation = %operation_type))]
  pub async fn execute_with_cancel(
    &self,
    operation_type: EngineOperationType,
    operation: Value,
    cancel: CancellationToken,
  ) -> EngineResponse {
    let result = match operation_type {
      EngineOperationType::ExtractBlockMetadata => match parse(operation) {
        Ok(op) => self.extract_block_metadata(op).await,
        Err(e) => Err(e),
      },
      EngineOperationType::ExecuteFlow => match parse(operation) {
        Ok(op) => self.execute_flow(op, cancel).await,
        Err(e) => Err(e),
      },
      EngineOperationType::ExecuteProperty => match parse(operation) {
        Ok(op) => self.execute_property(op).await,
        Err(e) => Err(e),
      },
      EngineOperationType::ExecuteTriggerHook => match parse(operation) {
        Ok(op) => self.execute_trigger_hook(op).await,
        Err(e) => Err(e),
      },
      EngineOperationType::ExecuteStep => match parse(operation) {
        Ok(op) => self.execute_step(op, cancel).await,
        Err(e) => Err(e),
      },
      EngineOperationType::ExecuteValidateAuth => match parse(operation) {
        Ok(op) => self.validate_auth(op).await,
        Err(e) => Err(e),
      },
    };

    match result {
      Ok(response) => EngineResponse::ok(response),
      Err(e) => {
        error!(operation = %operation_type, error = %e, "operation_failed");
        EngineResponse::error(&e.step_message())
      }
    }
  }

  async fn extract_block_metadata(&self, op: ExtractBlockMetadataOperation) -> Result<Value, EngineError> {
    let block = self
      .services()
      .blocks
      .load(&op.block_name, op.block_version.as_deref())
      .await?;
    to_json(&block.metadata())
  }

  #[instrument(
    name = "execute_flow",
    skip_all,
    fields(flow_run_id = %op.flow_run_id, execution_type = ?op.execution_type)
  )]
  async fn execute_flow(&self, op: ExecuteFlowOperation, cancel: CancellationToken) -> Result<Value, EngineError> {
    let services = self.services();
    let mut constants = EngineConstants::new(&op.flow_version, op.flow_run_id.clone());
    constants.execution_type = op.execution_type;
    constants.run_environment = op.run_environment;
    constants.progress_update_type = op.progress_update_type;
    constants.worker_handler_id = op.worker_handler_id.clone();
    if let Some(correlation_id) = &op.execution_correlation_id {
      constants.execution_correlation_id = correlation_id.clone();
    }
    constants.resume_payload = op.resume_payload.clone();
    constants.test_run_action_limits = op.test_run_action_limits.clone();
    constants.public_url = services.config.public_url.clone();
    constants.timeout = services.config.run_timeout;
    constants.cancel = cancel;

    let trigger = &op.flow_version.trigger;
    let ctx = match op.execution_type {
      ExecutionType::Begin => FlowExecutorContext::empty().upsert_step(
        &trigger.name,
        StepOutput::succeeded(trigger_step_type(trigger.trigger_type), json!({}), op.trigger_payload.clone()),
      ),
      ExecutionType::Resume => FlowExecutorContext::from_steps(op.steps.clone())
        .with_action_execution_counts(op.action_execution_counts.clone()),
    };

    info!(flow_version_id = %constants.flow_version_id, "flow_run_started");
    let result = match trigger.next_action.as_deref() {
      Some(first) => self.executor.execute(first, ctx.clone(), &constants).await,
      None => Ok(ctx.clone()),
    };

    let details = match result {
      Ok(final_ctx) => RunDetails::from_context(&final_ctx, true, constants.elapsed()),
      Err(e) => {
        error!(error = %e, "flow_run_aborted");
        let (e, reached) = e.into_parts();
        RunDetails::aborted(reached.as_ref().unwrap_or(&ctx), &e, constants.elapsed())
      }
    };

    if let Some(response) = &details.stop_response {
      services
        .progress
        .send_webhook_response(&constants, response.clone())
        .await;
    }
    services.progress.report(&constants, details.clone()).await;
    services.progress.finish_run(&constants.flow_run_id).await;

    info!(
      status = ?details.status,
      tasks = details.tasks,
      duration_ms = details.duration,
      "flow_run_finished"
    );
    to_json(&details)
  }

  #[instrument(name = "execute_step", skip_all, fields(step_name = %op.step_name))]
  async fn execute_step(&self, op: ExecuteStepOperation, cancel: CancellationToken) -> Result<Value, EngineError> {
    let services = self.services();
    let action = op
      .flow_version
      .find_step(&op.step_name)
      .ok_or_else(|| EngineError::invalid_operation(format!("step '{}' not found", op.step_name)))?;

    let mut constants = EngineConstants::new(&op.flow_version, uuid::Uuid::new_v4().to_string());
    constants.run_environment = RunEnvironment::Testing;
    constants.test_run_action_limits = op.test_run_action_limits.clone();
    constants.single_step = true;
    constants.public_url = services.config.public_url.clone();
    constants.timeout = services.config.run_timeout;
    constants.cancel = cancel;

    let ctx = sample_context(&op.flow_version, &op.sample_data);
    let ctx = self.executor.execute(action, ctx, &constants).await?;

    let output = ctx
      .get_step_output(&op.step_name)
      .ok_or_else(|| EngineError::internal(format!("step '{}' recorded no output", op.step_name)))?;
    info!(status = ?output.status, "step_tested");
    Ok(json!({
      "success": output.status != StepStatus::Failed,
      "input": output.input,
      "output": output.output,
      "errorMessage": output.error_message,
      "verdict": ctx.verdict(),
      "verdictResponse": ctx.verdict_response(),
    }))
  }

  async fn execute_property(&self, op: ExecutePropertyOperation) -> Result<Value, EngineError> {
    let services = self.services();
    let block = services
      .blocks
      .load(&op.block_name, op.block_version.as_deref())
      .await?;

    let state = Value::Object(op.sample_data.into_iter().collect());
    let mut input = services
      .resolver
      .resolve_value_only(&Value::Object(op.input), &state)
      .await?;
    let auth = take_auth(&mut input);
    let ctx = PropertyContext {
      input,
      auth,
      store: self.flow_store(op.flow_id.as_deref().unwrap_or("global")),
    };

    let options = match block.get_action(&op.action_or_trigger_name) {
      Ok(action) => action.options(&op.property_name, ctx).await?,
      Err(_) => {
        block
          .get_trigger(&op.action_or_trigger_name)?
          .options(&op.property_name, ctx)
          .await?
      }
    };
    to_json(&options)
  }

  #[instrument(name = "execute_trigger_hook", skip_all, fields(hook = ?op.hook_type))]
  async fn execute_trigger_hook(&self, op: ExecuteTriggerHookOperation) -> Result<Value, EngineError> {
    let services = self.services();
    let trigger = &op.flow_version.trigger;
    if trigger.trigger_type != TriggerType::Block {
      return Err(EngineError::invalid_operation("flow trigger is not a block trigger"));
    }
    let settings = &trigger.settings;
    let (Some(block_name), Some(trigger_name)) = (&settings.block_name, &settings.trigger_name) else {
      return Err(EngineError::invalid_operation("trigger settings name no block trigger"));
    };

    let block = services
      .blocks
      .load(block_name, settings.block_version.as_deref())
      .await?;
    let block_trigger = block.get_trigger(trigger_name)?;

    let mut input = services
      .resolver
      .resolve_value_only(&Value::Object(settings.input.clone()), &json!({}))
      .await?;
    let auth = take_auth(&mut input);
    let props = process_props(&block_trigger.metadata().props, &input)?;

    let ctx = TriggerContext {
      props,
      auth,
      store: self.flow_store(&op.flow_version.flow_id),
      payload: op.trigger_payload.clone(),
      webhook_url: op.webhook_url.clone(),
    };

    let response = match op.hook_type {
      TriggerHookType::OnEnable => {
        block_trigger.on_enable(ctx).await?;
        json!({})
      }
      TriggerHookType::OnDisable => {
        block_trigger.on_disable(ctx).await?;
        json!({})
      }
      TriggerHookType::Run => json!({ "success": true, "output": block_trigger.run(ctx).await? }),
      TriggerHookType::Test => json!({ "success": true, "output": block_trigger.test(ctx).await? }),
    };
    info!(block_name = %block_name, trigger_name = %trigger_name, "trigger_hook_executed");
    Ok(response)
  }

  async fn validate_auth(&self, op: ExecuteValidateAuthOperation) -> Result<Value, EngineError> {
    let block = self
      .services()
      .blocks
      .load(&op.block_name, op.block_version.as_deref())
      .await?;
    to_json(&block.validate_auth(&op.auth).await)
  }

  fn flow_store(&self, flow_id: &str) -> Arc<dyn Store> {
    Arc::new(ScopedStore::new(
      self.services().store.clone(),
      format!("flow_{}", flow_id),
    ))
  }
}

/// Wires an [`Engine`] together. Every collaborator has an in-process
/// default.
pub struct EngineBuilder {
  config: EngineConfig,
  sandbox: Option<Sandbox>,
  connections: Option<Arc<dyn ConnectionService>>,
  blocks: Option<Arc<dyn BlockLoader>>,
  store: Option<Arc<dyn Store>>,
  code_builder: Option<Arc<dyn CodeBuilder>>,
  progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl EngineBuilder {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config,
      sandbox: None,
      connections: None,
      blocks: None,
      store: None,
      code_builder: None,
      progress_sink: None,
    }
  }

  pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
    self.sandbox = Some(sandbox);
    self
  }

  pub fn with_connections(mut self, connections: Arc<dyn ConnectionService>) -> Self {
    self.connections = Some(connections);
    self
  }

  pub fn with_blocks(mut self, blocks: Arc<dyn BlockLoader>) -> Self {
    self.blocks = Some(blocks);
    self
  }

  pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn with_code_builder(mut self, code_builder: Arc<dyn CodeBuilder>) -> Self {
    self.code_builder = Some(code_builder);
    self
  }

  pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
    self.progress_sink = Some(sink);
    self
  }

  pub fn build(self) -> Engine {
    let config = self.config;
    let sandbox = self.sandbox.unwrap_or_else(|| {
      Sandbox::new(
        Arc::new(LuaSandbox::new(config.lua_limits())),
        Arc::new(ExpressionSandbox::new()),
      )
    });
    let connections = self
      .connections
      .unwrap_or_else(|| Arc::new(StaticConnectionService::new()));
    let resolver = PropsResolver::new(sandbox.script().clone(), connections);
    let code_builder = self
      .code_builder
      .unwrap_or_else(|| Arc::new(FsCodeBuilder::new(config.codes_dir.clone())));
    let progress = ProgressReporter::new(
      self
        .progress_sink
        .unwrap_or_else(|| Arc::new(TracingProgressSink)),
    );

    let services = EngineServices {
      sandbox,
      resolver,
      blocks: self
        .blocks
        .unwrap_or_else(|| Arc::new(InMemoryBlockLoader::new())),
      store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
      code_builder,
      progress,
      config,
    };
    Engine {
      executor: FlowExecutor::new(Arc::new(services)),
    }
  }
}

fn parse<T: DeserializeOwned>(operation: Value) -> Result<T, EngineError> {
  serde_json::from_value(operation)
    .map_err(|e| EngineError::invalid_operation(format!("malformed payload: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, EngineError> {
  serde_json::to_value(value).map_err(|e| EngineError::internal(format!("failed to encode response: {}", e)))
}

fn take_auth(input: &mut Value) -> Option<Value> {
  input
    .as_object_mut()
    .and_then(|input| input.remove("auth"))
    .filter(|auth| !auth.is_null())
}

fn trigger_step_type(trigger_type: TriggerType) -> StepType {
  match trigger_type {
    TriggerType::Empty => StepType::EmptyTrigger,
    TriggerType::Block => StepType::BlockTrigger,
  }
}

/// Context holding sample outputs of earlier steps as SUCCEEDED steps.
fn sample_context(flow_version: &FlowVersion, sample_data: &BTreeMap<String, Value>) -> FlowExecutorContext {
  sample_data
    .iter()
    .fold(FlowExecutorContext::empty(), |ctx, (name, output)| {
      let step_type = if *name == flow_version.trigger.name {
        trigger_step_type(flow_version.trigger.trigger_type)
      } else {
        flow_version
          .find_step(name)
          .map(|action| StepType::from(action.action_type()))
          .unwrap_or(StepType::Code)
      };
      ctx.upsert_step(name, StepOutput::succeeded(step_type, json!({}), output.clone()))
    })
}
