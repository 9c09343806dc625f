#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit_blocks::{ActionContext, ActionMetadata, Block, BlockAction, BlockError, InMemoryBlockLoader, Property, PropertyMap};
use conduit_context::PauseMetadata;
use conduit_engine::{
  Engine, EngineConfig, EngineError, EngineOperationType, EngineResponse, ProgressSink,
  ProgressUpdate, RunDetails, WebhookResponse,
};
use conduit_host_kv::InMemoryStore;
use conduit_resolver::ConnectionService;
use conduit_sandbox::{CodeSandbox, ExpressionSandbox, LuaSandbox, RunCodeModule, Sandbox, SandboxError};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const GATE_BLOCK: &str = "@test/block-gate";

/// Progress sink that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingSink {
  pub updates: Mutex<Vec<ProgressUpdate>>,
  pub webhooks: Mutex<Vec<WebhookResponse>>,
}

impl RecordingSink {
  pub fn updates(&self) -> Vec<ProgressUpdate> {
    self.updates.lock().unwrap().clone()
  }

  pub fn webhooks(&self) -> Vec<WebhookResponse> {
    self.webhooks.lock().unwrap().clone()
  }
}

#[async_trait]
impl ProgressSink for RecordingSink {
  async fn update_run_progress(&self, update: &ProgressUpdate) -> Result<(), EngineError> {
    self.updates.lock().unwrap().push(update.clone());
    Ok(())
  }

  async fn send_webhook_response(&self, response: &WebhookResponse) -> Result<(), EngineError> {
    self.webhooks.lock().unwrap().push(response.clone());
    Ok(())
  }
}

/// Code sandbox that fails a fixed number of times, then returns `output`.
pub struct FlakyCode {
  failures: u32,
  output: Value,
  delay: Option<Duration>,
  calls: Mutex<Vec<tokio::time::Instant>>,
}

impl FlakyCode {
  pub fn new(failures: u32, output: Value) -> Self {
    Self {
      failures,
      output,
      delay: None,
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Sleeps for `delay` on every call.
  pub fn slow(delay: Duration, output: Value) -> Self {
    Self {
      delay: Some(delay),
      ..Self::new(0, output)
    }
  }

  pub fn calls(&self) -> Vec<tokio::time::Instant> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl CodeSandbox for FlakyCode {
  async fn run_code_module(&self, _request: RunCodeModule) -> Result<Value, SandboxError> {
    let attempt = {
      let mut calls = self.calls.lock().unwrap();
      calls.push(tokio::time::Instant::now());
      calls.len() as u32
    };
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if attempt <= self.failures {
      return Err(SandboxError::script(format!("attempt {} failed", attempt)));
    }
    Ok(self.output.clone())
  }
}

/// Action driven by its `value` prop: "pause" pauses, "stop" stops, "fail"
/// fails and anything else is echoed back. A resumed run returns
/// `{resumed: true}`.
struct Gate {
  metadata: ActionMetadata,
}

impl Gate {
  fn new() -> Self {
    Self {
      metadata: ActionMetadata {
        name: "gate".to_string(),
        display_name: "Gate".to_string(),
        description: String::new(),
        props: PropertyMap::from([("value".to_string(), Property::short_text("Value"))]),
        require_auth: false,
      },
    }
  }
}

#[async_trait]
impl BlockAction for Gate {
  fn metadata(&self) -> &ActionMetadata {
    &self.metadata
  }

  async fn run(&self, ctx: ActionContext) -> Result<Value, BlockError> {
    if ctx.is_resuming() {
      return Ok(json!({ "resumed": true }));
    }
    let value = ctx.props["value"].as_str().unwrap_or_default().to_string();
    match value.as_str() {
      "pause" => {
        ctx.pause(PauseMetadata::webhook(None));
        Ok(json!({ "resumeUrl": ctx.generate_resume_url(&[])? }))
      }
      "stop" => {
        ctx.stop(json!({ "stopped": true }));
        Ok(json!({ "value": value }))
      }
      "fail" => Err(BlockError::execution("gate closed")),
      _ => Ok(json!({ "value": value })),
    }
  }
}

#[derive(Default)]
pub struct TestOptions {
  pub code_sandbox: Option<Arc<dyn CodeSandbox>>,
  pub connections: Option<Arc<dyn ConnectionService>>,
  pub run_timeout: Option<Duration>,
}

pub struct TestEngine {
  pub engine: Engine,
  pub store: Arc<InMemoryStore>,
  pub progress: Arc<RecordingSink>,
  _codes: TempDir,
}

impl TestEngine {
  pub async fn new(options: TestOptions) -> Self {
    let codes = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::new(codes.path());
    config.public_url = "https://conduit.test".to_string();
    if let Some(timeout) = options.run_timeout {
      config.run_timeout = timeout;
    }

    let code: Arc<dyn CodeSandbox> = options
      .code_sandbox
      .unwrap_or_else(|| Arc::new(LuaSandbox::new(config.lua_limits())));
    let sandbox = Sandbox::new(code, Arc::new(ExpressionSandbox::new()));

    let blocks = InMemoryBlockLoader::with_builtins().await;
    blocks
      .register(Block::new(GATE_BLOCK, "0.1.0", "Gate").with_action(Gate::new()))
      .await;

    let store = Arc::new(InMemoryStore::new());
    let progress = Arc::new(RecordingSink::default());

    let mut builder = Engine::builder(config)
      .with_sandbox(sandbox)
      .with_blocks(Arc::new(blocks))
      .with_store(store.clone())
      .with_progress_sink(progress.clone());
    if let Some(connections) = options.connections {
      builder = builder.with_connections(connections);
    }

    Self {
      engine: builder.build(),
      store,
      progress,
      _codes: codes,
    }
  }

  pub async fn execute(&self, operation_type: EngineOperationType, operation: Value) -> EngineResponse {
    self.engine.execute(operation_type, operation).await
  }

  /// Start `flow` with `trigger_payload` and return the final run details.
  pub async fn run_flow(&self, flow: Value, trigger_payload: Value) -> RunDetails {
    self
      .run(json!({
        "flowVersion": flow,
        "flowRunId": "run_1",
        "triggerPayload": trigger_payload,
      }))
      .await
  }

  pub async fn run(&self, operation: Value) -> RunDetails {
    let response = self.execute(EngineOperationType::ExecuteFlow, operation).await;
    assert!(response.is_ok(), "flow run failed: {}", response.response);
    serde_json::from_value(response.response).unwrap()
  }
}

/// Flow version with an empty trigger named `trigger`.
pub fn flow(first_action: Value) -> Value {
  json!({
    "id": "fv_1",
    "flowId": "flow_1",
    "displayName": "Test flow",
    "trigger": {
      "name": "trigger",
      "type": "EMPTY",
      "nextAction": first_action,
    }
  })
}

/// Link `steps` through `nextAction`, first to last.
pub fn chain(steps: Vec<Value>) -> Value {
  steps
    .into_iter()
    .rev()
    .reduce(|next, mut step| {
      step["nextAction"] = next;
      step
    })
    .unwrap_or(Value::Null)
}

pub fn code_step(name: &str, code: &str, input: Value) -> Value {
  json!({
    "type": "CODE",
    "name": name,
    "displayName": name,
    "settings": {
      "sourceCode": { "code": code },
      "input": input,
    }
  })
}

pub fn block_step(name: &str, block_name: &str, action_name: &str, input: Value) -> Value {
  json!({
    "type": "BLOCK",
    "name": name,
    "displayName": name,
    "settings": {
      "blockName": block_name,
      "actionName": action_name,
      "input": input,
    }
  })
}

pub fn gate_step(name: &str, value: &str) -> Value {
  block_step(name, GATE_BLOCK, "gate", json!({ "value": value }))
}

pub fn loop_step(name: &str, items: Value, body: Value) -> Value {
  json!({
    "type": "LOOP_ON_ITEMS",
    "name": name,
    "displayName": name,
    "settings": { "items": items },
    "firstLoopAction": body,
  })
}

pub fn with_error_handling(mut step: Value, continue_on_failure: bool, retry_on_failure: bool) -> Value {
  step["settings"]["errorHandlingOptions"] = json!({
    "continueOnFailure": continue_on_failure,
    "retryOnFailure": retry_on_failure,
  });
  step
}
