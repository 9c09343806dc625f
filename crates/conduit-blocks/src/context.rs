use std::sync::{Arc, Mutex};

use conduit_config::{ExecutionType, RequestPayload};
use conduit_context::PauseMetadata;
use conduit_host_kv::Store;

use crate::error::BlockError;

/// Where the current action sits in the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
  pub flow_id: String,
  pub flow_version_id: String,
  pub flow_run_id: String,
  pub step_name: String,
  /// Correlation id a resume request must carry.
  pub pause_id: String,
  /// Encoded loop path of the step, e.g. `loop_1,0`.
  pub step_path: String,
  pub execution_type: ExecutionType,
  pub resume_payload: Option<RequestPayload>,
  /// Public base URL used for resume links.
  pub public_url: String,
}

/// Request recorded by an action through [`ActionContext::pause`] or
/// [`ActionContext::stop`].
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
  Paused(PauseMetadata),
  Stopped(serde_json::Value),
}

/// Everything an action run can see.
#[derive(Clone)]
pub struct ActionContext {
  /// Processed props.
  pub props: serde_json::Value,
  pub auth: Option<serde_json::Value>,
  /// Flow-scoped store.
  pub store: Arc<dyn Store>,
  pub run: RunInfo,
  hooks: Arc<Mutex<Option<HookOutcome>>>,
}

impl ActionContext {
  pub fn new(
    props: serde_json::Value,
    auth: Option<serde_json::Value>,
    store: Arc<dyn Store>,
    run: RunInfo,
  ) -> Self {
    Self {
      props,
      auth,
      store,
      run,
      hooks: Arc::new(Mutex::new(None)),
    }
  }

  /// Ask the engine to pause the run once this action returns.
  pub fn pause(&self, metadata: PauseMetadata) {
    self.set_outcome(HookOutcome::Paused(metadata));
  }

  /// Ask the engine to end the run successfully with `response`.
  pub fn stop(&self, response: serde_json::Value) {
    self.set_outcome(HookOutcome::Stopped(response));
  }

  /// The pause or stop request made during the run, if any. The last call
  /// wins.
  pub fn hook_outcome(&self) -> Option<HookOutcome> {
    self.hooks.lock().ok().and_then(|guard| guard.clone())
  }

  /// True when the run is being resumed with a payload.
  pub fn is_resuming(&self) -> bool {
    self.run.execution_type == ExecutionType::Resume && self.run.resume_payload.is_some()
  }

  /// URL that resumes this run at this step. The step's loop path is always
  /// included as the `path` query parameter.
  pub fn generate_resume_url(&self, query: &[(&str, &str)]) -> Result<String, BlockError> {
    let base = format!(
      "{}/v1/flow-runs/{}/requests/{}",
      self.run.public_url.trim_end_matches('/'),
      self.run.flow_run_id,
      self.run.pause_id
    );
    let mut params = vec![("path", self.run.step_path.as_str())];
    params.extend_from_slice(query);

    reqwest::Url::parse_with_params(&base, &params)
      .map(|url| url.to_string())
      .map_err(|e| BlockError::execution(format!("invalid resume url '{}': {}", base, e)))
  }

  fn set_outcome(&self, outcome: HookOutcome) {
    if let Ok(mut guard) = self.hooks.lock() {
      *guard = Some(outcome);
    }
  }
}

/// Context for trigger hooks.
#[derive(Clone)]
pub struct TriggerContext {
  pub props: serde_json::Value,
  pub auth: Option<serde_json::Value>,
  pub store: Arc<dyn Store>,
  /// The delivered request for RUN, empty for the other hooks.
  pub payload: RequestPayload,
  pub webhook_url: String,
}

/// Context for computing dynamic property options.
#[derive(Clone)]
pub struct PropertyContext {
  /// Resolved values of the other props.
  pub input: serde_json::Value,
  pub auth: Option<serde_json::Value>,
  pub store: Arc<dyn Store>,
}
