//! Run progress reporting.
//!
//! After every step the flow executor hands the context to the
//! [`ProgressReporter`], which checks the run deadline, snapshots the run
//! and pushes it to a [`ProgressSink`]. Snapshots that only differ in their
//! duration are not sent twice.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_config::ProgressUpdateType;
use conduit_context::{
  FailedStep, FlowExecutorContext, PauseMetadata, StepMap, Verdict, VerdictResponse,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::guard::check_timeout;

/// Status of a flow run as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowRunStatus {
  Running,
  Succeeded,
  Failed,
  Paused,
  Stopped,
  Timeout,
  Cancelled,
  InternalError,
  ExecutionLimitReached,
}

/// Snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetails {
  pub status: FlowRunStatus,
  /// Milliseconds since the engine call started.
  pub duration: u64,
  pub tasks: u32,
  pub steps: StepMap,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pause_metadata: Option<PauseMetadata>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stop_response: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failed_step: Option<FailedStep>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Block action executions of a test run, keyed `block:action`. Passed
  /// back on RESUME so limits hold across pauses.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub action_execution_counts: BTreeMap<String, u32>,
}

impl RunDetails {
  /// Snapshot `ctx`. With `finished` set a still RUNNING verdict means the
  /// chain ran to its end and is reported as SUCCEEDED.
  pub fn from_context(ctx: &FlowExecutorContext, finished: bool, duration: Duration) -> Self {
    let mut details = Self {
      status: FlowRunStatus::Running,
      duration: duration.as_millis() as u64,
      tasks: ctx.tasks(),
      steps: ctx.steps().clone(),
      pause_metadata: None,
      stop_response: None,
      failed_step: None,
      error: None,
      action_execution_counts: ctx.action_execution_counts().clone(),
    };

    details.status = match (ctx.verdict(), ctx.verdict_response()) {
      (Verdict::Running, _) if finished => FlowRunStatus::Succeeded,
      (Verdict::Running, _) => FlowRunStatus::Running,
      (Verdict::Succeeded, Some(VerdictResponse::Stopped { response })) => {
        details.stop_response = Some(response.clone());
        FlowRunStatus::Stopped
      }
      (Verdict::Succeeded, _) => FlowRunStatus::Succeeded,
      (Verdict::Paused, response) => {
        if let Some(VerdictResponse::Paused { pause_metadata }) = response {
          details.pause_metadata = Some(pause_metadata.clone());
        }
        FlowRunStatus::Paused
      }
      (Verdict::Failed, Some(VerdictResponse::ExecutionLimitReached { .. })) => {
        FlowRunStatus::ExecutionLimitReached
      }
      (Verdict::Failed, response) => {
        match response {
          Some(VerdictResponse::Failed { failed_step }) => {
            details.failed_step = Some(failed_step.clone());
          }
          Some(VerdictResponse::InternalError { message }) => {
            details.error = Some(message.clone());
          }
          _ => {}
        }
        FlowRunStatus::Failed
      }
    };
    details
  }

  /// Snapshot of a run aborted by `error`.
  pub fn aborted(ctx: &FlowExecutorContext, error: &EngineError, duration: Duration) -> Self {
    let status = match error {
      EngineError::Timeout { .. } => FlowRunStatus::Timeout,
      EngineError::Cancelled => FlowRunStatus::Cancelled,
      _ => FlowRunStatus::InternalError,
    };
    Self {
      status,
      error: Some(error.step_message()),
      ..Self::from_context(ctx, false, duration)
    }
  }
}

/// Payload pushed to the host after each step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
  pub execution_correlation_id: String,
  pub run_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub worker_handler_id: Option<String>,
  pub run_details: RunDetails,
  pub progress_update_type: ProgressUpdateType,
}

impl ProgressUpdate {
  pub fn new(constants: &EngineConstants, run_details: RunDetails) -> Self {
    Self {
      execution_correlation_id: constants.execution_correlation_id.clone(),
      run_id: constants.flow_run_id.clone(),
      worker_handler_id: constants.worker_handler_id.clone(),
      run_details,
      progress_update_type: constants.progress_update_type,
    }
  }

  /// Content hash that ignores the run duration.
  fn fingerprint(&self) -> String {
    let mut value = match serde_json::to_value(self) {
      Ok(value) => value,
      Err(_) => return String::new(),
    };
    if let Some(details) = value
      .get_mut("runDetails")
      .and_then(serde_json::Value::as_object_mut)
    {
      details.remove("duration");
    }
    let bytes = serde_json::to_vec(&value).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
  }
}

/// Synchronous reply for a run started by a webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub worker_handler_id: Option<String>,
  pub flow_run_id: String,
  pub response: serde_json::Value,
}

/// Destination of progress updates.
#[async_trait]
pub trait ProgressSink: Send + Sync {
  async fn update_run_progress(&self, update: &ProgressUpdate) -> Result<(), EngineError>;

  async fn send_webhook_response(&self, response: &WebhookResponse) -> Result<(), EngineError>;
}

/// Logs updates instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
  async fn update_run_progress(&self, update: &ProgressUpdate) -> Result<(), EngineError> {
    info!(
      flow_run_id = %update.run_id,
      status = ?update.run_details.status,
      tasks = update.run_details.tasks,
      "run_progress"
    );
    Ok(())
  }

  async fn send_webhook_response(&self, response: &WebhookResponse) -> Result<(), EngineError> {
    info!(flow_run_id = %response.flow_run_id, "webhook_response");
    Ok(())
  }
}

/// Posts updates to the host API.
pub struct HttpProgressSink {
  client: reqwest::Client,
  api_url: String,
  token: String,
}

impl HttpProgressSink {
  pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.into().trim_end_matches('/').to_string(),
      token: token.into(),
    }
  }

  async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), EngineError> {
    let url = format!("{}{}", self.api_url, path);
    let response = self
      .client
      .post(&url)
      .bearer_auth(&self.token)
      .json(body)
      .send()
      .await
      .map_err(|e| EngineError::internal(format!("POST {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
      return Err(EngineError::internal(format!(
        "POST {} returned {}",
        url, status
      )));
    }
    Ok(())
  }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
  async fn update_run_progress(&self, update: &ProgressUpdate) -> Result<(), EngineError> {
    self.post("/v1/engine/update-run", update).await
  }

  async fn send_webhook_response(&self, response: &WebhookResponse) -> Result<(), EngineError> {
    self.post("/v1/engine/update-flow-response", response).await
  }
}

/// Deduplicating, retrying front of a [`ProgressSink`].
pub struct ProgressReporter {
  sink: Arc<dyn ProgressSink>,
  /// Fingerprint of the last delivered update per run. Holding the lock
  /// across delivery keeps at most one push per reporter in flight.
  last_sent: Mutex<HashMap<String, String>>,
  update_delays: Vec<Duration>,
  webhook_delays: Vec<Duration>,
}

impl ProgressReporter {
  pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
    Self {
      sink,
      last_sent: Mutex::new(HashMap::new()),
      update_delays: vec![
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(3),
      ],
      webhook_delays: vec![
        Duration::from_millis(200),
        Duration::from_millis(400),
        Duration::from_millis(600),
      ],
    }
  }

  /// Check the deadline, then push a RUNNING snapshot of `ctx`.
  ///
  /// Only a timeout is returned as an error. Delivery failures are logged.
  pub async fn send_update(
    &self,
    constants: &EngineConstants,
    ctx: &FlowExecutorContext,
  ) -> Result<(), EngineError> {
    check_timeout(constants)?;
    if constants.single_step {
      return Ok(());
    }
    let details = RunDetails::from_context(ctx, false, constants.elapsed());
    self.report(constants, details).await;
    Ok(())
  }

  /// Push `details` unless it matches the last delivered snapshot of the
  /// run. Returns whether anything was delivered.
  pub async fn report(&self, constants: &EngineConstants, details: RunDetails) -> bool {
    let update = ProgressUpdate::new(constants, details);
    let fingerprint = update.fingerprint();

    let mut last_sent = self.last_sent.lock().await;
    if last_sent.get(&constants.flow_run_id) == Some(&fingerprint) {
      debug!(flow_run_id = %constants.flow_run_id, "progress_update_skipped");
      return false;
    }

    let sink = self.sink.clone();
    let delivered = deliver(&self.update_delays, "progress_update", || {
      let sink = sink.clone();
      let update = &update;
      async move { sink.update_run_progress(update).await }
    })
    .await;

    if delivered {
      last_sent.insert(constants.flow_run_id.clone(), fingerprint);
    }
    delivered
  }

  /// Reply to the HTTP request that started the run. A no-op unless the run
  /// expects a webhook response.
  pub async fn send_webhook_response(
    &self,
    constants: &EngineConstants,
    response: serde_json::Value,
  ) -> bool {
    if constants.progress_update_type != ProgressUpdateType::WebhookResponse {
      return false;
    }
    let payload = WebhookResponse {
      worker_handler_id: constants.worker_handler_id.clone(),
      flow_run_id: constants.flow_run_id.clone(),
      response,
    };
    let sink = self.sink.clone();
    deliver(&self.webhook_delays, "webhook_response", || {
      let sink = sink.clone();
      let payload = &payload;
      async move { sink.send_webhook_response(payload).await }
    })
    .await
  }

  /// Forget the dedup state of a finished run.
  pub async fn finish_run(&self, flow_run_id: &str) {
    self.last_sent.lock().await.remove(flow_run_id);
  }

  #[cfg(test)]
  fn with_delays(mut self, update: Vec<Duration>, webhook: Vec<Duration>) -> Self {
    self.update_delays = update;
    self.webhook_delays = webhook;
    self
  }
}

/// One attempt plus one retry per delay.
async fn deliver<F, Fut>(delays: &[Duration], what: &str, mut op: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<(), EngineError>>,
{
  let mut attempt = 0;
  loop {
    match op().await {
      Ok(()) => return true,
      Err(e) => match delays.get(attempt) {
        Some(delay) => {
          warn!(what = what, attempt = attempt + 1, error = %e, "delivery_retry_scheduled");
          tokio::time::sleep(*delay).await;
          attempt += 1;
        }
        None => {
          error!(what = what, attempts = attempt + 1, error = %e, "delivery_failed");
          return false;
        }
      },
    }
  }
}
