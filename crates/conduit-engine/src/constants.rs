use std::time::Duration;

use conduit_config::{
  ExecutionType, FlowVersion, FlowVersionState, ProgressUpdateType, RequestPayload,
  RunEnvironment, TestRunActionLimits,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-run settings shared by every executor during one engine call.
#[derive(Debug, Clone)]
pub struct EngineConstants {
  pub flow_id: String,
  pub flow_version_id: String,
  pub flow_version_state: FlowVersionState,
  pub flow_run_id: String,
  pub execution_type: ExecutionType,
  pub run_environment: RunEnvironment,
  pub progress_update_type: ProgressUpdateType,
  pub worker_handler_id: Option<String>,
  /// Id the host uses to match progress updates to its request.
  pub execution_correlation_id: String,
  pub resume_payload: Option<RequestPayload>,
  pub test_run_action_limits: TestRunActionLimits,
  /// Run only the requested step, never its successors or children.
  pub single_step: bool,
  pub public_url: String,
  pub timeout: Duration,
  pub started_at: Instant,
  pub cancel: CancellationToken,
}

impl EngineConstants {
  pub fn new(flow_version: &FlowVersion, flow_run_id: impl Into<String>) -> Self {
    let flow_run_id = flow_run_id.into();
    Self {
      flow_id: flow_version.flow_id.clone(),
      flow_version_id: flow_version.id.clone(),
      flow_version_state: flow_version.state,
      execution_correlation_id: flow_run_id.clone(),
      flow_run_id,
      execution_type: ExecutionType::Begin,
      run_environment: RunEnvironment::Production,
      progress_update_type: ProgressUpdateType::None,
      worker_handler_id: None,
      resume_payload: None,
      test_run_action_limits: TestRunActionLimits::default(),
      single_step: false,
      public_url: "http://localhost:3000".to_string(),
      timeout: Duration::from_secs(600),
      started_at: Instant::now(),
      cancel: CancellationToken::new(),
    }
  }

  /// Drafts always re-import code modules.
  pub fn is_fresh_import(&self) -> bool {
    self.flow_version_state == FlowVersionState::Draft
  }

  pub fn is_resume(&self) -> bool {
    self.execution_type == ExecutionType::Resume
  }

  pub fn is_test_run(&self) -> bool {
    self.run_environment == RunEnvironment::Testing
  }

  /// The `path` query parameter of the resume request, if any.
  pub fn resume_path(&self) -> Option<&str> {
    self.resume_payload.as_ref()?.query_param("path")
  }

  pub fn elapsed(&self) -> Duration {
    self.started_at.elapsed()
  }
}
