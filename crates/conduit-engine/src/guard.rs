//! Timeout and cancellation checks.
//!
//! Both are cooperative: the flow executor checks cancellation between
//! steps and the progress reporter checks the deadline before every push.

use tracing::warn;

use crate::constants::EngineConstants;
use crate::error::EngineError;

pub fn check_timeout(constants: &EngineConstants) -> Result<(), EngineError> {
  if constants.elapsed() > constants.timeout {
    warn!(
      flow_run_id = %constants.flow_run_id,
      limit_secs = constants.timeout.as_secs(),
      "run_timed_out"
    );
    return Err(EngineError::Timeout {
      limit_secs: constants.timeout.as_secs(),
    });
  }
  Ok(())
}

pub fn check_cancelled(constants: &EngineConstants) -> Result<(), EngineError> {
  if constants.cancel.is_cancelled() {
    warn!(flow_run_id = %constants.flow_run_id, "run_cancelled");
    return Err(EngineError::Cancelled);
  }
  Ok(())
}
