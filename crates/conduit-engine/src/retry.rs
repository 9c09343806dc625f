//! Retry with exponential backoff, failure continuation and test-run limits.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use conduit_config::Action;
use conduit_context::{FlowExecutorContext, Verdict};
use tracing::{info, warn};

use crate::constants::EngineConstants;
use crate::error::EngineError;

/// Backoff schedule for retryable steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts including the first one.
  pub max_attempts: u32,
  /// Delay before the first retry.
  pub retry_interval: Duration,
  /// Growth factor applied to each following delay.
  pub retry_exponential: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      retry_interval: Duration::from_millis(2000),
      retry_exponential: 2,
    }
  }
}

impl RetryPolicy {
  /// Delay to wait after failed attempt number `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = self
      .retry_exponential
      .saturating_pow(attempt.saturating_sub(1));
    self.retry_interval.saturating_mul(factor)
  }
}

/// Run `op`, retrying failures the policy allows.
///
/// With `enabled` unset the operation runs exactly once. Errors rejected by
/// `is_retryable` are returned immediately.
pub async fn run_with_exponential_backoff<T, E, F, Fut>(
  policy: &RetryPolicy,
  enabled: bool,
  is_retryable: impl Fn(&E) -> bool,
  mut op: F,
) -> Result<T, E>
where
  E: Display,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let max_attempts = if enabled { policy.max_attempts.max(1) } else { 1 };
  let mut attempt = 1;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if attempt < max_attempts && is_retryable(&e) => {
        let delay = policy.delay_for(attempt);
        warn!(
          attempt = attempt,
          max_attempts = max_attempts,
          delay_ms = delay.as_millis() as u64,
          error = %e,
          "step_retry_scheduled"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

/// Clear a FAILED verdict when the action asks to continue on failure.
pub fn continue_if_failure_handler(
  ctx: FlowExecutorContext,
  action: &Action,
) -> FlowExecutorContext {
  if ctx.verdict() == Verdict::Failed && action.error_handling().continue_on_failure {
    info!(step_name = %action.name(), "step_failure_ignored");
    return ctx.set_verdict(Verdict::Running, None);
  }
  ctx
}

/// Refuse a block action that already hit its test-run limit.
///
/// Only test runs with limits enabled are checked. The count itself is kept
/// on the context via [`count_action_execution`].
pub fn check_action_limit(
  ctx: &FlowExecutorContext,
  constants: &EngineConstants,
  block_name: &str,
  action_name: &str,
) -> Result<(), EngineError> {
  if !constants.is_test_run() {
    return Ok(());
  }
  let Some(limit) = constants
    .test_run_action_limits
    .limit_for(block_name, action_name)
  else {
    return Ok(());
  };
  if ctx.action_execution_count(block_name, action_name) >= limit {
    return Err(EngineError::ExecutionLimitReached {
      block_name: block_name.to_string(),
      action_name: action_name.to_string(),
      limit,
    });
  }
  Ok(())
}

pub fn count_action_execution(
  ctx: FlowExecutorContext,
  constants: &EngineConstants,
  block_name: &str,
  action_name: &str,
) -> FlowExecutorContext {
  if constants.is_test_run() {
    ctx.increment_action_execution_count(block_name, action_name)
  } else {
    ctx
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  #[test]
  fn test_delay_schedule() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let start = tokio::time::Instant::now();

    let result: Result<(), String> =
      run_with_exponential_backoff(&RetryPolicy::default(), true, |_| true, || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err("boom".to_string())
        }
      })
      .await;

    assert_eq!(result.unwrap_err(), "boom");
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(14000));
    assert!(elapsed < Duration::from_millis(14100));
  }

  #[tokio::test]
  async fn test_disabled_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), String> =
      run_with_exponential_backoff(&RetryPolicy::default(), false, |_| true, || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err("boom".to_string())
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_non_retryable_error_returns_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), String> =
      run_with_exponential_backoff(&RetryPolicy::default(), true, |e: &String| e != "fatal", || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err("fatal".to_string())
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
