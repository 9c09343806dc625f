use std::path::PathBuf;
use std::time::Duration;

use conduit_sandbox::LuaLimits;

use crate::retry::RetryPolicy;

/// Process-wide engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Where code steps are written before they run.
  pub codes_dir: PathBuf,
  /// Base URL used for resume and webhook links.
  pub public_url: String,
  /// Wall-clock budget of a single flow run.
  pub run_timeout: Duration,
  /// Memory cap of a code step.
  pub sandbox_memory_bytes: usize,
  /// Wall-clock cap of a single code step attempt.
  pub sandbox_timeout: Duration,
  pub retry: RetryPolicy,
}

impl EngineConfig {
  pub fn new(codes_dir: impl Into<PathBuf>) -> Self {
    Self {
      codes_dir: codes_dir.into(),
      public_url: "http://localhost:3000".to_string(),
      run_timeout: Duration::from_secs(600),
      sandbox_memory_bytes: 64 * 1024 * 1024,
      sandbox_timeout: Duration::from_secs(10),
      retry: RetryPolicy::default(),
    }
  }

  pub fn lua_limits(&self) -> LuaLimits {
    LuaLimits {
      memory_bytes: self.sandbox_memory_bytes,
      timeout: self.sandbox_timeout,
    }
  }
}
