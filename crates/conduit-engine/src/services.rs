use std::sync::Arc;

use conduit_blocks::BlockLoader;
use conduit_host_kv::Store;
use conduit_resolver::PropsResolver;
use conduit_sandbox::Sandbox;

use crate::code_builder::CodeBuilder;
use crate::config::EngineConfig;
use crate::progress::ProgressReporter;

/// Long-lived collaborators shared by every run.
pub struct EngineServices {
  pub config: EngineConfig,
  pub sandbox: Sandbox,
  pub resolver: PropsResolver,
  pub blocks: Arc<dyn BlockLoader>,
  /// Unscoped host store. Executors scope it per flow or per loop.
  pub store: Arc<dyn Store>,
  pub code_builder: Arc<dyn CodeBuilder>,
  pub progress: ProgressReporter,
}
