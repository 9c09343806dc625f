//! Conduit Sandbox
//!
//! Two capabilities with different trust levels:
//!
//! - [`CodeSandbox`] runs untrusted code modules written by flow authors.
//!   [`LuaSandbox`] executes them in a Lua VM with a reduced standard
//!   library, a memory cap and a wall-clock limit.
//! - [`ScriptSandbox`] evaluates trusted template expressions produced by the
//!   engine itself. [`ExpressionSandbox`] uses minijinja expressions.
//!
//! [`Sandbox`] bundles one of each so executors can be handed a single value.

mod error;
mod expression;
mod lua;

pub use error::SandboxError;
pub use expression::ExpressionSandbox;
pub use lua::{LuaLimits, LuaSandbox};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

/// A request to run a prepared code module.
#[derive(Debug, Clone)]
pub struct RunCodeModule {
  /// Skip any cached copy of the module and load it from disk.
  pub is_fresh_import: bool,
  /// Path of the module entry file.
  pub code_file: PathBuf,
  /// Resolved step inputs.
  pub inputs: serde_json::Value,
}

/// Runs untrusted user code.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
  async fn run_code_module(&self, request: RunCodeModule) -> Result<serde_json::Value, SandboxError>;
}

/// Evaluates trusted expressions against a context value.
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
  async fn run_script(
    &self,
    script: &str,
    script_context: &serde_json::Value,
  ) -> Result<serde_json::Value, SandboxError>;
}

/// Both sandbox capabilities.
#[derive(Clone)]
pub struct Sandbox {
  code: Arc<dyn CodeSandbox>,
  script: Arc<dyn ScriptSandbox>,
}

impl Sandbox {
  pub fn new(code: Arc<dyn CodeSandbox>, script: Arc<dyn ScriptSandbox>) -> Self {
    Self { code, script }
  }

  pub fn code(&self) -> &Arc<dyn CodeSandbox> {
    &self.code
  }

  pub fn script(&self) -> &Arc<dyn ScriptSandbox> {
    &self.script
  }
}
