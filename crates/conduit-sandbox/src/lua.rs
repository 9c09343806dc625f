//! Lua code modules.
//!
//! A module is a Lua chunk that returns a function. The function is called
//! with the step inputs as a table and its return value becomes the step
//! output.
//!
//! ```lua
//! return function(inputs)
//!   return { greeting = "hello " .. inputs.name }
//! end
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, StdLib, VmState};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::error::SandboxError;
use crate::{CodeSandbox, RunCodeModule};

/// Globals removed from every VM so modules cannot load other code.
const BLOCKED_GLOBALS: [&str; 4] = ["dofile", "loadfile", "load", "collectgarbage"];

/// Instructions between wall-clock checks.
const HOOK_INSTRUCTION_INTERVAL: u32 = 1000;

/// Resource limits applied to each module run.
#[derive(Debug, Clone, Copy)]
pub struct LuaLimits {
  pub memory_bytes: usize,
  pub timeout: Duration,
}

impl Default for LuaLimits {
  fn default() -> Self {
    Self {
      memory_bytes: 64 * 1024 * 1024,
      timeout: Duration::from_secs(10),
    }
  }
}

/// [`CodeSandbox`] backed by a fresh Lua VM per run.
///
/// Module sources are cached by path. A fresh import re-reads the file and
/// replaces the cached copy.
pub struct LuaSandbox {
  limits: LuaLimits,
  modules: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl LuaSandbox {
  pub fn new(limits: LuaLimits) -> Self {
    Self {
      limits,
      modules: RwLock::new(HashMap::new()),
    }
  }

  async fn load_source(&self, path: &Path, fresh: bool) -> Result<Arc<str>, SandboxError> {
    if !fresh {
      if let Some(source) = self.modules.read().await.get(path) {
        return Ok(source.clone());
      }
    }

    let source = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| SandboxError::ModuleLoad {
        path: path.display().to_string(),
        message: e.to_string(),
      })?;
    let source: Arc<str> = Arc::from(source);

    self
      .modules
      .write()
      .await
      .insert(path.to_path_buf(), source.clone());

    Ok(source)
  }
}

impl Default for LuaSandbox {
  fn default() -> Self {
    Self::new(LuaLimits::default())
  }
}

#[async_trait]
impl CodeSandbox for LuaSandbox {
  #[instrument(
    name = "lua_run_code_module",
    skip(self, request),
    fields(code_file = %request.code_file.display(), fresh = request.is_fresh_import)
  )]
  async fn run_code_module(&self, request: RunCodeModule) -> Result<serde_json::Value, SandboxError> {
    let source = self
      .load_source(&request.code_file, request.is_fresh_import)
      .await?;
    let chunk_name = request.code_file.display().to_string();
    let limits = self.limits;

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
      execute_module(&source, &chunk_name, &request.inputs, limits)
    })
    .await
    .map_err(|e| SandboxError::internal(format!("lua worker failed: {}", e)))?;

    match &result {
      Ok(_) => info!(duration_ms = started.elapsed().as_millis() as u64, "lua_module_completed"),
      Err(e) => warn!(error = %e, "lua_module_failed"),
    }

    result
  }
}

fn execute_module(
  source: &str,
  chunk_name: &str,
  inputs: &serde_json::Value,
  limits: LuaLimits,
) -> Result<serde_json::Value, SandboxError> {
  let internal = |e: mlua::Error| SandboxError::internal(e.to_string());

  let lua = Lua::new_with(
    StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
    LuaOptions::new(),
  )
  .map_err(internal)?;
  lua.set_memory_limit(limits.memory_bytes).map_err(internal)?;

  let globals = lua.globals();
  for name in BLOCKED_GLOBALS {
    globals.set(name, mlua::Value::Nil).map_err(internal)?;
  }

  let started = Instant::now();
  let timeout = limits.timeout;
  lua.set_hook(
    HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL),
    move |_lua, _debug| {
      if started.elapsed() > timeout {
        Err(mlua::Error::runtime("execution time limit exceeded"))
      } else {
        Ok(VmState::Continue)
      }
    },
  );

  let user_error = |e: mlua::Error| {
    if started.elapsed() > timeout {
      SandboxError::Timeout {
        limit_ms: timeout.as_millis() as u64,
      }
    } else {
      SandboxError::script(e.to_string())
    }
  };

  let module: mlua::Value = lua
    .load(source)
    .set_name(chunk_name)
    .eval()
    .map_err(user_error)?;
  let mlua::Value::Function(entry) = module else {
    return Err(SandboxError::script("code module must return a function"));
  };

  let args = lua.to_value(inputs).map_err(internal)?;
  let output: mlua::Value = entry.call(args).map_err(user_error)?;

  lua
    .from_value(output)
    .map_err(|e| SandboxError::script(format!("unsupported return value: {}", e)))
}
