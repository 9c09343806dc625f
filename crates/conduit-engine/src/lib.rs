//! Conduit Flow Engine
//!
//! This crate walks a flow's action graph, dispatches each action to its
//! executor and produces a resumable snapshot of the run. Runs can pause
//! (for example on an approval webhook) and be resumed later from the
//! persisted steps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - execute(operation_type, payload) → EngineResponse        │
//! │  - EXECUTE_FLOW, EXECUTE_STEP, trigger hooks, props, auth   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FlowExecutor                          │
//! │  - walks next_action until the verdict leaves RUNNING       │
//! │  - polls cancellation, reports progress after every step    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Code / Block / Loop / Branch / Split               │
//! │  - resolve inputs via PropsResolver                         │
//! │  - code runs in the Lua sandbox, blocks via BlockLoader     │
//! │  - control structures recurse into the FlowExecutor         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use conduit_engine::{Engine, EngineConfig, EngineOperationType};
//!
//! let engine = Engine::builder(EngineConfig::new("/tmp/conduit/codes"))
//!   .with_blocks(Arc::new(InMemoryBlockLoader::with_builtins().await))
//!   .build();
//!
//! let response = engine
//!   .execute(EngineOperationType::ExecuteFlow, payload)
//!   .await;
//! ```

mod code_builder;
mod config;
mod constants;
mod engine;
mod error;
mod executors;
mod guard;
mod operations;
mod progress;
mod retry;
mod services;

pub use code_builder::{CodeArtifact, CodeBuilder, ENTRY_FILE, FsCodeBuilder};
pub use config::EngineConfig;
pub use constants::EngineConstants;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, ErrorKind, INTERNAL_STEP_MESSAGE};
pub use executors::{
  ActionHandler, FlowExecutor, IterationRecord, evaluate_condition, evaluate_conditions,
  loop_store_prefix, normalize_items,
};
pub use guard::{check_cancelled, check_timeout};
pub use operations::{
  EngineOperationType, EngineResponse, EngineResponseStatus, ExecuteFlowOperation,
  ExecutePropertyOperation, ExecuteStepOperation, ExecuteTriggerHookOperation,
  ExecuteValidateAuthOperation, ExtractBlockMetadataOperation, TriggerHookType,
};
pub use progress::{
  FlowRunStatus, HttpProgressSink, ProgressReporter, ProgressSink, ProgressUpdate, RunDetails,
  TracingProgressSink, WebhookResponse,
};
pub use retry::{
  RetryPolicy, check_action_limit, continue_if_failure_handler, count_action_execution,
  run_with_exponential_backoff,
};
pub use services::EngineServices;
