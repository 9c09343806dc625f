//! Conduit Config
//!
//! This crate contains the serializable flow definition types for conduit.
//! A flow version is a trigger followed by a chain of actions. Control
//! structures (loops, branches, splits) own their child chains, so the whole
//! graph is a tree of boxed nodes rather than a set of shared references.
//!
//! Definitions arrive as JSON (camelCase) inside engine operations and are
//! walked as-is by the engine; there is no separate "locked" representation.

mod action;
mod condition;
mod enums;
mod flow;
mod input;
mod request;

pub use action::{
  Action, ActionType, BlockActionDef, BlockSettings, BranchActionDef, BranchSettings,
  CodeActionDef, CodeSettings, ErrorHandlingOptions, LoopOnItemsActionDef, LoopSettings,
  SourceCode, SplitActionDef, SplitBranch, SplitSettings, StepType,
};
pub use condition::{BranchCondition, BranchOperator, SplitBranchType, SplitExecutionType};
pub use enums::{ExecutionType, FlowVersionState, ProgressUpdateType, RunEnvironment};
pub use flow::{ActionLimit, FlowVersion, TestRunActionLimits, Trigger, TriggerSettings, TriggerType};
pub use input::InputMap;
pub use request::RequestPayload;
