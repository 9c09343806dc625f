//! Execution context for conduit.
//!
//! A [`FlowExecutorContext`] is the value every executor receives and
//! returns. It holds step outputs keyed by step name, the path of loop
//! iterations currently being executed, the run verdict and a handful of
//! counters.
//!
//! Mutators take `self` by value and hand back a new context, so an
//! executor can keep the context it was called with and compare or discard
//! the one returned by a sub-chain. Step outputs of loop bodies live inside
//! the owning loop's `iterations`, one map per iteration.

mod context;
mod error;
mod path;
mod step;
mod verdict;

pub use context::FlowExecutorContext;
pub use error::ContextError;
pub use path::StepPath;
pub use step::{StepMap, StepOutput, StepStatus};
pub use verdict::{FailedStep, PauseMetadata, PauseType, Verdict, VerdictResponse};
