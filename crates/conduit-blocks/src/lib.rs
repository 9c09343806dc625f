//! Conduit Blocks
//!
//! A block is a named, versioned bundle of actions and triggers. The engine
//! never links against block implementations directly; it asks a
//! [`BlockLoader`] for a [`Block`] by name and version and talks to the
//! actions and triggers through the [`BlockAction`] and [`BlockTrigger`]
//! traits.
//!
//! Each action and trigger describes its inputs as a [`PropertyMap`].
//! [`process_props`] coerces resolved step input against that map before the
//! action runs.
//!
//! The [`builtin`] module ships a handful of blocks used by the CLI and the
//! test suites.

mod block;
pub mod builtin;
mod context;
mod error;
mod loader;
mod property;
mod props;

pub use block::{
  ActionMetadata, AuthValidation, AuthValidator, Block, BlockAction, BlockMetadata, BlockTrigger,
  TriggerMetadata, TriggerStrategy,
};
pub use context::{ActionContext, HookOutcome, PropertyContext, RunInfo, TriggerContext};
pub use error::BlockError;
pub use loader::{BlockLoader, InMemoryBlockLoader};
pub use property::{DropdownOption, DropdownState, Property, PropertyKind, PropertyMap};
pub use props::process_props;
