//! Blocks that ship with conduit.

mod approval;
mod http;
mod store;
mod webhook;

pub use approval::{APPROVAL_BLOCK, WaitForApproval};
pub use http::{HTTP_BLOCK, SendRequest, TokenAuthValidator};
pub use store::{GetValue, PutValue, STORE_BLOCK};
pub use webhook::{CatchWebhook, WEBHOOK_BLOCK};

use std::sync::Arc;

use crate::block::Block;
use crate::property::Property;

const BUILTIN_VERSION: &str = "0.1.0";

/// Every built-in block.
pub fn all() -> Vec<Block> {
  vec![
    Block::new(APPROVAL_BLOCK, BUILTIN_VERSION, "Approval")
      .with_description("Pause a run until someone approves or rejects it")
      .with_action(WaitForApproval::new()),
    Block::new(STORE_BLOCK, BUILTIN_VERSION, "Storage")
      .with_description("Keep values between runs of a flow")
      .with_action(PutValue::new())
      .with_action(GetValue::new()),
    Block::new(HTTP_BLOCK, BUILTIN_VERSION, "HTTP")
      .with_description("Send HTTP requests")
      .with_auth(
        Property::secret_text("Bearer token"),
        Some(Arc::new(TokenAuthValidator)),
      )
      .with_action(SendRequest::new()),
    Block::new(WEBHOOK_BLOCK, BUILTIN_VERSION, "Webhook")
      .with_description("Start a flow when a request arrives")
      .with_trigger(CatchWebhook::new()),
  ]
}
