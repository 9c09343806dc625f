use async_trait::async_trait;
use conduit_context::PauseMetadata;
use serde_json::json;

use crate::block::{ActionMetadata, BlockAction};
use crate::context::ActionContext;
use crate::error::BlockError;
use crate::property::PropertyMap;

pub const APPROVAL_BLOCK: &str = "@conduit/block-approval";

/// Pauses the run and hands out approve/disapprove links. The run resumes
/// when either link is called; the `action` query parameter decides the
/// outcome.
pub struct WaitForApproval {
  metadata: ActionMetadata,
}

impl WaitForApproval {
  pub fn new() -> Self {
    Self {
      metadata: ActionMetadata {
        name: "wait_for_approval".to_string(),
        display_name: "Wait for Approval".to_string(),
        description: "Pause the flow until an approval link is opened".to_string(),
        props: PropertyMap::new(),
        require_auth: false,
      },
    }
  }
}

impl Default for WaitForApproval {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl BlockAction for WaitForApproval {
  fn metadata(&self) -> &ActionMetadata {
    &self.metadata
  }

  async fn run(&self, ctx: ActionContext) -> Result<serde_json::Value, BlockError> {
    if let Some(payload) = ctx.run.resume_payload.as_ref().filter(|_| ctx.is_resuming()) {
      let approved = payload.query_param("action") == Some("approve");
      return Ok(json!({ "approved": approved }));
    }

    let approve_link = ctx.generate_resume_url(&[("action", "approve")])?;
    let disapprove_link = ctx.generate_resume_url(&[("action", "disapprove")])?;

    ctx.pause(PauseMetadata::webhook(None));

    Ok(json!({
      "approvalLink": approve_link,
      "disapprovalLink": disapprove_link,
    }))
  }
}
