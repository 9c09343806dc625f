use async_trait::async_trait;
use serde_json::json;

use crate::block::{BlockTrigger, TriggerMetadata, TriggerStrategy};
use crate::context::TriggerContext;
use crate::error::BlockError;
use crate::property::PropertyMap;

pub const WEBHOOK_BLOCK: &str = "@conduit/block-webhook";

const LAST_PAYLOAD_KEY: &str = "last_payload";

/// Starts one run per delivered request. The most recent body is kept so
/// the editor can test the trigger without sending a new request.
pub struct CatchWebhook {
  metadata: TriggerMetadata,
}

impl CatchWebhook {
  pub fn new() -> Self {
    Self {
      metadata: TriggerMetadata {
        name: "catch_webhook".to_string(),
        display_name: "Catch Webhook".to_string(),
        description: "Receive incoming HTTP requests".to_string(),
        props: PropertyMap::new(),
        strategy: TriggerStrategy::Webhook,
        sample_data: json!({}),
      },
    }
  }
}

impl Default for CatchWebhook {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl BlockTrigger for CatchWebhook {
  fn metadata(&self) -> &TriggerMetadata {
    &self.metadata
  }

  async fn on_enable(&self, _ctx: TriggerContext) -> Result<(), BlockError> {
    Ok(())
  }

  async fn on_disable(&self, ctx: TriggerContext) -> Result<(), BlockError> {
    ctx.store.delete(LAST_PAYLOAD_KEY).await?;
    Ok(())
  }

  async fn run(&self, ctx: TriggerContext) -> Result<Vec<serde_json::Value>, BlockError> {
    let event = json!({
      "body": ctx.payload.body,
      "headers": ctx.payload.headers,
      "queryParams": ctx.payload.query_params,
    });
    ctx.store.put(LAST_PAYLOAD_KEY, event.clone()).await?;
    Ok(vec![event])
  }

  async fn test(&self, ctx: TriggerContext) -> Result<Vec<serde_json::Value>, BlockError> {
    match ctx.store.get(LAST_PAYLOAD_KEY).await? {
      Some(event) => Ok(vec![event]),
      None => Ok(vec![self.metadata.sample_data.clone()]),
    }
  }
}
