use async_trait::async_trait;

use crate::block::{ActionMetadata, BlockAction};
use crate::context::ActionContext;
use crate::error::BlockError;
use crate::property::{Property, PropertyMap};

pub const STORE_BLOCK: &str = "@conduit/block-store";

fn key_of(ctx: &ActionContext) -> Result<String, BlockError> {
  ctx
    .props
    .get("key")
    .and_then(|k| k.as_str())
    .map(str::to_string)
    .ok_or_else(|| BlockError::execution("key is required"))
}

pub struct PutValue {
  metadata: ActionMetadata,
}

impl PutValue {
  pub fn new() -> Self {
    Self {
      metadata: ActionMetadata {
        name: "put".to_string(),
        display_name: "Put".to_string(),
        description: "Store a value under a key".to_string(),
        props: PropertyMap::from([
          ("key".to_string(), Property::short_text("Key").required()),
          ("value".to_string(), Property::long_text("Value")),
        ]),
        require_auth: false,
      },
    }
  }
}

impl Default for PutValue {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl BlockAction for PutValue {
  fn metadata(&self) -> &ActionMetadata {
    &self.metadata
  }

  async fn run(&self, ctx: ActionContext) -> Result<serde_json::Value, BlockError> {
    let key = key_of(&ctx)?;
    let value = ctx.props.get("value").cloned().unwrap_or_default();
    ctx.store.put(&key, value.clone()).await?;
    Ok(value)
  }
}

pub struct GetValue {
  metadata: ActionMetadata,
}

impl GetValue {
  pub fn new() -> Self {
    Self {
      metadata: ActionMetadata {
        name: "get".to_string(),
        display_name: "Get".to_string(),
        description: "Read the value stored under a key".to_string(),
        props: PropertyMap::from([
          ("key".to_string(), Property::short_text("Key").required()),
          ("defaultValue".to_string(), Property::long_text("Default value")),
        ]),
        require_auth: false,
      },
    }
  }
}

impl Default for GetValue {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl BlockAction for GetValue {
  fn metadata(&self) -> &ActionMetadata {
    &self.metadata
  }

  async fn run(&self, ctx: ActionContext) -> Result<serde_json::Value, BlockError> {
    let key = key_of(&ctx)?;
    match ctx.store.get(&key).await? {
      Some(value) => Ok(value),
      None => Ok(ctx.props.get("defaultValue").cloned().unwrap_or_default()),
    }
  }
}
