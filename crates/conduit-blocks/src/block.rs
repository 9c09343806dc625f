use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{ActionContext, PropertyContext, TriggerContext};
use crate::error::BlockError;
use crate::property::{DropdownState, Property, PropertyKind, PropertyMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
  pub name: String,
  pub display_name: String,
  #[serde(default)]
  pub description: String,
  pub props: PropertyMap,
  #[serde(default)]
  pub require_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStrategy {
  Webhook,
  Polling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMetadata {
  pub name: String,
  pub display_name: String,
  #[serde(default)]
  pub description: String,
  pub props: PropertyMap,
  #[serde(rename = "type")]
  pub strategy: TriggerStrategy,
  #[serde(default)]
  pub sample_data: serde_json::Value,
}

/// Serializable description of a block, returned by EXTRACT_BLOCK_METADATA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
  pub name: String,
  pub version: String,
  pub display_name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub auth: Option<Property>,
  pub actions: BTreeMap<String, ActionMetadata>,
  pub triggers: BTreeMap<String, TriggerMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthValidation {
  pub valid: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl AuthValidation {
  pub fn valid() -> Self {
    Self {
      valid: true,
      error: None,
    }
  }

  pub fn invalid(error: impl Into<String>) -> Self {
    Self {
      valid: false,
      error: Some(error.into()),
    }
  }
}

/// Options of a static dropdown declared in `props`.
fn static_options(props: &PropertyMap, property: &str) -> Result<DropdownState, BlockError> {
  match props.get(property).map(|p| &p.kind) {
    Some(PropertyKind::StaticDropdown { options }) => Ok(DropdownState {
      disabled: false,
      placeholder: None,
      options: options.clone(),
    }),
    _ => Err(BlockError::PropertyNotFound {
      property: property.to_string(),
    }),
  }
}

/// An action a flow step can run.
#[async_trait]
pub trait BlockAction: Send + Sync {
  fn metadata(&self) -> &ActionMetadata;

  async fn run(&self, ctx: ActionContext) -> Result<serde_json::Value, BlockError>;

  /// Options for a dropdown property. Static dropdowns are answered from
  /// metadata; actions with dynamic dropdowns override this.
  async fn options(&self, property: &str, _ctx: PropertyContext) -> Result<DropdownState, BlockError> {
    static_options(&self.metadata().props, property)
  }
}

/// A trigger that starts flows.
#[async_trait]
pub trait BlockTrigger: Send + Sync {
  fn metadata(&self) -> &TriggerMetadata;

  async fn on_enable(&self, ctx: TriggerContext) -> Result<(), BlockError>;

  async fn on_disable(&self, ctx: TriggerContext) -> Result<(), BlockError>;

  /// Turn a delivered payload into zero or more flow runs.
  async fn run(&self, ctx: TriggerContext) -> Result<Vec<serde_json::Value>, BlockError>;

  /// Sample events for the editor. Defaults to [`BlockTrigger::run`].
  async fn test(&self, ctx: TriggerContext) -> Result<Vec<serde_json::Value>, BlockError> {
    self.run(ctx).await
  }

  async fn options(&self, property: &str, _ctx: PropertyContext) -> Result<DropdownState, BlockError> {
    static_options(&self.metadata().props, property)
  }
}

/// Checks a connection value against the block's auth property.
#[async_trait]
pub trait AuthValidator: Send + Sync {
  async fn validate(&self, auth: &serde_json::Value) -> AuthValidation;
}

/// A named, versioned bundle of actions and triggers.
pub struct Block {
  name: String,
  version: String,
  display_name: String,
  description: String,
  auth: Option<Property>,
  auth_validator: Option<Arc<dyn AuthValidator>>,
  actions: BTreeMap<String, Arc<dyn BlockAction>>,
  triggers: BTreeMap<String, Arc<dyn BlockTrigger>>,
}

impl Block {
  pub fn new(
    name: impl Into<String>,
    version: impl Into<String>,
    display_name: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      display_name: display_name.into(),
      description: String::new(),
      auth: None,
      auth_validator: None,
      actions: BTreeMap::new(),
      triggers: BTreeMap::new(),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn with_auth(mut self, property: Property, validator: Option<Arc<dyn AuthValidator>>) -> Self {
    self.auth = Some(property);
    self.auth_validator = validator;
    self
  }

  pub fn with_action(mut self, action: impl BlockAction + 'static) -> Self {
    let name = action.metadata().name.clone();
    self.actions.insert(name, Arc::new(action));
    self
  }

  pub fn with_trigger(mut self, trigger: impl BlockTrigger + 'static) -> Self {
    let name = trigger.metadata().name.clone();
    self.triggers.insert(name, Arc::new(trigger));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn get_action(&self, action_name: &str) -> Result<Arc<dyn BlockAction>, BlockError> {
    self
      .actions
      .get(action_name)
      .cloned()
      .ok_or_else(|| BlockError::ActionNotFound {
        block: self.name.clone(),
        action: action_name.to_string(),
      })
  }

  pub fn get_trigger(&self, trigger_name: &str) -> Result<Arc<dyn BlockTrigger>, BlockError> {
    self
      .triggers
      .get(trigger_name)
      .cloned()
      .ok_or_else(|| BlockError::TriggerNotFound {
        block: self.name.clone(),
        trigger: trigger_name.to_string(),
      })
  }

  /// Validate a connection value. Blocks without a validator accept any
  /// value.
  pub async fn validate_auth(&self, auth: &serde_json::Value) -> AuthValidation {
    match &self.auth_validator {
      Some(validator) => validator.validate(auth).await,
      None => AuthValidation::valid(),
    }
  }

  pub fn metadata(&self) -> BlockMetadata {
    BlockMetadata {
      name: self.name.clone(),
      version: self.version.clone(),
      display_name: self.display_name.clone(),
      description: self.description.clone(),
      auth: self.auth.clone(),
      actions: self
        .actions
        .iter()
        .map(|(name, action)| (name.clone(), action.metadata().clone()))
        .collect(),
      triggers: self
        .triggers
        .iter()
        .map(|(name, trigger)| (name.clone(), trigger.metadata().clone()))
        .collect(),
    }
  }
}
