use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties keyed by name.
pub type PropertyMap = BTreeMap<String, Property>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownOption {
  pub label: String,
  pub value: serde_json::Value,
}

impl DropdownOption {
  pub fn new(label: impl Into<String>, value: serde_json::Value) -> Self {
    Self {
      label: label.into(),
      value,
    }
  }
}

/// Options offered by a dropdown, as returned by an EXECUTE_PROPERTY call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropdownState {
  #[serde(default)]
  pub disabled: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub placeholder: Option<String>,
  pub options: Vec<DropdownOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
  ShortText,
  LongText,
  SecretText,
  Number,
  Checkbox,
  Json,
  Array,
  Object,
  StaticDropdown { options: Vec<DropdownOption> },
  /// Options are computed by the action or trigger at edit time.
  Dropdown {
    #[serde(default)]
    refreshers: Vec<String>,
  },
}

/// An input of an action, trigger or block auth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
  pub display_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<serde_json::Value>,
  #[serde(flatten)]
  pub kind: PropertyKind,
}

impl Property {
  pub fn new(display_name: impl Into<String>, kind: PropertyKind) -> Self {
    Self {
      display_name: display_name.into(),
      description: None,
      required: false,
      default_value: None,
      kind,
    }
  }

  pub fn short_text(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::ShortText)
  }

  pub fn long_text(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::LongText)
  }

  pub fn secret_text(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::SecretText)
  }

  pub fn number(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::Number)
  }

  pub fn checkbox(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::Checkbox)
  }

  pub fn json(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::Json)
  }

  pub fn object(display_name: impl Into<String>) -> Self {
    Self::new(display_name, PropertyKind::Object)
  }

  pub fn static_dropdown(display_name: impl Into<String>, options: Vec<DropdownOption>) -> Self {
    Self::new(display_name, PropertyKind::StaticDropdown { options })
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_default(mut self, value: serde_json::Value) -> Self {
    self.default_value = Some(value);
    self
  }
}
