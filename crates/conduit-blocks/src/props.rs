//! Property processing.
//!
//! Resolved step input arrives as loosely typed JSON (templates often
//! produce strings). Processing coerces each declared property to the type
//! its [`PropertyKind`] expects, applies defaults and checks required
//! properties. Inputs that are not declared are dropped.
//!
//! All problems are collected before failing so the user sees every invalid
//! property at once.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::BlockError;
use crate::property::{PropertyKind, PropertyMap};

/// Coerce `input` against `props`, returning an object with one entry per
/// declared property.
pub fn process_props(props: &PropertyMap, input: &Value) -> Result<Value, BlockError> {
  let mut processed = serde_json::Map::new();
  let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

  for (name, property) in props {
    let raw = input
      .get(name)
      .filter(|v| !is_blank(v))
      .or(property.default_value.as_ref());

    let Some(raw) = raw else {
      if property.required {
        errors
          .entry(name.clone())
          .or_default()
          .push("expected value, but found none".to_string());
      }
      processed.insert(name.clone(), Value::Null);
      continue;
    };

    match coerce_value(raw, &property.kind) {
      Ok(value) => {
        processed.insert(name.clone(), value);
      }
      Err(message) => errors.entry(name.clone()).or_default().push(message),
    }
  }

  if errors.is_empty() {
    Ok(Value::Object(processed))
  } else {
    let errors = serde_json::to_string(&errors).unwrap_or_else(|_| format!("{:?}", errors));
    Err(BlockError::PropsValidation { errors })
  }
}

fn is_blank(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

/// Coerce a single value to the JSON shape a property kind expects.
fn coerce_value(value: &Value, kind: &PropertyKind) -> Result<Value, String> {
  match kind {
    PropertyKind::ShortText | PropertyKind::LongText | PropertyKind::SecretText => match value {
      Value::String(_) => Ok(value.clone()),
      other => Ok(Value::String(other.to_string())),
    },

    PropertyKind::Number => match value {
      Value::Number(_) => Ok(value.clone()),
      Value::String(s) => s
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(number_value)
        .ok_or_else(|| format!("expected number, got '{}'", s)),
      other => Err(format!("expected number, got {}", other)),
    },

    PropertyKind::Checkbox => match value {
      Value::Bool(_) => Ok(value.clone()),
      Value::String(s) => match s.to_lowercase().as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ => Err(format!("expected boolean, got '{}'", s)),
      },
      other => Err(format!("expected boolean, got {}", other)),
    },

    PropertyKind::Json => match value {
      Value::String(s) => {
        serde_json::from_str(s).map_err(|e| format!("expected valid JSON: {}", e))
      }
      other => Ok(other.clone()),
    },

    PropertyKind::Array => match parse_if_string(value)? {
      Value::Array(items) => Ok(Value::Array(items)),
      other => Err(format!("expected array, got {}", other)),
    },

    PropertyKind::Object => match parse_if_string(value)? {
      Value::Object(map) => Ok(Value::Object(map)),
      other => Err(format!("expected object, got {}", other)),
    },

    PropertyKind::StaticDropdown { options } => {
      if options.iter().any(|o| &o.value == value) {
        Ok(value.clone())
      } else {
        Err(format!("{} is not one of the allowed options", value))
      }
    }

    PropertyKind::Dropdown { .. } => Ok(value.clone()),
  }
}

fn parse_if_string(value: &Value) -> Result<Value, String> {
  match value {
    Value::String(s) => serde_json::from_str(s).map_err(|e| format!("expected valid JSON: {}", e)),
    other => Ok(other.clone()),
  }
}

/// Keep integral numbers integral so `"3"` becomes `3`, not `3.0`.
fn number_value(n: serde_json::Number) -> Value {
  match n.as_f64() {
    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Number((f as i64).into()),
    _ => Value::Number(n),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::property::{DropdownOption, Property};
  use serde_json::json;

  fn props() -> PropertyMap {
    PropertyMap::from([
      ("name".to_string(), Property::short_text("Name").required()),
      ("count".to_string(), Property::number("Count")),
      ("enabled".to_string(), Property::checkbox("Enabled").with_default(json!(false))),
      ("payload".to_string(), Property::json("Payload")),
      ("headers".to_string(), Property::object("Headers")),
      (
        "method".to_string(),
        Property::static_dropdown(
          "Method",
          vec![
            DropdownOption::new("GET", json!("GET")),
            DropdownOption::new("POST", json!("POST")),
          ],
        ),
      ),
    ])
  }

  #[test]
  fn test_coerces_declared_props() {
    let input = json!({
      "name": 42,
      "count": "3",
      "payload": "{\"a\": [1]}",
      "headers": { "x": "y" },
      "method": "POST",
      "undeclared": "dropped"
    });

    let processed = process_props(&props(), &input).unwrap();

    assert_eq!(
      processed,
      json!({
        "name": "42",
        "count": 3,
        "enabled": false,
        "payload": { "a": [1] },
        "headers": { "x": "y" },
        "method": "POST"
      })
    );
  }

  #[test]
  fn test_collects_every_error() {
    let input = json!({ "count": "abc", "method": "PATCH", "enabled": "maybe" });

    let err = process_props(&props(), &input).unwrap_err();
    let BlockError::PropsValidation { errors } = err else {
      panic!("expected validation error");
    };
    let errors: serde_json::Value = serde_json::from_str(&errors).unwrap();

    assert!(errors.get("name").is_some());
    assert!(errors.get("count").is_some());
    assert!(errors.get("method").is_some());
    assert!(errors.get("enabled").is_some());
    assert!(errors.get("payload").is_none());
  }

  #[test]
  fn test_blank_required_string_is_missing() {
    let err = process_props(&props(), &json!({ "name": "" })).unwrap_err();
    assert!(err.to_string().contains("name"));
  }

  #[test]
  fn test_fractional_numbers_kept() {
    let processed = process_props(&props(), &json!({ "name": "x", "count": "2.5" })).unwrap();
    assert_eq!(processed["count"], json!(2.5));
  }
}
