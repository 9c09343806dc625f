//! Branch condition evaluation.
//!
//! Conditions are grouped as an OR of AND-groups. Values have already been
//! resolved, so every operand is a plain JSON value here.

use conduit_config::{BranchCondition, BranchOperator};
use serde_json::Value;

/// True when any group has all of its conditions hold. No groups is false.
pub fn evaluate_conditions(groups: &[Vec<BranchCondition>]) -> bool {
  groups
    .iter()
    .any(|group| !group.is_empty() && group.iter().all(evaluate_condition))
}

pub fn evaluate_condition(condition: &BranchCondition) -> bool {
  let first = &condition.first_value;
  let second = &condition.second_value;
  let text = |value: &Value| {
    let text = to_text(value);
    if condition.case_sensitive { text } else { text.to_lowercase() }
  };

  match condition.operator {
    BranchOperator::TextContains => text(first).contains(&text(second)),
    BranchOperator::TextDoesNotContain => !text(first).contains(&text(second)),
    BranchOperator::TextExactlyMatches => text(first) == text(second),
    BranchOperator::TextDoesNotExactlyMatch => text(first) != text(second),
    BranchOperator::TextStartsWith => text(first).starts_with(&text(second)),
    BranchOperator::TextDoesNotStartWith => !text(first).starts_with(&text(second)),
    BranchOperator::TextEndsWith => text(first).ends_with(&text(second)),
    BranchOperator::TextDoesNotEndWith => !text(first).ends_with(&text(second)),
    BranchOperator::NumberIsGreaterThan => compare_numbers(first, second, |a, b| a > b),
    BranchOperator::NumberIsLessThan => compare_numbers(first, second, |a, b| a < b),
    BranchOperator::NumberIsEqualTo => compare_numbers(first, second, |a, b| a == b),
    BranchOperator::BooleanIsTrue => to_bool(first) == Some(true),
    BranchOperator::BooleanIsFalse => to_bool(first) == Some(false),
    BranchOperator::Exists => exists(first),
    BranchOperator::DoesNotExist => !exists(first),
    BranchOperator::ListIsEmpty => to_list(first).is_some_and(|items| items.is_empty()),
    BranchOperator::ListIsNotEmpty => to_list(first).is_some_and(|items| !items.is_empty()),
    BranchOperator::ListContains => to_list(first).is_some_and(|items| {
      let needle = text(second);
      items.iter().any(|item| text(item) == needle)
    }),
  }
}

fn to_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn to_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn compare_numbers(first: &Value, second: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
  match (to_number(first), to_number(second)) {
    (Some(a), Some(b)) => cmp(a, b),
    _ => false,
  }
}

fn to_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
    Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
    _ => None,
  }
}

fn exists(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::String(s) => !s.is_empty(),
    _ => true,
  }
}

/// Arrays as-is, strings holding a JSON array parsed.
fn to_list(value: &Value) -> Option<Vec<Value>> {
  match value {
    Value::Array(items) => Some(items.clone()),
    Value::String(s) => match serde_json::from_str(s) {
      Ok(Value::Array(items)) => Some(items),
      _ => None,
    },
    _ => None,
  }
}
