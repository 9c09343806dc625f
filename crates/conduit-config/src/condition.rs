use serde::{Deserialize, Serialize};

/// Comparison performed by a branch or split condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchOperator {
  TextContains,
  TextDoesNotContain,
  TextExactlyMatches,
  TextDoesNotExactlyMatch,
  TextStartsWith,
  TextDoesNotStartWith,
  TextEndsWith,
  TextDoesNotEndWith,
  NumberIsGreaterThan,
  NumberIsLessThan,
  NumberIsEqualTo,
  BooleanIsTrue,
  BooleanIsFalse,
  Exists,
  DoesNotExist,
  ListIsEmpty,
  ListIsNotEmpty,
  ListContains,
}

impl BranchOperator {
  /// Operators that only look at `first_value`.
  pub fn is_single_value(&self) -> bool {
    matches!(
      self,
      BranchOperator::BooleanIsTrue
        | BranchOperator::BooleanIsFalse
        | BranchOperator::Exists
        | BranchOperator::DoesNotExist
        | BranchOperator::ListIsEmpty
        | BranchOperator::ListIsNotEmpty
    )
  }
}

/// A single comparison. Values are templates resolved before evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCondition {
  #[serde(default)]
  pub first_value: serde_json::Value,
  #[serde(default)]
  pub second_value: serde_json::Value,
  pub operator: BranchOperator,
  #[serde(default = "default_case_sensitive")]
  pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
  true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitBranchType {
  Condition,
  Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitExecutionType {
  #[default]
  ExecuteFirstMatch,
  ExecuteAllMatch,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_condition_defaults() {
    let condition: BranchCondition = serde_json::from_value(json!({
      "firstValue": "{{ trigger.name }}",
      "operator": "TEXT_CONTAINS"
    }))
    .unwrap();
    assert!(condition.case_sensitive);
    assert_eq!(condition.second_value, serde_json::Value::Null);
    assert!(!condition.operator.is_single_value());
  }

  #[test]
  fn test_split_execution_type_names() {
    let parsed: SplitExecutionType = serde_json::from_value(json!("EXECUTE_ALL_MATCH")).unwrap();
    assert_eq!(parsed, SplitExecutionType::ExecuteAllMatch);
    assert_eq!(SplitExecutionType::default(), SplitExecutionType::ExecuteFirstMatch);
  }
}
