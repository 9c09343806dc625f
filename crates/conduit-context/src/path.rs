use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Ordered list of `(loop_name, iteration_index)` pairs, outermost first.
///
/// Encodes as comma-delimited pairs, e.g. `loop_1,0,loop_2,3`, which is the
/// form carried in the `path` query parameter of resume URLs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepPath(Vec<(String, usize)>);

impl StepPath {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &(String, usize)> {
    self.0.iter()
  }

  pub fn push(mut self, loop_name: impl Into<String>, index: usize) -> Self {
    self.0.push((loop_name.into(), index));
    self
  }

  pub fn pop(mut self) -> Self {
    self.0.pop();
    self
  }

  /// Iteration index recorded for `loop_name` in an encoded path.
  ///
  /// The encoded string is cut at the first occurrence of `loop_name` and the
  /// element following it is read as the index. This is a plain substring
  /// match, so a loop whose name is a prefix of an outer loop's name resolves
  /// against the outer one.
  pub fn iteration_for(encoded: &str, loop_name: &str) -> Option<usize> {
    let start = encoded.find(loop_name)?;
    encoded[start..].split(',').nth(1)?.trim().parse().ok()
  }
}

impl fmt::Display for StepPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self
      .0
      .iter()
      .map(|(name, index)| format!("{},{}", name, index))
      .collect();
    write!(f, "{}", parts.join(","))
  }
}

impl FromStr for StepPath {
  type Err = ContextError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.trim().is_empty() {
      return Ok(Self::new());
    }
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() % 2 != 0 {
      return Err(ContextError::InvalidPath {
        path: s.to_string(),
        message: "expected step/iteration pairs".to_string(),
      });
    }
    let mut pairs = Vec::with_capacity(parts.len() / 2);
    for pair in parts.chunks(2) {
      let index = pair[1].trim().parse::<usize>().map_err(|e| ContextError::InvalidPath {
        path: s.to_string(),
        message: format!("bad iteration index '{}': {}", pair[1], e),
      })?;
      pairs.push((pair[0].trim().to_string(), index));
    }
    Ok(Self(pairs))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_and_parse() {
    let path = StepPath::new().push("loop_1", 0).push("loop_2", 3);
    assert_eq!(path.to_string(), "loop_1,0,loop_2,3");
    assert_eq!("loop_1,0,loop_2,3".parse::<StepPath>().unwrap(), path);
    assert_eq!("".parse::<StepPath>().unwrap(), StepPath::new());
  }

  #[test]
  fn test_parse_rejects_odd_parts() {
    let err = "loop_1,0,loop_2".parse::<StepPath>().unwrap_err();
    assert!(matches!(err, ContextError::InvalidPath { .. }));
  }

  #[test]
  fn test_iteration_for_uses_first_occurrence() {
    assert_eq!(StepPath::iteration_for("loop_1,0,loop_2,3", "loop_2"), Some(3));
    assert_eq!(StepPath::iteration_for("loop_1,0,loop_2,3", "loop_1"), Some(0));
    // "loop_1" is found inside "loop_10" first.
    assert_eq!(StepPath::iteration_for("loop_10,4,loop_1,2", "loop_1"), Some(4));
    assert_eq!(StepPath::iteration_for("loop_1,0", "missing"), None);
  }
}
