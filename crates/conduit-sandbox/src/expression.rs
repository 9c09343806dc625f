//! Template expressions.
//!
//! Expressions use minijinja's expression syntax, so `trigger.items`,
//! `step_1.rows | length` and `loop_1.index + 1` all work. Undefined
//! attributes chain to undefined instead of failing, and an undefined result
//! is returned as `null`.

use async_trait::async_trait;
use minijinja::{Environment, UndefinedBehavior};

use crate::ScriptSandbox;
use crate::error::SandboxError;

/// [`ScriptSandbox`] backed by minijinja.
pub struct ExpressionSandbox {
  env: Environment<'static>,
}

impl ExpressionSandbox {
  pub fn new() -> Self {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    Self { env }
  }

  /// Evaluate synchronously.
  pub fn eval(
    &self,
    expression: &str,
    context: &serde_json::Value,
  ) -> Result<serde_json::Value, SandboxError> {
    let to_error = |e: minijinja::Error| SandboxError::Expression {
      expression: expression.to_string(),
      message: e.to_string(),
    };

    let compiled = self.env.compile_expression(expression).map_err(to_error)?;
    let value = compiled
      .eval(minijinja::Value::from_serialize(context))
      .map_err(to_error)?;

    if value.is_undefined() || value.is_none() {
      return Ok(serde_json::Value::Null);
    }

    serde_json::to_value(&value).map_err(|e| SandboxError::Expression {
      expression: expression.to_string(),
      message: e.to_string(),
    })
  }
}

impl Default for ExpressionSandbox {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ScriptSandbox for ExpressionSandbox {
  async fn run_script(
    &self,
    script: &str,
    script_context: &serde_json::Value,
  ) -> Result<serde_json::Value, SandboxError> {
    self.eval(script, script_context)
  }
}
