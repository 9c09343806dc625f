//! Input resolution.
//!
//! Step inputs are arbitrary JSON where strings may carry `{{ expression }}`
//! tokens. Resolution walks the value and replaces tokens with the result of
//! evaluating the expression against the current run state:
//!
//! - `"{{ step_1.rows }}"` is a single token and keeps the native type of
//!   the result (here, an array).
//! - `"Hello {{ trigger.name }}!"` embeds tokens; each result is rendered to
//!   text (JSON for non-strings, empty for null) and spliced in order.
//!
//! Tokens that reference `connections.<name>` or `connections['<name>']`
//! fetch the connection value and evaluate the rest of the path against it.
//! The censored copy of the input replaces those tokens with [`REDACTED`]
//! without ever fetching the secret.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use conduit_sandbox::ScriptSandbox;
use regex::Regex;
use tracing::debug;

use crate::connection::ConnectionService;
use crate::error::ResolveError;

/// Replacement for connection values in censored input.
pub const REDACTED: &str = "**REDACTED**";

static TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("token pattern is valid"));

static CONNECTION_REF: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?s)^connections(?:\.([A-Za-z0-9_\-]+)|\[\s*['"]([^'"]+)['"]\s*\])(.*)$"#)
    .expect("connection pattern is valid")
});

/// Both renditions of a step's input.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
  /// Input with every secret in place. Only handed to the executing step.
  pub resolved_input: serde_json::Value,
  /// Input with connection values masked. Safe to persist.
  pub censored_input: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Resolve,
  Censor,
}

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<serde_json::Value, ResolveError>> + Send + 'a>>;

/// Resolves templated step inputs.
#[derive(Clone)]
pub struct PropsResolver {
  script: Arc<dyn ScriptSandbox>,
  connections: Arc<dyn ConnectionService>,
}

impl PropsResolver {
  pub fn new(script: Arc<dyn ScriptSandbox>, connections: Arc<dyn ConnectionService>) -> Self {
    Self {
      script,
      connections,
    }
  }

  /// Resolve `unresolved` against `state` into its real and censored forms.
  pub async fn resolve(
    &self,
    unresolved: &serde_json::Value,
    state: &serde_json::Value,
  ) -> Result<ResolvedInput, ResolveError> {
    let resolved_input = self.resolve_value(unresolved, state, Mode::Resolve).await?;
    let censored_input = self.resolve_value(unresolved, state, Mode::Censor).await?;
    Ok(ResolvedInput {
      resolved_input,
      censored_input,
    })
  }

  /// Resolve `unresolved` with secrets in place, skipping the censored pass.
  pub async fn resolve_value_only(
    &self,
    unresolved: &serde_json::Value,
    state: &serde_json::Value,
  ) -> Result<serde_json::Value, ResolveError> {
    self.resolve_value(unresolved, state, Mode::Resolve).await
  }

  fn resolve_value<'a>(
    &'a self,
    value: &'a serde_json::Value,
    state: &'a serde_json::Value,
    mode: Mode,
  ) -> ResolveFuture<'a> {
    Box::pin(async move {
      match value {
        serde_json::Value::String(s) => self.resolve_string(s, state, mode).await,
        serde_json::Value::Array(items) => {
          let mut resolved = Vec::with_capacity(items.len());
          for item in items {
            resolved.push(self.resolve_value(item, state, mode).await?);
          }
          Ok(serde_json::Value::Array(resolved))
        }
        serde_json::Value::Object(map) => {
          let mut resolved = serde_json::Map::with_capacity(map.len());
          for (key, item) in map {
            resolved.insert(key.clone(), self.resolve_value(item, state, mode).await?);
          }
          Ok(serde_json::Value::Object(resolved))
        }
        other => Ok(other.clone()),
      }
    })
  }

  async fn resolve_string(
    &self,
    input: &str,
    state: &serde_json::Value,
    mode: Mode,
  ) -> Result<serde_json::Value, ResolveError> {
    let tokens: Vec<regex::Captures<'_>> = TOKEN.captures_iter(input).collect();
    if tokens.is_empty() {
      return Ok(serde_json::Value::String(input.to_string()));
    }

    if tokens.len() == 1 {
      let whole = tokens[0].get(0).map(|m| m.range());
      if whole == Some(0..input.len()) {
        return self.evaluate(&tokens[0][1], state, mode).await;
      }
    }

    let mut rendered = String::with_capacity(input.len());
    let mut last = 0;
    for token in &tokens {
      let Some(whole) = token.get(0) else {
        continue;
      };
      rendered.push_str(&input[last..whole.start()]);
      let value = self.evaluate(&token[1], state, mode).await?;
      rendered.push_str(&render_text(&value));
      last = whole.end();
    }
    rendered.push_str(&input[last..]);

    Ok(serde_json::Value::String(rendered))
  }

  async fn evaluate(
    &self,
    expression: &str,
    state: &serde_json::Value,
    mode: Mode,
  ) -> Result<serde_json::Value, ResolveError> {
    let expression = expression.trim();

    if let Some(reference) = CONNECTION_REF.captures(expression) {
      if mode == Mode::Censor {
        return Ok(serde_json::Value::String(REDACTED.to_string()));
      }
      let name = reference
        .get(1)
        .or_else(|| reference.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();
      let rest = reference.get(3).map(|m| m.as_str().trim()).unwrap_or_default();

      let value = self.connections.obtain(name).await?;
      if rest.is_empty() {
        return Ok(value);
      }
      let scope = serde_json::json!({ "connection": value });
      return Ok(self.run_script(&format!("connection{}", rest), &scope).await);
    }

    Ok(self.run_script(expression, state).await)
  }

  async fn run_script(&self, expression: &str, scope: &serde_json::Value) -> serde_json::Value {
    match self.script.run_script(expression, scope).await {
      Ok(value) => value,
      Err(e) => {
        debug!(expression = %expression, error = %e, "expression_evaluation_failed");
        serde_json::Value::String(String::new())
      }
    }
  }
}

fn render_text(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::Null => String::new(),
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connection::StaticConnectionService;
  use crate::error::ConnectionError;
  use async_trait::async_trait;
  use conduit_sandbox::ExpressionSandbox;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingConnections {
    inner: StaticConnectionService,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl ConnectionService for CountingConnections {
    async fn obtain(&self, name: &str) -> Result<serde_json::Value, ConnectionError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.inner.obtain(name).await
    }
  }

  async fn resolver() -> (PropsResolver, Arc<CountingConnections>) {
    let inner = StaticConnectionService::new();
    inner.insert("myConn", json!({ "secret": "s3cr3t", "user": "ada" })).await;
    inner.insert("api-key", json!("k-123")).await;
    let connections = Arc::new(CountingConnections {
      inner,
      calls: AtomicUsize::new(0),
    });
    let resolver = PropsResolver::new(Arc::new(ExpressionSandbox::new()), connections.clone());
    (resolver, connections)
  }

  #[tokio::test]
  async fn test_connection_redaction() {
    let (resolver, connections) = resolver().await;
    let input = json!({ "auth": "{{connections.myConn.secret}}" });

    let result = resolver.resolve(&input, &json!({})).await.unwrap();

    assert_eq!(result.resolved_input, json!({ "auth": "s3cr3t" }));
    assert_eq!(result.censored_input, json!({ "auth": REDACTED }));
    assert_eq!(connections.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_bracket_connection_reference() {
    let (resolver, _) = resolver().await;
    let input = json!("Bearer {{ connections['api-key'] }}");

    let result = resolver.resolve(&input, &json!({})).await.unwrap();

    assert_eq!(result.resolved_input, json!("Bearer k-123"));
    assert_eq!(result.censored_input, json!(format!("Bearer {}", REDACTED)));
  }

  #[tokio::test]
  async fn test_single_token_keeps_native_type() {
    let (resolver, _) = resolver().await;
    let state = json!({ "trigger": { "items": [1, 2, 3], "count": 3 } });

    let result = resolver
      .resolve(&json!({ "items": "{{ trigger.items }}", "n": "{{trigger.count}}" }), &state)
      .await
      .unwrap();

    assert_eq!(result.resolved_input, json!({ "items": [1, 2, 3], "n": 3 }));
  }

  #[tokio::test]
  async fn test_token_spanning_lines() {
    let (resolver, _) = resolver().await;
    let state = json!({ "trigger": { "name": "ada", "count": 3 } });

    let result = resolver
      .resolve(
        &json!({ "n": "{{\n  trigger.count\n}}", "greeting": "hi {{\n trigger.name }}!" }),
        &state,
      )
      .await
      .unwrap();

    assert_eq!(result.resolved_input, json!({ "n": 3, "greeting": "hi ada!" }));
  }

  #[tokio::test]
  async fn test_embedded_tokens_render_in_order() {
    let (resolver, _) = resolver().await;
    let state = json!({ "trigger": { "name": "ada", "tags": ["a"], "missing": null } });

    let value = resolver
      .resolve_value_only(
        &json!("{{ trigger.name }}: {{ trigger.tags }} [{{ trigger.missing }}]"),
        &state,
      )
      .await
      .unwrap();

    assert_eq!(value, json!(r#"ada: ["a"] []"#));
  }

  #[tokio::test]
  async fn test_failed_expression_resolves_to_empty() {
    let (resolver, _) = resolver().await;

    let value = resolver
      .resolve_value_only(&json!(["{{ trigger.( }}", "x{{ ) }}y", 7, null]), &json!({}))
      .await
      .unwrap();

    assert_eq!(value, json!(["", "xy", 7, null]));
  }

  #[tokio::test]
  async fn test_missing_connection_is_error() {
    let (resolver, _) = resolver().await;

    let err = resolver
      .resolve(&json!("{{ connections.nope.token }}"), &json!({}))
      .await
      .unwrap_err();

    assert!(err.is_user_error());
    assert!(err.to_string().contains("nope"));
  }

  #[tokio::test]
  async fn test_plain_values_untouched() {
    let (resolver, connections) = resolver().await;
    let input = json!({ "a": "plain", "b": { "c": [true, 1.5] } });

    let result = resolver.resolve(&input, &json!({})).await.unwrap();

    assert_eq!(result.resolved_input, input);
    assert_eq!(result.censored_input, input);
    assert_eq!(connections.calls.load(Ordering::SeqCst), 0);
  }
}
