use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{info, instrument};

use crate::block::{ActionMetadata, AuthValidation, AuthValidator, BlockAction};
use crate::context::ActionContext;
use crate::error::BlockError;
use crate::property::{DropdownOption, Property, PropertyMap};

pub const HTTP_BLOCK: &str = "@conduit/block-http";

const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Accepts any non-empty token string.
pub struct TokenAuthValidator;

#[async_trait]
impl AuthValidator for TokenAuthValidator {
  async fn validate(&self, auth: &serde_json::Value) -> AuthValidation {
    match auth.as_str() {
      Some(token) if !token.trim().is_empty() => AuthValidation::valid(),
      _ => AuthValidation::invalid("token must be a non-empty string"),
    }
  }
}

/// Sends a request and returns its status, headers and body. Responses with
/// a status of 400 or above fail the step.
pub struct SendRequest {
  metadata: ActionMetadata,
  client: reqwest::Client,
}

impl SendRequest {
  pub fn new() -> Self {
    let methods = METHODS
      .iter()
      .map(|m| DropdownOption::new(*m, json!(m)))
      .collect();

    Self {
      metadata: ActionMetadata {
        name: "send_request".to_string(),
        display_name: "Send HTTP request".to_string(),
        description: "Send a request to any URL".to_string(),
        props: PropertyMap::from([
          (
            "method".to_string(),
            Property::static_dropdown("Method", methods)
              .required()
              .with_default(json!("GET")),
          ),
          ("url".to_string(), Property::short_text("URL").required()),
          ("headers".to_string(), Property::object("Headers")),
          ("body".to_string(), Property::json("Body")),
        ]),
        require_auth: false,
      },
      client: reqwest::Client::new(),
    }
  }
}

impl Default for SendRequest {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl BlockAction for SendRequest {
  fn metadata(&self) -> &ActionMetadata {
    &self.metadata
  }

  #[instrument(name = "http_send_request", skip(self, ctx), fields(step = %ctx.run.step_name))]
  async fn run(&self, ctx: ActionContext) -> Result<serde_json::Value, BlockError> {
    let method = ctx.props["method"].as_str().unwrap_or("GET");
    let method = Method::from_bytes(method.as_bytes())
      .map_err(|e| BlockError::execution(format!("invalid method '{}': {}", method, e)))?;
    let url = ctx.props["url"]
      .as_str()
      .ok_or_else(|| BlockError::execution("url is required"))?;

    let mut request = self.client.request(method.clone(), url);
    if let Some(headers) = ctx.props["headers"].as_object() {
      for (name, value) in headers {
        let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        request = request.header(name.as_str(), value);
      }
    }
    if let Some(token) = ctx.auth.as_ref().and_then(|a| a.as_str()) {
      request = request.bearer_auth(token);
    }
    if !ctx.props["body"].is_null() {
      request = request.json(&ctx.props["body"]);
    }

    let response = request
      .send()
      .await
      .map_err(|e| BlockError::execution(format!("request to {} failed: {}", url, e)))?;

    let status = response.status();
    let headers: serde_json::Map<String, serde_json::Value> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), json!(v))))
      .collect();
    let text = response
      .text()
      .await
      .map_err(|e| BlockError::execution(format!("failed to read response body: {}", e)))?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    info!(method = %method, url = %url, status = status.as_u16(), "http_request_completed");

    if status.as_u16() >= 400 {
      return Err(BlockError::execution(format!(
        "request failed with status {}: {}",
        status.as_u16(),
        body
      )));
    }

    Ok(json!({
      "status": status.as_u16(),
      "headers": headers,
      "body": body,
    }))
  }
}
