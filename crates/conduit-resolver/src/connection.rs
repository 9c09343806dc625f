use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, instrument};

use crate::error::ConnectionError;

/// Source of decrypted connection values.
#[async_trait]
pub trait ConnectionService: Send + Sync {
  /// Fetch the value of a connection by name.
  async fn obtain(&self, name: &str) -> Result<serde_json::Value, ConnectionError>;
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ConnectionStatus {
  Active,
  Expired,
  Error,
}

#[derive(Debug, Deserialize)]
struct ConnectionRecord {
  status: ConnectionStatus,
  #[serde(default)]
  value: serde_json::Value,
}

/// Fetches connections from the server API. Each lookup is a single attempt.
pub struct HttpConnectionService {
  client: reqwest::Client,
  api_url: String,
  token: String,
}

impl HttpConnectionService {
  pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.into().trim_end_matches('/').to_string(),
      token: token.into(),
    }
  }

  fn connection_url(&self, name: &str) -> String {
    format!("{}/v1/worker/app-connections/{}", self.api_url, name)
  }
}

#[async_trait]
impl ConnectionService for HttpConnectionService {
  #[instrument(name = "connection_obtain", skip(self))]
  async fn obtain(&self, name: &str) -> Result<serde_json::Value, ConnectionError> {
    let loading = |message: String| {
      error!(connection = %name, error = %message, "connection_load_failed");
      ConnectionError::Loading {
        name: name.to_string(),
        message,
      }
    };

    let response = self
      .client
      .get(self.connection_url(name))
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|e| loading(e.to_string()))?;

    match response.status() {
      StatusCode::NOT_FOUND => Err(ConnectionError::NotFound {
        name: name.to_string(),
      }),
      status if status.is_success() => {
        let record: ConnectionRecord = response.json().await.map_err(|e| loading(e.to_string()))?;
        connection_value(name, record)
      }
      status => Err(loading(format!("unexpected status {}", status))),
    }
  }
}

fn connection_value(name: &str, record: ConnectionRecord) -> Result<serde_json::Value, ConnectionError> {
  match record.status {
    ConnectionStatus::Active => Ok(record.value),
    ConnectionStatus::Expired | ConnectionStatus::Error => Err(ConnectionError::Expired {
      name: name.to_string(),
    }),
  }
}

/// Connection values held in memory. Used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct StaticConnectionService {
  connections: RwLock<HashMap<String, serde_json::Value>>,
}

impl StaticConnectionService {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_connections(connections: HashMap<String, serde_json::Value>) -> Self {
    Self {
      connections: RwLock::new(connections),
    }
  }

  pub async fn insert(&self, name: impl Into<String>, value: serde_json::Value) {
    self.connections.write().await.insert(name.into(), value);
  }
}

#[async_trait]
impl ConnectionService for StaticConnectionService {
  async fn obtain(&self, name: &str) -> Result<serde_json::Value, ConnectionError> {
    self
      .connections
      .read()
      .await
      .get(name)
      .cloned()
      .ok_or_else(|| ConnectionError::NotFound {
        name: name.to_string(),
      })
  }
}
