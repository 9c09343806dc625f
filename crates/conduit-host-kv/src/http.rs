use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Store, StoreError};

#[derive(Serialize)]
struct PutEntry<'a> {
  key: &'a str,
  value: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct Entry {
  #[serde(default)]
  value: serde_json::Value,
}

/// Store backed by the server's `/v1/store-entries` API.
pub struct HttpStore {
  client: reqwest::Client,
  api_url: String,
  token: String,
}

impl HttpStore {
  pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_url: api_url.into().trim_end_matches('/').to_string(),
      token: token.into(),
    }
  }

  fn entries_url(&self) -> String {
    format!("{}/v1/store-entries", self.api_url)
  }

  fn storage_error(key: &str, status: StatusCode) -> StoreError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
      return StoreError::StorageLimit {
        key: key.to_string(),
      };
    }
    error!(key = %key, status = %status, "store_request_failed");
    StoreError::storage(format!("unexpected status {} for key '{}'", status, key))
  }
}

fn transport_error(e: reqwest::Error) -> StoreError {
  error!(error = %e, "store_transport_failed");
  StoreError::storage(e.to_string())
}

#[async_trait]
impl Store for HttpStore {
  async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
    let response = self
      .client
      .get(self.entries_url())
      .query(&[("key", key)])
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(transport_error)?;

    match response.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let entry: Entry = response.json().await.map_err(transport_error)?;
        Ok(Some(entry.value))
      }
      status => Err(Self::storage_error(key, status)),
    }
  }

  async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
    let response = self
      .client
      .post(self.entries_url())
      .bearer_auth(&self.token)
      .json(&PutEntry { key, value: &value })
      .send()
      .await
      .map_err(transport_error)?;

    if response.status().is_success() {
      Ok(())
    } else {
      Err(Self::storage_error(key, response.status()))
    }
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let response = self
      .client
      .delete(self.entries_url())
      .query(&[("key", key)])
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(transport_error)?;

    match response.status() {
      StatusCode::NOT_FOUND => Ok(()),
      status if status.is_success() => Ok(()),
      status => Err(Self::storage_error(key, status)),
    }
  }
}
