//! HTTP adapter for the remote write API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::api::{ConnectivityProbe, RemoteReceipt, RemoteWriteApi};
use super::error::RemoteError;
use crate::config::RemoteConfig;
use crate::error::OutboxError;
use crate::features::sync::OperationType;

/// Header carrying the operation id so replays can be deduplicated server-side.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// reqwest-backed client for the booking service.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRemote {
    /// Build a client from remote settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RemoteConfig) -> Result<Self, OutboxError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| OutboxError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn transport_error(&self, err: &reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if err.is_connect() || err.is_request() || err.is_body() {
            RemoteError::Network(err.to_string())
        } else {
            RemoteError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteWriteApi for HttpRemote {
    #[instrument(skip(self, payload), fields(endpoint = operation_type.endpoint()))]
    async fn submit(
        &self,
        operation_type: OperationType,
        payload: &Value,
        idempotency_key: &str,
    ) -> Result<RemoteReceipt, RemoteError> {
        let url = self.url(operation_type.endpoint());
        debug!(url = %url, "Submitting operation");

        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(RemoteReceipt::from_body(body.clone()).unwrap_or_else(|| {
                warn!(
                    operation_id = idempotency_key,
                    "Response carried no reference, using operation id"
                );
                RemoteReceipt {
                    reference: idempotency_key.to_uppercase(),
                    body,
                }
            }));
        }

        Err(status_error(status, &body))
    }
}

#[async_trait]
impl ConnectivityProbe for HttpRemote {
    async fn is_reachable(&self) -> bool {
        match self.client.get(self.url("health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            },
        }
    }
}

/// Map a non-success response to an error category.
fn status_error(status: StatusCode, body: &Value) -> RemoteError {
    let reason = ["message", "error", "reason"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map_or_else(
            || status.canonical_reason().unwrap_or("request failed").to_string(),
            String::from,
        );

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(reason)
        },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => RemoteError::Server {
            status: status.as_u16(),
            message: reason,
        },
        s if s.is_server_error() => RemoteError::Server {
            status: s.as_u16(),
            message: reason,
        },
        _ => RemoteError::Business(reason),
    }
}
