//! HTTP seam for the completion endpoint.
//!
//! The session only sees a stream of byte chunks, so tests can script the
//! wire without a server.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::types::ChatRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportError {
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("Aborted")]
    Aborted,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Everything needed for one streaming POST.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub url: String,
    pub api_key: String,
    pub headers: HeaderMap,
    pub body: ChatRequest,
}

#[async_trait::async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send the request. A non-success status resolves to
    /// [`TransportError::Status`] with the response text.
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, TransportError>;
}

pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http_client }
    }
}

#[async_trait::async_trait]
impl CompletionTransport for ReqwestTransport {
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, TransportError> {
        log::debug!(
            "POST {} (model={}, messages={})",
            request.url,
            request.body.model,
            request.body.messages.len()
        );

        let response = self
            .http_client
            .post(&request.url)
            .bearer_auth(&request.api_key)
            .headers(request.headers)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::network(e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}
