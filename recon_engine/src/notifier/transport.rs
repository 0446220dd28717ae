use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use thiserror::Error;

use crate::notifier::payload::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// One signed callback, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub signature: String,
    /// Unix time in seconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: String,
}

impl CallbackResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
pub enum CallbackTransportError {
    #[error("Could not initialise the callback client. {0}")]
    Initialization(String),
    #[error("The callback request timed out")]
    Timeout,
    #[error("The callback request failed. {0}")]
    RequestFailed(String),
}

/// Delivers one callback attempt. Retrying is the caller's job.
#[allow(async_fn_in_trait)]
pub trait CallbackSender {
    async fn send(&self, request: &CallbackRequest) -> Result<CallbackResponse, CallbackTransportError>;
}

/// Posts callbacks over HTTP with a per-attempt timeout.
#[derive(Clone)]
pub struct HttpCallbackSender {
    client: Arc<Client>,
}

impl HttpCallbackSender {
    pub fn new(timeout: Duration) -> Result<Self, CallbackTransportError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackTransportError::Initialization(e.to_string()))?;
        Ok(Self { client: Arc::new(client) })
    }
}

impl CallbackSender for HttpCallbackSender {
    async fn send(&self, request: &CallbackRequest) -> Result<CallbackResponse, CallbackTransportError> {
        trace!("📣️ POST {}", request.url);
        let response = self
            .client
            .post(request.url.as_str())
            .header(SIGNATURE_HEADER, request.signature.as_str())
            .header(TIMESTAMP_HEADER, request.timestamp.to_string())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallbackTransportError::Timeout
                } else {
                    CallbackTransportError::RequestFailed(e.to_string())
                }
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CallbackTransportError::RequestFailed(e.to_string()))?;
        Ok(CallbackResponse { status, body })
    }
}
