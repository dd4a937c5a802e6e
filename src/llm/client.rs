//! HTTP transport for the generation endpoint.
//!
//! One logical exchange per [`TextGen::generate`] call. The client owns a
//! bounded retry loop: connection failures, timeouts, and non-2xx statuses
//! are retried up to `retries` times with the backoff delay doubling after
//! every failed attempt. Exhaustion surfaces as a [`TransportError`] value;
//! nothing unwinds past this boundary.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{GenerationRequest, TextGen};
use crate::config::PipelineConfig;

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Wire payload for an Ollama-compatible `/api/generate` endpoint.
/// Streaming is always disabled.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    temperature: f32,
    num_predict: u32,
}

/// HTTP client for a text-generation endpoint.
#[derive(Debug)]
pub struct HttpClient {
    http: Client,
    endpoint: String,
    retries: u32,
    base_delay: Duration,
}

impl HttpClient {
    /// Build a client from the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Result<Self, TransportError> {
        Self::with_endpoint(
            &config.endpoint,
            config.transport_retries,
            config.retry_base_delay(),
        )
    }

    /// Build a client against an explicit endpoint (for mock servers).
    pub fn with_endpoint(
        endpoint: &str,
        retries: u32,
        base_delay: Duration,
    ) -> Result<Self, TransportError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            retries,
            base_delay,
        })
    }

    /// One network exchange, no retries.
    async fn send_once(&self, request: &GenerationRequest) -> Result<String, TransportError> {
        let body = WireRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: WireOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(TransportError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl TextGen for HttpClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError> {
        let endpoint = self.endpoint.clone();
        let model = request.model.clone();

        with_retry(self.retries, self.base_delay, |attempt| {
            tracing::info!(%endpoint, %model, attempt, "sending generation request");
            self.send_once(request)
        })
        .await
    }
}

/// Drive `attempt_fn` up to `retries + 1` times, sleeping between attempts
/// with the delay doubling after each failure (attempt k waits
/// `base_delay * 2^(k-2)` before running, k >= 2).
pub(crate) async fn with_retry<T, F, Fut>(
    retries: u32,
    base_delay: Duration,
    mut attempt_fn: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut delay = base_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt <= retries => {
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err,
                    "generation attempt failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                tracing::error!(attempt, error = %err, "generation failed, attempts exhausted");
                return Err(err);
            }
        }
    }
}
