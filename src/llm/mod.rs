//! Text-generation plumbing: transport client, response normalization,
//! fence stripping.
//!
//! Stages talk to the backend through the [`TextGen`] trait so tests can
//! substitute scripted backends. The HTTP implementation owns the bounded
//! transport retry loop; callers never re-drive transport attempts.

pub mod client;
pub mod response;
pub mod strip;

use std::time::Duration;

use async_trait::async_trait;

use client::TransportError;

/// One generation exchange, built fresh per attempt and never mutated
/// mid-flight.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier sent to the backend.
    pub model: String,
    /// Optional system instruction.
    pub system: Option<String>,
    /// User content.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens the backend may generate.
    pub max_tokens: u32,
    /// Network timeout for the exchange.
    pub timeout: Duration,
}

/// A text-generation backend: one logical exchange per call, transport
/// retries included. Returns the raw response body; interpreting it is the
/// caller's job (see [`response::normalize`]).
#[async_trait]
pub trait TextGen: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError>;
}
