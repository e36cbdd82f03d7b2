//! Generative model providers.
//!
//! Services depend on the [`TextProvider`] trait only; the concrete provider
//! is built once at startup and injected through application state, so tests
//! can swap in [`mock::MockTextProvider`].

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use metrics::{counter, histogram};
use std::time::Instant;
use thiserror::Error;

pub use gemini::{GeminiConfig, GeminiTextProvider};
pub use mock::MockTextProvider;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::EmptyResponse => "empty_response",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// One piece of a prompt, in the order the model should read it.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    /// Base64-encoded bytes tagged with their MIME type.
    InlineData { mime_type: String, data: String },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        PromptPart::Text(text.into())
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
}

/// Result of a provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub finish_reason: FinishReason,
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_tokens: Option<i32>,
}

/// Trait for text generation providers (e.g., Gemini).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Generate one text response for the given prompt parts.
    async fn generate(
        &self,
        parts: &[PromptPart],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Cheap check that the provider can be used at all.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Calls `provider.generate` and records latency and outcome metrics.
pub async fn generate_with_metrics(
    provider: &dyn TextProvider,
    parts: &[PromptPart],
    params: &GenerationParams,
) -> Result<ProviderResponse, ProviderError> {
    let start = Instant::now();
    let result = provider.generate(parts, params).await;
    let elapsed = start.elapsed().as_secs_f64();

    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    counter!("genai_requests_total", "status" => status).increment(1);
    histogram!("genai_request_duration_seconds").record(elapsed);

    match &result {
        Ok(response) => tracing::info!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = ?response.finish_reason,
            duration_secs = elapsed,
            "Model call completed"
        ),
        Err(e) => tracing::error!(error = %e, duration_secs = elapsed, "Model call failed"),
    }

    result
}
