//! Mock provider implementation for testing.

use super::{
    FinishReason, GenerationParams, PromptPart, ProviderError, ProviderResponse, TextProvider,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Mock text provider for testing.
///
/// Replies with a fixed text (or `"Mock response <n>"` when none is set) and
/// records the parts of every call. Clones share the same recording.
#[derive(Clone, Default)]
pub struct MockTextProvider {
    reply: Option<String>,
    failing: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<Vec<PromptPart>>>>,
}

impl MockTextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Make subsequent calls and health checks fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Parts received by each call so far, oldest first.
    pub async fn calls(&self) -> Vec<Vec<PromptPart>> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        parts: &[PromptPart],
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let call_number = {
            let mut calls = self.calls.lock().await;
            calls.push(parts.to_vec());
            calls.len()
        };

        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError(
                "Mock provider failure".to_string(),
            ));
        }

        let text = self
            .reply
            .clone()
            .unwrap_or_else(|| format!("Mock response {}", call_number));

        let input_chars: usize = parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(text) => text.len(),
                PromptPart::InlineData { data, .. } => data.len(),
            })
            .sum();

        Ok(ProviderResponse {
            output_tokens: (text.len() / 4) as i32,
            text,
            input_tokens: (input_chars / 4) as i32,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::NotConfigured(
                "Mock provider failure".to_string(),
            ));
        }
        Ok(())
    }
}
