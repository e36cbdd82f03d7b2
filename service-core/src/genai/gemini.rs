//! Gemini AI provider implementation.
//!
//! Implements non-streaming text generation against Google's Gemini
//! `generateContent` REST method, with text and inline media parts.

use super::{
    FinishReason, GenerationParams, PromptPart, ProviderError, ProviderResponse, TextProvider,
};
use crate::config::GenaiSettings;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl From<&GenaiSettings> for GeminiConfig {
    fn from(settings: &GenaiSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
            request_timeout: settings.request_timeout,
        }
    }
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiTextProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build the API URL for the given model method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_generation_config(params: &GenerationParams) -> Option<GenerationConfig> {
        if params.temperature.is_none() && params.max_tokens.is_none() {
            return None;
        }

        Some(GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        })
    }
}

impl From<&PromptPart> for ContentPart {
    fn from(part: &PromptPart) -> Self {
        match part {
            PromptPart::Text(text) => ContentPart::Text { text: text.clone() },
            PromptPart::InlineData { mime_type, data } => ContentPart::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        }
    }
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    async fn generate(
        &self,
        parts: &[PromptPart],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if parts.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Prompt has no parts".to_string(),
            ));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: parts.iter().map(ContentPart::from).collect(),
            }],
            generation_config: Self::build_generation_config(params),
        };

        tracing::debug!(
            model = %self.config.model,
            part_count = parts.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if api_response
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some())
        {
            return Err(ProviderError::ContentFiltered);
        }

        let candidate = api_response.candidates.first();

        let finish_reason = match candidate.and_then(|c| c.finish_reason.as_deref()) {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Complete,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let text: String = candidate
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::InlineData { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
    }

    /// Serves `reply` for every generateContent call and records what was sent.
    async fn spawn_gemini_stub(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured = Captured::default();

        let handler = {
            let reply = reply.clone();
            move |State(captured): State<Captured>,
                  Path(model_method): Path<String>,
                  headers: HeaderMap,
                  Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    let key = headers
                        .get(API_KEY_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    captured
                        .requests
                        .lock()
                        .unwrap()
                        .push((model_method, key, body));
                    (status, Json(reply)).into_response()
                }
            }
        };

        let app = Router::new()
            .route("/v1beta/models/:model_method", post(handler))
            .with_state(captured.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://{}/v1beta", addr), captured)
    }

    fn provider(api_base: String) -> GeminiTextProvider {
        GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: "gemini-2.0-flash".to_string(),
            api_base,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sends_text_and_inline_parts_and_joins_reply_text() {
        let (base, captured) = spawn_gemini_stub(
            StatusCode::OK,
            json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "A cat " }, { "text": "on a mat." }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 4 }
            }),
        )
        .await;

        let parts = vec![
            PromptPart::text("describe"),
            PromptPart::InlineData {
                mime_type: "image/png".to_string(),
                data: "aGVsbG8=".to_string(),
            },
        ];
        let response = provider(base)
            .generate(&parts, &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(response.text, "A cat on a mat.");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 4);
        assert_eq!(response.finish_reason, FinishReason::Complete);

        let requests = captured.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (model_method, key, body) = &requests[0];
        assert_eq!(model_method, "gemini-2.0-flash:generateContent");
        assert_eq!(key.as_deref(), Some("test-key"));
        assert_eq!(
            body,
            &json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "describe" },
                        { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                    ]
                }]
            })
        );
    }

    #[tokio::test]
    async fn generation_params_are_forwarded() {
        let (base, captured) = spawn_gemini_stub(
            StatusCode::OK,
            json!({ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] }),
        )
        .await;

        let params = GenerationParams {
            temperature: Some(0.5),
            max_tokens: Some(256),
        };
        provider(base)
            .generate(&[PromptPart::text("hi")], &params)
            .await
            .unwrap();

        let requests = captured.requests.lock().unwrap();
        assert_eq!(
            requests[0].2["generationConfig"],
            json!({ "temperature": 0.5, "maxOutputTokens": 256 })
        );
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limited() {
        let (base, _) = spawn_gemini_stub(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": { "message": "quota" } }),
        )
        .await;

        let err = provider(base)
            .generate(&[PromptPart::text("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let (base, _) = spawn_gemini_stub(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": { "message": "boom" } }),
        )
        .await;

        let err = provider(base)
            .generate(&[PromptPart::text("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn safety_block_maps_to_content_filtered() {
        let (base, _) = spawn_gemini_stub(
            StatusCode::OK,
            json!({ "candidates": [{ "finishReason": "SAFETY" }] }),
        )
        .await;

        let err = provider(base)
            .generate(&[PromptPart::text("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentFiltered));
    }

    #[tokio::test]
    async fn blocked_prompt_maps_to_content_filtered() {
        let (base, _) = spawn_gemini_stub(
            StatusCode::OK,
            json!({ "promptFeedback": { "blockReason": "OTHER" } }),
        )
        .await;

        let err = provider(base)
            .generate(&[PromptPart::text("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentFiltered));
    }

    #[tokio::test]
    async fn missing_text_is_an_empty_response() {
        let (base, _) = spawn_gemini_stub(StatusCode::OK, json!({ "candidates": [] })).await;

        let err = provider(base)
            .generate(&[PromptPart::text("hi")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_locally() {
        let err = provider("http://127.0.0.1:9".to_string())
            .generate(&[], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn health_check_requires_api_key() {
        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new(String::new()),
            model: "gemini-2.0-flash".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert!(provider.health_check().await.is_err());
    }
}
