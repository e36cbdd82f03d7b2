use crate::services::{document_text, summary_prompt};
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use service_core::genai::{generate_with_metrics, PromptPart};
use service_core::upload::{MimeFilter, TransientFile, UploadPolicy};

const SUMMARY_FAILED: &str = "Failed to generate summary";

pub fn summary_upload_policy(max_bytes: u64) -> UploadPolicy {
    UploadPolicy {
        field_name: "pdf".to_string(),
        missing_message: "No PDF uploaded".to_string(),
        mime_filter: MimeFilter::Exact("application/pdf".to_string()),
        rejected_type_message: "Only PDF files are allowed".to_string(),
        max_bytes,
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

pub async fn generate_summary(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SummaryResponse>, AppError> {
    let upload = state
        .uploads
        .receive(multipart, &state.upload_policy)
        .await?;

    tracing::info!(
        filename = upload.original_name().unwrap_or("unnamed"),
        size = upload.size(),
        "Summary requested"
    );

    let result = summary_for(&state, &upload).await;
    upload.release().await;

    let summary = result?;
    Ok(Json(SummaryResponse { summary }))
}

async fn summary_for(state: &AppState, upload: &TransientFile) -> Result<String, AppError> {
    let pdf = upload.read().await?;

    let text = document_text(state.extractor.as_ref(), pdf)
        .await
        .map_err(|e| AppError::processing(e.public_message(), e))?;

    tracing::debug!(chars = text.chars().count(), "Document text extracted");

    let parts = [PromptPart::text(summary_prompt(&text))];

    let response = generate_with_metrics(
        state.provider.as_ref(),
        &parts,
        &state.generation_params,
    )
    .await
    .map_err(|e| AppError::processing(SUMMARY_FAILED, e))?;

    Ok(response.text.trim().to_string())
}
