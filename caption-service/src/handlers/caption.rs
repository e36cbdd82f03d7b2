use crate::services::encode_inline;
use crate::startup::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use service_core::genai::{generate_with_metrics, PromptPart};
use service_core::upload::{MimeFilter, TransientFile, UploadPolicy};

pub const CAPTION_PROMPT: &str = "very simply describe the image in 1 line";

const CAPTION_FAILED: &str = "Failed to generate caption";

pub fn caption_upload_policy(max_bytes: u64) -> UploadPolicy {
    UploadPolicy {
        field_name: "image".to_string(),
        missing_message: "No image uploaded".to_string(),
        mime_filter: MimeFilter::Prefix("image/".to_string()),
        rejected_type_message: "Only image uploads are supported".to_string(),
        max_bytes,
    }
}

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub caption: String,
}

pub async fn generate_caption(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionResponse>, AppError> {
    let upload = state
        .uploads
        .receive(multipart, &state.upload_policy)
        .await?;

    tracing::info!(
        filename = upload.original_name().unwrap_or("unnamed"),
        mime_type = %upload.mime_type(),
        size = upload.size(),
        "Caption requested"
    );

    let result = caption_for(&state, &upload).await;
    upload.release().await;

    let caption = result?;
    Ok(Json(CaptionResponse { caption }))
}

async fn caption_for(state: &AppState, upload: &TransientFile) -> Result<String, AppError> {
    let payload = encode_inline(upload)
        .await
        .map_err(|e| AppError::processing(CAPTION_FAILED, e))?;

    let parts = [PromptPart::text(CAPTION_PROMPT), payload.into()];

    let response = generate_with_metrics(
        state.provider.as_ref(),
        &parts,
        &state.generation_params,
    )
    .await
    .map_err(|e| AppError::processing(CAPTION_FAILED, e))?;

    Ok(response.text.trim().to_string())
}
