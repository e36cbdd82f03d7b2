//! Inline-encode strategy: the uploaded image travels to the model as a
//! base64 payload inside the JSON request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use service_core::genai::PromptPart;
use service_core::upload::TransientFile;

#[derive(Debug, Clone, PartialEq)]
pub struct InlinePayload {
    pub mime_type: String,
    pub data: String,
}

impl From<InlinePayload> for PromptPart {
    fn from(payload: InlinePayload) -> Self {
        PromptPart::InlineData {
            mime_type: payload.mime_type,
            data: payload.data,
        }
    }
}

/// Reads the whole file and encodes it, tagged with the declared MIME type.
pub async fn encode_inline(file: &TransientFile) -> anyhow::Result<InlinePayload> {
    let bytes = file.read().await?;
    let data = tokio::task::spawn_blocking(move || STANDARD.encode(bytes)).await?;

    Ok(InlinePayload {
        mime_type: file.mime_type().to_string(),
        data,
    })
}
