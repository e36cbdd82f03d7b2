//! Transient upload handling.
//!
//! A request's uploaded file is streamed into the upload directory under a
//! fresh UUID name and handed out as a [`TransientFile`]. The file lives
//! exactly as long as that value: [`TransientFile::release`] deletes it at
//! the end of the request and `Drop` deletes it if the request never got
//! that far (handler cancelled, panic).

use crate::error::AppError;
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartRejection};
use metrics::counter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Missing(String),

    #[error("{message}")]
    UnsupportedType { mime_type: String, message: String },

    #[error("File too large (max {} MB)", .max_bytes / (1024 * 1024))]
    TooLarge { max_bytes: u64 },

    #[error("Invalid multipart request: {0}")]
    Multipart(String),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    fn reason(&self) -> &'static str {
        match self {
            UploadError::Missing(_) => "missing",
            UploadError::UnsupportedType { .. } => "unsupported_type",
            UploadError::TooLarge { .. } => "too_large",
            UploadError::Multipart(_) => "malformed",
            UploadError::Io(_) => "io",
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(e) => AppError::InternalError(anyhow::Error::new(e)),
            UploadError::Multipart(_) => AppError::bad_request("Invalid multipart request"),
            other => AppError::bad_request(other),
        }
    }
}

/// Which declared MIME types an upload field accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum MimeFilter {
    Any,
    /// e.g. `image/`
    Prefix(String),
    Exact(String),
}

impl MimeFilter {
    pub fn matches(&self, mime_type: &str) -> bool {
        let mime_type = essence(mime_type);
        match self {
            MimeFilter::Any => true,
            MimeFilter::Prefix(prefix) => mime_type.starts_with(prefix.as_str()),
            MimeFilter::Exact(expected) => mime_type == expected.as_str(),
        }
    }
}

/// Lowercased type/subtype without parameters.
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Rules for the single file field a route accepts.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub field_name: String,
    pub missing_message: String,
    pub mime_filter: MimeFilter,
    pub rejected_type_message: String,
    pub max_bytes: u64,
}

/// Directory that holds in-flight uploads.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Creates the directory if it does not exist.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists the policy's file field from `multipart`.
    ///
    /// A request that is not multipart at all counts as a missing file. The
    /// declared type is checked before any byte is written, and the size cap
    /// is enforced while streaming, so a rejected upload leaves nothing
    /// behind.
    pub async fn receive(
        &self,
        multipart: Result<Multipart, MultipartRejection>,
        policy: &UploadPolicy,
    ) -> Result<TransientFile, UploadError> {
        let mut multipart = match multipart {
            Ok(multipart) => multipart,
            Err(rejection) => {
                tracing::debug!(reason = %rejection.body_text(), "Request body is not multipart");
                counter!("uploads_rejected_total", "reason" => "missing").increment(1);
                return Err(UploadError::Missing(policy.missing_message.clone()));
            }
        };
        let multipart = &mut multipart;

        let result = self.receive_inner(multipart, policy).await;
        if let Err(e) = &result {
            if let UploadError::UnsupportedType { mime_type, .. } = e {
                tracing::info!(mime_type = %mime_type, "Upload rejected: unsupported type");
            }
            counter!("uploads_rejected_total", "reason" => e.reason()).increment(1);
            if matches!(e, UploadError::UnsupportedType { .. } | UploadError::TooLarge { .. }) {
                drain(multipart).await;
            }
        }
        result
    }

    async fn receive_inner(
        &self,
        multipart: &mut Multipart,
        policy: &UploadPolicy,
    ) -> Result<TransientFile, UploadError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadError::Multipart(e.body_text()))?
        {
            if field.name() != Some(policy.field_name.as_str()) {
                continue;
            }
            // Browsers send an empty part when the file input was left blank.
            if field.file_name() == Some("") {
                continue;
            }

            let mime_type = field.content_type().unwrap_or(DEFAULT_MIME_TYPE).to_string();
            if !policy.mime_filter.matches(&mime_type) {
                return Err(UploadError::UnsupportedType {
                    mime_type,
                    message: policy.rejected_type_message.clone(),
                });
            }

            return self.persist(field, mime_type, policy.max_bytes).await;
        }

        Err(UploadError::Missing(policy.missing_message.clone()))
    }

    async fn persist(
        &self,
        mut field: Field<'_>,
        mime_type: String,
        max_bytes: u64,
    ) -> Result<TransientFile, UploadError> {
        let original_name = field.file_name().map(str::to_string);
        let extension = original_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
            .to_ascii_lowercase();

        let path = self.dir.join(format!("{}.{}", Uuid::new_v4(), extension));

        // Own the path before the first write so every early return cleans up.
        let mut transient = TransientFile {
            path,
            mime_type,
            size: 0,
            original_name,
            released: false,
        };

        let mut file = fs::File::create(&transient.path).await?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| UploadError::Multipart(e.body_text()))?
        {
            transient.size += chunk.len() as u64;
            if transient.size > max_bytes {
                drop(file);
                transient.release().await;
                return Err(UploadError::TooLarge { max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(
            path = %transient.path.display(),
            size = transient.size,
            mime_type = %transient.mime_type,
            "Upload persisted"
        );

        Ok(transient)
    }
}

/// Reads the rest of the body so the client sees the error response instead
/// of a reset connection. Bounded by the route's body limit.
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

/// A request-scoped file in the upload directory.
///
/// The `Drop` fallback deletes with blocking `std::fs` on whichever thread
/// drops the value; it only runs when `release` was skipped.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    mime_type: String,
    size: u64,
    original_name: Option<String>,
    released: bool,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type declared by the client.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }

    /// Deletes the file. Deletion errors are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Transient file deleted"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete transient file"
            ),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(
                path = %self.path.display(),
                "Transient file deleted on drop"
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete transient file on drop"
            ),
        }
    }
}
