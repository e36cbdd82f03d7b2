use service_core::config::{self as core_config, get_env, GenaiSettings};
use service_core::error::AppError;
use std::path::PathBuf;

/// Port used when `APP__PORT` is not set.
pub const DEFAULT_PORT: u16 = 5001;

/// Largest accepted PDF.
pub const MAX_PDF_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub common: core_config::Config,
    pub genai: GenaiSettings,
    pub upload: UploadConfig,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
}

impl SummaryConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load(DEFAULT_PORT)?;
        let is_prod = core_config::is_prod();

        Ok(SummaryConfig {
            common: common_config,
            genai: GenaiSettings::load(is_prod)?,
            upload: UploadConfig {
                dir: get_env("UPLOAD_DIR", Some("uploads"), is_prod)?.into(),
                max_bytes: MAX_PDF_BYTES,
            },
            static_dir: get_env(
                "STATIC_DIR",
                Some(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
                is_prod,
            )?
            .into(),
        })
    }
}
