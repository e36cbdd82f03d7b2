use service_core::config::{self as core_config, get_env, GenaiSettings};
use service_core::error::AppError;
use std::path::PathBuf;

/// Port used when `APP__PORT` is not set.
pub const DEFAULT_PORT: u16 = 5000;

/// Upload cap applied when `MAX_IMAGE_BYTES` is not set.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CaptionConfig {
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

impl CaptionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load(DEFAULT_PORT)?;
        let is_prod = core_config::is_prod();

        Ok(CaptionConfig {
            common: common_config,
            genai: GenaiSettings::load(is_prod)?,
            upload: UploadConfig {
                dir: get_env("UPLOAD_DIR", Some("uploads"), is_prod)?.into(),
                max_bytes: get_env(
                    "MAX_IMAGE_BYTES",
                    Some(&DEFAULT_MAX_IMAGE_BYTES.to_string()),
                    is_prod,
                )?
                .parse()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid MAX_IMAGE_BYTES: {}", e)))?,
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
