use crate::error::AppError;
use config::{Config as Cfg, File};
use secrecy::Secret;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Gemini REST endpoint used when `GEMINI_API_BASE` is not set.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub port: u16,
}

impl Config {
    /// Loads the common settings. `default_port` applies when neither a
    /// `configuration` file nor `APP__PORT` provides one.
    pub fn load(default_port: u16) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .set_default("port", i64::from(default_port))?
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Settings for the external generative model.
#[derive(Debug, Clone)]
pub struct GenaiSettings {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<i32>,
}

impl GenaiSettings {
    pub fn load(is_prod: bool) -> Result<Self, AppError> {
        let timeout_secs = get_env(
            "GENAI_REQUEST_TIMEOUT_SECS",
            Some(&DEFAULT_REQUEST_TIMEOUT_SECS.to_string()),
            is_prod,
        )?
        .parse()
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid GENAI_REQUEST_TIMEOUT_SECS: {}", e))
        })?;

        Ok(GenaiSettings {
            api_key: Secret::new(get_env("GEMINI_API_KEY", None, is_prod)?),
            model: get_env("GEMINI_MODEL", Some(DEFAULT_GEMINI_MODEL), is_prod)?,
            api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
            request_timeout: Duration::from_secs(timeout_secs),
            temperature: parse_optional("GENAI_TEMPERATURE")?,
            max_output_tokens: parse_optional("GENAI_MAX_OUTPUT_TOKENS")?,
        })
    }
}

/// True when `ENVIRONMENT=prod`, which turns every default off.
pub fn is_prod() -> bool {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod"
}

pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
