//! Application Configuration Module
//!
//! Centralizes the configuration for the monitoring service. Settings
//! are loaded from environment variables into a single shareable
//! struct.

use std::env;
use std::time::Duration;

use tracing::Level;

use crate::client::{DEFAULT_MODEL, GEMINI_API_KEY};

/// Default base URL of the actuator service.
const DEFAULT_ACTUATOR_BASE_URL: &str = "http://localhost:3001";

/// Default wall-clock period between still-image captures.
const DEFAULT_IMAGE_INTERVAL_MS: u64 = 1000;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub model: String,
    pub actuator_base_url: String,
    pub image_interval: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: secret key for the inference endpoint. Required.
    // *   `SENTINEL_MODEL`: (Optional) model override.
    // *   `ACTUATOR_BASE_URL`: (Optional) base URL of the actuator service.
    // *   `SENTINEL_IMAGE_INTERVAL_MS`: (Optional) still-image cadence in milliseconds. Defaults to 1000.
    // *   `RUST_LOG`: (Optional) the logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present; useful for local development.
        dotenvy::dotenv().ok();

        let gemini_api_key = env::var(GEMINI_API_KEY)
            .map_err(|_| ConfigError::MissingVar(GEMINI_API_KEY.to_string()))?;

        let model = env::var("SENTINEL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let actuator_base_url = env::var("ACTUATOR_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_ACTUATOR_BASE_URL.to_string());

        let image_interval_ms = match env::var("SENTINEL_IMAGE_INTERVAL_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("SENTINEL_IMAGE_INTERVAL_MS", raw))?,
            Err(_) => DEFAULT_IMAGE_INTERVAL_MS,
        };

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            model,
            actuator_base_url,
            image_interval: Duration::from_millis(image_interval_ms),
            log_level,
        })
    }
}
