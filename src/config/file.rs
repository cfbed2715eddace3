//! TOML configuration file loading
//!
//! Supports `~/.config/harborline/textback/config.toml` as a persistent
//! config source. All fields are optional, the file is a partial overlay on
//! top of defaults, and environment variables win over the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// SQLite database path override
    #[serde(default)]
    pub db_path: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Twilio account configuration
    #[serde(default)]
    pub twilio: TwilioFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Decision pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Stripe billing configuration
    #[serde(default)]
    pub billing: BillingFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind host
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,

    /// Admin API key
    pub api_key: Option<String>,

    /// Admin rate limit (requests/minute)
    pub admin_rate_limit_rpm: Option<u32>,
}

/// Twilio account configuration
#[derive(Debug, Default, Deserialize)]
pub struct TwilioFileConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub public_base_url: Option<String>,
    pub skip_signature_validation: Option<bool>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// API key (env `OPENAI_API_KEY` wins)
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Max completion tokens
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Decision pipeline tunables
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    pub dedup_ttl_secs: Option<u64>,
    pub missed_call_max_secs: Option<u64>,
    pub rate_limit_window_secs: Option<i64>,
    pub rate_limit_max_sends: Option<i64>,
    pub owner_alerts: Option<bool>,
}

/// Stripe billing configuration
#[derive(Debug, Default, Deserialize)]
pub struct BillingFileConfig {
    pub stripe_webhook_secret: Option<String>,
    pub allow_unbilled: Option<bool>,
}

/// Load the TOML config file from an explicit path or the standard location
///
/// Returns `GatewayConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
pub fn load_config_file(override_path: Option<&Path>) -> GatewayConfigFile {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => match config_file_path() {
            Some(p) => p,
            None => return GatewayConfigFile::default(),
        },
    };

    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GatewayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/harborline/textback/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("harborline")
            .join("textback")
            .join("config.toml")
    })
}
