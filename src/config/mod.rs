//! Configuration management for the text-back gateway

pub mod file;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::Result;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, cache, etc)
    pub data_dir: PathBuf,

    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Twilio account configuration
    pub twilio: TwilioConfig,

    /// LLM reply generation configuration
    pub llm: LlmConfig,

    /// Decision pipeline tunables
    pub pipeline: PipelineConfig,

    /// Stripe billing webhook configuration
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind (default 0.0.0.0)
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// API key for admin endpoints (from `TEXTBACK_API_KEY` env)
    pub api_key: Option<String>,

    /// Admin API rate limit in requests per minute (None = unlimited)
    pub admin_rate_limit_rpm: Option<u32>,
}

/// Twilio account configuration
///
/// The gateway never wraps the Twilio SDK; these values feed the
/// purpose-built REST client and the webhook signature validator.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    /// Account SID (`TWILIO_ACCOUNT_SID`)
    pub account_sid: Option<String>,

    /// Auth token (`TWILIO_AUTH_TOKEN`), used for REST auth and
    /// `X-Twilio-Signature` validation
    pub auth_token: Option<SecretString>,

    /// Messaging service SID, used as the From fallback for outbound SMS
    pub messaging_service_sid: Option<String>,

    /// Public base URL of this gateway, used to reconstruct the exact
    /// webhook URL Twilio signed (e.g. `https://gw.example.com`)
    pub public_base_url: Option<String>,

    /// Skip webhook signature validation (local development only)
    pub skip_signature_validation: bool,
}

impl TwilioConfig {
    /// Whether enough is configured to make REST calls
    #[must_use]
    pub const fn can_send(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some()
    }
}

/// LLM reply generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key (`OPENAI_API_KEY`); None disables LLM paths entirely
    pub api_key: Option<SecretString>,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Model identifier for chat completions
    pub model: String,

    /// Max completion tokens per reply
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Whether LLM-backed replies and classification are available
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Decision pipeline tunables
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// TTL for the webhook dedupe cache, in seconds
    pub dedup_ttl_secs: u64,

    /// Completed calls shorter than this count as missed, in seconds
    pub missed_call_max_secs: u64,

    /// Per-number outbound rate limit window, in seconds
    pub rate_limit_window_secs: i64,

    /// Max outbound messages per number per window
    pub rate_limit_max_sends: i64,

    /// Send owner alert texts for missed calls and urgent messages
    pub owner_alerts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: 300,
            missed_call_max_secs: 10,
            rate_limit_window_secs: 3600,
            rate_limit_max_sends: 5,
            owner_alerts: true,
        }
    }
}

/// Stripe billing webhook configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Webhook signing secret (`STRIPE_WEBHOOK_SECRET`); None rejects the
    /// Stripe route with 503
    pub stripe_webhook_secret: Option<SecretString>,

    /// Allow sends for businesses that have never been billed
    /// (`subscription_status = none`), so onboarding works before checkout
    pub allow_unbilled: bool,
}

impl Config {
    /// Load configuration with priority: env > TOML file > defaults
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);

        // Data directory (~/.local/share/harborline/textback on Linux)
        let data_dir = std::env::var("TEXTBACK_DATA_DIR").map_or_else(
            |_| {
                directories::BaseDirs::new().map_or_else(
                    || PathBuf::from("."),
                    |d| d.data_dir().join("harborline").join("textback"),
                )
            },
            PathBuf::from,
        );
        std::fs::create_dir_all(&data_dir)?;

        let db_path = std::env::var("TEXTBACK_DB_PATH")
            .ok()
            .map(PathBuf::from)
            .or_else(|| fc.db_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join("textback.db"));

        // Server config (env > toml > default)
        let server = ServerConfig {
            host: std::env::var("TEXTBACK_HOST")
                .ok()
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: std::env::var("TEXTBACK_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(8340),
            api_key: std::env::var("TEXTBACK_API_KEY").ok().or(fc.server.api_key),
            admin_rate_limit_rpm: std::env::var("TEXTBACK_ADMIN_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.admin_rate_limit_rpm),
        };

        // Twilio config (env > toml)
        let twilio = TwilioConfig {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID")
                .ok()
                .or(fc.twilio.account_sid),
            auth_token: std::env::var("TWILIO_AUTH_TOKEN")
                .ok()
                .or(fc.twilio.auth_token)
                .map(SecretString::from),
            messaging_service_sid: std::env::var("TWILIO_MESSAGING_SERVICE_SID")
                .ok()
                .or(fc.twilio.messaging_service_sid),
            public_base_url: std::env::var("TEXTBACK_PUBLIC_URL")
                .ok()
                .or(fc.twilio.public_base_url)
                .map(|u| u.trim_end_matches('/').to_string()),
            skip_signature_validation: env_flag("TEXTBACK_SKIP_SIGNATURE_VALIDATION")
                .or(fc.twilio.skip_signature_validation)
                .unwrap_or(false),
        };

        // LLM config (env > toml > default)
        let llm = LlmConfig {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .or(fc.llm.api_key)
                .map(SecretString::from),
            base_url: std::env::var("TEXTBACK_LLM_BASE_URL")
                .ok()
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: std::env::var("TEXTBACK_LLM_MODEL")
                .ok()
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_tokens: std::env::var("TEXTBACK_LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.llm.max_tokens)
                .unwrap_or(200),
            timeout_secs: std::env::var("TEXTBACK_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.llm.timeout_secs)
                .unwrap_or(20),
        };

        // Pipeline tunables (env > toml > default)
        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            dedup_ttl_secs: std::env::var("TEXTBACK_DEDUP_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.dedup_ttl_secs)
                .unwrap_or(defaults.dedup_ttl_secs),
            missed_call_max_secs: std::env::var("TEXTBACK_MISSED_CALL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.missed_call_max_secs)
                .unwrap_or(defaults.missed_call_max_secs),
            rate_limit_window_secs: std::env::var("TEXTBACK_RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.rate_limit_window_secs)
                .unwrap_or(defaults.rate_limit_window_secs),
            rate_limit_max_sends: std::env::var("TEXTBACK_RATE_LIMIT_MAX_SENDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.rate_limit_max_sends)
                .unwrap_or(defaults.rate_limit_max_sends),
            owner_alerts: env_flag("TEXTBACK_OWNER_ALERTS")
                .or(fc.pipeline.owner_alerts)
                .unwrap_or(defaults.owner_alerts),
        };

        // Billing (env > toml)
        let billing = BillingConfig {
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .or(fc.billing.stripe_webhook_secret)
                .map(SecretString::from),
            allow_unbilled: env_flag("TEXTBACK_ALLOW_UNBILLED")
                .or(fc.billing.allow_unbilled)
                .unwrap_or(true),
        };

        Ok(Self {
            data_dir,
            db_path,
            server,
            twilio,
            llm,
            pipeline,
            billing,
        })
    }
}

/// Parse a boolean env var ("1"/"true" = true)
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
