//! HTTP surface of the text-back gateway
//!
//! Two route families share one server: the Twilio/Stripe webhook ingress
//! and the Bearer-key-protected admin API. Webhook handlers validate
//! signatures themselves because they need the raw form body; admin routes
//! sit behind the API-key middleware and a global rate limiter.

pub mod admin;
mod auth;
pub mod health;
pub mod rate_limit;
pub mod webhooks;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, TwilioConfig};
use crate::db::{BusinessRepo, DbPool, EventRepo, RateLimitRepo};
use crate::directory::BusinessDirectory;
use crate::events::EventLogger;
use crate::llm::LlmClient;
use crate::pipeline::{EventDedup, Responder};
use crate::twilio::SmsSender;
use crate::{Error, Result};

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    pub api_key: Option<String>,
    pub businesses: BusinessRepo,
    pub events: EventRepo,
    pub directory: BusinessDirectory,
    pub responder: Responder,
    /// SID dedupe shared by the voice and SMS webhook handlers
    pub dedup: Mutex<EventDedup>,
    pub twilio: TwilioConfig,
    pub stripe_webhook_secret: Option<SecretString>,
    /// Whether an LLM client is attached (readiness reporting only)
    pub llm_configured: bool,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
#[must_use]
pub struct ApiServerBuilder {
    config: Config,
    db: DbPool,
    sender: Option<Arc<dyn SmsSender>>,
    llm: Option<Arc<LlmClient>>,
}

impl ApiServerBuilder {
    #[must_use]
    pub fn new(config: Config, db: DbPool) -> Self {
        Self {
            config,
            db,
            sender: None,
            llm: None,
        }
    }

    /// Set the outbound SMS sender (the Twilio client, or a fake in tests)
    #[must_use]
    pub fn sender(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the LLM client for drafting and urgency classification
    #[must_use]
    pub fn llm(mut self, llm: Arc<LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let businesses = BusinessRepo::new(self.db.clone());
        let events = EventRepo::new(self.db.clone());
        let directory = BusinessDirectory::new(businesses.clone());

        let mut responder = Responder::new(
            directory.clone(),
            RateLimitRepo::new(self.db.clone()),
            EventLogger::new(events.clone()),
            self.config.pipeline.clone(),
            self.config.billing.allow_unbilled,
        );
        if let Some(sender) = self.sender {
            responder = responder.with_sender(sender);
        }
        let llm_configured = self.llm.is_some();
        if let Some(llm) = self.llm {
            responder = responder.with_llm(llm);
        }

        let dedup = Mutex::new(EventDedup::new(Duration::from_secs(
            self.config.pipeline.dedup_ttl_secs,
        )));

        let rate_limiter = self
            .config
            .server
            .admin_rate_limit_rpm
            .map(rate_limit::create_limiter);

        if self.config.server.api_key.is_none() {
            tracing::warn!("no admin API key configured, admin routes are open");
        }

        let state = Arc::new(ApiState {
            db: self.db,
            api_key: self.config.server.api_key,
            businesses,
            events,
            directory,
            responder,
            dedup,
            twilio: self.config.twilio,
            stripe_webhook_secret: self.config.billing.stripe_webhook_secret,
            llm_configured,
            rate_limiter,
        });

        ApiServer {
            state,
            host: self.config.server.host,
            port: self.config.server.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest("/webhooks", webhooks::router(self.state.clone()))
            .nest("/api/admin", admin::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until ctrl-c
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Config(format!("server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
