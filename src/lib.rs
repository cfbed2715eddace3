//! Textback Gateway - missed-call text-back and SMS auto-reply for small
//! businesses
//!
//! A business forwards its Twilio number here; the gateway answers calls
//! with a short TwiML greeting, texts missed callers back, auto-replies to
//! inbound SMS (FAQ match, ordering link, urgency escalation, LLM draft,
//! or template), alerts the owner, and records every step for analytics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Twilio                          │
//! │  voice status  │  inbound SMS  │  delivery status    │
//! └───────────────────────┬──────────────────────────────┘
//!                         │ signed webhooks
//! ┌───────────────────────▼──────────────────────────────┐
//! │                  Textback Gateway                     │
//! │  dedupe │ business lookup │ decision pipeline │ send │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//!        SQLite (tenants, FAQs, events, rate limits)
//! ```

pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod twilio;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use directory::BusinessDirectory;
pub use error::{Error, Result};
pub use events::EventLogger;
pub use llm::LlmClient;
pub use pipeline::{EventDedup, Responder};
pub use twilio::{SmsSender, TwilioClient};
