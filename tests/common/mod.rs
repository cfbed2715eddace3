//! Shared test utilities

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;

use textback_gateway::api::ApiServerBuilder;
use textback_gateway::config::{
    BillingConfig, Config, LlmConfig, PipelineConfig, ServerConfig, TwilioConfig,
};
use textback_gateway::db::{self, Business, BusinessRepo, DbPool, NewBusiness};
use textback_gateway::twilio::{MessageStatus, OutgoingSms, SentSms, SmsSender, signature};
use textback_gateway::{Error, Result};

pub const AUTH_TOKEN: &str = "test-auth-token";
pub const BASE_URL: &str = "https://gw.test";
pub const API_KEY: &str = "test-api-key";
pub const STRIPE_SECRET: &str = "whsec_test";

pub const BUSINESS_PHONE: &str = "+15550001111";
pub const OWNER_PHONE: &str = "+15550002222";
pub const CALLER_PHONE: &str = "+15557654321";

/// A fully-populated config pointing at test credentials
#[must_use]
pub fn test_config() -> Config {
    Config {
        data_dir: PathBuf::from("/tmp"),
        db_path: PathBuf::from(":memory:"),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            api_key: Some(API_KEY.to_string()),
            admin_rate_limit_rpm: None,
        },
        twilio: TwilioConfig {
            account_sid: None,
            auth_token: Some(SecretString::from(AUTH_TOKEN)),
            messaging_service_sid: None,
            public_base_url: Some(BASE_URL.to_string()),
            skip_signature_validation: false,
        },
        llm: LlmConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 200,
            timeout_secs: 5,
        },
        pipeline: PipelineConfig::default(),
        billing: BillingConfig {
            stripe_webhook_secret: Some(SecretString::from(STRIPE_SECRET)),
            allow_unbilled: true,
        },
    }
}

/// Outbound SMS fake that records instead of sending
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutgoingSms>>,
}

impl RecordingSender {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingSms> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsSender for RecordingSender {
    async fn send(&self, sms: OutgoingSms) -> Result<SentSms> {
        let mut sent = self.sent.lock().map_err(|_| Error::Twilio("poisoned".into()))?;
        let sid = format!("SM{:04}", sent.len());
        sent.push(sms);
        Ok(SentSms {
            sid,
            status: MessageStatus::Queued,
        })
    }
}

/// A router wired to an in-memory database and a recording sender
pub struct TestGateway {
    pub router: axum::Router,
    pub pool: DbPool,
    pub sender: Arc<RecordingSender>,
    pub business: Business,
}

/// Build a gateway with one seeded business
#[must_use]
pub fn gateway() -> TestGateway {
    gateway_with(test_config())
}

#[must_use]
pub fn gateway_with(config: Config) -> TestGateway {
    let pool = db::init_memory().expect("failed to init test db");
    let repo = BusinessRepo::new(pool.clone());
    let business = repo
        .upsert(&NewBusiness {
            name: "Juniper Plumbing".to_string(),
            phone_number: BUSINESS_PHONE.to_string(),
            owner_phone: OWNER_PHONE.to_string(),
            ordering_url: Some("https://order.example.com".to_string()),
            ..NewBusiness::default()
        })
        .expect("failed to seed business");

    let sender = RecordingSender::new();
    let router = ApiServerBuilder::new(config, pool.clone())
        .sender(sender.clone())
        .build()
        .router();

    TestGateway {
        router,
        pool,
        sender,
        business,
    }
}

/// Encode form params the way Twilio posts them
#[must_use]
pub fn form_body(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// A form POST signed the way Twilio signs webhooks
#[must_use]
pub fn signed_twilio_request(path: &str, params: &[(&str, &str)]) -> Request<Body> {
    let owned: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let url = format!("{BASE_URL}{path}");
    let sig = signature::expected_signature(AUTH_TOKEN, &url, &owned)
        .expect("failed to compute signature");

    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-twilio-signature", sig)
        .body(Body::from(form_body(params)))
        .unwrap()
}

/// A Stripe webhook POST with a valid `Stripe-Signature` header
#[must_use]
pub fn signed_stripe_request(payload: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(STRIPE_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());

    Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", format!("t={timestamp},v1={sig}"))
        .body(Body::from(payload.to_string()))
        .unwrap()
}

/// Poll until the recording sender has at least `at_least` messages
pub async fn wait_for_sends(sender: &RecordingSender, at_least: usize) -> Vec<OutgoingSms> {
    for _ in 0..100 {
        let sent = sender.sent();
        if sent.len() >= at_least {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sender.sent()
}
