//! Purpose-built Twilio REST client and webhook toolbox
//!
//! Covers exactly what the gateway needs: sending SMS through the Messages
//! endpoint, parsing form-encoded webhook payloads, and the status enums
//! Twilio uses on the wire. Not an SDK.

pub mod signature;
pub mod twiml;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::TwilioConfig;
use crate::{Error, Result};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// An SMS to send
#[derive(Debug, Clone)]
pub struct OutgoingSms {
    pub to: String,
    /// The business's gateway number; ignored when a messaging service is
    /// configured account-wide
    pub from: String,
    pub body: String,
}

/// Receipt for a created message
#[derive(Debug, Clone)]
pub struct SentSms {
    pub sid: String,
    pub status: MessageStatus,
}

/// Outbound SMS seam, so the pipeline can be driven by a recording fake in
/// tests
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send one SMS
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be created
    async fn send(&self, sms: OutgoingSms) -> Result<SentSms>;
}

/// Twilio REST client
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    messaging_service_sid: Option<String>,
    status_callback_url: Option<String>,
}

impl TwilioClient {
    /// Build a client from config, or None when credentials are missing
    #[must_use]
    pub fn from_config(config: &TwilioConfig) -> Option<Self> {
        let account_sid = config.account_sid.clone()?;
        let auth_token = config.auth_token.clone()?;

        Some(Self {
            http: reqwest::Client::new(),
            account_sid,
            auth_token,
            messaging_service_sid: config.messaging_service_sid.clone(),
            status_callback_url: config
                .public_base_url
                .as_ref()
                .map(|base| format!("{base}/webhooks/twilio/sms/status")),
        })
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send(&self, sms: OutgoingSms) -> Result<SentSms> {
        let url = format!("{API_BASE}/Accounts/{}/Messages.json", self.account_sid);

        let mut params: Vec<(&str, &str)> = vec![("To", &sms.to), ("Body", &sms.body)];
        if let Some(msid) = &self.messaging_service_sid {
            params.push(("MessagingServiceSid", msid));
        } else {
            params.push(("From", &sms.from));
        }
        if let Some(callback) = &self.status_callback_url {
            params.push(("StatusCallback", callback));
        }

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            return Err(Error::Twilio(format!(
                "message create failed ({status}): code {} {}",
                body.code.unwrap_or(0),
                body.message.unwrap_or_default()
            )));
        }

        let resource: MessageResource = response.json().await?;
        tracing::debug!(sid = %resource.sid, to = %sms.to, "sms created");

        Ok(SentSms {
            status: MessageStatus::from_str(&resource.status).unwrap_or(MessageStatus::Queued),
            sid: resource.sid,
        })
    }
}

/// Message resource returned by the Messages endpoint
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    status: String,
}

/// Error body returned by the Twilio API
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Voice call status as delivered in webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "no-answer" => Some(Self::NoAnswer),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::NoAnswer => "no-answer",
            Self::Canceled => "canceled",
        }
    }

    /// Whether the call has ended
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled
        )
    }
}

/// Message delivery status as delivered in webhooks and REST responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Queued,
    Accepted,
    Scheduled,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    Receiving,
    Received,
}

impl MessageStatus {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "accepted" => Some(Self::Accepted),
            "scheduled" => Some(Self::Scheduled),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "undelivered" => Some(Self::Undelivered),
            "failed" => Some(Self::Failed),
            "receiving" => Some(Self::Receiving),
            "received" => Some(Self::Received),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Accepted => "accepted",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Undelivered => "undelivered",
            Self::Failed => "failed",
            Self::Receiving => "receiving",
            Self::Received => "received",
        }
    }

    /// Whether delivery conclusively failed
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Undelivered | Self::Failed)
    }
}

/// Parse a form-encoded webhook body into ordered key/value pairs
///
/// Twilio encodes spaces as `+`. Order is preserved for signature
/// validation, which sorts keys itself.
#[must_use]
pub fn parse_form_params(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Find a webhook parameter by name
#[must_use]
pub fn form_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_status_parsing() {
        assert_eq!(CallStatus::from_str("no-answer"), Some(CallStatus::NoAnswer));
        assert_eq!(CallStatus::from_str("completed"), Some(CallStatus::Completed));
        assert_eq!(CallStatus::from_str("ringing"), Some(CallStatus::Ringing));
        assert_eq!(CallStatus::from_str("hold"), None);

        assert!(CallStatus::NoAnswer.is_terminal());
        assert!(CallStatus::Busy.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_message_status_parsing() {
        assert_eq!(
            MessageStatus::from_str("delivered"),
            Some(MessageStatus::Delivered)
        );
        assert!(MessageStatus::Failed.is_failure());
        assert!(MessageStatus::Undelivered.is_failure());
        assert!(!MessageStatus::Delivered.is_failure());
        assert_eq!(MessageStatus::from_str("delivered").unwrap().as_str(), "delivered");
    }

    #[test]
    fn test_parse_form_params() {
        let params = parse_form_params("From=%2B15551234567&Body=Hello+there%21&To=%2B15550001111");
        assert_eq!(form_param(&params, "From"), Some("+15551234567"));
        assert_eq!(form_param(&params, "Body"), Some("Hello there!"));
        assert_eq!(form_param(&params, "To"), Some("+15550001111"));
        assert_eq!(form_param(&params, "CallSid"), None);
    }

    #[test]
    fn test_parse_form_params_edge_cases() {
        assert!(parse_form_params("").is_empty());

        let params = parse_form_params("Flag&Body=");
        assert_eq!(form_param(&params, "Flag"), Some(""));
        assert_eq!(form_param(&params, "Body"), Some(""));
    }
}
