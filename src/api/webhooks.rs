//! Webhook ingress for Twilio and Stripe
//!
//! Twilio handlers validate `X-Twilio-Signature` over the raw form body,
//! acknowledge within the request, and push real work onto spawned tasks;
//! Twilio retries anything slow or non-2xx, so the only non-200 answer is
//! a signature rejection. Stripe events are verified against the endpoint
//! secret and applied synchronously (they are rare and cheap).

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use secrecy::ExposeSecret;
use serde::Serialize;

use super::ApiState;
use crate::billing;
use crate::db::{EventKind, NewEvent};
use crate::pipeline::{InboundSms, VoiceEvent, dedup, render_template};
use crate::twilio::{
    CallStatus, MessageStatus, form_param, parse_form_params, signature, twiml,
};

/// Spoken to forwarded callers before the text-back goes out
const VOICE_GREETING: &str =
    "Thanks for calling {business}. We can't pick up right now, but we're texting you back at this number in just a moment.";

const VOICE_GREETING_UNKNOWN: &str =
    "Thanks for calling. We can't take your call right now. Please text us instead.";

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/twilio/voice", post(voice_inbound))
        .route("/twilio/voice/status", post(voice_status))
        .route("/twilio/sms", post(sms_inbound))
        .route("/twilio/sms/status", post(sms_status))
        .route("/stripe", post(stripe_event))
        .with_state(state)
}

fn twiml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, twiml::CONTENT_TYPE)], body).into_response()
}

/// Reconstruct the exact URL Twilio signed for this request
///
/// Behind a proxy the request URI is relative, so the public base URL from
/// config wins; the Host header is the fallback for direct exposure.
fn signed_url(state: &ApiState, headers: &HeaderMap, path: &str) -> Option<String> {
    if let Some(base) = &state.twilio.public_base_url {
        return Some(format!("{base}{path}"));
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    Some(format!("{scheme}://{host}{path}"))
}

/// Validate the Twilio signature for one webhook request
///
/// Allows the request when validation is explicitly skipped (local dev) or
/// when no auth token is configured, matching the admin-auth posture for
/// unconfigured local gateways.
fn check_twilio_signature(
    state: &ApiState,
    headers: &HeaderMap,
    path: &str,
    params: &[(String, String)],
) -> Result<(), StatusCode> {
    if state.twilio.skip_signature_validation {
        return Ok(());
    }
    let Some(auth_token) = &state.twilio.auth_token else {
        tracing::warn!("no Twilio auth token configured, accepting unsigned webhook");
        return Ok(());
    };

    let Some(url) = signed_url(state, headers, path) else {
        tracing::warn!(path, "cannot reconstruct webhook URL for validation");
        return Err(StatusCode::FORBIDDEN);
    };
    let Some(provided) = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!(path, "webhook missing X-Twilio-Signature");
        return Err(StatusCode::FORBIDDEN);
    };

    if signature::validate(auth_token.expose_secret(), &url, params, provided) {
        Ok(())
    } else {
        tracing::warn!(path, "webhook signature rejected");
        Err(StatusCode::FORBIDDEN)
    }
}

/// `POST /webhooks/twilio/voice` — answer a forwarded call with TwiML
async fn voice_inbound(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = parse_form_params(&body);
    if let Err(status) =
        check_twilio_signature(&state, &headers, "/webhooks/twilio/voice", &params)
    {
        return status.into_response();
    }

    let to = form_param(&params, "To").unwrap_or_default();
    let caller = form_param(&params, "From").unwrap_or_default();

    let say = match state.directory.resolve(to) {
        Ok(Some(business)) => render_template(VOICE_GREETING, &business, caller),
        Ok(None) => VOICE_GREETING_UNKNOWN.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, to, "business lookup failed on voice webhook");
            VOICE_GREETING_UNKNOWN.to_string()
        }
    };

    twiml_response(twiml::voice_say_hangup(&say, Some(1)))
}

/// `POST /webhooks/twilio/voice/status` — call status callback
///
/// Terminal statuses feed the missed-call pipeline on a spawned task;
/// everything else is acknowledged and dropped.
async fn voice_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = parse_form_params(&body);
    if let Err(status) =
        check_twilio_signature(&state, &headers, "/webhooks/twilio/voice/status", &params)
    {
        return status.into_response();
    }

    let ack = twiml_response(twiml::empty_response());

    let Some(call_sid) = form_param(&params, "CallSid") else {
        tracing::debug!("voice status callback without CallSid");
        return ack;
    };
    let Some(status) = form_param(&params, "CallStatus").and_then(CallStatus::from_str) else {
        tracing::debug!(call_sid, "voice status callback with unknown status");
        return ack;
    };
    if !status.is_terminal() {
        return ack;
    }

    {
        let mut dedup = state
            .dedup
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if dedup.is_duplicate(&dedup::call_key(call_sid)) {
            tracing::debug!(call_sid, "duplicate voice status callback");
            return ack;
        }
    }

    let event = VoiceEvent {
        call_sid: call_sid.to_string(),
        from: form_param(&params, "From").unwrap_or_default().to_string(),
        to: form_param(&params, "To").unwrap_or_default().to_string(),
        status,
        duration_secs: form_param(&params, "CallDuration").and_then(|d| d.parse().ok()),
    };

    let responder = state.responder.clone();
    tokio::spawn(async move {
        if let Err(e) = responder.handle_missed_call(event).await {
            tracing::error!(error = %e, "missed-call handling failed");
        }
    });

    ack
}

/// `POST /webhooks/twilio/sms` — inbound SMS
///
/// Returns empty TwiML immediately; the reply goes out over REST so the
/// rate limit, subscription gate, and delivery callbacks apply to it.
async fn sms_inbound(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = parse_form_params(&body);
    if let Err(status) = check_twilio_signature(&state, &headers, "/webhooks/twilio/sms", &params)
    {
        return status.into_response();
    }

    let ack = twiml_response(twiml::empty_response());

    let Some(message_sid) = form_param(&params, "MessageSid") else {
        tracing::debug!("inbound SMS without MessageSid");
        return ack;
    };

    {
        let mut dedup = state
            .dedup
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if dedup.is_duplicate(&dedup::message_key(message_sid)) {
            tracing::debug!(message_sid, "duplicate inbound SMS");
            return ack;
        }
    }

    let sms = InboundSms {
        message_sid: message_sid.to_string(),
        from: form_param(&params, "From").unwrap_or_default().to_string(),
        to: form_param(&params, "To").unwrap_or_default().to_string(),
        body: form_param(&params, "Body").unwrap_or_default().to_string(),
    };

    let responder = state.responder.clone();
    tokio::spawn(async move {
        if let Err(e) = responder.handle_inbound_sms(sms).await {
            tracing::error!(error = %e, "inbound SMS handling failed");
        }
    });

    ack
}

/// `POST /webhooks/twilio/sms/status` — outbound delivery status callback
async fn sms_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let params = parse_form_params(&body);
    if let Err(status) =
        check_twilio_signature(&state, &headers, "/webhooks/twilio/sms/status", &params)
    {
        return status.into_response();
    }

    let ack = twiml_response(twiml::empty_response());

    let sid = form_param(&params, "MessageSid").unwrap_or_default();
    let to = form_param(&params, "To").unwrap_or_default();
    let Some(status) = form_param(&params, "MessageStatus").and_then(MessageStatus::from_str)
    else {
        return ack;
    };

    if status.is_failure() {
        tracing::warn!(sid, to, status = status.as_str(), "outbound SMS not delivered");
        // From is the business's gateway number on outbound messages.
        let from = form_param(&params, "From").unwrap_or_default();
        if let Ok(Some(business)) = state.directory.resolve(from) {
            state.responder.events().record(
                NewEvent::new(&business.id, EventKind::DeliveryFailed, to).with_detail(
                    serde_json::json!({
                        "stage": "delivery",
                        "sid": sid,
                        "status": status.as_str(),
                    }),
                ),
            );
        }
    } else {
        tracing::debug!(sid, status = status.as_str(), "delivery status");
    }

    ack
}

#[derive(Serialize)]
struct StripeAck {
    received: bool,
}

/// `POST /webhooks/stripe` — signed billing events
async fn stripe_event(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(secret) = &state.stripe_webhook_secret else {
        tracing::warn!("Stripe webhook received but no endpoint secret configured");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let Some(header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if let Err(e) =
        billing::verify_signature(secret, header, &body, billing::SIGNATURE_TOLERANCE_SECS)
    {
        tracing::warn!(error = %e, "Stripe signature rejected");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let event: billing::StripeEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable Stripe event");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match billing::apply_event(&state.businesses, &state.directory, &event) {
        Ok(applied) => {
            tracing::debug!(event = %event.id, kind = %event.event_type, ?applied, "Stripe event");
            axum::Json(StripeAck { received: true }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, event = %event.id, "failed to apply Stripe event");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
