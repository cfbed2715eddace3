//! Stripe billing webhook ingestion
//!
//! The gateway never calls the Stripe API; checkout and subscription
//! lifecycle events arrive as signed webhooks and drive the per-business
//! `subscription_status` column, which the pipeline consults before every
//! customer-facing send.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;

use crate::db::{BusinessRepo, SubscriptionStatus};
use crate::directory::BusinessDirectory;
use crate::twilio::signature::constant_time_eq;
use crate::{Error, Result};

/// How far a webhook timestamp may drift before it is rejected
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header against the payload
///
/// The header carries `t=<unix ts>,v1=<hex hmac>[,v1=...]`; the signed
/// content is `"{t}.{payload}"` under HMAC-SHA256 with the endpoint
/// secret. Any listed `v1` may match (Stripe sends several during secret
/// rotation).
///
/// # Errors
///
/// Returns [`Error::Signature`] when the header is malformed, the
/// timestamp is outside `tolerance_secs`, or no `v1` entry matches.
pub fn verify_signature(
    secret: &SecretString,
    header: &str,
    payload: &str,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| Error::Signature("missing timestamp in Stripe header".into()))?;
    if candidates.is_empty() {
        return Err(Error::Signature("missing v1 entry in Stripe header".into()));
    }

    let age = (chrono::Utc::now().timestamp() - timestamp).abs();
    if age > tolerance_secs {
        return Err(Error::Signature(format!(
            "Stripe timestamp outside tolerance ({age}s old)"
        )));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::Signature(format!("cannot key HMAC: {e}")))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if candidates
        .iter()
        .any(|c| constant_time_eq(expected.as_bytes(), c.as_bytes()))
    {
        Ok(())
    } else {
        Err(Error::Signature("no matching Stripe v1 signature".into()))
    }
}

/// The slice of a Stripe event envelope the gateway acts on
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeObject,
}

/// Fields shared by checkout sessions and subscriptions
#[derive(Debug, Deserialize)]
pub struct StripeObject {
    pub id: String,
    /// Stripe customer id, present on both object kinds
    pub customer: Option<String>,
    /// Subscription status string (subscription objects only)
    pub status: Option<String>,
    /// Business id passed through checkout as the client reference
    pub client_reference_id: Option<String>,
}

/// Map Stripe's subscription status strings onto the gateway's states
#[must_use]
pub fn map_subscription_status(stripe_status: &str) -> Option<SubscriptionStatus> {
    match stripe_status {
        "active" => Some(SubscriptionStatus::Active),
        "trialing" => Some(SubscriptionStatus::Trialing),
        "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
        "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
        // incomplete = checkout still in flight, nothing to record yet
        _ => None,
    }
}

/// Outcome of applying one Stripe event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A business's subscription status changed
    Updated,
    /// Recognized event, but no matching business or no status change
    NoOp,
    /// Event type the gateway does not handle
    Ignored,
}

/// Apply a verified Stripe event to the business table
///
/// Unknown event types and unknown customers are acknowledged as no-ops;
/// Stripe keeps retrying anything else.
///
/// # Errors
///
/// Returns error if a database update fails.
pub fn apply_event(
    repo: &BusinessRepo,
    directory: &BusinessDirectory,
    event: &StripeEvent,
) -> Result<Applied> {
    let object = &event.data.object;

    let applied = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(customer) = object.customer.as_deref() else {
                tracing::warn!(event = %event.id, "checkout session without customer");
                return Ok(Applied::NoOp);
            };
            // The onboarding flow passes the business id through checkout.
            let business = match object.client_reference_id.as_deref() {
                Some(business_id) => repo.find_by_id(business_id)?,
                None => repo.find_by_stripe_customer(customer)?,
            };
            match business {
                Some(b) => {
                    repo.update_subscription(&b.id, SubscriptionStatus::Active, Some(customer))?;
                    directory.invalidate(&b.phone_number);
                    tracing::info!(business = %b.name, "subscription activated via checkout");
                    Applied::Updated
                }
                None => {
                    tracing::warn!(customer, event = %event.id, "checkout for unknown business");
                    Applied::NoOp
                }
            }
        }
        "customer.subscription.updated" => {
            let status = object.status.as_deref().and_then(map_subscription_status);
            match (object.customer.as_deref(), status) {
                (Some(customer), Some(status)) => {
                    update_by_customer(repo, directory, customer, status)?
                }
                _ => Applied::NoOp,
            }
        }
        "customer.subscription.deleted" => match object.customer.as_deref() {
            Some(customer) => {
                update_by_customer(repo, directory, customer, SubscriptionStatus::Canceled)?
            }
            None => Applied::NoOp,
        },
        _ => Applied::Ignored,
    };

    Ok(applied)
}

fn update_by_customer(
    repo: &BusinessRepo,
    directory: &BusinessDirectory,
    customer: &str,
    status: SubscriptionStatus,
) -> Result<Applied> {
    let Some(business) = repo.find_by_stripe_customer(customer)? else {
        tracing::debug!(customer, "subscription event for unknown customer");
        return Ok(Applied::NoOp);
    };
    if business.subscription_status == status {
        return Ok(Applied::NoOp);
    }
    repo.update_subscription(&business.id, status, None)?;
    directory.invalidate(&business.phone_number);
    tracing::info!(
        business = %business.name,
        status = status.as_str(),
        "subscription status updated"
    );
    Ok(Applied::Updated)
}
