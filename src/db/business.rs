//! Business repository for tenant records and FAQ pairs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Default text-back for a missed call when the business has not set one
pub const DEFAULT_GREETING: &str =
    "Sorry we missed your call! This is {business}. Text us here and we'll get right back to you.";

/// Default reply for inbound texts nothing else matched
pub const DEFAULT_REPLY: &str =
    "Thanks for reaching out to {business}! We got your message and will reply shortly.";

/// A tenant business
#[derive(Debug, Clone, Serialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// The Twilio number routed at this gateway, normalized
    pub phone_number: String,
    /// Where owner alerts go, normalized
    pub owner_phone: String,
    /// Missed-call text-back template ({business}, {caller} placeholders)
    pub greeting_template: String,
    /// Fallback reply template for inbound texts
    pub reply_template: String,
    /// Online-ordering link, answered to ordering-intent messages
    pub ordering_url: Option<String>,
    pub llm_enabled: bool,
    pub alerts_enabled: bool,
    pub subscription_status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Missed-call template, falling back to the default when unset
    #[must_use]
    pub fn greeting(&self) -> &str {
        if self.greeting_template.is_empty() {
            DEFAULT_GREETING
        } else {
            &self.greeting_template
        }
    }

    /// Inbound-text fallback template, falling back to the default when unset
    #[must_use]
    pub fn fallback_reply(&self) -> &str {
        if self.reply_template.is_empty() {
            DEFAULT_REPLY
        } else {
            &self.reply_template
        }
    }
}

/// A stored FAQ pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Faq {
    pub id: String,
    pub business_id: String,
    pub question: String,
    pub answer: String,
    pub position: i64,
}

/// Subscription state, driven by Stripe webhook events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never billed (onboarding)
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Whether customer-facing replies may be sent in this state
    ///
    /// `allow_unbilled` keeps onboarding businesses working before their
    /// first checkout.
    #[must_use]
    pub const fn can_reply(self, allow_unbilled: bool) -> bool {
        match self {
            Self::Active | Self::Trialing => true,
            Self::None => allow_unbilled,
            Self::PastDue | Self::Canceled => false,
        }
    }

    /// Whether owner alerts may still be sent in this state
    ///
    /// Past-due businesses keep their alerts so a lapsed card never hides
    /// an urgent customer. Only cancellation silences them.
    #[must_use]
    pub const fn can_alert(self) -> bool {
        !matches!(self, Self::Canceled)
    }
}

/// Fields for creating or upserting a business
#[derive(Debug, Clone, Default)]
pub struct NewBusiness {
    pub name: String,
    pub phone_number: String,
    pub owner_phone: String,
    pub greeting_template: Option<String>,
    pub reply_template: Option<String>,
    pub ordering_url: Option<String>,
}

/// Normalize a phone number for storage and lookup
///
/// Keeps digits and a single leading `+`; strips spaces, dashes, dots and
/// parentheses. Twilio delivers E.164 so this is mostly a no-op on webhook
/// input, but operator-entered numbers arrive in every format.
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c == '+' && i == 0 {
            out.push(c);
        } else if c.is_ascii_digit() {
            out.push(c);
        }
    }
    out
}

/// Business repository
#[derive(Clone)]
pub struct BusinessRepo {
    pool: DbPool,
}

impl BusinessRepo {
    /// Create a new business repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a business, or update name/owner/templates if the phone number
    /// is already registered
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn upsert(&self, new: &NewBusiness) -> Result<Business> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let phone = normalize_phone(&new.phone_number);
        let owner = normalize_phone(&new.owner_phone);
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO businesses
                (id, name, phone_number, owner_phone, greeting_template,
                 reply_template, ordering_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(phone_number) DO UPDATE SET
                name = excluded.name,
                owner_phone = excluded.owner_phone,
                greeting_template = excluded.greeting_template,
                reply_template = excluded.reply_template,
                ordering_url = excluded.ordering_url,
                updated_at = excluded.updated_at",
            rusqlite::params![
                &id,
                &new.name,
                &phone,
                &owner,
                new.greeting_template.as_deref().unwrap_or(""),
                new.reply_template.as_deref().unwrap_or(""),
                new.ordering_url.as_deref(),
                &now,
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        // Release the connection before find_by_phone re-acquires from the pool
        drop(conn);

        self.find_by_phone(&phone)?
            .ok_or_else(|| Error::Database(format!("upsert lost business {phone}")))
    }

    /// Look up a business by its gateway phone number
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_phone(&self, phone: &str) -> Result<Option<Business>> {
        self.find_where("phone_number = ?1", &normalize_phone(phone))
    }

    /// Look up a business by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_id(&self, id: &str) -> Result<Option<Business>> {
        self.find_where("id = ?1", id)
    }

    /// Look up a business by its Stripe customer id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_stripe_customer(&self, customer_id: &str) -> Result<Option<Business>> {
        self.find_where("stripe_customer_id = ?1", customer_id)
    }

    fn find_where(&self, clause: &str, param: &str) -> Result<Option<Business>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let sql = format!(
            "SELECT id, name, phone_number, owner_phone, greeting_template,
                    reply_template, ordering_url, llm_enabled, alerts_enabled,
                    subscription_status, stripe_customer_id, created_at, updated_at
             FROM businesses WHERE {clause}"
        );

        let business = conn.query_row(&sql, [param], Self::row_to_business).ok();

        Ok(business)
    }

    /// List all businesses, most recently updated first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_all(&self) -> Result<Vec<Business>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, phone_number, owner_phone, greeting_template,
                        reply_template, ordering_url, llm_enabled, alerts_enabled,
                        subscription_status, stripe_customer_id, created_at, updated_at
                 FROM businesses ORDER BY updated_at DESC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let businesses = stmt
            .query_map([], Self::row_to_business)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(businesses)
    }

    /// Toggle auto-reply LLM use and owner alerts
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_toggles(&self, id: &str, llm_enabled: bool, alerts_enabled: bool) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE businesses SET llm_enabled = ?1, alerts_enabled = ?2, updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![llm_enabled, alerts_enabled, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Error::BusinessNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Update subscription status, optionally attaching the Stripe customer
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails or the business is unknown
    pub fn update_subscription(
        &self,
        id: &str,
        status: SubscriptionStatus,
        stripe_customer_id: Option<&str>,
    ) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE businesses
                 SET subscription_status = ?1,
                     stripe_customer_id = COALESCE(?2, stripe_customer_id),
                     updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![
                    status.as_str(),
                    stripe_customer_id,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Error::BusinessNotFound(id.to_string()));
        }
        Ok(())
    }

    /// List FAQ pairs for a business, in position order
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn faqs_for(&self, business_id: &str) -> Result<Vec<Faq>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, business_id, question, answer, position
                 FROM faqs WHERE business_id = ?1 ORDER BY position, created_at",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let faqs = stmt
            .query_map([business_id], |row| {
                Ok(Faq {
                    id: row.get(0)?,
                    business_id: row.get(1)?,
                    question: row.get(2)?,
                    answer: row.get(3)?,
                    position: row.get(4)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(faqs)
    }

    /// Append a FAQ pair
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add_faq(&self, business_id: &str, question: &str, answer: &str) -> Result<Faq> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let position: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM faqs WHERE business_id = ?1",
                [business_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO faqs (id, business_id, question, answer, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![&id, business_id, question, answer, position],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Faq {
            id,
            business_id: business_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            position,
        })
    }

    /// Replace all FAQ pairs for a business
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn replace_faqs(&self, business_id: &str, pairs: &[(String, String)]) -> Result<Vec<Faq>> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute("DELETE FROM faqs WHERE business_id = ?1", [business_id])
            .map_err(|e| Error::Database(e.to_string()))?;

        for (position, (question, answer)) in pairs.iter().enumerate() {
            tx.execute(
                "INSERT INTO faqs (id, business_id, question, answer, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    business_id,
                    question,
                    answer,
                    i64::try_from(position).unwrap_or(0),
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;

        // Release the connection before faqs_for re-acquires from the pool
        drop(conn);

        self.faqs_for(business_id)
    }

    /// Delete one FAQ pair
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete_faq(&self, faq_id: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute("DELETE FROM faqs WHERE id = ?1", [faq_id])
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(changed > 0)
    }

    fn row_to_business(row: &rusqlite::Row<'_>) -> rusqlite::Result<Business> {
        Ok(Business {
            id: row.get(0)?,
            name: row.get(1)?,
            phone_number: row.get(2)?,
            owner_phone: row.get(3)?,
            greeting_template: row.get(4)?,
            reply_template: row.get(5)?,
            ordering_url: row.get(6)?,
            llm_enabled: row.get(7)?,
            alerts_enabled: row.get(8)?,
            subscription_status: SubscriptionStatus::from_str(&row.get::<_, String>(9)?)
                .unwrap_or(SubscriptionStatus::None),
            stripe_customer_id: row.get(10)?,
            created_at: parse_datetime(&row.get::<_, String>(11)?),
            updated_at: parse_datetime(&row.get::<_, String>(12)?),
        })
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
