//! Event repository for the analytics feed

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// What happened, as recorded for analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MissedCall,
    CallCompleted,
    SmsIn,
    SmsOut,
    OwnerAlert,
    DeliveryFailed,
    LlmUsage,
    ReplySuppressed,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissedCall => "missed_call",
            Self::CallCompleted => "call_completed",
            Self::SmsIn => "sms_in",
            Self::SmsOut => "sms_out",
            Self::OwnerAlert => "owner_alert",
            Self::DeliveryFailed => "delivery_failed",
            Self::LlmUsage => "llm_usage",
            Self::ReplySuppressed => "reply_suppressed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "missed_call" => Some(Self::MissedCall),
            "call_completed" => Some(Self::CallCompleted),
            "sms_in" => Some(Self::SmsIn),
            "sms_out" => Some(Self::SmsOut),
            "owner_alert" => Some(Self::OwnerAlert),
            "delivery_failed" => Some(Self::DeliveryFailed),
            "llm_usage" => Some(Self::LlmUsage),
            "reply_suppressed" => Some(Self::ReplySuppressed),
            _ => None,
        }
    }
}

/// A recorded event
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub business_id: String,
    pub kind: EventKind,
    /// Customer phone number the event concerns, if any
    pub caller: String,
    /// Small JSON payload (SIDs, statuses, token counts, reasons)
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for recording an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub business_id: String,
    pub kind: EventKind,
    pub caller: String,
    pub detail: serde_json::Value,
}

impl NewEvent {
    /// Convenience constructor for events without a detail payload
    #[must_use]
    pub fn new(business_id: &str, kind: EventKind, caller: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            kind,
            caller: caller.to_string(),
            detail: serde_json::Value::Null,
        }
    }

    /// Attach a detail payload
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Event repository
#[derive(Debug, Clone)]
pub struct EventRepo {
    pool: DbPool,
}

impl EventRepo {
    /// Create a new event repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an event
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(&self, event: &NewEvent) -> Result<Event> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let detail = if event.detail.is_null() {
            "{}".to_string()
        } else {
            event.detail.to_string()
        };

        conn.execute(
            "INSERT INTO events (id, business_id, kind, caller, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                &id,
                &event.business_id,
                event.kind.as_str(),
                &event.caller,
                &detail,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Event {
            id,
            business_id: event.business_id.clone(),
            kind: event.kind,
            caller: event.caller.clone(),
            detail: event.detail.clone(),
            created_at: now,
        })
    }

    /// Recent events for a business, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_recent(&self, business_id: &str, limit: usize) -> Result<Vec<Event>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, business_id, kind, caller, detail, created_at
                 FROM events WHERE business_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let events = stmt
            .query_map(
                rusqlite::params![business_id, i64::try_from(limit).unwrap_or(i64::MAX)],
                |row| {
                    Ok(Event {
                        id: row.get(0)?,
                        business_id: row.get(1)?,
                        kind: EventKind::from_str(&row.get::<_, String>(2)?)
                            .unwrap_or(EventKind::SmsIn),
                        caller: row.get(3)?,
                        detail: serde_json::from_str(&row.get::<_, String>(4)?)
                            .unwrap_or(serde_json::Value::Null),
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                    })
                },
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(events)
    }

    /// Event counts per kind for a business over the trailing period
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn counts_since(&self, business_id: &str, days: i64) -> Result<Vec<(String, i64)>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();

        let mut stmt = conn
            .prepare(
                "SELECT kind, COUNT(*) FROM events
                 WHERE business_id = ?1 AND created_at >= ?2
                 GROUP BY kind ORDER BY kind",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let counts = stmt
            .query_map([business_id, &cutoff], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(counts)
    }

    /// Delete events older than the retention window, returning the count
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn prune_older_than(&self, days: i64) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();

        let deleted = conn
            .execute("DELETE FROM events WHERE created_at < ?1", [&cutoff])
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(deleted)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
