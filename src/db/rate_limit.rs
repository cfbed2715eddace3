//! Per-number outbound SMS rate limiting
//!
//! Windows are persisted so limits survive restarts and apply across
//! concurrent webhook handlers. The check-and-count runs in one immediate
//! transaction so two handlers racing on the same number cannot both take
//! the last slot.

use chrono::{DateTime, Duration, Utc};

use super::DbPool;
use crate::{Error, Result};

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Send allowed; the window counter was incremented
    Allowed,
    /// Window is exhausted until it expires
    Limited,
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Rate-limit window repository
#[derive(Clone)]
pub struct RateLimitRepo {
    pool: DbPool,
}

impl RateLimitRepo {
    /// Create a new rate-limit repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Check whether another message may be sent to `phone`, counting it if so
    ///
    /// A window starts on the first send and lasts `window_secs`; up to
    /// `max_sends` messages fit in one window. Expired windows reset.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn check_and_count(
        &self,
        phone: &str,
        window_secs: i64,
        max_sends: i64,
    ) -> Result<RateLimitDecision> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now();
        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT window_start, sent_count FROM sms_rate_limits WHERE phone_number = ?1",
                [phone],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let decision = match existing {
            Some((start, count)) if !window_expired(&start, now, window_secs) => {
                if count >= max_sends {
                    RateLimitDecision::Limited
                } else {
                    tx.execute(
                        "UPDATE sms_rate_limits SET sent_count = sent_count + 1
                         WHERE phone_number = ?1",
                        [phone],
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                    RateLimitDecision::Allowed
                }
            }
            _ => {
                // New number or expired window: start fresh at one send
                tx.execute(
                    "INSERT INTO sms_rate_limits (phone_number, window_start, sent_count)
                     VALUES (?1, ?2, 1)
                     ON CONFLICT(phone_number) DO UPDATE SET
                        window_start = excluded.window_start,
                        sent_count = 1",
                    [phone, &now.to_rfc3339()],
                )
                .map_err(|e| Error::Database(e.to_string()))?;
                RateLimitDecision::Allowed
            }
        };

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(decision)
    }

}

fn window_expired(start: &str, now: DateTime<Utc>, window_secs: i64) -> bool {
    match DateTime::parse_from_rfc3339(start) {
        Ok(s) => {
            now.signed_duration_since(s.with_timezone(&Utc)) >= Duration::seconds(window_secs)
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> RateLimitRepo {
        RateLimitRepo::new(init_memory().unwrap())
    }

    #[test]
    fn test_counts_up_to_max() {
        let repo = setup();

        for _ in 0..3 {
            assert!(
                repo.check_and_count("+15551234567", 3600, 3)
                    .unwrap()
                    .is_allowed()
            );
        }
        assert_eq!(
            repo.check_and_count("+15551234567", 3600, 3).unwrap(),
            RateLimitDecision::Limited
        );

        // A different number has its own window
        assert!(
            repo.check_and_count("+15559999999", 3600, 3)
                .unwrap()
                .is_allowed()
        );
    }

    #[test]
    fn test_expired_window_resets() {
        let repo = setup();

        assert!(
            repo.check_and_count("+15551234567", 3600, 1)
                .unwrap()
                .is_allowed()
        );
        assert_eq!(
            repo.check_and_count("+15551234567", 3600, 1).unwrap(),
            RateLimitDecision::Limited
        );

        // Zero-length window expires immediately
        assert!(
            repo.check_and_count("+15551234567", 0, 1)
                .unwrap()
                .is_allowed()
        );
    }

    #[test]
    fn test_unparseable_window_resets() {
        let repo = setup();
        let conn = repo.pool.get().unwrap();
        conn.execute(
            "INSERT INTO sms_rate_limits (phone_number, window_start, sent_count)
             VALUES ('+15551234567', 'garbage', 99)",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(
            repo.check_and_count("+15551234567", 3600, 1)
                .unwrap()
                .is_allowed()
        );
        // The reset counted as the window's one send
        assert_eq!(
            repo.check_and_count("+15551234567", 3600, 1).unwrap(),
            RateLimitDecision::Limited
        );
    }
}
