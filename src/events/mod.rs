//! Best-effort activity logging.
//!
//! Every notable action in the gateway (missed call, inbound/outbound SMS,
//! owner alert, delivery failure, LLM usage, suppressed reply) is recorded
//! as an [`Event`](crate::db::Event) row. Recording is fire-and-forget:
//! failures are logged and never propagate to the webhook path.

use crate::db::{EventRepo, NewEvent};

/// Cloneable handle that records events without blocking the caller.
#[derive(Debug, Clone)]
pub struct EventLogger {
    repo: EventRepo,
}

impl EventLogger {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(repo: EventRepo) -> Self {
        Self { repo }
    }

    /// Record an event on a background task (best-effort, fire-and-forget).
    ///
    /// Insert failures are logged at `warn` and dropped so that a full disk
    /// or locked database can never stall call or message handling.
    pub fn record(&self, event: NewEvent) {
        let repo = self.repo.clone();
        drop(tokio::spawn(async move {
            if let Err(e) = repo.insert(&event) {
                tracing::warn!(
                    kind = event.kind.as_str(),
                    business_id = %event.business_id,
                    error = %e,
                    "failed to record event"
                );
            }
        }));
    }

}
