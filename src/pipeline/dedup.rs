//! Webhook event deduplication cache
//!
//! Twilio retries status callbacks that are slow to acknowledge, and the
//! same terminal call status can arrive on both the voice webhook and the
//! status callback. Deduplicating on the Twilio SID keeps one text-back
//! per call and one reply per inbound message.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Maximum cache entries before forced eviction
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Namespaced dedup key for a voice call SID.
#[must_use]
pub fn call_key(call_sid: &str) -> String {
    format!("call:{call_sid}")
}

/// Namespaced dedup key for an inbound message SID.
#[must_use]
pub fn message_key(message_sid: &str) -> String {
    format!("msg:{message_sid}")
}

/// SID deduplication cache with TTL-based eviction and a hard entry cap.
#[derive(Debug)]
pub struct EventDedup {
    seen: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl EventDedup {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            ttl,
            max_entries: DEDUP_MAX_ENTRIES,
        }
    }

    /// Check whether the given key was seen within the TTL.
    ///
    /// Returns `true` for a duplicate. Returns `false` on first sight and
    /// records the key.
    pub fn is_duplicate(&mut self, key: &str) -> bool {
        let now = Instant::now();

        // Evict expired entries when at capacity
        if self.seen.len() >= self.max_entries {
            self.seen.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        // Still at capacity? Drop the oldest entry.
        if self.seen.len() >= self.max_entries {
            if let Some(oldest) = self
                .seen
                .iter()
                .min_by_key(|(_, ts)| *ts)
                .map(|(k, _)| k.clone())
            {
                self.seen.remove(&oldest);
            }
        }

        if let Some(ts) = self.seen.get(key) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }

        self.seen.insert(key.to_string(), now);
        false
    }
}

impl Default for EventDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
