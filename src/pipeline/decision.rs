//! Reply decision for one inbound message
//!
//! Fixed priority: ordering requests, then configured FAQs, then urgency,
//! then LLM drafting with a template fallback. Urgency is tracked
//! separately from the reply so an FAQ answer can still page the owner.

use std::sync::OnceLock;

use regex::Regex;

use super::{faq, urgency};
use crate::db::{Business, Faq};

const ORDERING_PATTERN: &str = r"(?i)\b(?:order(?:ing)?|menu|delivery|deliver|take ?out|pick ?up|curbside|door ?dash|uber ?eats|grub ?hub)\b";

fn ordering_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(ORDERING_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "invalid ordering pattern");
            None
        }
    })
    .as_ref()
}

/// Check whether the text reads like an ordering or menu request.
#[must_use]
pub fn wants_ordering(text: &str) -> bool {
    ordering_regex().is_some_and(|re| re.is_match(text))
}

/// How the gateway should reply to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send the configured online-ordering link.
    OrderingLink,
    /// Answer with a stored FAQ.
    Faq(Faq),
    /// Acknowledge an urgent message.
    UrgentAck,
    /// Draft with the LLM, falling back to the reply template.
    Draft,
}

/// The decision for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub reply: Reply,
    /// Drives owner escalation independently of the reply kind.
    pub urgent: bool,
}

/// Decide how to reply to an inbound message.
///
/// Pure with respect to the database; the caller fetches the business and
/// its FAQs. LLM-based urgency classification happens later and only when
/// this pass settles on [`Reply::Draft`] without a keyword hit.
#[must_use]
pub fn decide(body: &str, business: &Business, faqs: &[Faq]) -> Decision {
    let urgent = urgency::keyword_hit(body);

    if business.ordering_url.is_some() && wants_ordering(body) {
        return Decision {
            reply: Reply::OrderingLink,
            urgent,
        };
    }

    if let Some(hit) = faq::best_match(body, faqs) {
        return Decision {
            reply: Reply::Faq(hit.clone()),
            urgent,
        };
    }

    if urgent {
        return Decision {
            reply: Reply::UrgentAck,
            urgent: true,
        };
    }

    Decision {
        reply: Reply::Draft,
        urgent: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::db::SubscriptionStatus;

    fn business(ordering_url: Option<&str>) -> Business {
        Business {
            id: "b1".to_string(),
            name: "Golden Crust Pizza".to_string(),
            phone_number: "+15550001111".to_string(),
            owner_phone: "+15550002222".to_string(),
            greeting_template: String::new(),
            reply_template: String::new(),
            ordering_url: ordering_url.map(str::to_string),
            llm_enabled: true,
            alerts_enabled: true,
            subscription_status: SubscriptionStatus::Active,
            stripe_customer_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn hours_faq() -> Faq {
        Faq {
            id: "f1".to_string(),
            business_id: "b1".to_string(),
            question: "What are your hours?".to_string(),
            answer: "Open 11am to 10pm daily".to_string(),
            position: 0,
        }
    }

    #[test]
    fn ordering_request_gets_the_link() {
        let biz = business(Some("https://order.example.com"));
        let d = decide("can I see a menu?", &biz, &[]);
        assert_eq!(d.reply, Reply::OrderingLink);
        assert!(!d.urgent);
    }

    #[test]
    fn ordering_without_url_falls_through() {
        let biz = business(None);
        let d = decide("do you do delivery?", &biz, &[]);
        assert_eq!(d.reply, Reply::Draft);
    }

    #[test]
    fn faq_beats_drafting() {
        let biz = business(None);
        let d = decide("what are your hours today", &biz, &[hours_faq()]);
        assert_eq!(d.reply, Reply::Faq(hours_faq()));
    }

    #[test]
    fn urgent_keyword_without_other_match_acks() {
        let biz = business(None);
        let d = decide("burst pipe, please help", &biz, &[hours_faq()]);
        assert_eq!(d.reply, Reply::UrgentAck);
        assert!(d.urgent);
    }

    #[test]
    fn faq_reply_still_flags_urgency() {
        let biz = business(None);
        let faq = Faq {
            question: "Do you handle emergency calls?".to_string(),
            answer: "Yes, call us any time".to_string(),
            ..hours_faq()
        };
        let d = decide("emergency! do you handle emergency calls?", &biz, &[faq]);
        assert!(matches!(d.reply, Reply::Faq(_)));
        assert!(d.urgent);
    }

    #[test]
    fn plain_message_drafts() {
        let biz = business(Some("https://order.example.com"));
        let d = decide("hi, do you have gluten free options?", &biz, &[]);
        assert_eq!(d.reply, Reply::Draft);
        assert!(!d.urgent);
    }

    #[test]
    fn ordering_priority_over_faq() {
        let biz = business(Some("https://order.example.com"));
        let faq = Faq {
            question: "Do you deliver?".to_string(),
            answer: "Yes".to_string(),
            ..hours_faq()
        };
        let d = decide("do you deliver?", &biz, &[faq]);
        assert_eq!(d.reply, Reply::OrderingLink);
    }
}
