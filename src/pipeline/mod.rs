//! The decision pipeline behind every webhook
//!
//! Webhook handlers acknowledge Twilio immediately and hand the event to a
//! [`Responder`] on a spawned task. The responder resolves the business,
//! decides what (if anything) to send, applies subscription and rate-limit
//! gates, fans out to the customer and the owner, and records events for
//! each step. Per-step failures are logged and never abort the remaining
//! fan-out.

pub mod decision;
pub mod dedup;
pub mod faq;
pub mod urgency;

use std::sync::Arc;

pub use decision::{Decision, Reply, decide, wants_ordering};
pub use dedup::EventDedup;

use crate::Result;
use crate::config::PipelineConfig;
use crate::db::{Business, EventKind, Faq, NewEvent, RateLimitRepo, normalize_phone};
use crate::directory::BusinessDirectory;
use crate::events::EventLogger;
use crate::llm::LlmClient;
use crate::twilio::{CallStatus, OutgoingSms, SmsSender};

/// Reply sent for ordering requests when an ordering link is configured
const ORDERING_REPLY: &str =
    "Thanks for reaching {business}! You can order online here: {ordering_url}";

/// Acknowledgement for messages flagged urgent
const URGENT_ACK: &str = "Got it. We've flagged your message as urgent and notified the owner of {business}. If this is a life-threatening emergency, please call 911.";

/// A terminal voice status callback, parsed from Twilio form params.
#[derive(Debug, Clone)]
pub struct VoiceEvent {
    pub call_sid: String,
    pub from: String,
    pub to: String,
    pub status: CallStatus,
    pub duration_secs: Option<u64>,
}

/// An inbound SMS, parsed from Twilio form params.
#[derive(Debug, Clone)]
pub struct InboundSms {
    pub message_sid: String,
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Decide whether a terminal call status counts as a missed call.
///
/// Busy, failed, no-answer, and canceled calls always do. A completed call
/// counts when it connected for less than `max_secs`, which catches callers
/// who bailed out of voicemail or an IVR menu.
#[must_use]
pub fn is_missed_call(status: CallStatus, duration_secs: Option<u64>, max_secs: u64) -> bool {
    match status {
        CallStatus::Busy | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Canceled => {
            true
        }
        CallStatus::Completed => duration_secs.is_none_or(|d| d < max_secs),
        _ => false,
    }
}

/// Fill `{business}`, `{caller}`, and `{ordering_url}` placeholders.
#[must_use]
pub fn render_template(template: &str, business: &Business, caller: &str) -> String {
    template
        .replace("{business}", &business.name)
        .replace("{caller}", caller)
        .replace(
            "{ordering_url}",
            business.ordering_url.as_deref().unwrap_or(""),
        )
}

fn missed_call_alert(business: &Business, caller: &str) -> String {
    format!(
        "Missed call on your {} line from {caller}. We texted them back for you.",
        business.name
    )
}

fn urgent_alert(business: &Business, caller: &str, body: &str) -> String {
    let excerpt: String = body.chars().take(120).collect();
    format!(
        "Urgent message for {} from {caller}: \"{excerpt}\"",
        business.name
    )
}

/// Orchestrates the decision pipeline and notification fan-out.
///
/// Cheap to clone; webhook handlers clone it into spawned tasks so the
/// HTTP acknowledgement never waits on Twilio or the LLM.
#[derive(Clone)]
pub struct Responder {
    directory: BusinessDirectory,
    rate_limits: RateLimitRepo,
    events: EventLogger,
    sender: Option<Arc<dyn SmsSender>>,
    llm: Option<Arc<LlmClient>>,
    pipeline: PipelineConfig,
    allow_unbilled: bool,
}

impl Responder {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(
        directory: BusinessDirectory,
        rate_limits: RateLimitRepo,
        events: EventLogger,
        pipeline: PipelineConfig,
        allow_unbilled: bool,
    ) -> Self {
        Self {
            directory,
            rate_limits,
            events,
            sender: None,
            llm: None,
            pipeline,
            allow_unbilled,
        }
    }

    /// Attach the outbound SMS sender. Without one, decisions are still
    /// made and logged but nothing is sent.
    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Attach the LLM client used for drafting and urgency classification.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Event logger handle, for callers recording events outside the
    /// pipeline (delivery status callbacks).
    #[must_use]
    pub const fn events(&self) -> &EventLogger {
        &self.events
    }

    /// Handle a terminal voice status callback.
    ///
    /// # Errors
    ///
    /// Returns error if the business lookup fails. Send and logging
    /// failures are handled internally.
    pub async fn handle_missed_call(&self, event: VoiceEvent) -> Result<()> {
        let Some(business) = self.directory.resolve(&event.to)? else {
            tracing::debug!(to = %event.to, "voice status for unknown number");
            return Ok(());
        };

        if !is_missed_call(
            event.status,
            event.duration_secs,
            self.pipeline.missed_call_max_secs,
        ) {
            self.events.record(
                NewEvent::new(&business.id, EventKind::CallCompleted, &event.from).with_detail(
                    serde_json::json!({
                        "call_sid": event.call_sid,
                        "duration_secs": event.duration_secs,
                    }),
                ),
            );
            return Ok(());
        }

        tracing::info!(
            business = %business.name,
            caller = %event.from,
            status = event.status.as_str(),
            "missed call"
        );
        self.events.record(
            NewEvent::new(&business.id, EventKind::MissedCall, &event.from).with_detail(
                serde_json::json!({
                    "call_sid": event.call_sid,
                    "status": event.status.as_str(),
                    "duration_secs": event.duration_secs,
                }),
            ),
        );

        let greeting = render_template(business.greeting(), &business, &event.from);
        self.send_customer_reply(&business, &event.from, &greeting, "missed_call")
            .await;

        if self.pipeline.owner_alerts && business.alerts_enabled {
            self.send_owner_alert(&business, &missed_call_alert(&business, &event.from))
                .await;
        }
        Ok(())
    }

    /// Handle an inbound SMS to a business number.
    ///
    /// # Errors
    ///
    /// Returns error if the business or FAQ lookup fails. Send and logging
    /// failures are handled internally.
    pub async fn handle_inbound_sms(&self, sms: InboundSms) -> Result<()> {
        let Some(business) = self.directory.resolve(&sms.to)? else {
            tracing::debug!(to = %sms.to, "inbound SMS for unknown number");
            return Ok(());
        };

        self.events.record(
            NewEvent::new(&business.id, EventKind::SmsIn, &sms.from).with_detail(
                serde_json::json!({
                    "sid": sms.message_sid,
                    "body": sms.body,
                }),
            ),
        );

        let faqs = self.directory.faqs_for(&business.id)?;
        let mut decision = decide(&sms.body, &business, &faqs);

        // Keyword misses escalate to the LLM classifier, but only when a
        // draft is the alternative. FAQ and ordering replies stand.
        if !decision.urgent && decision.reply == Reply::Draft && business.llm_enabled {
            if let Some(llm) = &self.llm {
                match llm.classify_urgency(&sms.body).await {
                    Ok(true) => {
                        decision.urgent = true;
                        decision.reply = Reply::UrgentAck;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "urgency classification failed"),
                }
            }
        }

        let (reply_body, context) = match &decision.reply {
            Reply::OrderingLink => (
                render_template(ORDERING_REPLY, &business, &sms.from),
                "ordering",
            ),
            Reply::Faq(hit) => (hit.answer.clone(), "faq"),
            Reply::UrgentAck => (render_template(URGENT_ACK, &business, &sms.from), "urgent"),
            Reply::Draft => (self.draft_reply(&business, &faqs, &sms.body).await, "draft"),
        };

        self.send_customer_reply(&business, &sms.from, &reply_body, context)
            .await;

        if decision.urgent && self.pipeline.owner_alerts && business.alerts_enabled {
            self.send_owner_alert(&business, &urgent_alert(&business, &sms.from, &sms.body))
                .await;
        }
        Ok(())
    }

    /// Draft a reply with the LLM, falling back to the business template.
    async fn draft_reply(&self, business: &Business, faqs: &[Faq], inbound: &str) -> String {
        if business.llm_enabled {
            if let Some(llm) = &self.llm {
                match llm.generate_reply(business, faqs, inbound).await {
                    Ok(reply) => {
                        self.events.record(
                            NewEvent::new(&business.id, EventKind::LlmUsage, "").with_detail(
                                serde_json::json!({
                                    "prompt_tokens": reply.prompt_tokens,
                                    "completion_tokens": reply.completion_tokens,
                                }),
                            ),
                        );
                        return reply.text;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reply drafting failed, using template");
                    }
                }
            }
        }
        render_template(business.fallback_reply(), business, inbound)
    }

    /// Send a customer-facing reply, subject to the subscription gate and
    /// the per-number rate limit. All failure modes log and return.
    async fn send_customer_reply(
        &self,
        business: &Business,
        to: &str,
        body: &str,
        context: &'static str,
    ) {
        if !business.subscription_status.can_reply(self.allow_unbilled) {
            tracing::info!(
                business = %business.name,
                status = business.subscription_status.as_str(),
                "reply suppressed by subscription state"
            );
            self.events.record(
                NewEvent::new(&business.id, EventKind::ReplySuppressed, to).with_detail(
                    serde_json::json!({ "reason": "subscription", "context": context }),
                ),
            );
            return;
        }

        // The sender check comes first so unconfigured gateways never
        // consume window slots for messages that were never sent.
        let Some(sender) = &self.sender else {
            tracing::warn!("no SMS credentials configured, reply not sent");
            self.events.record(
                NewEvent::new(&business.id, EventKind::ReplySuppressed, to).with_detail(
                    serde_json::json!({ "reason": "unconfigured", "context": context }),
                ),
            );
            return;
        };

        match self.rate_limits.check_and_count(
            &normalize_phone(to),
            self.pipeline.rate_limit_window_secs,
            self.pipeline.rate_limit_max_sends,
        ) {
            Ok(d) if d.is_allowed() => {}
            Ok(_) => {
                tracing::info!(to, "reply suppressed by rate limit");
                self.events.record(
                    NewEvent::new(&business.id, EventKind::ReplySuppressed, to).with_detail(
                        serde_json::json!({ "reason": "rate_limited", "context": context }),
                    ),
                );
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, to, "rate limit check failed, holding reply");
                return;
            }
        }

        let sms = OutgoingSms {
            to: to.to_string(),
            from: business.phone_number.clone(),
            body: body.to_string(),
        };
        match sender.send(sms).await {
            Ok(sent) => {
                tracing::info!(sid = %sent.sid, to, context, "reply sent");
                self.events.record(
                    NewEvent::new(&business.id, EventKind::SmsOut, to).with_detail(
                        serde_json::json!({
                            "sid": sent.sid,
                            "context": context,
                            "body": body,
                        }),
                    ),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, to, "reply send failed");
                self.events.record(
                    NewEvent::new(&business.id, EventKind::DeliveryFailed, to).with_detail(
                        serde_json::json!({
                            "stage": "create",
                            "error": e.to_string(),
                            "context": context,
                        }),
                    ),
                );
            }
        }
    }

    /// Text the owner. Not rate limited; silenced only by cancellation,
    /// a missing owner number, or missing credentials.
    async fn send_owner_alert(&self, business: &Business, body: &str) {
        if !business.subscription_status.can_alert() || business.owner_phone.is_empty() {
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };

        let sms = OutgoingSms {
            to: business.owner_phone.clone(),
            from: business.phone_number.clone(),
            body: body.to_string(),
        };
        match sender.send(sms).await {
            Ok(sent) => {
                tracing::info!(sid = %sent.sid, owner = %business.owner_phone, "owner alerted");
                self.events.record(
                    NewEvent::new(&business.id, EventKind::OwnerAlert, &business.owner_phone)
                        .with_detail(serde_json::json!({ "sid": sent.sid, "body": body })),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, owner = %business.owner_phone, "owner alert failed");
                self.events.record(
                    NewEvent::new(&business.id, EventKind::DeliveryFailed, &business.owner_phone)
                        .with_detail(serde_json::json!({
                            "stage": "owner_alert",
                            "error": e.to_string(),
                        })),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, BusinessRepo, EventRepo, NewBusiness, SubscriptionStatus};
    use crate::twilio::{MessageStatus, SentSms};
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<OutgoingSms>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<OutgoingSms> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SmsSender for RecordingSender {
        async fn send(&self, sms: OutgoingSms) -> Result<SentSms> {
            if self.fail {
                return Err(crate::Error::Twilio("simulated send failure".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            let sid = format!("SM{:04}", sent.len());
            sent.push(sms);
            Ok(SentSms {
                sid,
                status: MessageStatus::Queued,
            })
        }
    }

    struct Harness {
        responder: Responder,
        sender: Arc<RecordingSender>,
        repo: BusinessRepo,
        events: EventRepo,
        business: Business,
    }

    fn harness_with(sender: Arc<RecordingSender>, pipeline: PipelineConfig) -> Harness {
        let pool = db::init_memory().unwrap();
        let repo = BusinessRepo::new(pool.clone());
        let business = repo
            .upsert(&NewBusiness {
                name: "Juniper Plumbing".to_string(),
                phone_number: "+15550001111".to_string(),
                owner_phone: "+15550002222".to_string(),
                ordering_url: Some("https://order.example.com".to_string()),
                ..NewBusiness::default()
            })
            .unwrap();

        let events = EventRepo::new(pool.clone());
        let responder = Responder::new(
            BusinessDirectory::new(repo.clone()),
            RateLimitRepo::new(pool),
            EventLogger::new(events.clone()),
            pipeline,
            true,
        )
        .with_sender(sender.clone());

        Harness {
            responder,
            sender,
            repo,
            events,
            business,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingSender::new(), PipelineConfig::default())
    }

    fn voice(call_sid: &str, status: CallStatus, duration_secs: Option<u64>) -> VoiceEvent {
        VoiceEvent {
            call_sid: call_sid.to_string(),
            from: "+15557654321".to_string(),
            to: "+15550001111".to_string(),
            status,
            duration_secs,
        }
    }

    fn text(body: &str) -> InboundSms {
        InboundSms {
            message_sid: "SMinbound".to_string(),
            from: "+15557654321".to_string(),
            to: "+15550001111".to_string(),
            body: body.to_string(),
        }
    }

    async fn wait_for_events(h: &Harness, at_least: usize) -> Vec<crate::db::Event> {
        for _ in 0..50 {
            let events = h.events.list_recent(&h.business.id, 50).unwrap();
            if events.len() >= at_least {
                return events;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        h.events.list_recent(&h.business.id, 50).unwrap()
    }

    #[tokio::test]
    async fn missed_call_texts_caller_and_owner() {
        let h = harness();
        h.responder
            .handle_missed_call(voice("CA1", CallStatus::NoAnswer, None))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "+15557654321");
        assert!(sent[0].body.contains("Juniper Plumbing"));
        assert_eq!(sent[1].to, "+15550002222");
        assert!(sent[1].body.contains("Missed call"));

        let events = wait_for_events(&h, 3).await;
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::MissedCall));
        assert!(kinds.contains(&EventKind::SmsOut));
        assert!(kinds.contains(&EventKind::OwnerAlert));
    }

    #[tokio::test]
    async fn short_completed_call_counts_as_missed() {
        let h = harness();
        h.responder
            .handle_missed_call(voice("CA1", CallStatus::Completed, Some(4)))
            .await
            .unwrap();
        assert_eq!(h.sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn long_completed_call_is_not_missed() {
        let h = harness();
        h.responder
            .handle_missed_call(voice("CA1", CallStatus::Completed, Some(95)))
            .await
            .unwrap();
        assert!(h.sender.sent().is_empty());

        let events = wait_for_events(&h, 1).await;
        assert_eq!(events[0].kind, EventKind::CallCompleted);
    }

    #[tokio::test]
    async fn unknown_number_is_ignored() {
        let h = harness();
        let mut event = voice("CA1", CallStatus::NoAnswer, None);
        event.to = "+19998887777".to_string();
        h.responder.handle_missed_call(event).await.unwrap();
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn canceled_subscription_suppresses_everything() {
        let h = harness();
        h.repo
            .update_subscription(&h.business.id, SubscriptionStatus::Canceled, None)
            .unwrap();
        h.responder.directory.invalidate_all();

        h.responder
            .handle_missed_call(voice("CA1", CallStatus::Busy, None))
            .await
            .unwrap();
        assert!(h.sender.sent().is_empty());

        let events = wait_for_events(&h, 2).await;
        assert!(events.iter().any(|e| e.kind == EventKind::ReplySuppressed));
        assert!(!events.iter().any(|e| e.kind == EventKind::OwnerAlert));
    }

    #[tokio::test]
    async fn past_due_keeps_owner_alerts() {
        let h = harness();
        h.repo
            .update_subscription(&h.business.id, SubscriptionStatus::PastDue, None)
            .unwrap();
        h.responder.directory.invalidate_all();

        h.responder
            .handle_missed_call(voice("CA1", CallStatus::NoAnswer, None))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15550002222");
    }

    #[tokio::test]
    async fn rate_limit_caps_customer_texts_not_owner_alerts() {
        let pipeline = PipelineConfig {
            rate_limit_max_sends: 1,
            ..PipelineConfig::default()
        };
        let h = harness_with(RecordingSender::new(), pipeline);

        h.responder
            .handle_missed_call(voice("CA1", CallStatus::NoAnswer, None))
            .await
            .unwrap();
        h.responder
            .handle_missed_call(voice("CA2", CallStatus::NoAnswer, None))
            .await
            .unwrap();

        let sent = h.sender.sent();
        // Call 1: caller text + owner alert. Call 2: owner alert only.
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].to, "+15550002222");
        assert_eq!(sent[2].to, "+15550002222");
    }

    #[tokio::test]
    async fn inbound_faq_gets_the_stored_answer() {
        let h = harness();
        h.repo
            .add_faq(&h.business.id, "What are your hours?", "Open 8am to 6pm")
            .unwrap();

        h.responder
            .handle_inbound_sms(text("what are your hours?"))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Open 8am to 6pm");
    }

    #[tokio::test]
    async fn inbound_ordering_request_gets_the_link() {
        let h = harness();
        h.responder
            .handle_inbound_sms(text("can I order takeout?"))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("https://order.example.com"));
    }

    #[tokio::test]
    async fn inbound_urgent_message_acks_and_pages_owner() {
        let h = harness();
        h.responder
            .handle_inbound_sms(text("EMERGENCY, a pipe burst!"))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].body.contains("urgent"));
        assert_eq!(sent[1].to, "+15550002222");
        assert!(sent[1].body.contains("Urgent message"));
    }

    #[tokio::test]
    async fn plain_inbound_without_llm_uses_template() {
        let h = harness();
        h.responder
            .handle_inbound_sms(text("hello there"))
            .await
            .unwrap();

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Juniper Plumbing"));
    }

    #[tokio::test]
    async fn unconfigured_sender_leaves_rate_limit_window_untouched() {
        let pool = db::init_memory().unwrap();
        let repo = BusinessRepo::new(pool.clone());
        repo.upsert(&NewBusiness {
            name: "Juniper Plumbing".to_string(),
            phone_number: "+15550001111".to_string(),
            owner_phone: "+15550002222".to_string(),
            ..NewBusiness::default()
        })
        .unwrap();

        let rate_limits = RateLimitRepo::new(pool.clone());
        let responder = Responder::new(
            BusinessDirectory::new(repo),
            rate_limits.clone(),
            EventLogger::new(EventRepo::new(pool)),
            PipelineConfig {
                rate_limit_max_sends: 1,
                ..PipelineConfig::default()
            },
            true,
        );

        responder
            .handle_missed_call(voice("CA1", CallStatus::NoAnswer, None))
            .await
            .unwrap();

        // The single window slot is still free for a real send.
        assert!(
            rate_limits
                .check_and_count("+15557654321", 3600, 1)
                .unwrap()
                .is_allowed()
        );
    }

    #[tokio::test]
    async fn send_failure_records_delivery_failed() {
        let h = harness_with(RecordingSender::failing(), PipelineConfig::default());
        h.responder
            .handle_missed_call(voice("CA1", CallStatus::NoAnswer, None))
            .await
            .unwrap();

        let events = wait_for_events(&h, 3).await;
        assert!(events.iter().any(|e| e.kind == EventKind::DeliveryFailed));
    }

    #[test]
    fn missed_call_classification() {
        assert!(is_missed_call(CallStatus::NoAnswer, None, 10));
        assert!(is_missed_call(CallStatus::Busy, None, 10));
        assert!(is_missed_call(CallStatus::Failed, None, 10));
        assert!(is_missed_call(CallStatus::Canceled, None, 10));
        assert!(is_missed_call(CallStatus::Completed, Some(3), 10));
        assert!(is_missed_call(CallStatus::Completed, None, 10));
        assert!(!is_missed_call(CallStatus::Completed, Some(45), 10));
        assert!(!is_missed_call(CallStatus::Ringing, None, 10));
        assert!(!is_missed_call(CallStatus::InProgress, Some(2), 10));
    }

    #[test]
    fn template_rendering() {
        let h_business = Business {
            id: "b1".to_string(),
            name: "Juniper Plumbing".to_string(),
            phone_number: "+15550001111".to_string(),
            owner_phone: "+15550002222".to_string(),
            greeting_template: String::new(),
            reply_template: String::new(),
            ordering_url: Some("https://order.example.com".to_string()),
            llm_enabled: true,
            alerts_enabled: true,
            subscription_status: SubscriptionStatus::Active,
            stripe_customer_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let out = render_template(
            "Hi from {business}, we saw {caller} call. Order: {ordering_url}",
            &h_business,
            "+15557654321",
        );
        assert_eq!(
            out,
            "Hi from Juniper Plumbing, we saw +15557654321 call. Order: https://order.example.com"
        );
    }
}
