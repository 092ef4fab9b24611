//! The alert rule engine and dispatcher (C7): classifies post-analysis
//! events into notification kinds, picks priority, recipients and
//! channel, then persists and attempts delivery.
//!
//! `AlertEngine::classify` answers three questions in order (should we
//! alert, what priority, who gets it on what channel) and is pure: it
//! reads only the event and the config. `AlertDispatcher` is the
//! effectful half: it persists the planned notification, validates the
//! recipient for its channel, and attempts delivery through a
//! [`NotificationChannelSender`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use callaudit_broker::{BrokerMessage, Handler, HandlerOutcome};
use callaudit_config::AlertConfig;
use callaudit_core::envelope::{EventEnvelope, EventPayload};
use callaudit_core::payloads::Severity;
use callaudit_core::readmodel::{Notification, NotificationChannel, Priority};
use callaudit_persistence::{NotificationStore, PersistenceError};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static CHAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[#@][A-Za-z0-9_-]+$").expect("valid regex"));

/// One notification the engine decided to send, before it has been
/// persisted or attempted. `AlertDispatcher::dispatch` turns this into a
/// [`Notification`] row.
#[derive(Debug, Clone)]
pub struct PlannedNotification {
    pub call_id: String,
    pub notification_type: String,
    pub recipient: String,
    pub channel: NotificationChannel,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
}

/// The three-question decision procedure, applied per event.
pub struct AlertEngine {
    config: AlertConfig,
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    /// Classify one event into zero, one, or two planned notifications.
    /// An escalation with high churn risk produces two notifications from
    /// a single `SentimentAnalyzed` event.
    pub fn classify(&self, envelope: &EventEnvelope) -> Vec<PlannedNotification> {
        match &envelope.payload {
            EventPayload::SentimentAnalyzed(p) => self.classify_sentiment(envelope, p),
            EventPayload::VocAnalyzed(p) => self.classify_voc(envelope, p),
            EventPayload::CallAudited(p) => self.classify_audited(envelope, p),
            _ => Vec::new(),
        }
    }

    fn classify_sentiment(
        &self,
        envelope: &EventEnvelope,
        p: &callaudit_core::payloads::SentimentAnalyzed,
    ) -> Vec<PlannedNotification> {
        let mut planned = Vec::new();

        if p.escalation_detected && self.config.escalation_alerts_enabled {
            planned.push(self.notification(
                &p.call_id,
                "escalation",
                Priority::Urgent,
                NotificationChannel::Chat,
                "Escalation detected on live call",
                format!(
                    "Call {} shows a sentiment drop flagged as an escalation.",
                    p.call_id
                ),
            ));
        }

        // `predictedChurnRisk` is a VoC-only field, but the churn alert
        // rule evaluates it against a `SentimentAnalyzed` event. We treat
        // it as an optional metadata hint a producer may stamp onto the
        // envelope (the same open `metadata` map used for agentId/model
        // version), rather than inventing a cross-stream read. Absent the
        // hint, only the escalation condition above applies to this event.
        if let Some(churn) = envelope
            .metadata
            .get("predictedChurnRisk")
            .and_then(|v| v.parse::<f64>().ok())
        {
            if churn >= self.config.churn_threshold {
                let priority = if churn >= self.config.high_churn_threshold {
                    Priority::High
                } else {
                    Priority::Normal
                };
                planned.push(self.notification(
                    &p.call_id,
                    "high_churn",
                    priority,
                    NotificationChannel::Email,
                    "High churn risk detected",
                    format!(
                        "Call {} carries a predicted churn risk of {:.2}.",
                        p.call_id, churn
                    ),
                ));
            }
        }

        planned
    }

    fn classify_voc(
        &self,
        _envelope: &EventEnvelope,
        p: &callaudit_core::payloads::VocAnalyzed,
    ) -> Vec<PlannedNotification> {
        // `flagsForReview` is not part of the `VocAnalyzed` payload; we
        // derive the equivalent "needs review" signal from the two VoC
        // fields that carry that intent: a complaint with nothing
        // actioned, or low satisfaction.
        let flags_for_review = (p.primary_intent == callaudit_core::payloads::Intent::Complaint
            && p.actionable_items.is_empty())
            || p.customer_satisfaction == callaudit_core::payloads::SatisfactionLevel::Low;

        let critical_themes: Vec<&String> = p
            .topics
            .iter()
            .filter(|t| {
                self.config
                    .critical_themes
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(t))
            })
            .collect();

        if !flags_for_review && critical_themes.is_empty() {
            return Vec::new();
        }

        let priority = if critical_themes.len() >= self.config.critical_themes_threshold {
            Priority::High
        } else {
            Priority::Normal
        };

        vec![self.notification(
            &p.call_id,
            "review_required",
            priority,
            NotificationChannel::Email,
            "Call flagged for review",
            format!(
                "Call {} was flagged for review (intent={:?}, satisfaction={:?}, themes={:?}).",
                p.call_id, p.primary_intent, p.customer_satisfaction, critical_themes
            ),
        )]
    }

    fn classify_audited(
        &self,
        _envelope: &EventEnvelope,
        p: &callaudit_core::payloads::CallAudited,
    ) -> Vec<PlannedNotification> {
        let score_fraction = p.overall_score as f64 / 100.0;
        let has_critical = p.violations.iter().any(|v| v.severity == Severity::Critical);
        let has_high = p
            .violations
            .iter()
            .any(|v| matches!(v.severity, Severity::High | Severity::Critical));

        let should_alert =
            score_fraction < self.config.compliance_floor || has_high || p.flags_for_review;
        if !should_alert {
            return Vec::new();
        }

        let priority = if has_critical || score_fraction < self.config.low_compliance_threshold {
            Priority::Urgent
        } else if score_fraction < self.config.compliance_floor || has_high {
            Priority::High
        } else {
            Priority::Normal
        };

        let notification_type = if !p.violations.is_empty() {
            "compliance_violation"
        } else {
            "low_compliance"
        };

        vec![self.notification(
            &p.call_id,
            notification_type,
            priority,
            NotificationChannel::Email,
            "Compliance audit requires attention",
            format!(
                "Call {} scored {} ({} violation(s), status {:?}).",
                p.call_id,
                p.overall_score,
                p.violations.len(),
                p.compliance_status
            ),
        )]
    }

    /// Build the supervisor-addressed notification. Manager fan-out is
    /// applied afterwards by [`Self::fan_out_recipients`].
    fn notification(
        &self,
        call_id: &str,
        notification_type: &str,
        priority: Priority,
        channel: NotificationChannel,
        subject: &str,
        body: String,
    ) -> PlannedNotification {
        let recipient = match channel {
            NotificationChannel::Chat => self.config.escalation_chat_channel.clone(),
            NotificationChannel::Email | NotificationChannel::Webhook => {
                self.config.supervisor_email.clone()
            }
        };
        PlannedNotification {
            call_id: call_id.to_string(),
            notification_type: notification_type.to_string(),
            recipient,
            channel,
            subject: subject.to_string(),
            body,
            priority,
        }
    }

    /// Expand one planned notification into one-per-recipient rows: the
    /// supervisor always, plus the manager when priority is High/Urgent or
    /// the notification is an escalation.
    fn fan_out_recipients(&self, planned: PlannedNotification) -> Vec<PlannedNotification> {
        let include_manager =
            planned.priority >= Priority::High || planned.notification_type == "escalation";
        if !include_manager {
            return vec![planned];
        }
        let manager_recipient = match planned.channel {
            NotificationChannel::Chat => self.config.escalation_chat_channel.clone(),
            NotificationChannel::Email | NotificationChannel::Webhook => {
                self.config.manager_email.clone()
            }
        };
        let mut manager_copy = planned.clone();
        manager_copy.recipient = manager_recipient;
        vec![planned, manager_copy]
    }
}

/// Stand-in for a real delivery system (email/chat/webhook providers are
/// out-of-scope collaborators). Each implementation only needs to
/// report success or failure; the dispatcher owns all persistence and
/// state-machine transitions.
#[async_trait]
pub trait NotificationChannelSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), String>;
}

/// Delivery attempt that always succeeds, used for the channel that has
/// no stricter validation beyond the recipient-format check (dev/test
/// default for all three channels unless overridden).
pub struct NoopChannelSender;

#[async_trait]
impl NotificationChannelSender for NoopChannelSender {
    async fn send(&self, _notification: &Notification) -> Result<(), String> {
        Ok(())
    }
}

fn validate_recipient(channel: NotificationChannel, recipient: &str) -> Result<(), String> {
    let valid = match channel {
        NotificationChannel::Email => EMAIL_RE.is_match(recipient),
        NotificationChannel::Chat => CHAT_RE.is_match(recipient),
        NotificationChannel::Webhook => {
            recipient.starts_with("http://") || recipient.starts_with("https://")
        }
    };
    if valid {
        Ok(())
    } else {
        Err("invalid_recipient".to_string())
    }
}

fn outcome_for_store_error(err: PersistenceError) -> HandlerOutcome {
    if err.is_transient() {
        HandlerOutcome::Retry(err.to_string())
    } else {
        HandlerOutcome::Permanent(err.to_string())
    }
}

/// Turns planned notifications into persisted rows and attempts delivery.
/// Also implements [`Handler`] so it can be registered directly against
/// `calls.sentiment-analyzed`, `calls.voc-analyzed`, `calls.audited`.
pub struct AlertDispatcher<N: NotificationStore> {
    engine: AlertEngine,
    store: Arc<N>,
    channels: HashMap<NotificationChannel, Arc<dyn NotificationChannelSender>>,
}

impl<N: NotificationStore + 'static> AlertDispatcher<N> {
    pub fn new(config: AlertConfig, store: Arc<N>) -> Self {
        let mut channels: HashMap<NotificationChannel, Arc<dyn NotificationChannelSender>> =
            HashMap::new();
        channels.insert(NotificationChannel::Email, Arc::new(NoopChannelSender));
        channels.insert(NotificationChannel::Chat, Arc::new(NoopChannelSender));
        channels.insert(NotificationChannel::Webhook, Arc::new(NoopChannelSender));
        Self {
            engine: AlertEngine::new(config),
            store,
            channels,
        }
    }

    pub fn with_channel(
        mut self,
        channel: NotificationChannel,
        sender: Arc<dyn NotificationChannelSender>,
    ) -> Self {
        self.channels.insert(channel, sender);
        self
    }

    /// Persist a `pending` row, validate the recipient, and attempt
    /// delivery. Returns the final notification row.
    pub async fn dispatch(&self, planned: PlannedNotification) -> Result<Notification, PersistenceError> {
        let mut notification = Notification::new_pending(
            planned.call_id,
            planned.notification_type,
            planned.recipient,
            planned.channel,
            planned.subject,
            planned.body,
            planned.priority,
        );
        self.store.create(notification.clone()).await?;

        if let Err(reason) = validate_recipient(notification.channel, &notification.recipient) {
            notification.mark_failed(reason);
            self.store.update(notification.clone()).await?;
            return Ok(notification);
        }

        let sender = self.channels.get(&notification.channel).cloned();
        let result = match sender {
            Some(sender) => sender.send(&notification).await,
            None => Err("no sender configured for channel".to_string()),
        };

        match result {
            Ok(()) => notification.mark_sent(),
            Err(reason) => notification.mark_failed(reason),
        }
        self.store.update(notification.clone()).await?;
        Ok(notification)
    }

    /// Reset a notification to `pending` and re-attempt delivery, the
    /// state machine's `resend` edge.
    pub async fn resend(&self, notification_id: Uuid) -> Result<Option<Notification>, PersistenceError> {
        let Some(mut notification) = self.store.get(notification_id).await? else {
            return Ok(None);
        };
        notification.reset_for_resend();
        self.store.update(notification.clone()).await?;

        let sender = self.channels.get(&notification.channel).cloned();
        let result = match sender {
            Some(sender) => sender.send(&notification).await,
            None => Err("no sender configured for channel".to_string()),
        };
        match result {
            Ok(()) => notification.mark_sent(),
            Err(reason) => notification.mark_failed(reason),
        }
        self.store.update(notification.clone()).await?;
        Ok(Some(notification))
    }
}

#[async_trait]
impl<N: NotificationStore + 'static> Handler for AlertDispatcher<N> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        let planned = self.engine.classify(&message.envelope);
        if planned.is_empty() {
            return HandlerOutcome::Ack;
        }

        for one in planned {
            for recipient_copy in self.engine.fan_out_recipients(one) {
                match self.dispatch(recipient_copy).await {
                    Ok(notification) => {
                        info!(
                            call_id = %notification.call_id,
                            notification_type = %notification.notification_type,
                            status = ?notification.status,
                            "alert dispatched"
                        );
                    }
                    Err(e) => {
                        warn!(%e, "failed to persist/dispatch notification");
                        return outcome_for_store_error(e);
                    }
                }
            }
        }
        HandlerOutcome::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callaudit_core::payloads::{
        ComplianceStatus, Intent, SatisfactionLevel, SentimentAnalyzed, Severity, VocAnalyzed,
        Violation,
    };
    use callaudit_persistence::InMemoryNotificationStore;

    fn envelope_with_metadata(payload: EventPayload, metadata: &[(&str, &str)]) -> EventEnvelope {
        let mut envelope = EventEnvelope::originate("c1", payload);
        for (k, v) in metadata {
            envelope = envelope.with_metadata(*k, *v);
        }
        envelope
    }

    #[test]
    fn escalation_and_churn_produce_two_notifications() {
        let engine = AlertEngine::new(AlertConfig::default());
        let payload = EventPayload::SentimentAnalyzed(SentimentAnalyzed {
            call_id: "c1".into(),
            overall_sentiment: callaudit_core::payloads::Sentiment::Negative,
            sentiment_score: -0.6,
            escalation_detected: true,
            escalation_details: None,
            segment_sentiments: vec![],
            processing_time_ms: 5,
        });
        let envelope = envelope_with_metadata(payload, &[("predictedChurnRisk", "0.85")]);
        let planned = engine.classify(&envelope);
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().any(|p| p.notification_type == "escalation"));
        assert!(planned.iter().any(|p| p.notification_type == "high_churn"));
    }

    #[test]
    fn critical_violation_is_urgent() {
        let engine = AlertEngine::new(AlertConfig::default());
        let payload = EventPayload::CallAudited(callaudit_core::payloads::CallAudited {
            call_id: "c1".into(),
            overall_score: 80,
            compliance_status: ComplianceStatus::Failed,
            script_adherence: 90,
            customer_service: 90,
            resolution_effectiveness: 90,
            flags_for_review: true,
            review_reason: Some("critical compliance violation".into()),
            violations: vec![Violation {
                rule_id: "R_PROHIBITED".into(),
                rule_name: "no prohibited words".into(),
                severity: Severity::Critical,
                description: "bad word".into(),
                timestamp_in_call: Some(3.0),
                evidence: Some("that's stupid".into()),
            }],
            processing_time_ms: 5,
        });
        let envelope = EventEnvelope::originate("c1", payload);
        let planned = engine.classify(&envelope);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].priority, Priority::Urgent);
    }

    #[test]
    fn healthy_voc_produces_no_alert() {
        let engine = AlertEngine::new(AlertConfig::default());
        let payload = EventPayload::VocAnalyzed(VocAnalyzed {
            call_id: "c1".into(),
            primary_intent: Intent::Inquiry,
            topics: vec!["billing".into()],
            keywords: vec![],
            customer_satisfaction: SatisfactionLevel::High,
            predicted_churn_risk: 0.1,
            actionable_items: vec![],
            summary: String::new(),
        });
        let envelope = EventEnvelope::originate("c1", payload);
        assert!(engine.classify(&envelope).is_empty());
    }

    #[tokio::test]
    async fn invalid_email_recipient_fails_permanently() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let dispatcher = AlertDispatcher::new(AlertConfig::default(), store.clone());
        let planned = PlannedNotification {
            call_id: "c1".into(),
            notification_type: "low_compliance".into(),
            recipient: "not-an-email".into(),
            channel: NotificationChannel::Email,
            subject: "subject".into(),
            body: "body".into(),
            priority: Priority::Normal,
        };
        let result = dispatcher.dispatch(planned).await.unwrap();
        assert_eq!(result.status, callaudit_core::readmodel::NotificationStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("invalid_recipient"));
    }

    #[tokio::test]
    async fn valid_recipient_is_sent() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let dispatcher = AlertDispatcher::new(AlertConfig::default(), store.clone());
        let planned = PlannedNotification {
            call_id: "c1".into(),
            notification_type: "escalation".into(),
            recipient: "#call-escalations".into(),
            channel: NotificationChannel::Chat,
            subject: "subject".into(),
            body: "body".into(),
            priority: Priority::Urgent,
        };
        let result = dispatcher.dispatch(planned).await.unwrap();
        assert_eq!(result.status, callaudit_core::readmodel::NotificationStatus::Sent);
        assert!(result.sent_at.is_some());
    }

    #[tokio::test]
    async fn resend_resets_and_re_attempts() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let dispatcher = AlertDispatcher::new(AlertConfig::default(), store.clone());
        let planned = PlannedNotification {
            call_id: "c1".into(),
            notification_type: "low_compliance".into(),
            recipient: "not-an-email".into(),
            channel: NotificationChannel::Email,
            subject: "subject".into(),
            body: "body".into(),
            priority: Priority::Normal,
        };
        let failed = dispatcher.dispatch(planned).await.unwrap();
        assert_eq!(failed.status, callaudit_core::readmodel::NotificationStatus::Failed);

        let resent = dispatcher.resend(failed.notification_id).await.unwrap().unwrap();
        assert_eq!(resent.status, callaudit_core::readmodel::NotificationStatus::Failed);
        assert_eq!(resent.notification_id, failed.notification_id);
    }
}
