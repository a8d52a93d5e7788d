//! Normalized inbound events.
//!
//! An upstream collaborator turns raw webhook payloads into an
//! `InboundEvent`. Fields are whatever the normalizer could extract;
//! coarse payloads get enriched by a follow-up fetch outside this core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::task::WaitingFor;

/// Category of an inbound external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    EmailReply,
    CalendarResponse,
    WebhookEvent,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailReply => "email_reply",
            Self::CalendarResponse => "calendar_response",
            Self::WebhookEvent => "webhook_event",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email_reply" => Some(Self::EmailReply),
            "calendar_response" => Some(Self::CalendarResponse),
            "webhook_event" => Some(Self::WebhookEvent),
            _ => None,
        }
    }

    /// The wait kind a task must be suspended on for this category to
    /// be a candidate.
    pub fn waiting_for(&self) -> WaitingFor {
        match self {
            Self::EmailReply => WaitingFor::EmailReply,
            Self::CalendarResponse => WaitingFor::CalendarResponse,
            Self::WebhookEvent => WaitingFor::WebhookEvent,
        }
    }
}

/// Normalized webhook payload handed to the matching engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub object_id: Option<String>,
    pub object_type: Option<String>,
    pub event_id: Option<String>,
    /// Normalizer fields that have no dedicated slot
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl InboundEvent {
    pub fn with_thread_id(mut self, id: impl Into<String>) -> Self {
        self.thread_id = Some(id.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_object(mut self, id: impl Into<String>, object_type: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self.object_type = Some(object_type.into());
        self
    }

    /// Serialize to the JSON value merged into a resumed task's
    /// workflow state.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parses_from_webhook_strings() {
        assert_eq!(EventCategory::from_str("email_reply"), Some(EventCategory::EmailReply));
        assert_eq!(
            EventCategory::from_str("CALENDAR_RESPONSE"),
            Some(EventCategory::CalendarResponse)
        );
        assert_eq!(EventCategory::from_str("unknown"), None);
    }

    #[test]
    fn test_category_maps_onto_wait_kind() {
        assert_eq!(EventCategory::EmailReply.waiting_for(), WaitingFor::EmailReply);
        assert_eq!(
            EventCategory::CalendarResponse.waiting_for(),
            WaitingFor::CalendarResponse
        );
        assert_eq!(EventCategory::WebhookEvent.waiting_for(), WaitingFor::WebhookEvent);
    }
}
