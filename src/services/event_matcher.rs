//! Event matching and resumption.
//!
//! Maps an inbound webhook event onto the waiting task(s) whose wait
//! condition it satisfies. Matching is an OR over heuristics evaluated
//! in priority order; each strategy's verdict is logged individually so
//! mismatches stay diagnosable, even though only the aggregate decides.
//!
//! The design deliberately accepts occasional false positives: an
//! un-resumed task stalls silently forever, while a wrongly-resumed
//! task still produces visible, correctable output.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventCategory, InboundEvent, Task, TaskStatus, WaitDescriptor};
use crate::domain::ports::{ReasoningOracle, TaskRepository, ToolExecutor};
use crate::services::task_lifecycle::TaskLifecycle;
use crate::services::workflow_engine::WorkflowEngine;

/// One heuristic rule for deciding whether an event satisfies a task's
/// wait condition, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact thread or CRM object id equality.
    ThreadIdentity,
    /// Sender address equals or contains the expected recipient.
    SenderIdentity,
    /// Reply-marker subject carrying a domain keyword or the
    /// recipient's name.
    SubjectHeuristic,
    /// A token of the recipient's name appears near the sender address.
    FuzzyName,
    /// Task created recently; weakest signal, last resort only.
    Recency,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadIdentity => "thread_identity",
            Self::SenderIdentity => "sender_identity",
            Self::SubjectHeuristic => "subject_heuristic",
            Self::FuzzyName => "fuzzy_name",
            Self::Recency => "recency",
        }
    }
}

/// How one matched task's resumption went.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumptionOutcome {
    /// The task resumed and progressed (possibly to completion).
    Resumed,
    /// The task resumed but immediately suspended again.
    Waiting,
    /// Resumption failed; other candidates were still processed.
    Error(String),
}

/// Per-task result returned to the webhook caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventMatchOutcome {
    pub task_id: Uuid,
    pub strategy: MatchStrategy,
    pub outcome: ResumptionOutcome,
}

pub struct EventMatcher<R, T, O>
where
    R: TaskRepository,
    T: ToolExecutor,
    O: ReasoningOracle,
{
    lifecycle: Arc<TaskLifecycle<R>>,
    engine: Arc<WorkflowEngine<R, T, O>>,
    recency_window: Duration,
}

impl<R, T, O> EventMatcher<R, T, O>
where
    R: TaskRepository,
    T: ToolExecutor,
    O: ReasoningOracle,
{
    pub fn new(lifecycle: Arc<TaskLifecycle<R>>, engine: Arc<WorkflowEngine<R, T, O>>) -> Self {
        Self {
            lifecycle,
            engine,
            recency_window: Duration::minutes(120),
        }
    }

    pub fn with_recency_window_minutes(mut self, minutes: i64) -> Self {
        self.recency_window = Duration::minutes(minutes);
        self
    }

    /// Webhook entry point.
    ///
    /// Finds every waiting task the event matches and resumes each,
    /// isolating per-task failures. Tolerates duplicate delivery: a
    /// second invocation with the same event finds no still-waiting
    /// match and returns an empty outcome set.
    pub async fn handle_event(
        &self,
        user_id: &str,
        category: EventCategory,
        event: &InboundEvent,
    ) -> DomainResult<Vec<EventMatchOutcome>> {
        let candidates = self
            .lifecycle
            .waiting_tasks(user_id, Some(category.waiting_for()))
            .await?;

        tracing::info!(
            user_id,
            category = category.as_str(),
            candidates = candidates.len(),
            "Matching inbound event against waiting tasks"
        );

        let mut matched: Vec<(Task, MatchStrategy)> = Vec::new();
        for task in &candidates {
            if let Some(strategy) = match_task(task, event) {
                matched.push((task.clone(), strategy));
            }
        }

        // Recency is a last resort for coarse events only: when the
        // payload carried identifiers and none of them matched, that is
        // evidence against every candidate, not an invitation to guess.
        if matched.is_empty() && event_is_coarse(event) {
            let now = Utc::now();
            for task in &candidates {
                if now.signed_duration_since(task.created_at) <= self.recency_window {
                    tracing::debug!(
                        task_id = %task.id,
                        strategy = MatchStrategy::Recency.as_str(),
                        "Weak recency match; event too coarse for stronger strategies"
                    );
                    matched.push((task.clone(), MatchStrategy::Recency));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(matched.len());
        for (task, strategy) in matched {
            let outcome = match self.engine.resume(task.id, category, event).await {
                Ok(resumed) if resumed.status == TaskStatus::WaitingForResponse => {
                    ResumptionOutcome::Waiting
                }
                Ok(resumed) if resumed.status == TaskStatus::Failed => {
                    ResumptionOutcome::Error(
                        resumed
                            .failure_reason
                            .unwrap_or_else(|| "resumed task failed".to_string()),
                    )
                }
                Ok(_) => ResumptionOutcome::Resumed,
                Err(err) => {
                    tracing::warn!(
                        task_id = %task.id,
                        error = %err,
                        "Resumption failed; continuing with remaining candidates"
                    );
                    ResumptionOutcome::Error(err.to_string())
                }
            };
            outcomes.push(EventMatchOutcome {
                task_id: task.id,
                strategy,
                outcome,
            });
        }

        Ok(outcomes)
    }
}

/// An event with none of the identifiers the stronger strategies need.
fn event_is_coarse(event: &InboundEvent) -> bool {
    event.thread_id.is_none() && event.object_id.is_none() && event.from.is_none()
}

/// Evaluate the non-recency strategies in priority order. Every verdict
/// is logged; the first positive one wins.
fn match_task(task: &Task, event: &InboundEvent) -> Option<MatchStrategy> {
    let descriptor = task.waiting_for_data.as_ref()?;

    let checks: [(MatchStrategy, bool); 4] = [
        (
            MatchStrategy::ThreadIdentity,
            thread_identity_match(descriptor, event),
        ),
        (
            MatchStrategy::SenderIdentity,
            sender_identity_match(descriptor, event),
        ),
        (
            MatchStrategy::SubjectHeuristic,
            subject_heuristic_match(descriptor, event),
        ),
        (MatchStrategy::FuzzyName, fuzzy_name_match(descriptor, event)),
    ];

    let mut winner = None;
    for (strategy, verdict) in checks {
        tracing::debug!(
            task_id = %task.id,
            strategy = strategy.as_str(),
            verdict,
            "Strategy evaluated"
        );
        if verdict && winner.is_none() {
            winner = Some(strategy);
        }
    }
    winner
}

/// Exact equality on thread id, or on CRM/calendar object id. The
/// strongest signal there is.
fn thread_identity_match(descriptor: &WaitDescriptor, event: &InboundEvent) -> bool {
    let thread = match (&descriptor.thread_id, &event.thread_id) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    };
    let object = match (&descriptor.object_id, &event.object_id) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    };
    thread || object
}

/// Sender equals or contains the expected recipient address,
/// case-insensitively, after stripping display-name decoration from
/// both sides.
fn sender_identity_match(descriptor: &WaitDescriptor, event: &InboundEvent) -> bool {
    let (Some(expected), Some(from)) = (&descriptor.recipient_email, &event.from) else {
        return false;
    };

    let expected_addr = normalize_email(expected);
    let from_addr = normalize_email(from);
    if expected_addr.is_empty() || from_addr.is_empty() {
        return false;
    }

    from_addr == expected_addr
        || from_addr.contains(&expected_addr)
        || from.to_lowercase().contains(&expected_addr)
}

const SUBJECT_KEYWORDS: &[&str] = &["meeting", "available", "schedule", "appointment"];

/// Subject starts with a reply marker and carries either a domain
/// keyword or the recipient's recorded name.
fn subject_heuristic_match(descriptor: &WaitDescriptor, event: &InboundEvent) -> bool {
    let Some(subject) = &event.subject else {
        return false;
    };
    let subject = subject.trim().to_lowercase();
    if !subject.starts_with("re:") {
        return false;
    }

    if SUBJECT_KEYWORDS.iter().any(|k| subject.contains(k)) {
        return true;
    }

    descriptor
        .recipient_name
        .as_ref()
        .is_some_and(|name| !name.trim().is_empty() && subject.contains(&name.trim().to_lowercase()))
}

/// Any token (length > 2) of the recorded recipient name appears in the
/// sender address, or in the body text surrounding the sender address.
fn fuzzy_name_match(descriptor: &WaitDescriptor, event: &InboundEvent) -> bool {
    let Some(name) = &descriptor.recipient_name else {
        return false;
    };
    let tokens: Vec<String> = name
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect();
    if tokens.is_empty() {
        return false;
    }

    if let Some(from) = &event.from {
        let from = from.to_lowercase();
        if tokens.iter().any(|t| from.contains(t)) {
            return true;
        }
    }

    let (Some(body), Some(from)) = (&event.body, &event.from) else {
        return false;
    };
    let body = body.to_lowercase();
    let addr = normalize_email(from);
    if addr.is_empty() {
        return false;
    }
    let Some(pos) = body.find(&addr) else {
        return false;
    };

    let window = surrounding_window(&body, pos, addr.len(), 60);
    tokens.iter().any(|t| window.contains(t.as_str()))
}

/// Strip `Display Name <addr>` decoration and lowercase.
pub fn normalize_email(raw: &str) -> String {
    let raw = raw.trim();
    let addr = match (raw.find('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    addr.trim().trim_matches('"').to_lowercase()
}

/// Slice `radius` bytes of context either side of a match, snapped to
/// char boundaries.
fn surrounding_window(text: &str, pos: usize, len: usize, radius: usize) -> &str {
    let mut start = pos.saturating_sub(radius);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + len + radius).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskType, WaitingFor};

    fn waiting_task(descriptor: WaitDescriptor) -> Task {
        let mut task = Task::new("user-1", "Email Jane about meeting", TaskType::EmailWorkflow);
        task.status = TaskStatus::WaitingForResponse;
        task.waiting_for = Some(WaitingFor::EmailReply);
        task.waiting_for_data = Some(descriptor);
        task
    }

    #[test]
    fn test_thread_identity_exact_only() {
        let descriptor = WaitDescriptor::default().with_thread_id("thread-1");
        let hit = InboundEvent::default().with_thread_id("thread-1");
        let miss = InboundEvent::default().with_thread_id("thread-10");

        assert!(thread_identity_match(&descriptor, &hit));
        assert!(!thread_identity_match(&descriptor, &miss));
        assert!(!thread_identity_match(&descriptor, &InboundEvent::default()));
    }

    #[test]
    fn test_thread_identity_matches_crm_object() {
        let descriptor = WaitDescriptor::default().with_object("deal-7", "deal");
        let event = InboundEvent::default().with_object("deal-7", "deal");
        assert!(thread_identity_match(&descriptor, &event));
    }

    #[test]
    fn test_sender_identity_normalizes_display_names() {
        let descriptor = WaitDescriptor::default().with_recipient_email("Jane@Example.com");
        let event = InboundEvent::default().with_from("Jane Doe <jane@example.com>");
        assert!(sender_identity_match(&descriptor, &event));

        let other = InboundEvent::default().with_from("someone-else@y.com");
        assert!(!sender_identity_match(&descriptor, &other));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("Jane Doe <JANE@x.com>"), "jane@x.com");
        assert_eq!(normalize_email("  jane@x.com "), "jane@x.com");
        assert_eq!(normalize_email("\"Doe, Jane\" <jane@x.com>"), "jane@x.com");
    }

    #[test]
    fn test_subject_heuristic_needs_reply_marker() {
        let descriptor = WaitDescriptor::default().with_recipient_name("Jane Doe");

        let reply = InboundEvent::default().with_subject("Re: Meeting Request");
        assert!(subject_heuristic_match(&descriptor, &reply));

        let named = InboundEvent::default().with_subject("RE: question from jane doe");
        assert!(subject_heuristic_match(&descriptor, &named));

        let fresh = InboundEvent::default().with_subject("Meeting Request");
        assert!(!subject_heuristic_match(&descriptor, &fresh));

        let unrelated = InboundEvent::default().with_subject("Re: lunch?");
        assert!(!subject_heuristic_match(&descriptor, &unrelated));
    }

    #[test]
    fn test_fuzzy_name_token_in_sender() {
        let descriptor = WaitDescriptor::default().with_recipient_name("Jane Doe");
        let event = InboundEvent::default().with_from("jane.doe@corp.example");
        assert!(fuzzy_name_match(&descriptor, &event));

        // Two-letter tokens never fire.
        let short = WaitDescriptor::default().with_recipient_name("Jo Li");
        assert!(!fuzzy_name_match(&short, &event));
    }

    #[test]
    fn test_fuzzy_name_token_near_address_in_body() {
        let descriptor = WaitDescriptor::default().with_recipient_name("Jane Doe");
        let event = InboundEvent::default()
            .with_from("assistant@corp.example")
            .with_body("Forwarding on behalf of Jane (assistant@corp.example), she is fine with it");
        assert!(fuzzy_name_match(&descriptor, &event));

        let far = InboundEvent::default()
            .with_from("assistant@corp.example")
            .with_body("No names anywhere near here");
        assert!(!fuzzy_name_match(&descriptor, &far));
    }

    #[test]
    fn test_match_task_priority_order() {
        let descriptor = WaitDescriptor::default()
            .with_thread_id("t-1")
            .with_recipient_email("jane@x.com")
            .with_recipient_name("Jane Doe");
        let task = waiting_task(descriptor);

        // Thread id wins even when sender would also match.
        let event = InboundEvent::default()
            .with_thread_id("t-1")
            .with_from("jane@x.com");
        assert_eq!(match_task(&task, &event), Some(MatchStrategy::ThreadIdentity));

        // Without a thread id the sender strategy takes over.
        let event = InboundEvent::default().with_from("jane@x.com");
        assert_eq!(match_task(&task, &event), Some(MatchStrategy::SenderIdentity));

        let event = InboundEvent::default().with_from("stranger@y.com");
        assert_eq!(match_task(&task, &event), None);
    }
}
