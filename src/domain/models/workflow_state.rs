//! Workflow state carried on a task.
//!
//! Step outputs are stored in a typed union per workflow family rather
//! than a single untyped map. Free text coming back from the reasoning
//! oracle goes into the `scratch` map only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
}

/// One ordered, tool-addressable unit of a decomposed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub number: u32,
    pub description: String,
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(number: u32, description: impl Into<String>) -> Self {
        Self {
            number,
            description: description.into(),
            status: StepStatus::Pending,
        }
    }

    /// Opaque identifier used in `next_step` and `steps_completed`.
    pub fn step_id(&self) -> String {
        format!("step_{}", self.number)
    }
}

/// Recorded outcome of an executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub tool: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

/// How a recipient answered the reply we were waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAnalysis {
    Accepted,
    Declined,
    Unclear,
}

impl ReplyAnalysis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Unclear => "unclear",
        }
    }
}

/// Typed step outputs, one variant per workflow family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowOutputs {
    Email {
        draft: Option<String>,
        sent_message_id: Option<String>,
        thread_id: Option<String>,
        reply_analysis: Option<ReplyAnalysis>,
    },
    Calendar {
        event_id: Option<String>,
        invitees: Vec<String>,
        response: Option<String>,
    },
    Crm {
        object_id: Option<String>,
        object_type: Option<String>,
    },
    General(HashMap<String, serde_json::Value>),
}

impl Default for WorkflowOutputs {
    fn default() -> Self {
        Self::General(HashMap::new())
    }
}

impl WorkflowOutputs {
    /// Record the outcome of a sent email, switching the variant if the
    /// workflow had not produced email output yet.
    pub fn record_sent_email(&mut self, message_id: Option<String>, thread_id: Option<String>) {
        match self {
            Self::Email {
                sent_message_id, thread_id: tid, ..
            } => {
                if message_id.is_some() {
                    *sent_message_id = message_id;
                }
                if thread_id.is_some() {
                    *tid = thread_id;
                }
            }
            _ => {
                *self = Self::Email {
                    draft: None,
                    sent_message_id: message_id,
                    thread_id,
                    reply_analysis: None,
                };
            }
        }
    }

    pub fn record_reply_analysis(&mut self, analysis: ReplyAnalysis) {
        if let Self::Email { reply_analysis, .. } = self {
            *reply_analysis = Some(analysis);
        }
    }

    pub fn record_calendar_event(&mut self, event_id: Option<String>) {
        match self {
            Self::Calendar { event_id: eid, .. } => {
                if event_id.is_some() {
                    *eid = event_id;
                }
            }
            Self::Email { .. } => {
                // Email workflows that end in a booked meeting keep their
                // email outputs; the event id lands in the general record
                // of the creating step instead.
            }
            _ => {
                *self = Self::Calendar {
                    event_id,
                    invitees: Vec::new(),
                    response: None,
                };
            }
        }
    }
}

/// Everything a workflow accumulates while executing: the ordered step
/// plan, typed outputs, oracle free text, and merged resumption events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Ordered plan produced by the breakdown phase
    #[serde(default)]
    pub plan: Vec<PlanStep>,
    /// Typed outputs per workflow family
    #[serde(default)]
    pub outputs: WorkflowOutputs,
    /// Per-step tool outcome record
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    /// Oracle-derived free text only
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scratch: HashMap<String, serde_json::Value>,
    /// Inbound event data merged in by resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_event: Option<serde_json::Value>,
}

impl WorkflowState {
    /// First step of the plan that has not completed yet.
    pub fn next_pending_step(&self) -> Option<&PlanStep> {
        self.plan.iter().find(|s| s.status == StepStatus::Pending)
    }

    /// Mark the numbered step completed.
    pub fn complete_step(&mut self, number: u32) {
        if let Some(step) = self.plan.iter_mut().find(|s| s.number == number) {
            step.status = StepStatus::Completed;
        }
    }

    /// Append a synthesized step after the current plan.
    pub fn append_step(&mut self, description: impl Into<String>) -> u32 {
        let number = self.plan.iter().map(|s| s.number).max().unwrap_or(0) + 1;
        self.plan.push(PlanStep::new(number, description));
        number
    }

    pub fn record_step_result(&mut self, result: StepResult) {
        self.step_results.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pending_step_in_order() {
        let mut state = WorkflowState {
            plan: vec![
                PlanStep::new(1, "find contact"),
                PlanStep::new(2, "send email"),
            ],
            ..Default::default()
        };

        assert_eq!(state.next_pending_step().unwrap().number, 1);
        state.complete_step(1);
        assert_eq!(state.next_pending_step().unwrap().number, 2);
        state.complete_step(2);
        assert!(state.next_pending_step().is_none());
    }

    #[test]
    fn test_append_step_numbers_after_plan() {
        let mut state = WorkflowState {
            plan: vec![PlanStep::new(1, "send email")],
            ..Default::default()
        };
        let n = state.append_step("create calendar event");
        assert_eq!(n, 2);
        assert_eq!(state.plan.len(), 2);
    }

    #[test]
    fn test_record_sent_email_switches_variant() {
        let mut outputs = WorkflowOutputs::default();
        outputs.record_sent_email(Some("m-1".into()), Some("t-1".into()));
        match outputs {
            WorkflowOutputs::Email { sent_message_id, thread_id, .. } => {
                assert_eq!(sent_message_id.as_deref(), Some("m-1"));
                assert_eq!(thread_id.as_deref(), Some("t-1"));
            }
            other => panic!("expected email outputs, got {:?}", other),
        }
    }

    #[test]
    fn test_workflow_state_roundtrip() {
        let mut state = WorkflowState::default();
        state.plan.push(PlanStep::new(1, "send email"));
        state.outputs.record_sent_email(Some("m-1".into()), None);
        state.resume_event = Some(serde_json::json!({"from": "jane@example.com"}));

        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
