//! Request and reply classification.
//!
//! The oracle-response parsers live next to the deterministic fallbacks
//! so both sides of each decision stay in one place. Everything here is
//! pure and total: the fallbacks always produce a classification,
//! regardless of input.

use crate::domain::models::{ReplyAnalysis, TaskType};

/// Which tool family a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFamily {
    Email,
    Calendar,
    Crm,
    Unknown,
}

impl ActionFamily {
    /// Tool name used on the simple path.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Calendar => "calendar",
            Self::Crm => "crm",
            Self::Unknown => "auto",
        }
    }

    /// Task type used when the complex path creates a task.
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Email => TaskType::EmailWorkflow,
            Self::Calendar => TaskType::CalendarWorkflow,
            Self::Crm => TaskType::HubspotWorkflow,
            Self::Unknown => TaskType::MultiStepAction,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let s = s.to_lowercase();
        if s.contains("email") || s.contains("mail") {
            Self::Email
        } else if s.contains("calendar") || s.contains("event") || s.contains("meeting") {
            Self::Calendar
        } else if s.contains("crm") || s.contains("hubspot") || s.contains("contact") {
            Self::Crm
        } else {
            Self::Unknown
        }
    }
}

/// Outcome of classifying a user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// One tool call, executed synchronously, no task row
    Simple(ActionFamily),
    /// Multi-step; a task is created and decomposed
    Complex(String),
    /// The request is too ambiguous to act on
    Clarify(Vec<String>),
}

/// Parse an oracle classification response.
///
/// Expected shapes: `SIMPLE:<action-kind>`, `COMPLEX:<description>`,
/// `CLARIFY:<questions>`. Returns None for anything else so the caller
/// falls back to the heuristic.
pub fn parse_oracle_classification(text: &str) -> Option<Classification> {
    let trimmed = text.trim();
    // Tolerate leading prose; take the first line carrying a marker.
    let line = trimmed
        .lines()
        .map(str::trim)
        .find(|l| {
            let upper = l.to_uppercase();
            upper.starts_with("SIMPLE:")
                || upper.starts_with("COMPLEX:")
                || upper.starts_with("CLARIFY:")
        })?;

    let (marker, rest) = line.split_once(':')?;
    let rest = rest.trim();
    match marker.trim().to_uppercase().as_str() {
        "SIMPLE" => Some(Classification::Simple(ActionFamily::from_str(rest))),
        "COMPLEX" => Some(Classification::Complex(rest.to_string())),
        "CLARIFY" => {
            let questions: Vec<String> = rest
                .split(|c| c == ';' || c == '\n')
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from)
                .collect();
            Some(Classification::Clarify(questions))
        }
        _ => None,
    }
}

/// Connectives that signal an ordered, multi-step request.
const SEQUENCING_CONNECTIVES: &[&str] = &[
    "and then",
    "after that",
    "after the",
    "after they",
    "after he",
    "after she",
    "wait for",
    "waiting for",
    "once they",
    "once the",
    "followed by",
    "when they reply",
    "when they respond",
    "if they accept",
    "if she accepts",
    "if he accepts",
];

const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail", "mail ", "reply", "inbox", "send a message"];

const CALENDAR_KEYWORDS: &[&str] = &[
    "calendar",
    "meeting",
    "schedule",
    "appointment",
    "invite",
    "event",
    "book a",
];

const CRM_KEYWORDS: &[&str] = &["crm", "hubspot", "contact record", "deal", "pipeline", "lead"];

/// Deterministic fallback classifier. Total: always returns something.
///
/// Sequencing connectives win over keyword families because a request
/// like "email Jane and then book a room" must not take the simple path.
pub fn heuristic_classify(request: &str) -> Classification {
    let lowered = request.to_lowercase();

    if SEQUENCING_CONNECTIVES.iter().any(|c| lowered.contains(c)) {
        return Classification::Complex(request.trim().to_string());
    }

    for (keywords, family) in [
        (EMAIL_KEYWORDS, ActionFamily::Email),
        (CALENDAR_KEYWORDS, ActionFamily::Calendar),
        (CRM_KEYWORDS, ActionFamily::Crm),
    ] {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return Classification::Simple(family);
        }
    }

    Classification::Simple(ActionFamily::Unknown)
}

/// Parse an oracle reply-sentiment response. Accepts the bare token
/// anywhere in the first line; None when nothing recognizable appears.
pub fn parse_oracle_reply_analysis(text: &str) -> Option<ReplyAnalysis> {
    let first_line = text.trim().lines().next()?.to_uppercase();
    if first_line.contains("ACCEPT") {
        Some(ReplyAnalysis::Accepted)
    } else if first_line.contains("DECLIN") {
        Some(ReplyAnalysis::Declined)
    } else if first_line.contains("UNCLEAR") {
        Some(ReplyAnalysis::Unclear)
    } else {
        None
    }
}

const ACCEPT_PHRASES: &[&str] = &[
    "yes",
    "sure",
    "sounds good",
    "works for me",
    "that works",
    "confirmed",
    "see you",
    "i'm available",
    "i am available",
    "accept",
];

const DECLINE_PHRASES: &[&str] = &[
    "no",
    "can't",
    "cannot",
    "can not",
    "won't",
    "unable",
    "decline",
    "not available",
    "unavailable",
    "doesn't work",
    "does not work",
    "reschedule",
];

/// Deterministic fallback reply classifier over the reply body. Total.
pub fn heuristic_reply_analysis(body: &str) -> ReplyAnalysis {
    let lowered = body.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    let contains_phrase = |phrase: &str| {
        if phrase.contains(' ') || phrase.contains('\'') {
            lowered.contains(phrase)
        } else {
            // Single words match on token boundaries so "no" does not
            // fire inside "know" or "noon".
            words.contains(&phrase)
        }
    };

    let declined = DECLINE_PHRASES.iter().any(|p| contains_phrase(p));
    let accepted = ACCEPT_PHRASES.iter().any(|p| contains_phrase(p));

    match (accepted, declined) {
        (true, false) => ReplyAnalysis::Accepted,
        (false, true) => ReplyAnalysis::Declined,
        _ => ReplyAnalysis::Unclear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_classification() {
        assert_eq!(
            parse_oracle_classification("SIMPLE: calendar"),
            Some(Classification::Simple(ActionFamily::Calendar))
        );
        assert_eq!(
            parse_oracle_classification("simple: email"),
            Some(Classification::Simple(ActionFamily::Email))
        );
    }

    #[test]
    fn test_parse_complex_classification() {
        let parsed = parse_oracle_classification("COMPLEX: email then schedule a follow-up");
        assert_eq!(
            parsed,
            Some(Classification::Complex("email then schedule a follow-up".to_string()))
        );
    }

    #[test]
    fn test_parse_clarify_questions() {
        let parsed = parse_oracle_classification("CLARIFY: Which Jane?; What time zone?");
        match parsed {
            Some(Classification::Clarify(questions)) => {
                assert_eq!(questions, vec!["Which Jane?", "What time zone?"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_tolerates_leading_prose() {
        let text = "Here is my assessment.\nSIMPLE: crm";
        assert_eq!(
            parse_oracle_classification(text),
            Some(Classification::Simple(ActionFamily::Crm))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_oracle_classification("I cannot help with that"), None);
        assert_eq!(parse_oracle_classification(""), None);
    }

    #[test]
    fn test_heuristic_sequencing_wins() {
        let c = heuristic_classify("Email Jane and then create a calendar event");
        assert!(matches!(c, Classification::Complex(_)));

        let c = heuristic_classify("Send the report and wait for approval");
        assert!(matches!(c, Classification::Complex(_)));
    }

    #[test]
    fn test_heuristic_keyword_families() {
        assert_eq!(
            heuristic_classify("Schedule a meeting with John tomorrow at 2pm"),
            Classification::Simple(ActionFamily::Calendar)
        );
        assert_eq!(
            heuristic_classify("Email the quarterly numbers to finance"),
            Classification::Simple(ActionFamily::Email)
        );
        assert_eq!(
            heuristic_classify("Update the hubspot deal stage"),
            Classification::Simple(ActionFamily::Crm)
        );
    }

    #[test]
    fn test_heuristic_is_total() {
        assert_eq!(
            heuristic_classify("xyzzy"),
            Classification::Simple(ActionFamily::Unknown)
        );
        assert_eq!(
            heuristic_classify(""),
            Classification::Simple(ActionFamily::Unknown)
        );
    }

    #[test]
    fn test_reply_analysis_parsing() {
        assert_eq!(parse_oracle_reply_analysis("ACCEPTED"), Some(ReplyAnalysis::Accepted));
        assert_eq!(
            parse_oracle_reply_analysis("DECLINED - conflict at that time"),
            Some(ReplyAnalysis::Declined)
        );
        assert_eq!(parse_oracle_reply_analysis("UNCLEAR"), Some(ReplyAnalysis::Unclear));
        assert_eq!(parse_oracle_reply_analysis("maybe?"), None);
    }

    #[test]
    fn test_reply_heuristic_word_boundaries() {
        assert_eq!(
            heuristic_reply_analysis("I know this is short notice, see you then!"),
            ReplyAnalysis::Accepted
        );
        assert_eq!(
            heuristic_reply_analysis("Sorry, I can't make it"),
            ReplyAnalysis::Declined
        );
        assert_eq!(
            heuristic_reply_analysis("Let me check with my manager"),
            ReplyAnalysis::Unclear
        );
    }

    #[test]
    fn test_reply_heuristic_conflicting_signals_unclear() {
        assert_eq!(
            heuristic_reply_analysis("Yes but actually no, I cannot"),
            ReplyAnalysis::Unclear
        );
    }
}
