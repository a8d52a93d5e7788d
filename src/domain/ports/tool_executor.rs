//! Tool executor port - interface to the action-performing collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::errors::DomainResult;

/// A single named action for the executor to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name, e.g. "send_email", "create_event", "upsert_contact",
    /// "search_context", or "auto" to let the executor pick
    pub tool: String,
    /// Tool-specific arguments
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub args: HashMap<String, serde_json::Value>,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Request carrying a free-text instruction for the executor.
    pub fn instruction(tool: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(tool).with_arg("instruction", text.into())
    }
}

/// Structured result of one tool invocation.
///
/// `status` is untrusted text from the external executor; the engine
/// classifies it strictly and treats unrecognized values as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Executor-reported status token, e.g. "ok" or "error"
    pub status: String,
    /// Human-readable result text
    pub message: String,
    /// Name of the tool that actually ran
    pub tool: String,
    /// Tool-specific structured fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl ToolOutcome {
    pub fn ok(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            tool: tool.into(),
            data: HashMap::new(),
        }
    }

    pub fn error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            tool: tool.into(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Fetch a string field from the structured data.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Fetch a boolean field from the structured data.
    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(serde_json::Value::as_bool)
    }
}

/// Trait for the external collaborator that performs single named
/// actions (mail, calendar, CRM, context search).
///
/// The engine inspects outcomes structurally and never depends on a
/// tool's internal implementation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one action for a user.
    async fn execute(&self, user_id: &str, request: ToolRequest) -> DomainResult<ToolOutcome>;
}
