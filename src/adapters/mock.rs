//! Scripted mock collaborators for testing.
//!
//! `MockOracle` and `MockExecutor` replay queued responses in order and
//! record every call so tests can assert on what the engine asked for.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ReasoningOracle, ToolExecutor, ToolOutcome, ToolRequest};

/// One scripted oracle response.
#[derive(Debug, Clone)]
enum OracleScript {
    Text(String),
    Failure(String),
}

/// Scripted reasoning oracle. Responses are consumed in FIFO order;
/// when the script runs dry the oracle fails, which exercises the
/// engine's deterministic fallbacks.
#[derive(Clone, Default)]
pub struct MockOracle {
    script: Arc<Mutex<VecDeque<OracleScript>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_text(&self, text: impl Into<String>) {
        self.script.lock().await.push_back(OracleScript::Text(text.into()));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .await
            .push_back(OracleScript::Failure(message.into()));
    }

    /// Prompts the engine sent, in order.
    pub async fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ReasoningOracle for MockOracle {
    async fn complete(
        &self,
        _user_id: &str,
        prompt: &str,
        _tools_enabled: bool,
    ) -> DomainResult<String> {
        self.calls.lock().await.push(prompt.to_string());

        match self.script.lock().await.pop_front() {
            Some(OracleScript::Text(text)) => Ok(text),
            Some(OracleScript::Failure(message)) => Err(DomainError::Reasoning(message)),
            None => Err(DomainError::Reasoning("mock oracle script exhausted".to_string())),
        }
    }
}

/// One scripted executor response.
#[derive(Debug, Clone)]
enum ExecutorScript {
    Outcome(ToolOutcome),
    Failure(String),
}

/// Scripted tool executor.
#[derive(Clone, Default)]
pub struct MockExecutor {
    script: Arc<Mutex<VecDeque<ExecutorScript>>>,
    calls: Arc<Mutex<Vec<ToolRequest>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_outcome(&self, outcome: ToolOutcome) {
        self.script
            .lock()
            .await
            .push_back(ExecutorScript::Outcome(outcome));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .await
            .push_back(ExecutorScript::Failure(message.into()));
    }

    /// Requests the engine issued, in order.
    pub async fn recorded_requests(&self) -> Vec<ToolRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
    async fn execute(&self, _user_id: &str, request: ToolRequest) -> DomainResult<ToolOutcome> {
        let tool = request.tool.clone();
        self.calls.lock().await.push(request);

        match self.script.lock().await.pop_front() {
            Some(ExecutorScript::Outcome(outcome)) => Ok(outcome),
            Some(ExecutorScript::Failure(message)) => {
                Err(DomainError::ToolExecution { tool, message })
            }
            None => Err(DomainError::ToolExecution {
                tool,
                message: "mock executor script exhausted".to_string(),
            }),
        }
    }
}
