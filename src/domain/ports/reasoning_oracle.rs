//! Reasoning oracle port - interface to the natural-language collaborator.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Trait for the external collaborator that provides natural-language
/// classification, decomposition, and generation.
///
/// Responses are untrusted text. Every consumer parses defensively and
/// keeps a deterministic fallback for when parsing fails.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Complete a prompt for a user. `tools_enabled` tells the oracle
    /// whether it may call out to tools while answering.
    async fn complete(
        &self,
        user_id: &str,
        prompt: &str,
        tools_enabled: bool,
    ) -> DomainResult<String>;
}
