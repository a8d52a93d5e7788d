//! Anthropic API reasoning oracle implementation.
//!
//! Makes direct HTTP calls to the Anthropic Messages API. The engine
//! treats the returned text as untrusted and parses it defensively.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OracleConfig;
use crate::domain::ports::ReasoningOracle;

pub struct AnthropicOracle {
    config: OracleConfig,
    http_client: Client,
}

impl AnthropicOracle {
    pub fn new(config: OracleConfig) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, http_client }
    }

    /// Get API key from config or environment.
    fn api_key(&self) -> DomainResult<String> {
        self.config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                DomainError::Reasoning(
                    "No API key configured (set oracle.api_key or ANTHROPIC_API_KEY)".to_string(),
                )
            })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
    metadata: RequestMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestMetadata<'a> {
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[async_trait]
impl ReasoningOracle for AnthropicOracle {
    async fn complete(
        &self,
        user_id: &str,
        prompt: &str,
        _tools_enabled: bool,
    ) -> DomainResult<String> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
            metadata: RequestMetadata { user_id },
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::Reasoning(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Reasoning(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Reasoning(format!("Malformed response: {}", e)))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(DomainError::Reasoning("Empty completion".to_string()));
        }

        Ok(text)
    }
}
