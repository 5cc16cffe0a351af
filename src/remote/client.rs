//! Remote reasoning service boundary
//!
//! The core sends one prompt and receives plain text. [`OpenAiChatClient`]
//! talks to any OpenAI-compatible `chat/completions` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// A bounded prompt ready to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePrompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// External service that turns a prompt into text
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Complete `prompt`; the returned text may still be empty
    async fn complete(&self, prompt: &RemotePrompt) -> Result<String, RemoteError>;

    /// Service label for logs
    fn name(&self) -> &str;
}

#[cfg(feature = "openai")]
pub use openai::OpenAiChatClient;

#[cfg(feature = "openai")]
mod openai {
    use super::*;
    use crate::config::RemoteConfig;

    #[derive(Serialize)]
    struct ChatMessage<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage<'a>>,
        max_tokens: u32,
        temperature: f32,
    }

    /// OpenAI-compatible chat completions client
    ///
    /// Works with OpenAI, OpenRouter, Azure OpenAI and local servers that
    /// expose the same API.
    pub struct OpenAiChatClient {
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
    }

    impl OpenAiChatClient {
        /// Build a client; a missing or blank key is a configuration error
        pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
            let api_key = config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| RemoteError::Configuration("no API key configured".to_string()))?;

            let client = reqwest::Client::builder()
                .timeout(config.timeout())
                .build()
                .map_err(|e| RemoteError::Configuration(e.to_string()))?;

            Ok(Self {
                client,
                api_key: api_key.to_string(),
                base_url: config.base_url.trim_end_matches('/').to_string(),
                model: config.model.clone(),
            })
        }
    }

    #[async_trait]
    impl ReasoningService for OpenAiChatClient {
        async fn complete(&self, prompt: &RemotePrompt) -> Result<String, RemoteError> {
            let url = format!("{}/chat/completions", self.base_url);
            let request = ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: &prompt.system,
                    },
                    ChatMessage {
                        role: "user",
                        content: &prompt.user,
                    },
                ],
                max_tokens: prompt.max_tokens,
                temperature: prompt.temperature,
            };

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(RemoteError::Configuration(format!(
                    "credential rejected ({})",
                    status
                )));
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(RemoteError::RateLimit(format!("upstream returned {}", status)));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RemoteError::Transport(format!("Status {}: {}", status, body)));
            }

            let data: serde_json::Value = response.json().await?;
            data["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string)
                .ok_or(RemoteError::EmptyResponse)
        }

        fn name(&self) -> &str {
            &self.model
        }
    }

}
