//! Rate-limited gateway to the remote reasoning service

pub mod client;
pub mod rate_limit;

use std::sync::Arc;

use tracing::{debug, instrument, warn};

pub use client::{ReasoningService, RemotePrompt};
#[cfg(feature = "openai")]
pub use client::OpenAiChatClient;
pub use rate_limit::{RateWindow, RateWindowSnapshot};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::types::FormContext;

const SYSTEM_PROMPT: &str = "You are a billing assistant embedded in a medical billing form for an eye-care practice. \
Answer precisely and concisely. Cite ICD-10, CPT, HCPCS, place-of-service and modifier codes when relevant. \
If the form context names a field, tailor the answer to completing that field.";

/// Sends prompts through the shared rate window with a per-call timeout
pub struct RemoteGateway {
    service: Option<Arc<dyn ReasoningService>>,
    window: Arc<RateWindow>,
    config: RemoteConfig,
}

impl RemoteGateway {
    pub fn new(
        service: Option<Arc<dyn ReasoningService>>,
        window: Arc<RateWindow>,
        config: RemoteConfig,
    ) -> Self {
        Self {
            service,
            window,
            config,
        }
    }

    /// Gateway backed by the OpenAI-compatible client when a key is set.
    ///
    /// Without a key the gateway still exists and reports a configuration
    /// failure per call.
    pub fn from_config(config: &RemoteConfig, window: Arc<RateWindow>) -> Self {
        #[cfg(feature = "openai")]
        let service: Option<Arc<dyn ReasoningService>> = match OpenAiChatClient::new(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                debug!(error = %e, "Remote reasoning disabled");
                None
            }
        };
        #[cfg(not(feature = "openai"))]
        let service: Option<Arc<dyn ReasoningService>> = None;

        Self::new(service, window, config.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    pub fn window(&self) -> &Arc<RateWindow> {
        &self.window
    }

    /// Prompt embedding the form context and the (bounded) user text
    pub fn build_prompt(&self, text: &str, context: &FormContext) -> RemotePrompt {
        let mut user = String::new();
        if !context.is_empty() {
            user.push_str("Form context:\n");
            if let Some(form) = &context.form_type {
                user.push_str(&format!("- form: {}\n", form));
            }
            if let Some(field) = &context.active_field {
                user.push_str(&format!("- field: {}\n", field));
            }
            if let Some(step) = &context.step {
                user.push_str(&format!("- step: {}\n", step));
            }
            let mut extra: Vec<_> = context.extra.iter().collect();
            extra.sort();
            for (key, value) in extra {
                user.push_str(&format!("- {}: {}\n", key, value));
            }
            user.push('\n');
        }

        let question: String = text.trim().chars().take(self.config.max_prompt_chars).collect();
        user.push_str("Question: ");
        user.push_str(&question);

        RemotePrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Ask the remote service. Waits for a rate-window slot first.
    #[instrument(skip(self, text, context), fields(text_len = text.len()))]
    pub async fn ask(&self, text: &str, context: &FormContext) -> Result<String, RemoteError> {
        let service = self.service.as_ref().ok_or_else(|| {
            RemoteError::Configuration("no reasoning service configured".to_string())
        })?;

        let prompt = self.build_prompt(text, context);

        let waited = self.window.acquire().await;
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis() as u64, "Rate window slot acquired");
        }

        let timeout = self.config.timeout();
        let reply = match tokio::time::timeout(timeout, service.complete(&prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    service = service.name(),
                    timeout_ms = self.config.timeout_ms,
                    "Remote call timed out"
                );
                return Err(RemoteError::Transport(format!(
                    "timed out after {} ms",
                    self.config.timeout_ms
                )));
            }
        };

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(RemoteError::EmptyResponse);
        }
        Ok(reply.to_string())
    }
}
