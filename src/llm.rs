//! Chat completion backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::{ChatModel, Message};
use crate::{Error, Result};

/// Backend that produces the next assistant message for a history
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Complete the conversation in `messages` with `model`
    ///
    /// # Errors
    ///
    /// Returns error on auth, quota, network or malformed-response failures
    async fn complete(
        &self,
        messages: &[Message],
        model: ChatModel,
        api_key: &str,
    ) -> Result<String>;
}

/// Chat completions through an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    /// Create a new chat completion backend
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChatCompleter for OpenAiChat {
    async fn complete(
        &self,
        messages: &[Message],
        model: ChatModel,
        api_key: &str,
    ) -> Result<String> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        // The whole history is resent on every turn and grows without bound
        tracing::debug!(model = %model, history = messages.len(), "requesting chat completion");

        let request = CompletionRequest {
            model: model.as_str(),
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat completion request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::Completion(format!("API error {status}: {body}")));
        }

        let result: CompletionResponse = response.json().await?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Completion("response contained no message content".to_string()))?;

        tracing::info!(chars = content.chars().count(), "chat completion received");
        Ok(content)
    }
}
