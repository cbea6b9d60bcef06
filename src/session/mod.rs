//! Conversation session state
//!
//! A session holds two parallel records of the conversation:
//! - `messages`: the model context, always starting with the system prompt
//! - `chat`: the display transcript, with a timestamp per entry
//!
//! Turns are executed by [`process_cycle`], which mutates a `SessionState`
//! passed in by reference.

mod store;
mod turn;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use store::{SessionHandle, SessionStore};
pub use turn::{
    AudioInput, CycleReport, CycleRequest, InputKind, TurnError, TurnInput, TurnOutcome, TurnPhase,
    process_cycle, resolve_input,
};

/// Default system prompt placed at the head of every history
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Respond to all input in 25 words and answer in Korean.";

/// Role of a message in the model context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the model context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Who wrote a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A display-only transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub sender: Sender,
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl ChatEntry {
    /// Wall-clock time as shown next to a chat bubble
    #[must_use]
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }
}

/// Chat models a session can select
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatModel {
    #[default]
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl ChatModel {
    /// All selectable models, in display order
    pub const ALL: [Self; 3] = [Self::Gpt4o, Self::Gpt4Turbo, Self::Gpt35Turbo];

    /// Model identifier sent to the completion API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| Error::Config(format!("unknown chat model: {s}")))
    }
}

/// Per-user conversation state
pub struct SessionState {
    /// Display transcript
    pub chat: Vec<ChatEntry>,
    /// Model context; `messages[0]` is always the system prompt
    pub messages: Vec<Message>,
    /// Suppresses input resolution on the cycle right after a reset
    pub reset_pending: bool,
    /// Model used for completions
    pub selected_model: ChatModel,
    credential: Option<SecretString>,
    system_prompt: String,
}

impl SessionState {
    /// Create a fresh session with the given system prompt
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            chat: Vec::new(),
            messages: vec![Message::system(system_prompt.clone())],
            reset_pending: false,
            selected_model: ChatModel::default(),
            credential: None,
            system_prompt,
        }
    }

    /// Set the selected model
    #[must_use]
    pub const fn with_model(mut self, model: ChatModel) -> Self {
        self.selected_model = model;
        self
    }

    /// Set the API credential
    #[must_use]
    pub fn with_credential(mut self, credential: &str) -> Self {
        self.set_credential(credential);
        self
    }

    /// Replace the API credential; an empty value clears it
    pub fn set_credential(&mut self, credential: &str) {
        self.credential = if credential.is_empty() {
            None
        } else {
            Some(SecretString::from(credential.to_string()))
        };
    }

    /// Whether a non-empty credential is present
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// The raw credential, or `""` when none is set
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.credential
            .as_ref()
            .map_or("", |c| c.expose_secret())
    }

    /// The fixed system prompt of this session
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Clear the conversation and arm the one-shot replay suppression
    ///
    /// Credential and selected model are kept.
    pub fn reset(&mut self) {
        self.chat.clear();
        self.messages = vec![Message::system(self.system_prompt.clone())];
        self.reset_pending = true;
        tracing::debug!("session reset");
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("chat", &self.chat.len())
            .field("messages", &self.messages.len())
            .field("reset_pending", &self.reset_pending)
            .field("selected_model", &self.selected_model)
            .field("has_credential", &self.has_credential())
            .finish_non_exhaustive()
    }
}
