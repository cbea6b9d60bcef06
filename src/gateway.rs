//! Gateways to the external speech and language services
//!
//! [`Gateways`] bundles one backend per service and applies the boundary
//! policy shared by all of them: failures are logged here and handed to the
//! orchestrator as a [`TurnError::Gateway`] value, never as a fault.

use std::fmt;
use std::sync::Arc;

use crate::config::{Config, TtsProvider};
use crate::llm::{ChatCompleter, OpenAiChat};
use crate::session::{ChatModel, Message, TurnError};
use crate::voice::{
    GoogleTranslateSpeech, OpenAiSpeech, Synthesizer, Transcriber, WhisperTranscriber,
};
use crate::Result;

/// External service a gateway wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Transcription,
    Completion,
    Synthesis,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transcription => "transcription",
            Self::Completion => "completion",
            Self::Synthesis => "synthesis",
        })
    }
}

/// The three service backends used by a turn
#[derive(Clone)]
pub struct Gateways {
    transcriber: Arc<dyn Transcriber>,
    completer: Arc<dyn ChatCompleter>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Gateways {
    /// Bundle explicit backends
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completer: Arc<dyn ChatCompleter>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            completer,
            synthesizer,
        }
    }

    /// Build the configured HTTP backends
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.openai.timeout)
            .connect_timeout(config.openai.connect_timeout)
            .user_agent(concat!("voicebot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let transcriber = WhisperTranscriber::new(
            client.clone(),
            config.openai.base_url.clone(),
            config.openai.stt_model.clone(),
        )
        .with_language(config.openai.stt_language.clone());

        let completer = OpenAiChat::new(client.clone(), config.openai.base_url.clone());

        let synthesizer: Arc<dyn Synthesizer> = match config.tts.provider {
            TtsProvider::Google => {
                Arc::new(GoogleTranslateSpeech::new(client, config.tts.language.clone()))
            }
            TtsProvider::OpenAi => Arc::new(OpenAiSpeech::new(
                client,
                config.openai.base_url.clone(),
                config.tts.model.clone(),
                config.tts.voice.clone(),
                config.tts.speed,
            )),
        };

        tracing::debug!(
            base_url = %config.openai.base_url,
            tts = ?config.tts.provider,
            timeout_secs = config.openai.timeout.as_secs(),
            "gateways configured"
        );

        Ok(Self::new(Arc::new(transcriber), Arc::new(completer), synthesizer))
    }

    /// Transcribe normalized audio
    ///
    /// A zero-length payload yields an empty transcript without calling
    /// the backend.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Gateway`] if the backend fails
    pub async fn transcribe(
        &self,
        wav: &[u8],
        api_key: &str,
    ) -> std::result::Result<String, TurnError> {
        if wav.is_empty() {
            tracing::debug!("skipping transcription of empty audio");
            return Ok(String::new());
        }

        self.transcriber
            .transcribe(wav, api_key)
            .await
            .map_err(|e| gateway_failure(GatewayKind::Transcription, &e))
    }

    /// Request the next assistant message
    ///
    /// An empty reply counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Gateway`] if the backend fails
    pub async fn complete(
        &self,
        messages: &[Message],
        model: ChatModel,
        api_key: &str,
    ) -> std::result::Result<String, TurnError> {
        let response = self
            .completer
            .complete(messages, model, api_key)
            .await
            .map_err(|e| gateway_failure(GatewayKind::Completion, &e))?;

        if response.is_empty() {
            let error = crate::Error::Completion("empty response".to_string());
            return Err(gateway_failure(GatewayKind::Completion, &error));
        }
        Ok(response)
    }

    /// Synthesize reply audio
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Gateway`] if the backend fails
    pub async fn synthesize(
        &self,
        text: &str,
        api_key: &str,
    ) -> std::result::Result<Vec<u8>, TurnError> {
        self.synthesizer
            .synthesize(text, api_key)
            .await
            .map_err(|e| gateway_failure(GatewayKind::Synthesis, &e))
    }
}

fn gateway_failure(kind: GatewayKind, error: &crate::Error) -> TurnError {
    tracing::warn!(gateway = %kind, error = %error, "gateway call failed");
    TurnError::Gateway {
        kind,
        message: error.to_string(),
    }
}
