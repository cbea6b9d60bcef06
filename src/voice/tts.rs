//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::{Error, Result};

/// Default Google Translate TTS endpoint
pub const DEFAULT_GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the Google Translate endpoint accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// Backend that turns reply text into playable MP3 audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, api_key: &str) -> Result<Vec<u8>>;
}

/// Synthesizes speech through OpenAI `/audio/speech`
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiSpeech {
    /// Create a new OpenAI TTS backend
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        speed: f32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            voice: voice.into(),
            speed,
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, api_key: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "OpenAI speech synthesized");
        Ok(audio.to_vec())
    }
}

/// Synthesizes speech through the Google Translate TTS endpoint
///
/// Needs no credential. Text is split into short chunks and the returned
/// MP3 streams are concatenated, which players handle as one stream.
pub struct GoogleTranslateSpeech {
    client: reqwest::Client,
    url: String,
    language: String,
}

impl GoogleTranslateSpeech {
    /// Create a new Google Translate TTS backend for a fixed language
    #[must_use]
    pub fn new(client: reqwest::Client, language: impl Into<String>) -> Self {
        Self::with_url(client, DEFAULT_GOOGLE_TTS_URL, language)
    }

    /// Create a backend against a custom endpoint
    #[must_use]
    pub fn with_url(
        client: reqwest::Client,
        url: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl Synthesizer for GoogleTranslateSpeech {
    async fn synthesize(&self, text: &str, _api_key: &str) -> Result<Vec<u8>> {
        let chunks = chunk_text(text, GOOGLE_MAX_CHARS);
        if chunks.is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();

            let response = self
                .client
                .get(&self.url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        tracing::debug!(
            chunks = chunks.len(),
            bytes = audio.len(),
            language = %self.language,
            "Google speech synthesized"
        );
        Ok(audio)
    }
}

/// Split text into chunks of at most `max_chars` characters
///
/// Splits on whitespace; a single word longer than `max_chars` is cut on
/// character boundaries.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            let mut pieces = chars.chunks(max_chars).map(|c| c.iter().collect::<String>());
            let last = pieces.next_back();
            chunks.extend(pieces);
            if let Some(last) = last {
                current_len = last.chars().count();
                current = last;
            }
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
