//! Configuration management for the voicebot service
//!
//! Values are layered env > TOML file > defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::session::{ChatModel, DEFAULT_SYSTEM_PROMPT};
use crate::voice::stt::DEFAULT_OPENAI_BASE_URL;
use crate::{Error, Result};

pub use file::VoicebotConfigFile;

/// Default request timeout for every gateway call
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Upload limit; matches the Whisper API file limit
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Voicebot service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// OpenAI-compatible API configuration
    pub openai: OpenAiConfig,

    /// Chat configuration
    pub chat: ChatConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,

    /// Session lifetime configuration
    pub session: SessionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI override)
    pub static_dir: Option<PathBuf>,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

/// OpenAI-compatible API configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL, without trailing slash
    pub base_url: String,

    /// Process-level default credential for new sessions
    pub api_key: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// Spoken language hint for STT
    pub stt_language: Option<String>,

    /// Request timeout for every gateway call
    pub timeout: Duration,

    /// Connect timeout for every gateway call
    pub connect_timeout: Duration,
}

/// Chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Fixed system prompt at the head of every history
    pub system_prompt: String,

    /// Model selected for new sessions
    pub default_model: ChatModel,
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TtsProvider {
    /// Google Translate TTS (no credential needed)
    #[default]
    Google,
    /// OpenAI `/audio/speech`
    OpenAi,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Backend used for replies
    pub provider: TtsProvider,

    /// Fixed target language (Google)
    pub language: String,

    /// TTS model (`OpenAI`)
    pub model: String,

    /// TTS voice identifier (`OpenAI`)
    pub voice: String,

    /// TTS speed multiplier, 0.25 to 4.0 (`OpenAI`)
    pub speed: f32,
}

/// Session lifetime configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions untouched for this long are dropped
    pub idle_timeout: Duration,

    /// Upper bound on live sessions
    pub max_sessions: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8501,
                static_dir: None,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            openai: OpenAiConfig {
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                api_key: None,
                stt_model: "whisper-1".to_string(),
                stt_language: None,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                connect_timeout: Duration::from_secs(10),
            },
            chat: ChatConfig {
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                default_model: ChatModel::default(),
            },
            tts: TtsConfig {
                provider: TtsProvider::default(),
                language: "ko".to_string(),
                model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                speed: 1.0,
            },
            session: SessionConfig {
                idle_timeout: Duration::from_secs(30 * 60),
                max_sessions: 1024,
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// `path` overrides the config file location; otherwise `VOICEBOT_CONFIG`
    /// or `~/.config/voicebot/config.toml` is used.
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("VOICEBOT_CONFIG").ok().map(PathBuf::from);
        let fc = file::load_config_file(path.or(env_path.as_deref()));
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Layer environment values over a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn resolve(
        fc: VoicebotConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        // Server config (env > toml > default)
        let port = match env("VOICEBOT_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| Error::Config(format!("invalid VOICEBOT_PORT: {p}")))?,
            None => fc.server.port.unwrap_or(defaults.server.port),
        };
        let server = ServerConfig {
            host: env("VOICEBOT_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.server.host),
            port,
            static_dir: env("VOICEBOT_STATIC_DIR")
                .map(PathBuf::from)
                .or(fc.server.static_dir),
            max_upload_bytes: fc
                .server
                .max_upload_bytes
                .unwrap_or(defaults.server.max_upload_bytes),
        };

        let timeout_secs = match env("VOICEBOT_TIMEOUT_SECS") {
            Some(t) => t
                .parse()
                .map_err(|_| Error::Config(format!("invalid VOICEBOT_TIMEOUT_SECS: {t}")))?,
            None => fc.openai.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(Error::Config("timeout must be at least one second".to_string()));
        }

        let openai = OpenAiConfig {
            base_url: env("OPENAI_BASE_URL")
                .or(fc.openai.base_url)
                .unwrap_or(defaults.openai.base_url)
                .trim_end_matches('/')
                .to_string(),
            api_key: env("OPENAI_API_KEY").or(fc.openai.api_key),
            stt_model: env("VOICEBOT_STT_MODEL")
                .or(fc.openai.stt_model)
                .unwrap_or(defaults.openai.stt_model),
            stt_language: env("VOICEBOT_STT_LANGUAGE").or(fc.openai.stt_language),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: defaults.openai.connect_timeout,
        };

        let default_model = env("VOICEBOT_MODEL")
            .or(fc.chat.default_model)
            .map(|m| m.parse::<ChatModel>())
            .transpose()?
            .unwrap_or(defaults.chat.default_model);
        let chat = ChatConfig {
            system_prompt: fc
                .chat
                .system_prompt
                .unwrap_or(defaults.chat.system_prompt),
            default_model,
        };

        let provider = env("VOICEBOT_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map(|p| p.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or_default();
        let speed = fc.tts.speed.unwrap_or(defaults.tts.speed);
        if !(0.25..=4.0).contains(&speed) {
            return Err(Error::Config(format!(
                "TTS speed must be between 0.25 and 4.0, got {speed}"
            )));
        }
        let tts = TtsConfig {
            provider,
            language: env("VOICEBOT_TTS_LANGUAGE")
                .or(fc.tts.language)
                .unwrap_or(defaults.tts.language),
            model: fc.tts.model.unwrap_or(defaults.tts.model),
            voice: fc.tts.voice.unwrap_or(defaults.tts.voice),
            speed,
        };

        let session = SessionConfig {
            idle_timeout: fc
                .session
                .idle_timeout_secs
                .map_or(defaults.session.idle_timeout, Duration::from_secs),
            max_sessions: fc
                .session
                .max_sessions
                .unwrap_or(defaults.session.max_sessions),
        };

        Ok(Self {
            server,
            openai,
            chat,
            tts,
            session,
        })
    }
}
