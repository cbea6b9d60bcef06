//! TOML configuration file loading
//!
//! Supports `~/.config/voicebot/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoicebotConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// OpenAI-compatible API configuration (STT and chat)
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Chat configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Session lifetime configuration
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Serve the web UI from this directory instead of the embedded page
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
}

/// OpenAI-compatible API configuration
#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    pub base_url: Option<String>,
    /// Default credential for new sessions
    pub api_key: Option<String>,
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
    /// Spoken language hint for STT (e.g. "ko")
    pub stt_language: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Chat configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    pub system_prompt: Option<String>,
    /// Model selected for new sessions (e.g. "gpt-4o")
    pub default_model: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "google" or "openai"
    pub provider: Option<String>,
    /// Target language for Google TTS (e.g. "ko")
    pub language: Option<String>,
    /// OpenAI TTS model (e.g. "tts-1")
    pub model: Option<String>,
    /// OpenAI TTS voice (e.g. "alloy")
    pub voice: Option<String>,
    /// OpenAI TTS speed multiplier
    pub speed: Option<f32>,
}

/// Session lifetime configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub idle_timeout_secs: Option<u64>,
    pub max_sessions: Option<u64>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `VoicebotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> VoicebotConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return VoicebotConfigFile::default();
    };

    if !path.exists() {
        return VoicebotConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoicebotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoicebotConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voicebot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicebot").join("config.toml"))
}
