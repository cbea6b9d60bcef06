//! Voicebot - voice-enabled chat assistant served as a web UI
//!
//! A user asks a question by typing or by recording/uploading audio. The
//! question is transcribed (Whisper), answered by a chat model, shown as a
//! timestamped chat bubble and spoken back as synthesized audio.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Web UI (axum)                       │
//! │   chat bubbles  │  sidebar  │  text  │  mic/upload  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ one request per refresh cycle
//! ┌────────────────────▼────────────────────────────────┐
//! │            Session orchestrator                      │
//! │   resolve input  │  turn state machine  │  history  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Gateways                            │
//! │   Whisper STT  │  Chat completion  │  TTS           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{GatewayKind, Gateways};
pub use llm::{ChatCompleter, OpenAiChat};
pub use session::{
    ChatModel, CycleReport, CycleRequest, SessionState, SessionStore, TurnError, TurnOutcome,
    process_cycle,
};
