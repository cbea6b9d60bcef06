//! Turn orchestration
//!
//! One refresh cycle resolves at most one [`TurnInput`] and runs at most one
//! request/response turn against the gateways:
//!
//! ```text
//! AwaitingInput ─► [ProcessingTranscription] ─► ProcessingCompletion ─► ProcessingSynthesis
//!                          │                           │                        │
//!                          └──────────► Error ◄────────┴────────────────────────┤
//!                                         │                                     ▼
//!                                         └───────────────────────────────────► Idle
//! ```
//!
//! Every cycle ends in `Idle`; nothing is carried between cycles except the
//! session state itself.

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use super::{ChatEntry, Message, Sender, SessionState};
use crate::gateway::{GatewayKind, Gateways};
use crate::voice::{AudioFormat, normalize, normalize_sniffed};

/// Recorded or uploaded audio as received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub data: Vec<u8>,
    /// Known format; detected from the payload when `None`
    pub format: Option<AudioFormat>,
}

/// Raw widget values submitted for one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleRequest {
    /// Current content of the question field
    pub text: String,
    /// Whether the submit control fired this cycle
    pub submitted: bool,
    /// Current content of the audio input, if any
    pub audio: Option<AudioInput>,
}

impl CycleRequest {
    /// A submitted text question
    #[must_use]
    pub fn text(question: impl Into<String>) -> Self {
        Self {
            text: question.into(),
            submitted: true,
            audio: None,
        }
    }

    /// An audio recording or upload
    #[must_use]
    pub fn audio(data: Vec<u8>, format: Option<AudioFormat>) -> Self {
        Self {
            audio: Some(AudioInput { data, format }),
            ..Self::default()
        }
    }
}

/// The input resolved for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    None,
    TextQuestion(String),
    AudioBlob(AudioInput),
}

/// Which kind of input a cycle resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    None,
    Text,
    Audio,
}

impl From<&TurnInput> for InputKind {
    fn from(input: &TurnInput) -> Self {
        match input {
            TurnInput::None => Self::None,
            TurnInput::TextQuestion(_) => Self::Text,
            TurnInput::AudioBlob(_) => Self::Audio,
        }
    }
}

/// Phases a cycle passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    AwaitingInput,
    ProcessingTranscription,
    ProcessingCompletion,
    ProcessingSynthesis,
    Error,
}

/// Why a turn stopped early
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// No API credential in the session
    #[error("enter an OpenAI API key in the sidebar first")]
    MissingCredential,

    /// An external service failed
    #[error("{kind} failed: {message}")]
    Gateway { kind: GatewayKind, message: String },

    /// Nothing to ask (empty text or transcript)
    #[error("no question to answer")]
    EmptyInput,
}

impl TurnError {
    /// Whether the user should be told about this error
    #[must_use]
    pub const fn is_reported(&self) -> bool {
        !matches!(self, Self::EmptyInput)
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No input this cycle
    Idle,
    /// Input ignored on the cycle after a reset
    Suppressed,
    /// Turn stopped before anything was recorded
    Aborted(TurnError),
    /// Question recorded, completion failed
    Unanswered(TurnError),
    /// Question and reply recorded
    Answered { response: String },
}

impl TurnOutcome {
    /// Short machine-readable name
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Suppressed => "suppressed",
            Self::Aborted(_) => "aborted",
            Self::Unanswered(_) => "unanswered",
            Self::Answered { .. } => "answered",
        }
    }
}

/// Everything a cycle produced besides the state mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub input: InputKind,
    pub outcome: TurnOutcome,
    /// Phases entered, in order; always ends with `Idle`
    pub phases: Vec<TurnPhase>,
    /// User-visible error notices
    pub notices: Vec<String>,
    /// Synthesized reply audio (MP3)
    pub speech: Option<Vec<u8>>,
}

impl CycleReport {
    fn new(input: InputKind) -> Self {
        Self {
            input,
            outcome: TurnOutcome::Idle,
            phases: vec![TurnPhase::AwaitingInput],
            notices: Vec::new(),
            speech: None,
        }
    }

    fn enter(&mut self, phase: TurnPhase) {
        tracing::debug!(?phase, "turn phase");
        self.phases.push(phase);
    }

    fn fail(&mut self, error: &TurnError) {
        self.enter(TurnPhase::Error);
        if error.is_reported() {
            self.notices.push(error.to_string());
        }
    }

    fn finish(mut self, outcome: TurnOutcome) -> Self {
        self.enter(TurnPhase::Idle);
        tracing::debug!(input = ?self.input, outcome = outcome.label(), "cycle complete");
        self.outcome = outcome;
        self
    }
}

/// Resolve the input of one cycle
///
/// Priority: a pending reset wins and is consumed, then a submitted
/// non-empty text, then non-empty audio.
pub fn resolve_input(state: &mut SessionState, request: CycleRequest) -> TurnInput {
    if state.reset_pending {
        state.reset_pending = false;
        tracing::debug!("input suppressed on the cycle after reset");
        return TurnInput::None;
    }

    if request.submitted && !request.text.is_empty() {
        return TurnInput::TextQuestion(request.text);
    }

    match request.audio {
        Some(audio) if !audio.data.is_empty() => TurnInput::AudioBlob(audio),
        _ => TurnInput::None,
    }
}

/// Run one refresh cycle against `state`
///
/// Never fails: gateway errors end the turn and are reported in
/// [`CycleReport::notices`].
pub async fn process_cycle(
    state: &mut SessionState,
    request: CycleRequest,
    gateways: &Gateways,
) -> CycleReport {
    let suppressed = state.reset_pending;
    let input = resolve_input(state, request);
    let mut report = CycleReport::new(InputKind::from(&input));

    let outcome = if suppressed {
        TurnOutcome::Suppressed
    } else {
        run_turn(state, input, gateways, &mut report).await
    };

    report.finish(outcome)
}

async fn run_turn(
    state: &mut SessionState,
    input: TurnInput,
    gateways: &Gateways,
    report: &mut CycleReport,
) -> TurnOutcome {
    let question = match input {
        TurnInput::None => return TurnOutcome::Idle,
        TurnInput::TextQuestion(text) => text,
        TurnInput::AudioBlob(audio) => {
            report.enter(TurnPhase::ProcessingTranscription);
            match transcribe(audio, state.api_key(), gateways).await {
                Ok(text) => text,
                Err(e) => {
                    report.fail(&e);
                    return TurnOutcome::Aborted(e);
                }
            }
        }
    };

    if question.trim().is_empty() {
        return TurnOutcome::Aborted(TurnError::EmptyInput);
    }

    if !state.has_credential() {
        let error = TurnError::MissingCredential;
        report.fail(&error);
        return TurnOutcome::Aborted(error);
    }

    // Both halves of the turn share this timestamp
    let now = Local::now();
    state.chat.push(ChatEntry {
        sender: Sender::User,
        timestamp: now,
        text: question.clone(),
    });
    state.messages.push(Message::user(question));

    report.enter(TurnPhase::ProcessingCompletion);
    let response = match gateways
        .complete(&state.messages, state.selected_model, state.api_key())
        .await
    {
        Ok(response) => response,
        Err(e) => {
            report.fail(&e);
            return TurnOutcome::Unanswered(e);
        }
    };

    state.messages.push(Message::assistant(response.clone()));
    state.chat.push(ChatEntry {
        sender: Sender::Bot,
        timestamp: now,
        text: response.clone(),
    });

    report.enter(TurnPhase::ProcessingSynthesis);
    match gateways.synthesize(&response, state.api_key()).await {
        Ok(audio) => report.speech = Some(audio),
        Err(e) => report.fail(&e),
    }

    TurnOutcome::Answered { response }
}

/// Normalize and transcribe audio; an empty transcript is `Ok("")`
async fn transcribe(
    audio: AudioInput,
    api_key: &str,
    gateways: &Gateways,
) -> Result<String, TurnError> {
    let AudioInput { data, format } = audio;
    let wav = tokio::task::spawn_blocking(move || match format {
        Some(format) => normalize(&data, format),
        None => normalize_sniffed(&data),
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|r| r.map_err(|e| e.to_string()))
    .map_err(|message| {
        tracing::warn!(error = %message, ?format, "audio normalization failed");
        TurnError::Gateway {
            kind: GatewayKind::Transcription,
            message,
        }
    })?;

    gateways.transcribe(&wav, api_key).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("system")
    }

    #[test]
    fn pending_reset_wins_and_is_consumed() {
        let mut state = state();
        state.reset_pending = true;

        let request = CycleRequest {
            text: "stale".to_string(),
            submitted: true,
            audio: Some(AudioInput {
                data: vec![1, 2, 3],
                format: None,
            }),
        };

        assert_eq!(resolve_input(&mut state, request.clone()), TurnInput::None);
        assert!(!state.reset_pending);
        assert_eq!(
            resolve_input(&mut state, request),
            TurnInput::TextQuestion("stale".to_string())
        );
    }

    #[test]
    fn text_needs_submit() {
        let mut state = state();
        let request = CycleRequest {
            text: "hello".to_string(),
            submitted: false,
            audio: None,
        };
        assert_eq!(resolve_input(&mut state, request), TurnInput::None);
    }

    #[test]
    fn text_takes_priority_over_audio() {
        let mut state = state();
        let request = CycleRequest {
            text: "typed".to_string(),
            submitted: true,
            audio: Some(AudioInput {
                data: vec![0; 8],
                format: None,
            }),
        };
        assert_eq!(
            resolve_input(&mut state, request),
            TurnInput::TextQuestion("typed".to_string())
        );
    }

    #[test]
    fn empty_submit_falls_through_to_audio() {
        let mut state = state();
        let mut request = CycleRequest::audio(vec![0; 8], Some(AudioFormat::Wav));
        request.submitted = true;

        assert!(matches!(
            resolve_input(&mut state, request),
            TurnInput::AudioBlob(_)
        ));
    }

    #[test]
    fn zero_length_audio_resolves_to_none() {
        let mut state = state();
        assert_eq!(
            resolve_input(&mut state, CycleRequest::audio(Vec::new(), None)),
            TurnInput::None
        );
    }

    #[test]
    fn empty_input_is_not_reported() {
        assert!(!TurnError::EmptyInput.is_reported());
        assert!(TurnError::MissingCredential.is_reported());
    }

    #[test]
    fn gateway_error_names_the_service() {
        let error = TurnError::Gateway {
            kind: GatewayKind::Completion,
            message: "429 quota".to_string(),
        };
        assert_eq!(error.to_string(), "completion failed: 429 quota");
    }
}
