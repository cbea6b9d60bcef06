//! Voice processing module
//!
//! Audio normalization plus the speech-to-text and text-to-speech
//! backends used by the turn orchestrator.

pub mod audio;
pub mod stt;
pub mod tts;

pub use audio::{
    AudioFormat, DEFAULT_PCM_SAMPLE_RATE, SAMPLE_RATE, normalize, normalize_sniffed, samples_to_wav,
};
pub use stt::{Transcriber, WhisperTranscriber};
pub use tts::{GoogleTranslateSpeech, OpenAiSpeech, Synthesizer};
