//! Shared test utilities

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use voicebot::api::{ApiServer, ApiState};
use voicebot::session::{ChatModel, Message, SessionStore};
use voicebot::voice::{Synthesizer, Transcriber};
use voicebot::{ChatCompleter, Config, Error, Gateways, Result};

/// Number of calls each stub backend received
#[derive(Debug, Default)]
pub struct Calls {
    pub transcribe: AtomicUsize,
    pub complete: AtomicUsize,
    pub synthesize: AtomicUsize,
}

impl Calls {
    pub fn transcribe(&self) -> usize {
        self.transcribe.load(Ordering::SeqCst)
    }

    pub fn complete(&self) -> usize {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn synthesize(&self) -> usize {
        self.synthesize.load(Ordering::SeqCst)
    }
}

struct StubTranscriber {
    transcript: Option<String>,
    calls: Arc<Calls>,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _wav: &[u8], _api_key: &str) -> Result<String> {
        self.calls.transcribe.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| Error::Stt("stub transcription failure".to_string()))
    }
}

struct StubCompleter {
    reply: Option<String>,
    calls: Arc<Calls>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

#[async_trait]
impl ChatCompleter for StubCompleter {
    async fn complete(
        &self,
        messages: &[Message],
        _model: ChatModel,
        _api_key: &str,
    ) -> Result<String> {
        self.calls.complete.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| Error::Completion("429 insufficient_quota".to_string()))
    }
}

struct StubSynthesizer {
    speech: Option<Vec<u8>>,
    calls: Arc<Calls>,
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(&self, _text: &str, _api_key: &str) -> Result<Vec<u8>> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        self.speech
            .clone()
            .ok_or_else(|| Error::Tts("stub synthesis failure".to_string()))
    }
}

/// Gateways backed by scripted stubs
pub struct StubGateways {
    pub gateways: Gateways,
    pub calls: Arc<Calls>,
    /// History passed to each completion call
    pub seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

/// Build stub gateways; `None` makes that backend fail
pub fn stub_gateways(
    transcript: Option<&str>,
    reply: Option<&str>,
    speech: Option<&[u8]>,
) -> StubGateways {
    let calls = Arc::new(Calls::default());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let gateways = Gateways::new(
        Arc::new(StubTranscriber {
            transcript: transcript.map(ToString::to_string),
            calls: calls.clone(),
        }),
        Arc::new(StubCompleter {
            reply: reply.map(ToString::to_string),
            calls: calls.clone(),
            seen: seen.clone(),
        }),
        Arc::new(StubSynthesizer {
            speech: speech.map(<[u8]>::to_vec),
            calls: calls.clone(),
        }),
    );

    StubGateways {
        gateways,
        calls,
        seen,
    }
}

/// Gateways where every backend succeeds
pub fn happy_gateways(reply: &str) -> StubGateways {
    stub_gateways(Some("transcribed question"), Some(reply), Some(b"ID3fake-mp3"))
}

/// Build a test API router over the given gateways
pub fn build_test_router(stubs: &StubGateways) -> axum::Router {
    let config = Config::default();
    let state = ApiState {
        sessions: SessionStore::new(&config.session, "system prompt", ChatModel::default()),
        gateways: stubs.gateways.clone(),
    };
    ApiServer::new(state, &config.server).router()
}

/// Encode mono 16-bit samples as a WAV file
pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for sample in samples {
        writer.write_sample(*sample).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// One second of a 440 Hz tone, interleaved for `channels`
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn tone(sample_rate: u32, channels: u16) -> Vec<i16> {
    (0..sample_rate)
        .flat_map(|i| {
            let phase = (i as f32 / sample_rate as f32) * 440.0 * std::f32::consts::TAU;
            let value = phase.sin() * 8000.0;
            std::iter::repeat_n(value as i16, usize::from(channels))
        })
        .collect()
}
