//! Audio normalization and HTTP backend integration tests
//!
//! Backends run against a local mock server; no network access needed.

use std::io::Cursor;

use serde_json::json;
use voicebot::session::{ChatModel, Message};
use voicebot::voice::{
    AudioFormat, GoogleTranslateSpeech, OpenAiSpeech, SAMPLE_RATE, Synthesizer, Transcriber,
    WhisperTranscriber, normalize,
};
use voicebot::{ChatCompleter, OpenAiChat};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{tone, wav_bytes};

fn wav_spec(wav: &[u8]) -> (hound::WavSpec, u32) {
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    (reader.spec(), reader.duration())
}

#[test]
fn test_stereo_wav_becomes_mono_16k() {
    let input = wav_bytes(&tone(44_100, 2), 44_100, 2);

    let output = normalize(&input, AudioFormat::Wav).unwrap();
    let (spec, frames) = wav_spec(&output);

    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    // One second in, roughly one second out
    assert!((15_000..=17_000).contains(&frames), "got {frames} frames");
}

#[test]
fn test_raw_pcm_is_normalized() {
    let pcm: Vec<u8> = tone(48_000, 1).iter().flat_map(|s| s.to_le_bytes()).collect();

    let output = normalize(
        &pcm,
        AudioFormat::Pcm16 {
            sample_rate: 48_000,
            channels: 1,
        },
    )
    .unwrap();
    let (spec, frames) = wav_spec(&output);

    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert!((15_000..=17_000).contains(&frames), "got {frames} frames");
}

#[test]
fn test_16k_mono_keeps_length() {
    let input = wav_bytes(&tone(SAMPLE_RATE, 1), SAMPLE_RATE, 1);

    let output = normalize(&input, AudioFormat::Wav).unwrap();
    let (_, frames) = wav_spec(&output);

    assert_eq!(frames, SAMPLE_RATE);
}

#[test]
fn test_zero_frame_wav_normalizes_to_empty() {
    let input = wav_bytes(&[], 44_100, 2);
    assert!(normalize(&input, AudioFormat::Wav).unwrap().is_empty());
}

#[test]
fn test_empty_payload_normalizes_to_empty() {
    assert!(normalize(&[], AudioFormat::Mp3).unwrap().is_empty());
}

#[test]
fn test_garbage_wav_is_an_error() {
    assert!(normalize(b"definitely not audio", AudioFormat::Wav).is_err());
}

#[test]
fn test_format_detection() {
    let wav = wav_bytes(&tone(8_000, 1), 8_000, 1);
    assert_eq!(AudioFormat::detect(&wav), Some(AudioFormat::Wav));
    assert_eq!(AudioFormat::detect(b"ID3\x04\x00rest"), Some(AudioFormat::Mp3));
    assert_eq!(AudioFormat::detect(&[0x01, 0x02, 0x03, 0x04]), None);

    assert_eq!(
        AudioFormat::from_hint(Some("audio/mpeg"), None),
        Some(AudioFormat::Mp3)
    );
    assert_eq!(
        AudioFormat::from_hint(None, Some("Question.WAV")),
        Some(AudioFormat::Wav)
    );
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "안녕" })))
        .expect(1)
        .mount(&server)
        .await;

    let transcriber = WhisperTranscriber::new(
        reqwest::Client::new(),
        format!("{}/v1/", server.uri()),
        "whisper-1",
    )
    .with_language(Some("ko".to_string()));

    let wav = wav_bytes(&tone(SAMPLE_RATE, 1), SAMPLE_RATE, 1);
    let text = transcriber.transcribe(&wav, "sk-test").await.unwrap();

    assert_eq!(text, "안녕");
}

#[tokio::test]
async fn test_whisper_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let transcriber = WhisperTranscriber::new(reqwest::Client::new(), server.uri(), "whisper-1");
    let err = transcriber.transcribe(b"RIFF", "sk-bad").await.unwrap_err();

    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_whisper_requires_key() {
    let transcriber =
        WhisperTranscriber::new(reqwest::Client::new(), "http://127.0.0.1:9", "whisper-1");
    assert!(transcriber.transcribe(b"RIFF", "").await.is_err());
}

#[tokio::test]
async fn test_chat_completion_sends_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4-turbo",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "안녕" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": " 안녕하세요 \n" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(reqwest::Client::new(), server.uri());
    let messages = [Message::system("be brief"), Message::user("안녕")];
    let reply = chat
        .complete(&messages, ChatModel::Gpt4Turbo, "sk-test")
        .await
        .unwrap();

    assert_eq!(reply, "안녕하세요");
}

#[tokio::test]
async fn test_chat_completion_without_content_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(reqwest::Client::new(), server.uri());
    let result = chat
        .complete(&[Message::system("p")], ChatModel::Gpt4o, "sk-test")
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_chat_completion_quota_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("insufficient_quota"))
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(reqwest::Client::new(), server.uri());
    let err = chat
        .complete(&[Message::system("p")], ChatModel::Gpt4o, "sk-test")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_openai_speech() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(json!({ "model": "tts-1", "voice": "alloy", "input": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3mp3".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let tts = OpenAiSpeech::new(reqwest::Client::new(), server.uri(), "tts-1", "alloy", 1.0);
    let audio = tts.synthesize("hello", "sk-test").await.unwrap();

    assert_eq!(audio, b"ID3mp3");
}

#[tokio::test]
async fn test_google_speech_concatenates_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .and(query_param("tl", "ko"))
        .and(query_param("client", "tw-ob"))
        .and(query_param("total", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let tts = GoogleTranslateSpeech::with_url(
        reqwest::Client::new(),
        format!("{}/translate_tts", server.uri()),
        "ko",
    );
    // Two chunks at the 100 character limit
    let text = ["가나다라마바사아자차"; 15].join(" ");
    let audio = tts.synthesize(&text, "").await.unwrap();

    assert_eq!(audio, b"mp3mp3");
}

#[tokio::test]
async fn test_google_speech_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let tts = GoogleTranslateSpeech::with_url(reqwest::Client::new(), server.uri(), "ko");
    assert!(tts.synthesize("안녕하세요", "").await.is_err());
}
