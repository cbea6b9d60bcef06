//! Audio container normalization
//!
//! Uploaded or recorded audio arrives as WAV, MP3 or raw 16-bit PCM. Before
//! transcription everything is converted to a single representation: mono,
//! [`SAMPLE_RATE`] Hz, 16-bit signed PCM in a WAV container.

use std::io::Cursor;

use rubato::Resampler;

use crate::{Error, Result};

/// Sample rate of normalized audio (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Sample rate assumed for raw PCM when the client does not say otherwise
pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 44100;

/// Container/encoding of an incoming audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    /// Headerless little-endian 16-bit PCM
    Pcm16 { sample_rate: u32, channels: u16 },
}

impl AudioFormat {
    /// Format assumed for payloads that carry no recognizable header
    pub const RAW_PCM: Self = Self::Pcm16 {
        sample_rate: DEFAULT_PCM_SAMPLE_RATE,
        channels: 1,
    };

    /// Guess the format from the leading bytes of the payload
    ///
    /// A bare MPEG frame sync only counts when the header is valid and a
    /// second frame starts where the first one ends; headerless PCM often
    /// begins with `0xFF 0xFF`.
    #[must_use]
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Some(Self::Wav);
        }
        if data.starts_with(b"ID3") {
            return Some(Self::Mp3);
        }

        let len = mpeg_frame_len(data)?;
        match data.len().cmp(&len) {
            std::cmp::Ordering::Less => None,
            std::cmp::Ordering::Equal => Some(Self::Mp3),
            std::cmp::Ordering::Greater => mpeg_frame_len(&data[len..]).map(|_| Self::Mp3),
        }
    }

    /// Guess the format from a MIME type or file name
    #[must_use]
    pub fn from_hint(content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        let by_mime = content_type.and_then(|ct| {
            match ct.split(';').next().unwrap_or_default().trim() {
                "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Some(Self::Wav),
                "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
                _ => None,
            }
        });

        by_mime.or_else(|| {
            let ext = file_name?.rsplit_once('.')?.1.to_ascii_lowercase();
            match ext.as_str() {
                "wav" | "wave" => Some(Self::Wav),
                "mp3" => Some(Self::Mp3),
                _ => None,
            }
        })
    }
}

/// Mono PCM samples in `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Normalize an audio payload into mono 16kHz 16-bit WAV bytes
///
/// Returns an empty buffer when the payload decodes to zero samples, so
/// callers can treat "no audio" uniformly.
///
/// # Errors
///
/// Returns error if the payload cannot be decoded or re-encoded
pub fn normalize(data: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = decode(data, format)?;
    if decoded.samples.is_empty() {
        tracing::debug!(?format, "audio decoded to zero samples");
        return Ok(Vec::new());
    }

    let samples = resample_mono(&decoded.samples, decoded.sample_rate, SAMPLE_RATE)?;

    tracing::debug!(
        ?format,
        input_bytes = data.len(),
        input_rate = decoded.sample_rate,
        output_samples = samples.len(),
        "audio normalized"
    );

    samples_to_wav(&samples, SAMPLE_RATE)
}

/// Normalize a payload sent without a format hint
///
/// Uses [`AudioFormat::detect`], falling back to [`AudioFormat::RAW_PCM`]
/// when nothing is recognized or a sniffed MP3 does not decode.
///
/// # Errors
///
/// Returns error if the payload cannot be decoded either way
pub fn normalize_sniffed(data: &[u8]) -> Result<Vec<u8>> {
    match AudioFormat::detect(data) {
        Some(AudioFormat::Mp3) => normalize(data, AudioFormat::Mp3).or_else(|e| {
            tracing::debug!(error = %e, "sniffed MP3 did not decode, retrying as raw PCM");
            normalize(data, AudioFormat::RAW_PCM)
        }),
        Some(format) => normalize(data, format),
        None => normalize(data, AudioFormat::RAW_PCM),
    }
}

/// Length in bytes of the MPEG audio frame whose header starts `data`
///
/// `None` unless the header has a sync word, no reserved version, layer,
/// bitrate or sample-rate values, and a fixed (non-free) bitrate.
fn mpeg_frame_len(data: &[u8]) -> Option<usize> {
    const MPEG1_KBPS: [[u32; 14]; 3] = [
        [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ];
    const MPEG2_KBPS: [[u32; 14]; 2] = [
        [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ];

    let &[b0, b1, b2, ..] = data else {
        return None;
    };
    if b0 != 0xFF || b1 & 0xE0 != 0xE0 {
        return None;
    }

    let version = (b1 >> 3) & 0b11;
    let layer = (b1 >> 1) & 0b11;
    let bitrate_index = usize::from(b2 >> 4);
    let rate_index = usize::from((b2 >> 2) & 0b11);
    let padding = u32::from((b2 >> 1) & 1);

    // 0b01 version and 0b00 layer are reserved; bitrate 0 is "free"
    if version == 0b01 || layer == 0b00 || bitrate_index == 0 || bitrate_index == 0b1111 {
        return None;
    }
    if rate_index == 0b11 {
        return None;
    }

    let mpeg1 = version == 0b11;
    // layer bits: 0b11 = I, 0b10 = II, 0b01 = III
    let layer_row = usize::from(3 - layer);
    let kbps = if mpeg1 {
        MPEG1_KBPS[layer_row][bitrate_index - 1]
    } else {
        MPEG2_KBPS[layer_row.min(1)][bitrate_index - 1]
    };
    let sample_rate = match version {
        0b11 => [44_100, 48_000, 32_000][rate_index],
        0b10 => [22_050, 24_000, 16_000][rate_index],
        _ => [11_025, 12_000, 8_000][rate_index],
    };

    let bitrate = kbps * 1000;
    let len = match layer {
        0b11 => (12 * bitrate / sample_rate + padding) * 4,
        0b01 if !mpeg1 => 72 * bitrate / sample_rate + padding,
        _ => 144 * bitrate / sample_rate + padding,
    };
    usize::try_from(len).ok()
}

/// Decode a payload into mono samples
///
/// # Errors
///
/// Returns error if the payload is not valid for `format`
pub fn decode(data: &[u8], format: AudioFormat) -> Result<DecodedAudio> {
    match format {
        AudioFormat::Wav => decode_wav(data),
        AudioFormat::Mp3 => decode_mp3(data),
        AudioFormat::Pcm16 {
            sample_rate,
            channels,
        } => decode_pcm16(data, sample_rate, channels),
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let rate = u32::try_from(frame.sample_rate)
                    .map_err(|_| Error::Audio("invalid MP3 sample rate".to_string()))?;
                if *sample_rate.get_or_insert(rate) != rate {
                    return Err(Error::Audio("MP3 sample rate changes mid-stream".to_string()));
                }

                let channels = u16::try_from(frame.channels).unwrap_or(1);
                let frame_samples: Vec<f32> =
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&frame_samples, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Audio("no MP3 frames found".to_string()))?;

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn decode_pcm16(data: &[u8], sample_rate: u32, channels: u16) -> Result<DecodedAudio> {
    if sample_rate == 0 || channels == 0 {
        return Err(Error::Audio("PCM sample rate and channels must be non-zero".to_string()));
    }
    if data.len() % 2 != 0 {
        return Err(Error::Audio("PCM payload has an odd byte count".to_string()));
    }

    let interleaved: Vec<f32> = data
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect();

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate,
    })
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let channels = usize::from(channels);
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono f32 audio to a target sample rate
///
/// # Errors
///
/// Returns error if the resampler cannot be constructed or fails
pub fn resample_mono(
    input_samples: &[f32],
    input_sample_rate: u32,
    target_sample_rate: u32,
) -> Result<Vec<f32>> {
    if input_sample_rate == target_sample_rate || input_samples.is_empty() {
        return Ok(input_samples.to_vec());
    }

    let params = rubato::SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: rubato::WindowFunction::BlackmanHarris2,
    };

    let mut resampler = rubato::SincFixedIn::<f32>::new(
        f64::from(target_sample_rate) / f64::from(input_sample_rate),
        2.0,
        params,
        input_samples.len(),
        1,
    )
    .map_err(|e| Error::Audio(format!("create resampler: {e}")))?;

    let input = vec![input_samples.to_vec()];
    let out = resampler
        .process(&input, None)
        .map_err(|e| Error::Audio(format!("resample: {e}")))?;

    Ok(out.into_iter().next().unwrap_or_default())
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
