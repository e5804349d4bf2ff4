//! Speech-to-text: turn one push-to-talk recording into a passenger question.
//!
//! `create_best_stt` picks the OpenAI-compatible transcription API when
//! `STT_API_KEY` is set and the placeholder otherwise.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_STT_URL: &str = "https://api.openai.com/v1";
const DEFAULT_STT_MODEL: &str = "whisper-1";

/// One recorded utterance, 16 kHz mono f32 unless `sample_rate` says otherwise.
#[derive(Debug, Clone)]
pub struct AudioTurn {
    pub samples: Vec<f32>,
    /// When recording stopped.
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub sample_rate: u32,
}

impl AudioTurn {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64)
        };
        Self {
            samples,
            timestamp: Utc::now(),
            duration,
            sample_rate,
        }
    }
}

/// Converts a recorded turn into text.
pub trait SttBackend: Send + Sync {
    /// Return an empty string when nothing intelligible was said.
    fn transcribe_turn(&self, turn: &AudioTurn) -> VoiceResult<String>;
}

/// Encode f32 PCM (mono) as 16-bit WAV bytes for upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Returns a fixed transcript. Keeps the kiosk usable without an STT key.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe_turn(&self, turn: &AudioTurn) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        if turn.samples.is_empty() {
            return Ok(String::new());
        }
        Ok("What is the next stop?".to_string())
    }
}

/// OpenAI-compatible transcription API (`POST {base}/audio/transcriptions`).
#[derive(Debug, Clone)]
pub struct ApiStt {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    client: reqwest::blocking::Client,
}

impl ApiStt {
    /// Build from `STT_API_URL`, `STT_API_KEY`, and `STT_MODEL`.
    pub fn from_env() -> VoiceResult<Self> {
        let api_key = std::env::var("STT_API_KEY")
            .map_err(|_| VoiceError::Config("STT requires STT_API_KEY".to_string()))?;
        let base_url = std::env::var("STT_API_URL").unwrap_or_else(|_| DEFAULT_STT_URL.to_string());
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| DEFAULT_STT_MODEL.to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

impl SttBackend for ApiStt {
    fn transcribe_turn(&self, turn: &AudioTurn) -> VoiceResult<String> {
        if turn.samples.is_empty() {
            return Ok(String::new());
        }
        let wav = pcm_f32_to_wav(&turn.samples, turn.sample_rate);
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        debug!(samples = turn.samples.len(), "Uploading turn for transcription");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

/// `ApiStt` when `STT_API_KEY` is set, otherwise `PlaceholderStt`.
pub fn create_best_stt() -> Box<dyn SttBackend> {
    match ApiStt::from_env() {
        Ok(api) => {
            info!(model = %api.model, "Using transcription API");
            Box::new(api)
        }
        Err(e) => {
            info!("{}; using placeholder transcription", e);
            Box::new(PlaceholderStt::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_describes_pcm16_mono() {
        let wav = pcm_f32_to_wav(&[0.0, 1.0, -1.0, 2.0], 16000);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);

        let sample = |i: usize| i16::from_le_bytes([wav[44 + 2 * i], wav[45 + 2 * i]]);
        assert_eq!(sample(0), 0);
        assert_eq!(sample(1), 32767);
        assert_eq!(sample(2), -32767);
        // clamped
        assert_eq!(sample(3), 32767);
    }

    #[test]
    fn turn_duration_follows_sample_count() {
        let turn = AudioTurn::new(vec![0.0; 8000], 16000);
        assert_eq!(turn.duration, Duration::from_millis(500));
        assert_eq!(AudioTurn::new(vec![0.0; 10], 0).duration, Duration::ZERO);
    }

    #[test]
    fn placeholder_is_silent_for_empty_turns() {
        let stt = PlaceholderStt::new();
        assert_eq!(stt.transcribe_turn(&AudioTurn::new(vec![], 16000)).unwrap(), "");
        assert!(!stt
            .transcribe_turn(&AudioTurn::new(vec![0.1; 160], 16000))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn placeholder_with_response() {
        let stt = PlaceholderStt::with_response("hello world");
        let turn = AudioTurn::new(vec![], 16000);
        assert_eq!(stt.transcribe_turn(&turn).unwrap(), "hello world");
    }
}
