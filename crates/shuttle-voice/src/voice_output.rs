//! Spoken replies: text normalization, TTS backends, and rodio playback.
//!
//! [`SpokenOutput`] is the kiosk's `SpeechOutput`. Each utterance is
//! synthesized and played on its own detached thread so the tick loop never
//! waits on audio.

use crate::error::{VoiceError, VoiceResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rodio::{OutputStream, Sink, Source};
use shuttle_core::SpeechOutput;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TTS_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TTS_MODEL: &str = "tts-1";
const DEFAULT_TTS_VOICE: &str = "alloy";

static WHOLE_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\s*\.\s*0\b").expect("valid regex"));
static METERS_PER_SECOND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*m\s*/\s*s\b").expect("valid regex"));
static KILOMETERS_PER_HOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*km\s*/\s*h\b").expect("valid regex"));
static METERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*m\b").expect("valid regex"));
static KILOMETERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?)\s*km\b").expect("valid regex"));

/// Rewrite units and whole-number decimals so they read naturally aloud.
pub fn normalize_for_speech(text: &str) -> String {
    let text = WHOLE_DECIMAL.replace_all(text, "$1");
    let text = METERS_PER_SECOND.replace_all(&text, "$1 meters per second");
    let text = KILOMETERS_PER_HOUR.replace_all(&text, "$1 kilometers per hour");
    let text = METERS.replace_all(&text, "$1 meters");
    let text = KILOMETERS.replace_all(&text, "$1 kilometers");
    text.into_owned()
}

/// Turns text into encoded audio (WAV/MP3).
pub trait TtsBackend: Send + Sync {
    /// Return an empty vec to skip playback.
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// Produces no audio. Used when no TTS key is configured.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible speech API (`POST {base}/audio/speech`).
#[derive(Debug, Clone)]
pub struct ApiTts {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl ApiTts {
    /// Build from `TTS_API_URL`, `TTS_API_KEY`, `TTS_MODEL`, and `TTS_VOICE`.
    pub fn from_env() -> VoiceResult<Self> {
        let api_key = std::env::var("TTS_API_KEY")
            .map_err(|_| VoiceError::Config("TTS requires TTS_API_KEY".to_string()))?;
        let base_url = std::env::var("TTS_API_URL").unwrap_or_else(|_| DEFAULT_TTS_URL.to_string());
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| DEFAULT_TTS_MODEL.to_string());
        let tts = Self::new(base_url, api_key, model)?;
        Ok(match std::env::var("TTS_VOICE") {
            Ok(voice) if !voice.trim().is_empty() => tts.with_voice(voice.trim()),
            _ => tts,
        })
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: DEFAULT_TTS_VOICE.to_string(),
            client,
        })
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

impl TtsBackend for ApiTts {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// `ApiTts` when `TTS_API_KEY` is set, otherwise `PlaceholderTts`.
pub fn create_best_tts() -> Arc<dyn TtsBackend> {
    match ApiTts::from_env() {
        Ok(api) => {
            info!(model = %api.model, voice = %api.voice, "Using speech API");
            Arc::new(api)
        }
        Err(e) => {
            info!("{}; replies will not be voiced", e);
            Arc::new(PlaceholderTts)
        }
    }
}

/// A rodio sink on the default output device.
///
/// `OutputStream` is not `Send`; build one on the thread that plays.
pub struct VoiceOutput {
    _stream: OutputStream,
    sink: Sink,
}

impl VoiceOutput {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            sink,
        })
    }

    /// Queue encoded audio (WAV/MP3). Empty input is skipped.
    pub fn play_bytes(&self, bytes: Vec<u8>) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let source = rodio::Decoder::new(Cursor::new(bytes))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    pub fn sleep_until_end(&self) {
        self.sink.sleep_until_end();
    }
}

/// Fire-and-forget speech for the tick loop.
pub struct SpokenOutput {
    tts: Arc<dyn TtsBackend>,
}

impl SpokenOutput {
    pub fn new(tts: Arc<dyn TtsBackend>) -> Self {
        Self { tts }
    }

    fn render(tts: &dyn TtsBackend, text: &str) -> VoiceResult<()> {
        let bytes = tts.synthesize(text)?;
        if bytes.is_empty() {
            return Ok(());
        }
        let output = VoiceOutput::new()?;
        output.play_bytes(bytes)?;
        output.sleep_until_end();
        Ok(())
    }
}

impl SpeechOutput for SpokenOutput {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let text = normalize_for_speech(text);
        let tts = Arc::clone(&self.tts);
        debug!(utterance = %text, "Speaking");

        let spawned = thread::Builder::new()
            .name("speak".to_string())
            .spawn(move || {
                if let Err(e) = Self::render(tts.as_ref(), &text) {
                    warn!("Speech playback failed: {}", e);
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start speech thread: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn whole_decimals_lose_their_fraction() {
        assert_eq!(normalize_for_speech("about 3.0 seconds"), "about 3 seconds");
        assert_eq!(normalize_for_speech("about 3 . 0 seconds"), "about 3 seconds");
        assert_eq!(normalize_for_speech("2.5 seconds"), "2.5 seconds");
    }

    #[test]
    fn units_are_spelled_out() {
        assert_eq!(
            normalize_for_speech("We travel at 3.0 m/s."),
            "We travel at 3 meters per second."
        );
        assert_eq!(normalize_for_speech("12 km/h"), "12 kilometers per hour");
        assert_eq!(normalize_for_speech("B is 20 m away"), "B is 20 meters away");
        assert_eq!(normalize_for_speech("about 1.5 km"), "about 1.5 kilometers");
        assert_eq!(normalize_for_speech("I'm fine"), "I'm fine");
    }

    #[test]
    fn placeholder_tts_returns_empty() {
        assert!(PlaceholderTts.synthesize("hello").unwrap().is_empty());
    }

    struct CountingTts {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl TtsBackend for CountingTts {
        fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            Ok(Vec::new())
        }
    }

    #[test]
    fn blank_text_is_a_no_op() {
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let output = SpokenOutput::new(tts.clone());
        output.speak("   ");
        output.speak("");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn speak_synthesizes_normalized_text_off_thread() {
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let output = SpokenOutput::new(tts.clone());
        output.speak("Next stop in 20 m.");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while tts.calls.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*tts.seen.lock().unwrap(), vec!["Next stop in 20 meters."]);
    }
}
