//! Passenger speech capture: Enter-key push-to-talk or typed questions.

use crate::audio::{drain_chunks, AudioCapture, AudioConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::stt::{AudioTurn, SttBackend};
use shuttle_core::{CaptureConfig, ShuttleResult, SpeechCapture};
use std::io::{BufRead, BufReader};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

type LineSource = Box<dyn BufRead + Send>;

fn stdin_source() -> LineSource {
    Box::new(BufReader::new(std::io::stdin()))
}

/// Read one line; `Ok(None)` on end of input.
fn read_line(source: &mut dyn BufRead) -> VoiceResult<Option<String>> {
    let mut line = String::new();
    if source.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// First Enter starts recording, second Enter stops it; the recording is
/// transcribed by the configured STT backend.
pub struct PushToTalkCapture {
    keys: Mutex<LineSource>,
    audio: AudioConfig,
    stt: Box<dyn SttBackend>,
    debounce: Duration,
}

impl PushToTalkCapture {
    pub fn new(config: &CaptureConfig, stt: Box<dyn SttBackend>) -> Self {
        Self::with_keys(config, stt, stdin_source())
    }

    pub fn with_keys(config: &CaptureConfig, stt: Box<dyn SttBackend>, keys: LineSource) -> Self {
        Self {
            keys: Mutex::new(keys),
            audio: AudioConfig {
                sample_rate: config.sample_rate,
                ..AudioConfig::default()
            },
            stt,
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }

    fn keys(&self) -> MutexGuard<'_, LineSource> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for_enter(&self) -> VoiceResult<()> {
        match read_line(self.keys().as_mut())? {
            Some(_) => Ok(()),
            None => Err(VoiceError::InputClosed),
        }
    }

    /// Record until the next Enter, trailing partial chunk included.
    fn record_until_enter(&self) -> VoiceResult<Vec<f32>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recording = AudioCapture::new(self.audio.clone())?.start_capture(tx)?;
        let released = self.wait_for_enter();
        recording.stop();
        released?;
        Ok(drain_chunks(&mut rx))
    }

    fn transcribe(&self, samples: Vec<f32>) -> VoiceResult<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let turn = AudioTurn::new(samples, self.audio.sample_rate);
        debug!(
            samples = turn.samples.len(),
            secs = turn.duration.as_secs_f32(),
            "Transcribing recording"
        );
        self.stt.transcribe_turn(&turn)
    }
}

impl SpeechCapture for PushToTalkCapture {
    fn capture_utterance(&self, on_start: &dyn Fn(), on_end: &dyn Fn()) -> ShuttleResult<String> {
        self.wait_for_enter()?;
        on_start();
        let recorded = self.record_until_enter();
        on_end();

        let text = self.transcribe(recorded?)?;
        thread::sleep(self.debounce);
        Ok(text)
    }
}

/// Reads one typed question per line. Used on machines without a microphone.
pub struct TypedCapture {
    lines: Mutex<LineSource>,
}

impl TypedCapture {
    pub fn stdin() -> Self {
        Self::from_reader(stdin_source())
    }

    pub fn from_reader(lines: LineSource) -> Self {
        info!("Typed capture: enter a question and press Enter");
        Self {
            lines: Mutex::new(lines),
        }
    }
}

impl SpeechCapture for TypedCapture {
    fn capture_utterance(&self, on_start: &dyn Fn(), on_end: &dyn Fn()) -> ShuttleResult<String> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let line = read_line(lines.as_mut())?.ok_or(VoiceError::InputClosed)?;
        // A typed line is the whole gesture; blank lines still count as one
        on_start();
        on_end();
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::PlaceholderStt;
    use shuttle_core::ShuttleError;
    use std::cell::Cell;
    use std::io::Cursor;

    fn source(text: &str) -> LineSource {
        Box::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn typed_capture_yields_lines_then_closes() {
        let capture = TypedCapture::from_reader(source("where are we?\n\nnext stop\r\n"));
        let starts = Cell::new(0);
        let ends = Cell::new(0);
        let on_start = || starts.set(starts.get() + 1);
        let on_end = || ends.set(ends.get() + 1);

        assert_eq!(capture.capture_utterance(&on_start, &on_end).unwrap(), "where are we?");
        assert_eq!(capture.capture_utterance(&on_start, &on_end).unwrap(), "");
        assert_eq!(capture.capture_utterance(&on_start, &on_end).unwrap(), "next stop");
        assert!(matches!(
            capture.capture_utterance(&on_start, &on_end),
            Err(ShuttleError::CaptureClosed)
        ));
        // every line read fires the hooks once, blank ones included; EOF fires none
        assert_eq!(starts.get(), 3);
        assert_eq!(ends.get(), 3);
    }

    #[test]
    fn blank_line_fires_hooks_once() {
        let capture = TypedCapture::from_reader(source("   \n"));
        let calls = Cell::new(0);
        let on_start = || calls.set(calls.get() + 1);
        let on_end = || calls.set(calls.get() + 10);
        assert_eq!(capture.capture_utterance(&on_start, &on_end).unwrap(), "");
        assert_eq!(calls.get(), 11);
    }

    #[test]
    fn push_to_talk_closes_on_eof_before_recording() {
        let capture = PushToTalkCapture::with_keys(
            &CaptureConfig::default(),
            Box::new(PlaceholderStt::new()),
            source(""),
        );
        let started = Cell::new(false);
        let on_start = || started.set(true);
        let result = capture.capture_utterance(&on_start, &|| {});
        assert!(matches!(result, Err(ShuttleError::CaptureClosed)));
        assert!(!started.get());
    }

    #[test]
    fn empty_recording_is_not_transcribed() {
        let capture = PushToTalkCapture::with_keys(
            &CaptureConfig::default(),
            Box::new(PlaceholderStt::with_response("should not appear")),
            source(""),
        );
        assert_eq!(capture.transcribe(Vec::new()).unwrap(), "");
        assert_eq!(capture.transcribe(vec![0.0; 160]).unwrap(), "should not appear");
    }

    #[test]
    #[ignore] // Requires a microphone; press Enter twice
    fn records_from_microphone() {
        let capture = PushToTalkCapture::new(&CaptureConfig::default(), Box::new(PlaceholderStt::new()));
        let text = capture.capture_utterance(&|| println!("listening"), &|| println!("done"));
        println!("{:?}", text);
    }
}
