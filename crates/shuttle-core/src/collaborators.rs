//! Seams for the external collaborators: speech capture, explanation
//! generation, speech output, and display rendering.
//!
//! Implementations live outside the core (see `shuttle-voice` and the kiosk);
//! the core only depends on these traits.

use crate::classifier::SemanticState;
use crate::error::ShuttleResult;
use crate::motion::CartSnapshot;
use crate::orchestrator::ExplanationJob;

/// Blocking push-to-talk capture. Yields one utterance per call.
///
/// `on_start` and `on_end` fire exactly once per call that gets past the
/// push-to-talk wait; they only drive the "listening" display flag.
pub trait SpeechCapture: Send {
    fn capture_utterance(&self, on_start: &dyn Fn(), on_end: &dyn Fn()) -> ShuttleResult<String>;
}

/// Text generation for a passenger question. Runs on a background thread and
/// may block for seconds.
pub trait ExplanationGenerator: Send + Sync {
    fn generate(&self, job: &ExplanationJob) -> ShuttleResult<String>;
}

/// Fire-and-forget utterance rendering. Must return immediately; blank input is a no-op.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
}

/// Everything the display shows for one tick.
#[derive(Debug, Clone, Copy)]
pub struct DisplayFrame<'a> {
    pub snapshot: &'a CartSnapshot,
    pub state: &'a SemanticState,
    pub capture_active: bool,
    pub last_heard: &'a str,
    pub last_assistant: &'a str,
}

pub trait Renderer {
    fn render(&self, frame: &DisplayFrame<'_>);

    /// Called once on shutdown.
    fn clear(&self) {}
}
