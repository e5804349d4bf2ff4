//! # Shuttle Voice - the kiosk's ears, voice, and explainer
//!
//! Implements the collaborator traits from `shuttle-core`:
//!
//! - [`PushToTalkCapture`] / [`TypedCapture`]: `SpeechCapture` (cpal + STT, or stdin)
//! - [`SpokenOutput`]: `SpeechOutput` (TTS + rodio on a detached thread)
//! - [`OllamaExplainer`] / [`TemplateExplainer`]: `ExplanationGenerator`
//!
//! STT and TTS backends are picked from the environment (`STT_API_KEY`,
//! `TTS_API_KEY`); without keys the placeholders keep the kiosk running.

pub mod audio;
pub mod capture;
pub mod error;
pub mod explainer;
pub mod stt;
pub mod voice_output;

pub use audio::{AudioCapture, AudioChunk, AudioConfig, Chunker, Recording};
pub use capture::{PushToTalkCapture, TypedCapture};
pub use error::{VoiceError, VoiceResult};
pub use explainer::{build_prompt, OllamaExplainer, ReplyBudget, TemplateExplainer};
pub use stt::{create_best_stt, ApiStt, AudioTurn, PlaceholderStt, SttBackend};
pub use voice_output::{
    create_best_tts, normalize_for_speech, ApiTts, PlaceholderTts, SpokenOutput, TtsBackend, VoiceOutput,
};
