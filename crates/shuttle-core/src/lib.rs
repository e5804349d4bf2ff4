//! # Shuttle Core - state/response orchestration for a campus shuttle
//!
//! Simulates a cart driving a closed loop of stops, classifies its motion
//! into a semantic state every tick, and answers passenger questions through
//! a single-flight explanation job whose answer is dropped if the cart's
//! state changed while it was being generated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── tick (1 s) ────────────────────────────┐
//! │  MotionSimulator ─► CartSnapshot ─► classify ─► SemanticState       │
//! │                                                   │                 │
//! │  QueryInbox ◄── capture thread       dispatch_if_idle ─► job thread │
//! │                                                   │          │      │
//! │  SpeechOutput ◄── Accepted ◄── try_drain_result ◄─┴── JobSlot ◄┘    │
//! │  Renderer ◄── DisplayFrame                                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod motion;
pub mod orchestrator;
pub mod route;
pub mod shuttle_loop;

pub use classifier::{classify, classify_with_threshold, SemanticState, StateKind, APPROACHING_THRESHOLD_M};
pub use collaborators::{DisplayFrame, ExplanationGenerator, Renderer, SpeechCapture, SpeechOutput};
pub use config::{CaptureConfig, ExplainerConfig, ShuttleConfig};
pub use error::{ShuttleError, ShuttleResult};
pub use motion::{CartSnapshot, MotionParams, MotionSimulator, MotionState};
pub use orchestrator::{
    Delivery, ExplanationJob, ExplanationOrchestrator, ExplanationResult, JobSlot, QueryInbox,
};
pub use route::{Position, Route, RouteContext, Stop, StopId};
pub use shuttle_loop::{spawn_capture_loop, LoopParams, ShuttleLoop, TickReport};
