//! The tick: advance, classify, drain, dispatch, render.
//!
//! [`ShuttleLoop::tick`] is synchronous and never waits on capture or
//! generation; the caller paces it (see the kiosk's interval loop).

use crate::classifier::{classify_with_threshold, SemanticState};
use crate::collaborators::{DisplayFrame, Renderer, SpeechCapture, SpeechOutput};
use crate::config::ShuttleConfig;
use crate::error::ShuttleError;
use crate::motion::{CartSnapshot, MotionParams, MotionSimulator};
use crate::orchestrator::{Delivery, ExplanationOrchestrator, QueryInbox};
use crate::route::Route;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loop parameters that are not motion tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopParams {
    pub dt_secs: f64,
    pub approaching_threshold_m: f64,
    pub upcoming_stop_count: usize,
}

impl From<&ShuttleConfig> for LoopParams {
    fn from(config: &ShuttleConfig) -> Self {
        Self {
            dt_secs: config.tick_secs,
            approaching_threshold_m: config.approaching_threshold_m,
            upcoming_stop_count: config.upcoming_stop_count,
        }
    }
}

/// What happened on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub snapshot: CartSnapshot,
    pub state: SemanticState,
    pub dispatched_job: Option<u64>,
    pub delivery: Option<Delivery>,
}

pub struct ShuttleLoop {
    params: LoopParams,
    simulator: MotionSimulator,
    orchestrator: ExplanationOrchestrator,
    speech: Arc<dyn SpeechOutput>,
    renderer: Box<dyn Renderer>,
    last_assistant: String,
    ticks: u64,
}

impl ShuttleLoop {
    pub fn new(
        route: Arc<Route>,
        motion: MotionParams,
        params: LoopParams,
        orchestrator: ExplanationOrchestrator,
        speech: Arc<dyn SpeechOutput>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            params,
            simulator: MotionSimulator::new(route, motion),
            orchestrator,
            speech,
            renderer,
            last_assistant: String::new(),
            ticks: 0,
        }
    }

    pub fn inbox(&self) -> QueryInbox {
        self.orchestrator.inbox()
    }

    pub fn orchestrator(&self) -> &ExplanationOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut ExplanationOrchestrator {
        &mut self.orchestrator
    }

    pub fn last_assistant(&self) -> &str {
        &self.last_assistant
    }

    pub fn tick(&mut self) -> TickReport {
        self.simulator.advance(self.params.dt_secs);
        let snapshot = self.simulator.snapshot();
        let state = classify_with_threshold(&snapshot, self.params.approaching_threshold_m);
        let route_context = self.simulator.route().context_at(
            self.simulator.state().loop_index,
            self.params.upcoming_stop_count,
        );

        // Drain first: a published result is taken before a new job can overwrite it
        let delivery = self.orchestrator.try_drain_result(state.kind);
        if let Some(Delivery::Accepted(result)) = &delivery {
            self.speech.speak(&result.text);
            self.last_assistant = result.text.clone();
        }

        let dispatched_job = self
            .orchestrator
            .dispatch_if_idle(&state, &snapshot, &route_context);

        let last_heard = self.orchestrator.last_heard();
        self.renderer.render(&DisplayFrame {
            snapshot: &snapshot,
            state: &state,
            capture_active: self.orchestrator.capture_active(),
            last_heard: &last_heard,
            last_assistant: &self.last_assistant,
        });

        let tick = self.ticks;
        self.ticks += 1;
        debug!(
            target: "shuttle::loop",
            tick,
            state = %state.kind,
            distance = snapshot.distance_to_next_stop,
            "Tick"
        );

        TickReport {
            tick,
            snapshot,
            state,
            dispatched_job,
            delivery,
        }
    }

    pub fn shutdown(&self) {
        self.renderer.clear();
    }
}

/// Run `capture` on its own thread for the life of the process, publishing
/// every non-empty utterance to `inbox`. The thread is never joined.
pub fn spawn_capture_loop(
    capture: Box<dyn SpeechCapture>,
    inbox: QueryInbox,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("speech-capture".to_string())
        .spawn(move || capture_loop(capture.as_ref(), &inbox))
}

fn capture_loop(capture: &dyn SpeechCapture, inbox: &QueryInbox) {
    info!(target: "shuttle::capture", "Capture loop started");
    loop {
        let on_start = || inbox.set_capture_active(true);
        let on_end = || inbox.set_capture_active(false);
        match capture.capture_utterance(&on_start, &on_end) {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                info!(target: "shuttle::capture", heard = %text, "Utterance captured");
                inbox.submit(text);
            }
            Err(ShuttleError::CaptureClosed) => {
                info!(target: "shuttle::capture", "Capture input closed; capture loop ending");
                inbox.set_capture_active(false);
                return;
            }
            Err(e) => {
                warn!(target: "shuttle::capture", "Capture failed: {}", e);
                inbox.set_capture_active(false);
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
}
