//! Explanation Orchestrator - single-flight generation with staleness discard
//!
//! The tick loop owns the orchestrator and is the only caller of
//! [`ExplanationOrchestrator::dispatch_if_idle`] and
//! [`ExplanationOrchestrator::try_drain_result`]. Two other contexts touch it:
//!
//! - the capture thread, through a [`QueryInbox`] (pending query, last heard
//!   text, capture-active flag);
//! - the job thread, through a [`JobSlot`] that publishes exactly one result.
//!
//! Each mailbox is a single slot with one writer and one reader,
//! last-write-wins. A result is spoken only if the semantic state captured at
//! dispatch still matches the state on the tick that drains it.

use crate::classifier::{SemanticState, StateKind};
use crate::collaborators::ExplanationGenerator;
use crate::motion::CartSnapshot;
use crate::route::RouteContext;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Work handed to the generator. Everything is captured by value at dispatch.
#[derive(Debug, Clone)]
pub struct ExplanationJob {
    pub id: u64,
    /// Semantic state discriminant at dispatch time.
    pub state_tag: StateKind,
    pub semantic_state: SemanticState,
    pub question: String,
    pub snapshot: CartSnapshot,
    pub route_context: RouteContext,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationResult {
    pub job_id: u64,
    pub state_tag: StateKind,
    pub text: String,
    /// True when `text` is the fallback apology.
    pub failed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of draining the result mailbox on a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// State unchanged since dispatch: speak it.
    Accepted(ExplanationResult),
    /// State changed since dispatch: dropped silently.
    Stale {
        result: ExplanationResult,
        current: StateKind,
    },
}

#[derive(Debug, Default)]
struct Mailboxes {
    pending_query: Mutex<Option<String>>,
    last_heard: Mutex<String>,
    result: Mutex<Option<ExplanationResult>>,
    in_flight: AtomicBool,
    capture_active: AtomicBool,
}

/// Mailbox contents are plain values, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture-side handle: publishes utterances and the listening flag.
#[derive(Debug, Clone)]
pub struct QueryInbox {
    mailboxes: Arc<Mailboxes>,
}

impl QueryInbox {
    /// Publish an utterance. Overwrites a query that has not been dispatched yet.
    pub fn submit(&self, text: impl Into<String>) {
        let text = text.into();
        *lock(&self.mailboxes.last_heard) = text.clone();
        if let Some(previous) = lock(&self.mailboxes.pending_query).replace(text) {
            debug!(
                target: "shuttle::orchestrator",
                dropped = %previous,
                "Pending query overwritten before dispatch"
            );
        }
    }

    pub fn set_capture_active(&self, active: bool) {
        self.mailboxes.capture_active.store(active, Ordering::Release);
    }
}

/// Job-side handle. Publishes one result and frees the slot.
///
/// Dropping the slot without completing it (the job thread panicked, or could
/// not be spawned) publishes the fallback text instead, so the slot never
/// stays in flight.
pub struct JobSlot {
    mailboxes: Arc<Mailboxes>,
    job_id: u64,
    state_tag: StateKind,
    fallback: String,
    completed: bool,
}

impl JobSlot {
    /// Publish the job's text.
    pub fn complete_job(mut self, text: String) {
        self.publish(text, false);
    }

    /// Publish the fallback apology.
    pub fn fail_job(mut self) {
        let fallback = self.fallback.clone();
        self.publish(fallback, true);
    }

    fn publish(&mut self, text: String, failed: bool) {
        let result = ExplanationResult {
            job_id: self.job_id,
            state_tag: self.state_tag,
            text,
            failed,
            completed_at: Utc::now(),
        };
        *lock(&self.mailboxes.result) = Some(result);
        self.mailboxes.in_flight.store(false, Ordering::Release);
        self.completed = true;
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        if !self.completed {
            error!(
                target: "shuttle::orchestrator",
                job = self.job_id,
                "Explanation job ended without a result; publishing fallback"
            );
            let fallback = self.fallback.clone();
            self.publish(fallback, true);
        }
    }
}

pub struct ExplanationOrchestrator {
    mailboxes: Arc<Mailboxes>,
    generator: Arc<dyn ExplanationGenerator>,
    fallback_reply: String,
    worker: Option<JoinHandle<()>>,
    next_job_id: u64,
}

impl ExplanationOrchestrator {
    pub fn new(generator: Arc<dyn ExplanationGenerator>, fallback_reply: impl Into<String>) -> Self {
        Self {
            mailboxes: Arc::new(Mailboxes::default()),
            generator,
            fallback_reply: fallback_reply.into(),
            worker: None,
            next_job_id: 1,
        }
    }

    /// Handle for the capture thread.
    pub fn inbox(&self) -> QueryInbox {
        QueryInbox {
            mailboxes: Arc::clone(&self.mailboxes),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.mailboxes.in_flight.load(Ordering::Acquire)
    }

    pub fn capture_active(&self) -> bool {
        self.mailboxes.capture_active.load(Ordering::Acquire)
    }

    pub fn has_pending_query(&self) -> bool {
        lock(&self.mailboxes.pending_query).is_some()
    }

    pub fn last_heard(&self) -> String {
        lock(&self.mailboxes.last_heard).clone()
    }

    /// Start a job for the pending query if no job is running.
    ///
    /// The query stays queued while a job is in flight. Returns the id of the
    /// dispatched job.
    pub fn dispatch_if_idle(
        &mut self,
        state: &SemanticState,
        snapshot: &CartSnapshot,
        route_context: &RouteContext,
    ) -> Option<u64> {
        if self.is_in_flight() {
            return None;
        }
        let question = lock(&self.mailboxes.pending_query).take()?;

        let job = ExplanationJob {
            id: self.next_job_id,
            state_tag: state.kind,
            semantic_state: state.clone(),
            question,
            snapshot: snapshot.clone(),
            route_context: route_context.clone(),
            dispatched_at: Utc::now(),
        };
        self.next_job_id += 1;

        info!(
            target: "shuttle::orchestrator",
            job = job.id,
            state = %job.state_tag,
            question = %job.question,
            "Dispatching explanation job"
        );

        self.mailboxes.in_flight.store(true, Ordering::Release);
        let slot = JobSlot {
            mailboxes: Arc::clone(&self.mailboxes),
            job_id: job.id,
            state_tag: job.state_tag,
            fallback: self.fallback_reply.clone(),
            completed: false,
        };
        let job_id = job.id;
        let generator = Arc::clone(&self.generator);

        let spawned = thread::Builder::new()
            .name(format!("explain-job-{}", job_id))
            .spawn(move || run_job(generator.as_ref(), &job, slot));

        match spawned {
            // The previous worker has already published (the slot was idle); dropping its handle detaches it.
            Ok(handle) => self.worker = Some(handle),
            Err(e) => error!(
                target: "shuttle::orchestrator",
                job = job_id,
                "Failed to spawn explanation job: {}",
                e
            ),
        }
        Some(job_id)
    }

    /// Take the published result, if any, and decide whether it may be spoken.
    pub fn try_drain_result(&mut self, current: StateKind) -> Option<Delivery> {
        let result = lock(&self.mailboxes.result).take()?;
        let waited_ms = (Utc::now() - result.completed_at).num_milliseconds();

        if result.state_tag == current {
            info!(
                target: "shuttle::orchestrator",
                job = result.job_id,
                state = %current,
                failed = result.failed,
                waited_ms,
                "Explanation accepted"
            );
            Some(Delivery::Accepted(result))
        } else {
            info!(
                target: "shuttle::orchestrator",
                job = result.job_id,
                dispatched = %result.state_tag,
                current = %current,
                "Discarding stale explanation"
            );
            Some(Delivery::Stale { result, current })
        }
    }

    /// Block until the current job thread exits. The tick loop never calls this.
    pub fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!(target: "shuttle::orchestrator", "Explanation job thread panicked");
            }
        }
    }
}

fn run_job(generator: &dyn ExplanationGenerator, job: &ExplanationJob, slot: JobSlot) {
    match generator.generate(job) {
        Ok(text) => {
            debug!(
                target: "shuttle::orchestrator",
                job = job.id,
                elapsed_ms = (Utc::now() - job.dispatched_at).num_milliseconds(),
                "Explanation generated"
            );
            slot.complete_job(text);
        }
        Err(e) => {
            warn!(
                target: "shuttle::orchestrator",
                job = job.id,
                "Explanation generation failed: {}",
                e
            );
            slot.fail_job();
        }
    }
}
