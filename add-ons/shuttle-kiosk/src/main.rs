//! Shuttle kiosk
//!
//! Drives the simulated cart around its loop once per tick, redraws the
//! passenger screen, and answers questions captured by push-to-talk.
//! Ctrl-C stops the loop; capture and generation threads are abandoned.

mod display;

use display::TerminalRenderer;
use shuttle_core::{
    spawn_capture_loop, ExplanationGenerator, ExplanationOrchestrator, LoopParams, MotionParams,
    Route, ShuttleConfig, ShuttleLoop, SpeechCapture,
};
use shuttle_voice::{
    create_best_stt, create_best_tts, OllamaExplainer, PushToTalkCapture, SpokenOutput,
    TemplateExplainer, TypedCapture,
};
use std::error::Error;
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn Error + Send + Sync>;

fn main() -> ExitCode {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[shuttle-kiosk] .env not loaded: {} (using system environment)", e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[shuttle-kiosk] {}", e);
            ExitCode::FAILURE
        }
    }
}

/// The screen is the terminal, so logs go to `log_file` when one is set.
fn init_tracing(log_file: Option<&str>) -> Result<(), BoxError> {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()));
    let registry = tracing_subscriber::registry().with(filter);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
    Ok(())
}

fn build_generator(config: &ShuttleConfig) -> Result<Arc<dyn ExplanationGenerator>, BoxError> {
    Ok(match config.explainer.mode.trim() {
        "template" => Arc::new(TemplateExplainer),
        _ => Arc::new(OllamaExplainer::new(&config.explainer)?),
    })
}

fn build_capture(config: &ShuttleConfig) -> Box<dyn SpeechCapture> {
    match config.capture.mode.trim() {
        "typed" => Box::new(TypedCapture::stdin()),
        _ => Box::new(PushToTalkCapture::new(&config.capture, create_best_stt())),
    }
}

fn run() -> Result<(), BoxError> {
    let config = ShuttleConfig::load()?;
    init_tracing(config.log_file.as_deref())?;

    let route = Arc::new(Route::load(&config.route_path)?);

    // Blocking HTTP clients are built and dropped outside the async runtime
    let orchestrator = ExplanationOrchestrator::new(build_generator(&config)?, config.fallback_reply.clone());
    let speech = Arc::new(SpokenOutput::new(create_best_tts()));
    let mut shuttle = ShuttleLoop::new(
        route,
        MotionParams::from(&config),
        LoopParams::from(&config),
        orchestrator,
        speech,
        Box::new(TerminalRenderer),
    );
    spawn_capture_loop(build_capture(&config), shuttle.inbox())?;

    tracing::info!(
        tick_secs = config.tick_secs,
        route_path = %config.route_path,
        explainer = %config.explainer.mode,
        capture = %config.capture.mode,
        "Shuttle kiosk started"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(&mut shuttle, config.tick_duration()));

    shuttle.shutdown();
    println!("Exiting");
    Ok(())
}

/// Real-time pacing: after a stall the next tick waits a full period
/// instead of bursting to catch up.
fn tick_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn drive(shuttle: &mut ShuttleLoop, period: Duration) {
    let mut interval = tick_interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                shuttle.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; stopping the shuttle");
                break;
            }
        }
    }
}
