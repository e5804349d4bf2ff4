//! Passenger-facing terminal screen, redrawn once per tick.

use shuttle_core::{DisplayFrame, Renderer};
use std::io::Write;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";
const RULE: &str = "----------------------------------------";
const EMPTY: &str = "—";

fn or_dash(text: &str) -> &str {
    if text.trim().is_empty() {
        EMPTY
    } else {
        text
    }
}

/// Plain-text screen contents for one frame.
pub fn format_frame(frame: &DisplayFrame<'_>) -> String {
    let snapshot = frame.snapshot;
    let eta = snapshot
        .eta_to_next_stop
        .map(|s| format!("~{} seconds", s))
        .unwrap_or_else(|| EMPTY.to_string());
    let prompt = if frame.capture_active {
        "Listening… press Enter to finish"
    } else {
        "Press Enter to speak"
    };

    [
        "Campus Shuttle Assistant".to_string(),
        RULE.to_string(),
        format!("Current stop: {}", snapshot.current_stop),
        format!("Next stop:    {}", snapshot.next_stop),
        format!("ETA:          {}", eta),
        format!("Status:       {}", frame.state.kind.status_line()),
        RULE.to_string(),
        prompt.to_string(),
        format!("Heard:        {}", or_dash(frame.last_heard)),
        format!("Assistant:    {}", or_dash(frame.last_assistant)),
    ]
    .join("\n")
}

#[derive(Debug, Default)]
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, frame: &DisplayFrame<'_>) {
        let mut out = std::io::stdout().lock();
        // A closed terminal is not worth stopping the cart for
        let _ = writeln!(out, "{}{}", CLEAR_SCREEN, format_frame(frame));
        let _ = out.flush();
    }

    fn clear(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}", CLEAR_SCREEN);
        let _ = out.flush();
    }
}
