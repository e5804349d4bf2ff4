//! Deterministic classification of a cart snapshot into a semantic state.

use crate::motion::CartSnapshot;
use serde::Serialize;
use std::fmt;

/// Distance (meters) under which a moving cart is approaching its next stop.
pub const APPROACHING_THRESHOLD_M: f64 = 20.0;

/// Semantic motion category. This is the tag compared for staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateKind {
    StoppedAtStop,
    ApproachingStop,
    MovingBetweenStops,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::StoppedAtStop => "STOPPED_AT_STOP",
            StateKind::ApproachingStop => "APPROACHING_STOP",
            StateKind::MovingBetweenStops => "MOVING_BETWEEN_STOPS",
        }
    }

    /// Short status line for the passenger display.
    pub fn status_line(&self) -> &'static str {
        match self {
            StateKind::StoppedAtStop => "Stopped",
            StateKind::ApproachingStop => "Approaching stop",
            StateKind::MovingBetweenStops => "Moving",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticState {
    pub kind: StateKind,
    pub current_stop: String,
    pub next_stop: String,
    /// The stop the cart is at or most recently departed.
    pub last_stop: String,
}

/// Classify with the default approaching threshold.
pub fn classify(snapshot: &CartSnapshot) -> SemanticState {
    classify_with_threshold(snapshot, APPROACHING_THRESHOLD_M)
}

/// First match wins: stopped, then approaching, then moving.
pub fn classify_with_threshold(snapshot: &CartSnapshot, approaching_m: f64) -> SemanticState {
    let kind = if snapshot.is_stopped {
        StateKind::StoppedAtStop
    } else if snapshot.distance_to_next_stop <= approaching_m {
        StateKind::ApproachingStop
    } else {
        StateKind::MovingBetweenStops
    };

    SemanticState {
        kind,
        current_stop: snapshot.current_stop.clone(),
        next_stop: snapshot.next_stop.clone(),
        last_stop: snapshot.current_stop.clone(),
    }
}
