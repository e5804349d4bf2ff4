//! Motion simulator: fixed-tick cart movement along the route loop.
//!
//! The cart dwells at a stop, then drives in a straight line to the next stop,
//! snaps onto it when close enough, and dwells again. All position state is
//! owned here and mutated only by [`MotionSimulator::advance`].

use crate::route::{Position, Route, StopId};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Tuning for the simulated cart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub cruise_speed_mps: f64,
    pub dwell_secs: f64,
    pub snap_threshold_m: f64,
}

impl From<&crate::config::ShuttleConfig> for MotionParams {
    fn from(config: &crate::config::ShuttleConfig) -> Self {
        Self {
            cruise_speed_mps: config.cruise_speed_mps,
            dwell_secs: config.dwell_secs,
            snap_threshold_m: config.snap_threshold_m,
        }
    }
}

/// Mutable cart state. `is_stopped` implies `speed == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub simulation_time: f64,
    pub position: Position,
    pub loop_index: usize,
    pub current_stop_id: StopId,
    pub next_stop_id: StopId,
    pub is_stopped: bool,
    pub stop_elapsed: f64,
    pub speed: f64,
}

/// Read-only projection of the cart, produced once per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSnapshot {
    pub simulation_time: f64,
    pub position: Position,
    pub current_stop_id: StopId,
    pub next_stop_id: StopId,
    pub current_stop: String,
    pub next_stop: String,
    pub is_stopped: bool,
    pub speed: f64,
    pub distance_to_next_stop: f64,
    /// Whole seconds to the next stop; `None` while stopped.
    pub eta_to_next_stop: Option<u64>,
}

/// Straight-line step of `step` meters from `from` toward `to`, never overshooting.
fn interpolate(from: &Position, to: &Position, step: f64) -> Position {
    let total = from.distance_to(to);
    if total == 0.0 {
        return *to;
    }
    let ratio = (step / total).min(1.0);
    Position::new(
        from.x + ratio * (to.x - from.x),
        from.y + ratio * (to.y - from.y),
    )
}

pub struct MotionSimulator {
    route: Arc<Route>,
    params: MotionParams,
    state: MotionState,
}

impl MotionSimulator {
    /// Place the cart at the first stop of the loop, dwelling.
    pub fn new(route: Arc<Route>, params: MotionParams) -> Self {
        let (current, next) = route.segment(0);
        let state = MotionState {
            simulation_time: 0.0,
            position: current.position(),
            loop_index: 0,
            current_stop_id: current.id,
            next_stop_id: next.id,
            is_stopped: true,
            stop_elapsed: 0.0,
            speed: 0.0,
        };
        Self {
            route,
            params,
            state,
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    /// Advance the cart by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.state.simulation_time += dt;

        if self.state.is_stopped {
            self.state.stop_elapsed += dt;
            if self.state.stop_elapsed >= self.params.dwell_secs {
                self.state.is_stopped = false;
                self.state.stop_elapsed = 0.0;
                self.state.speed = self.params.cruise_speed_mps;
                debug!(
                    target: "shuttle::motion",
                    from = self.state.current_stop_id,
                    to = self.state.next_stop_id,
                    "Departing"
                );
            }
            return;
        }

        let target = self.route.segment(self.state.loop_index).1.position();
        let step = self.state.speed * dt;
        self.state.position = interpolate(&self.state.position, &target, step);

        if self.state.position.distance_to(&target) <= self.params.snap_threshold_m {
            self.arrive(target);
        }
    }

    fn arrive(&mut self, at: Position) {
        self.state.position = at;
        self.state.is_stopped = true;
        self.state.stop_elapsed = 0.0;
        self.state.speed = 0.0;

        self.state.loop_index = self.route.next_index(self.state.loop_index);
        let (current, next) = self.route.segment(self.state.loop_index);
        self.state.current_stop_id = current.id;
        self.state.next_stop_id = next.id;
        debug!(
            target: "shuttle::motion",
            stop = %current.name,
            "Arrived"
        );
    }

    pub fn snapshot(&self) -> CartSnapshot {
        let (current, next) = self.route.segment(self.state.loop_index);
        let remaining = self.state.position.distance_to(&next.position());
        let eta = if !self.state.is_stopped && self.state.speed > 0.0 {
            Some((remaining / self.state.speed).round() as u64)
        } else {
            None
        };
        CartSnapshot {
            simulation_time: self.state.simulation_time,
            position: self.state.position,
            current_stop_id: current.id,
            next_stop_id: next.id,
            current_stop: current.name.clone(),
            next_stop: next.name.clone(),
            is_stopped: self.state.is_stopped,
            speed: self.state.speed,
            distance_to_next_stop: remaining,
            eta_to_next_stop: eta,
        }
    }
}
