//! Route model: stops and the closed loop the cart drives.
//!
//! Loaded once at startup and read-only afterwards. The loop must be closed
//! (its last id repeats its first) so the simulator can walk it with index
//! arithmetic modulo `len(loop) - 1`.

use crate::error::{ShuttleError, ShuttleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Identifier of a stop as written in the route document.
pub type StopId = i64;

/// A planar coordinate in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// One stop on the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl Stop {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Route document as stored on disk.
#[derive(Debug, Clone, Deserialize)]
struct RouteDocument {
    stops: Vec<Stop>,
    #[serde(rename = "loop")]
    stop_loop: Vec<StopId>,
}

/// Route information handed to the explanation generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteContext {
    pub full_route: Vec<String>,
    pub upcoming_stops: Vec<String>,
}

/// Validated, immutable route.
#[derive(Debug, Clone)]
pub struct Route {
    stops: HashMap<StopId, Stop>,
    stop_loop: Vec<StopId>,
    order: Vec<String>,
}

impl Route {
    /// Read and validate a route document. Missing or malformed files are fatal.
    pub fn load(path: impl AsRef<Path>) -> ShuttleResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ShuttleError::RouteIo {
            path: path.display().to_string(),
            source,
        })?;
        let route = Self::from_json_str(&raw)?;
        info!(
            target: "shuttle::route",
            path = %path.display(),
            stops = route.stops.len(),
            cycle = route.cycle_len(),
            "Route loaded"
        );
        Ok(route)
    }

    pub fn from_json_str(raw: &str) -> ShuttleResult<Self> {
        let doc: RouteDocument = serde_json::from_str(raw)?;
        Self::new(doc.stops, doc.stop_loop)
    }

    /// Build a route from parts, enforcing the loop invariants.
    pub fn new(stops: Vec<Stop>, stop_loop: Vec<StopId>) -> ShuttleResult<Self> {
        if stops.is_empty() {
            return Err(ShuttleError::InvalidRoute("route has no stops".to_string()));
        }

        let mut by_id = HashMap::with_capacity(stops.len());
        for stop in stops {
            let id = stop.id;
            if by_id.insert(id, stop).is_some() {
                return Err(ShuttleError::InvalidRoute(format!("duplicate stop id {}", id)));
            }
        }

        if stop_loop.len() < 2 {
            return Err(ShuttleError::InvalidRoute(format!(
                "loop needs at least 2 entries (got {})",
                stop_loop.len()
            )));
        }
        if let Some(unknown) = stop_loop.iter().find(|id| !by_id.contains_key(id)) {
            return Err(ShuttleError::InvalidRoute(format!(
                "loop references unknown stop id {}",
                unknown
            )));
        }
        if stop_loop.first() != stop_loop.last() {
            return Err(ShuttleError::InvalidRoute(
                "loop is not closed: its last id must repeat its first".to_string(),
            ));
        }

        let order = stop_loop
            .iter()
            .map(|id| by_id[id].name.clone())
            .collect();

        Ok(Self {
            stops: by_id,
            stop_loop,
            order,
        })
    }

    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.stops.get(&id)
    }

    /// Stop names in loop order, closing entry included.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Number of distinct positions in the cycle (`len(loop) - 1`).
    pub fn cycle_len(&self) -> usize {
        self.stop_loop.len() - 1
    }

    /// The stop pair `(current, next)` at `loop_index`.
    pub fn segment(&self, loop_index: usize) -> (&Stop, &Stop) {
        let index = loop_index % self.cycle_len();
        (
            &self.stops[&self.stop_loop[index]],
            &self.stops[&self.stop_loop[index + 1]],
        )
    }

    /// Index of the pair that follows `loop_index`, never the closing entry.
    pub fn next_index(&self, loop_index: usize) -> usize {
        (loop_index + 1) % self.cycle_len()
    }

    /// Names of the next `count` stops after `loop_index`, walking around the cycle.
    pub fn upcoming_after(&self, loop_index: usize, count: usize) -> Vec<String> {
        let cycle = self.cycle_len();
        (1..=count.min(cycle))
            .map(|offset| {
                let id = self.stop_loop[(loop_index + offset) % cycle];
                self.stops[&id].name.clone()
            })
            .collect()
    }

    pub fn context_at(&self, loop_index: usize, upcoming: usize) -> RouteContext {
        RouteContext {
            full_route: self.order.clone(),
            upcoming_stops: self.upcoming_after(loop_index, upcoming),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CAMPUS: &str = r#"{
        "stops": [
            {"id": 1, "name": "Library", "x": 0.0, "y": 0.0},
            {"id": 2, "name": "Gym", "x": 100.0, "y": 0.0},
            {"id": 3, "name": "Dorms", "x": 100.0, "y": 50.0}
        ],
        "loop": [1, 2, 3, 1]
    }"#;

    #[test]
    fn parses_closed_loop() {
        let route = Route::from_json_str(CAMPUS).unwrap();
        assert_eq!(route.cycle_len(), 3);
        assert_eq!(route.order(), ["Library", "Gym", "Dorms", "Library"]);
        let (current, next) = route.segment(2);
        assert_eq!(current.name, "Dorms");
        assert_eq!(next.name, "Library");
        assert_eq!(route.next_index(2), 0);
    }

    #[test]
    fn upcoming_wraps_around_the_cycle() {
        let route = Route::from_json_str(CAMPUS).unwrap();
        assert_eq!(route.upcoming_after(0, 4), ["Gym", "Dorms", "Library"]);
        assert_eq!(route.upcoming_after(2, 2), ["Library", "Gym"]);
        let context = route.context_at(1, 4);
        assert_eq!(context.full_route.len(), 4);
        assert_eq!(context.upcoming_stops[0], "Dorms");
    }

    #[test]
    fn rejects_open_loop() {
        let raw = CAMPUS.replace("[1, 2, 3, 1]", "[1, 2, 3]");
        let err = Route::from_json_str(&raw).unwrap_err();
        assert!(matches!(err, ShuttleError::InvalidRoute(_)));
    }

    #[test]
    fn rejects_unknown_and_duplicate_ids() {
        let unknown = CAMPUS.replace("[1, 2, 3, 1]", "[1, 9, 1]");
        assert!(matches!(
            Route::from_json_str(&unknown),
            Err(ShuttleError::InvalidRoute(_))
        ));

        let duplicate = CAMPUS.replace("\"id\": 3", "\"id\": 2");
        assert!(matches!(
            Route::from_json_str(&duplicate),
            Err(ShuttleError::InvalidRoute(_))
        ));
    }

    #[test]
    fn rejects_short_loop_and_empty_stops() {
        let short = CAMPUS.replace("[1, 2, 3, 1]", "[1]");
        assert!(Route::from_json_str(&short).is_err());
        assert!(Route::new(Vec::new(), vec![1, 1]).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            Route::from_json_str("{ not json"),
            Err(ShuttleError::RouteParse(_))
        ));
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CAMPUS.as_bytes()).unwrap();
        let route = Route::load(file.path()).unwrap();
        assert_eq!(route.stop(2).map(|s| s.name.as_str()), Some("Gym"));

        let missing = Route::load("/definitely/not/here/route.json");
        assert!(matches!(missing, Err(ShuttleError::RouteIo { .. })));
    }
}
