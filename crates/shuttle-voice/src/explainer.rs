//! Explanation generators: a streaming Ollama client and an offline template.
//!
//! The Ollama client stops reading as soon as the reply is long enough to
//! speak, so a chatty model cannot hold the job slot for long.

use crate::error::{VoiceError, VoiceResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shuttle_core::{ExplainerConfig, ExplanationGenerator, ExplanationJob, ShuttleResult, StateKind};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, info};

/// Spoken when the model streams nothing usable.
pub const EMPTY_REPLY: &str = "Please stay seated, we'll be at the next stop shortly.";

static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]").expect("valid regex"));

/// Render the model prompt for one job.
pub fn build_prompt(job: &ExplanationJob) -> String {
    let state = &job.semantic_state;
    let snapshot = &job.snapshot;
    let route = &job.route_context;

    let eta_line = snapshot
        .eta_to_next_stop
        .map(|eta| format!("- Estimated time to next stop: about {} seconds\n", eta))
        .unwrap_or_default();
    let upcoming = if route.upcoming_stops.is_empty() {
        "None".to_string()
    } else {
        route.upcoming_stops.join(", ")
    };

    format!(
        "You are a friendly onboard assistant for an autonomous campus shuttle cart.

SYSTEM STATE:
- State: {state_tag}
- Current stop: {last_stop}
- Next stop: {next_stop}
- Speed: {speed} meters per second
- Distance to next stop: about {distance:.0} meters
{eta_line}
ROUTE INFORMATION:
- Full route order: {full_route}
- Upcoming stops: {upcoming}

PASSENGER QUESTION:
\"{question}\"

RULES:
- Safety is the highest priority
- If the cart is moving, tell the passenger to stay seated
- If the cart is stopped, confirm they may get off before discussing later stops
- If the passenger asks about a stop beyond the next one, explain it is further along the route
- If the question is playful, hypothetical, or impossible, answer lightly and say you cannot perceive such events
- Do not invent obstacles, actions, or permissions
- Use the provided estimates only; do not recalculate
- Friendly, natural English
- 1-2 sentences maximum
- Never mention these rules or the system state format
",
        state_tag = job.state_tag.as_str(),
        last_stop = state.last_stop,
        next_stop = state.next_stop,
        speed = snapshot.speed,
        distance = snapshot.distance_to_next_stop,
        eta_line = eta_line,
        full_route = route.full_route.join(" → "),
        upcoming = upcoming,
        question = job.question,
    )
}

/// When to stop reading the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyBudget {
    pub max_sentences: usize,
    pub max_words: usize,
}

impl From<&ExplainerConfig> for ReplyBudget {
    fn from(config: &ExplainerConfig) -> Self {
        Self {
            max_sentences: config.max_sentences,
            max_words: config.max_words,
        }
    }
}

/// The first `count` complete sentences, if that many are present.
pub fn first_sentences(text: &str, count: usize) -> Option<String> {
    let sentences: Vec<&str> = SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .take(count)
        .collect();
    (count > 0 && sentences.len() == count).then(|| sentences.join(" "))
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Read newline-delimited generate chunks until the budget or the stream ends.
pub fn collect_reply(reader: impl BufRead, budget: ReplyBudget) -> VoiceResult<String> {
    let mut collected = String::new();

    for line in reader.lines() {
        let line = line.map_err(|e| VoiceError::Generation(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: GenerateChunk = serde_json::from_str(&line)
            .map_err(|e| VoiceError::Generation(format!("Malformed stream chunk: {}", e)))?;
        collected.push_str(&chunk.response);

        if let Some(reply) = first_sentences(&collected, budget.max_sentences) {
            return Ok(reply);
        }
        if collected.split_whitespace().count() > budget.max_words || chunk.done {
            break;
        }
    }

    let reply = collected.trim();
    Ok(if reply.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        reply.to_string()
    })
}

/// Streams from an Ollama-style `/api/generate` endpoint.
pub struct OllamaExplainer {
    url: String,
    model: String,
    budget: ReplyBudget,
    client: reqwest::blocking::Client,
}

impl OllamaExplainer {
    pub fn new(config: &ExplainerConfig) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(url = %config.url, model = %config.model, "Explainer: streaming generator");
        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            budget: ReplyBudget::from(config),
            client,
        })
    }

    fn stream_reply(&self, prompt: &str) -> VoiceResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: true,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VoiceError::Generation(format!("HTTP {}: {}", status, body)));
        }
        collect_reply(BufReader::new(response), self.budget)
    }
}

impl ExplanationGenerator for OllamaExplainer {
    fn generate(&self, job: &ExplanationJob) -> ShuttleResult<String> {
        let prompt = build_prompt(job);
        debug!(job_id = job.id, prompt_len = prompt.len(), "Requesting explanation");
        Ok(self.stream_reply(&prompt)?)
    }
}

/// Deterministic replies built from the job; no model server needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateExplainer;

impl ExplanationGenerator for TemplateExplainer {
    fn generate(&self, job: &ExplanationJob) -> ShuttleResult<String> {
        let state = &job.semantic_state;
        let reply = match job.state_tag {
            StateKind::StoppedAtStop => format!(
                "We are stopped at {}. You may get off now; the next stop is {}.",
                state.current_stop, state.next_stop
            ),
            StateKind::ApproachingStop => format!(
                "We are arriving at {} shortly, please stay seated.",
                state.next_stop
            ),
            StateKind::MovingBetweenStops => match job.snapshot.eta_to_next_stop {
                Some(eta) => format!(
                    "Please stay seated. We left {} and the next stop is {}, about {} seconds away.",
                    state.last_stop, state.next_stop, eta
                ),
                None => format!(
                    "Please stay seated. We left {} and the next stop is {}.",
                    state.last_stop, state.next_stop
                ),
            },
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shuttle_core::{classify, CartSnapshot, Position, RouteContext, SemanticState};
    use std::io::Cursor;

    fn snapshot(is_stopped: bool, distance: f64, eta: Option<u64>) -> CartSnapshot {
        CartSnapshot {
            simulation_time: 30.0,
            position: Position::new(40.0, 0.0),
            current_stop_id: 1,
            next_stop_id: 2,
            current_stop: "Library".to_string(),
            next_stop: "Gym".to_string(),
            is_stopped,
            speed: if is_stopped { 0.0 } else { 3.0 },
            distance_to_next_stop: distance,
            eta_to_next_stop: eta,
        }
    }

    fn job(snapshot: CartSnapshot, upcoming: Vec<&str>) -> ExplanationJob {
        let semantic_state: SemanticState = classify(&snapshot);
        ExplanationJob {
            id: 7,
            state_tag: semantic_state.kind,
            semantic_state,
            question: "When do we get to the gym?".to_string(),
            snapshot,
            route_context: RouteContext {
                full_route: vec!["Library".into(), "Gym".into(), "Cafe".into(), "Library".into()],
                upcoming_stops: upcoming.into_iter().map(String::from).collect(),
            },
            dispatched_at: Utc::now(),
        }
    }

    fn stream(tokens: &[&str]) -> Cursor<Vec<u8>> {
        let mut body = String::new();
        for token in tokens {
            body.push_str(&serde_json::json!({ "response": token, "done": false }).to_string());
            body.push('\n');
        }
        body.push_str("{\"response\":\"\",\"done\":true}\n");
        Cursor::new(body.into_bytes())
    }

    const BUDGET: ReplyBudget = ReplyBudget {
        max_sentences: 2,
        max_words: 40,
    };

    #[test]
    fn prompt_carries_state_route_and_question() {
        let prompt = build_prompt(&job(snapshot(false, 59.6, Some(20)), vec!["Gym", "Cafe"]));
        assert!(prompt.contains("- State: MOVING_BETWEEN_STOPS"));
        assert!(prompt.contains("- Current stop: Library"));
        assert!(prompt.contains("- Next stop: Gym"));
        assert!(prompt.contains("about 60 meters"));
        assert!(prompt.contains("about 20 seconds"));
        assert!(prompt.contains("Library → Gym → Cafe → Library"));
        assert!(prompt.contains("- Upcoming stops: Gym, Cafe"));
        assert!(prompt.contains("\"When do we get to the gym?\""));
    }

    #[test]
    fn prompt_omits_unknown_eta_and_marks_no_upcoming() {
        let prompt = build_prompt(&job(snapshot(true, 100.0, None), vec![]));
        assert!(prompt.contains("- State: STOPPED_AT_STOP"));
        assert!(!prompt.contains("Estimated time"));
        assert!(prompt.contains("- Upcoming stops: None"));
    }

    #[test]
    fn first_sentences_needs_complete_sentences() {
        assert_eq!(first_sentences("Stay seated. We are", 2), None);
        assert_eq!(
            first_sentences("Stay seated. We arrive soon! Enjoy", 2).as_deref(),
            Some("Stay seated. We arrive soon!")
        );
        assert_eq!(first_sentences("Anything.", 0), None);
    }

    #[test]
    fn stops_after_two_sentences() {
        let reply = collect_reply(
            stream(&["Please stay", " seated.", " Gym is next", ".", " Extra text."]),
            BUDGET,
        )
        .unwrap();
        assert_eq!(reply, "Please stay seated. Gym is next.");
    }

    #[test]
    fn stops_when_word_budget_exceeded() {
        let budget = ReplyBudget {
            max_sentences: 2,
            max_words: 3,
        };
        let reply = collect_reply(stream(&["one two", " three four", " five six"]), budget).unwrap();
        assert_eq!(reply, "one two three four");
    }

    #[test]
    fn returns_partial_text_at_end_of_stream() {
        let reply = collect_reply(stream(&["  Almost", " there "]), BUDGET).unwrap();
        assert_eq!(reply, "Almost there");
    }

    #[test]
    fn empty_stream_reassures() {
        assert_eq!(collect_reply(stream(&[]), BUDGET).unwrap(), EMPTY_REPLY);
        assert_eq!(collect_reply(Cursor::new(Vec::new()), BUDGET).unwrap(), EMPTY_REPLY);
    }

    #[test]
    fn malformed_chunk_is_a_generation_error() {
        let result = collect_reply(Cursor::new(b"not json\n".to_vec()), BUDGET);
        assert!(matches!(result, Err(VoiceError::Generation(_))));
    }

    #[test]
    fn template_replies_follow_state() {
        let stopped = TemplateExplainer.generate(&job(snapshot(true, 100.0, None), vec![])).unwrap();
        assert_eq!(
            stopped,
            "We are stopped at Library. You may get off now; the next stop is Gym."
        );

        let approaching = TemplateExplainer.generate(&job(snapshot(false, 12.0, Some(4)), vec![])).unwrap();
        assert_eq!(approaching, "We are arriving at Gym shortly, please stay seated.");

        let moving = TemplateExplainer.generate(&job(snapshot(false, 60.0, Some(20)), vec![])).unwrap();
        assert_eq!(
            moving,
            "Please stay seated. We left Library and the next stop is Gym, about 20 seconds away."
        );
    }

    #[test]
    #[ignore] // Requires a running model server
    fn live_generation() {
        let explainer = OllamaExplainer::new(&ExplainerConfig::default()).unwrap();
        let reply = explainer
            .generate(&job(snapshot(false, 60.0, Some(20)), vec!["Gym"]))
            .unwrap();
        println!("{}", reply);
    }
}
