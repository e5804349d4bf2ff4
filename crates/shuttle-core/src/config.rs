//! Shuttle configuration loaded from TOML and environment.
//!
//! Precedence: `SHUTTLE__*` environment variables > `SHUTTLE_CONFIG` file
//! (default `config/shuttle.toml`) > built-in defaults.

use crate::error::{ShuttleError, ShuttleResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/shuttle.toml";

pub const DEFAULT_ROUTE_PATH: &str = "config/route.json";
pub const DEFAULT_TICK_SECS: f64 = 1.0;
pub const DEFAULT_CRUISE_SPEED_MPS: f64 = 3.0;
pub const DEFAULT_DWELL_SECS: f64 = 15.0;
pub const DEFAULT_SNAP_THRESHOLD_M: f64 = 0.5;
pub const DEFAULT_UPCOMING_STOP_COUNT: usize = 4;
pub const DEFAULT_FALLBACK_REPLY: &str = "Sorry, something went wrong.";

fn default_explainer_mode() -> String {
    "ollama".to_string()
}

fn default_explainer_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_explainer_model() -> String {
    "gpt-oss:20b-cloud".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_sentences() -> usize {
    2
}

fn default_max_words() -> usize {
    40
}

fn default_capture_mode() -> String {
    "microphone".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_debounce_ms() -> u64 {
    250
}

/// Explanation generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// "ollama" (streaming HTTP) | "template" (offline, deterministic).
    #[serde(default = "default_explainer_mode")]
    pub mode: String,
    #[serde(default = "default_explainer_url")]
    pub url: String,
    #[serde(default = "default_explainer_model")]
    pub model: String,
    /// Overall call timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Stop reading the stream once this many sentences are complete.
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
    /// Stop reading the stream once the reply grows past this many words.
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            mode: default_explainer_mode(),
            url: default_explainer_url(),
            model: default_explainer_model(),
            timeout_secs: default_timeout_secs(),
            max_sentences: default_max_sentences(),
            max_words: default_max_words(),
        }
    }
}

/// Speech capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// "microphone" (cpal + STT) | "typed" (one stdin line per utterance).
    #[serde(default = "default_capture_mode")]
    pub mode: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Pause after each utterance before push-to-talk is armed again.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: default_capture_mode(),
            sample_rate: default_sample_rate(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Kiosk configuration.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | route_path | config/route.json | Route document (stops + loop). |
/// | tick_secs | 1.0 | Tick period; also the simulated dt per tick. |
/// | cruise_speed_mps | 3.0 | Cart speed while moving. |
/// | dwell_secs | 15.0 | Time spent at each stop. |
/// | snap_threshold_m | 0.5 | Remaining distance at which the cart snaps onto a stop. |
/// | approaching_threshold_m | 20.0 | Distance at which a moving cart counts as approaching. |
/// | upcoming_stop_count | 4 | Stops listed as "upcoming" in the route context. |
/// | fallback_reply | Sorry, something went wrong. | Spoken when generation fails. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuttleConfig {
    pub route_path: String,
    pub tick_secs: f64,
    pub cruise_speed_mps: f64,
    pub dwell_secs: f64,
    pub snap_threshold_m: f64,
    pub approaching_threshold_m: f64,
    pub upcoming_stop_count: usize,
    pub fallback_reply: String,
    /// Write logs here instead of stderr (the terminal is redrawn every tick).
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub explainer: ExplainerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            route_path: DEFAULT_ROUTE_PATH.to_string(),
            tick_secs: DEFAULT_TICK_SECS,
            cruise_speed_mps: DEFAULT_CRUISE_SPEED_MPS,
            dwell_secs: DEFAULT_DWELL_SECS,
            snap_threshold_m: DEFAULT_SNAP_THRESHOLD_M,
            approaching_threshold_m: crate::classifier::APPROACHING_THRESHOLD_M,
            upcoming_stop_count: DEFAULT_UPCOMING_STOP_COUNT,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            log_file: None,
            explainer: ExplainerConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl ShuttleConfig {
    /// Load from `SHUTTLE_CONFIG` (or `config/shuttle.toml`) plus `SHUTTLE__*` env overrides.
    pub fn load() -> ShuttleResult<Self> {
        let config_path =
            std::env::var("SHUTTLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path. A missing file falls back to defaults.
    pub fn load_from(path: &Path) -> ShuttleResult<Self> {
        let builder = config::Config::builder()
            .set_default("route_path", DEFAULT_ROUTE_PATH)?
            .set_default("tick_secs", DEFAULT_TICK_SECS)?
            .set_default("cruise_speed_mps", DEFAULT_CRUISE_SPEED_MPS)?
            .set_default("dwell_secs", DEFAULT_DWELL_SECS)?
            .set_default("snap_threshold_m", DEFAULT_SNAP_THRESHOLD_M)?
            .set_default(
                "approaching_threshold_m",
                crate::classifier::APPROACHING_THRESHOLD_M,
            )?
            .set_default("upcoming_stop_count", DEFAULT_UPCOMING_STOP_COUNT as i64)?
            .set_default("fallback_reply", DEFAULT_FALLBACK_REPLY)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("SHUTTLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulator or the generator cannot work with.
    pub fn validate(&self) -> ShuttleResult<()> {
        if !(self.tick_secs > 0.0) {
            return Err(ShuttleError::Config(format!(
                "tick_secs must be positive (got {})",
                self.tick_secs
            )));
        }
        if !(self.cruise_speed_mps > 0.0) {
            return Err(ShuttleError::Config(format!(
                "cruise_speed_mps must be positive (got {})",
                self.cruise_speed_mps
            )));
        }
        for (name, value) in [
            ("dwell_secs", self.dwell_secs),
            ("snap_threshold_m", self.snap_threshold_m),
            ("approaching_threshold_m", self.approaching_threshold_m),
        ] {
            if !(value >= 0.0) {
                return Err(ShuttleError::Config(format!(
                    "{} must not be negative (got {})",
                    name, value
                )));
            }
        }
        if !matches!(self.explainer.mode.trim(), "ollama" | "template") {
            return Err(ShuttleError::Config(format!(
                "explainer.mode must be \"ollama\" or \"template\" (got {:?})",
                self.explainer.mode
            )));
        }
        if self.explainer.max_sentences == 0 {
            return Err(ShuttleError::Config(
                "explainer.max_sentences must be at least 1".to_string(),
            ));
        }
        if !matches!(self.capture.mode.trim(), "microphone" | "typed") {
            return Err(ShuttleError::Config(format!(
                "capture.mode must be \"microphone\" or \"typed\" (got {:?})",
                self.capture.mode
            )));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Loading reads process-wide `SHUTTLE__*` variables; tests that load
    /// hold this lock so overrides never leak into each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets variables for the life of the guard.
    struct EnvVars(Vec<&'static str>);

    impl EnvVars {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for EnvVars {
        fn drop(&mut self) {
            for key in &self.0 {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = ShuttleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_secs, 1.0);
        assert_eq!(config.approaching_threshold_m, 20.0);
        assert_eq!(config.explainer.max_sentences, 2);
        assert_eq!(config.explainer.max_words, 40);
    }

    #[test]
    fn rejects_zero_speed() {
        let config = ShuttleConfig {
            cruise_speed_mps: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ShuttleError::Config(_))));
    }

    #[test]
    fn rejects_unknown_modes() {
        let mut config = ShuttleConfig::default();
        config.explainer.mode = "openai".to_string();
        assert!(config.validate().is_err());

        let mut config = ShuttleConfig::default();
        config.capture.mode = "telepathy".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file_over_defaults() {
        let _lock = env_lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "cruise_speed_mps = 5.0\ndwell_secs = 10.0\n\n[explainer]\nmode = \"template\"\n"
        )
        .unwrap();

        let config = ShuttleConfig::load_from(file.path()).unwrap();
        assert_eq!(config.cruise_speed_mps, 5.0);
        assert_eq!(config.dwell_secs, 10.0);
        assert_eq!(config.explainer.mode, "template");
        // untouched keys keep their defaults
        assert_eq!(config.snap_threshold_m, DEFAULT_SNAP_THRESHOLD_M);
        assert_eq!(config.explainer.max_words, 40);
        assert_eq!(config.capture.mode, "microphone");
    }

    #[test]
    fn invalid_file_values_are_fatal() {
        let _lock = env_lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "tick_secs = -1.0").unwrap();
        assert!(ShuttleConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn environment_overrides_file_and_nested_keys() {
        let _lock = env_lock();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "cruise_speed_mps = 5.0\ndwell_secs = 10.0\n\n[capture]\nmode = \"microphone\"\n"
        )
        .unwrap();

        let _vars = EnvVars::set(&[
            ("SHUTTLE__CRUISE_SPEED_MPS", "4.5"),
            ("SHUTTLE__CAPTURE__MODE", "typed"),
            ("SHUTTLE__EXPLAINER__MAX_WORDS", "25"),
        ]);

        let config = ShuttleConfig::load_from(file.path()).unwrap();
        assert_eq!(config.cruise_speed_mps, 4.5);
        assert_eq!(config.capture.mode, "typed");
        assert_eq!(config.explainer.max_words, 25);
        // file value without an override survives
        assert_eq!(config.dwell_secs, 10.0);
    }

    #[test]
    fn invalid_environment_values_are_fatal() {
        let _lock = env_lock();
        let _vars = EnvVars::set(&[("SHUTTLE__EXPLAINER__MODE", "telepathy")]);
        let missing = std::path::Path::new("does/not/exist/shuttle.toml");
        assert!(ShuttleConfig::load_from(missing).is_err());
    }
}
