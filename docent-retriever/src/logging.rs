//! Tracing subscriber setup for the `docent` binary.
//!
//! Logs go to stderr so that `--json` output on stdout stays parseable.
//! `RUST_LOG`, when set, replaces the configured filter entirely.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Noisy dependencies are held back unless overridden.
pub const DEFAULT_DIRECTIVES: &str = "ort=warn,pdf_extract=error,lopdf=error,hyper=warn,reqwest=warn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level: trace, debug, info, warn or error
    pub level: String,
    /// Extra comma-separated `target=level` directives
    pub directives: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: DEFAULT_DIRECTIVES.to_string(),
        }
    }
}

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl LoggingConfig {
    /// Base level raised by `verbosity` steps (`-v`, `-vv`).
    pub fn effective_level(&self, verbosity: u8) -> &'static str {
        let base = LEVELS
            .iter()
            .position(|level| level.eq_ignore_ascii_case(self.level.trim()))
            .unwrap_or(2);
        let raised = (base + verbosity as usize).min(LEVELS.len() - 1);
        LEVELS[raised]
    }

    /// Filter string handed to [`EnvFilter`].
    pub fn filter_directives(&self, verbosity: u8) -> String {
        let level = self.effective_level(verbosity);
        let extra = self.directives.trim().trim_matches(',');
        if extra.is_empty() {
            level.to_string()
        } else {
            format!("{level},{extra}")
        }
    }
}

/// Install the global subscriber. Does nothing if one is already installed.
pub fn init(config: &LoggingConfig, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(config.filter_directives(verbosity))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
