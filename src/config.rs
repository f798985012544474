use std::num::NonZeroUsize;
use std::str::FromStr;

use tracing::Level;

pub const WORKERS_VAR: &str = "HOSTFLOW_WORKERS";
pub const STATS_VAR: &str = "HOSTFLOW_STATS";
pub const LOG_VAR: &str = "HOSTFLOW_LOG";

/// Settings for the engine binary. Built from defaults, then the environment,
/// then command-line flags, each layer overriding the one before.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub worker_threads: usize,
    pub print_stats: bool,
    pub log_level: Level,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            print_stats: false,
            log_level: Level::WARN,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Apply whatever `lookup` finds. Values that don't parse are ignored
    /// with a warning.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(workers) = parse_var::<usize>(&lookup, WORKERS_VAR) {
            if workers > 0 {
                self.worker_threads = workers;
            }
        }
        if let Some(value) = lookup(STATS_VAR) {
            self.print_stats = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(level) = parse_var::<Level>(&lookup, LOG_VAR) {
            self.log_level = level;
        }
        self
    }

    /// Raise the log level by `verbosity` steps above the current one.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        const LEVELS: [Level; 5] = [
            Level::ERROR,
            Level::WARN,
            Level::INFO,
            Level::DEBUG,
            Level::TRACE,
        ];
        let current = LEVELS
            .iter()
            .position(|level| *level == self.log_level)
            .unwrap_or(1);
        self.log_level = LEVELS[(current + verbosity as usize).min(LEVELS.len() - 1)];
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let value = lookup(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(variable = name, value = %value, "ignoring unparsable setting");
            None
        }
    }
}
