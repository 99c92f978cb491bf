//! Log output for the `shipit` binary.
//!
//! Logs always go to stderr; stdout carries the release summary and the
//! `plan` / `intent` / `catalog` output that scripts parse.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Crates whose events follow `--verbose`; everything else stays at `warn`.
const SHIPIT_TARGETS: [&str; 3] = ["shipit", "shipit_core", "shipit_exec"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for an operator terminal.
    Text,

    /// Newline-delimited JSON for CI agents that ship logs.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(SHIPIT_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber. Returns `false` when one is already set.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => output.boxed(),
        LogFormat::Json => output.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .is_ok()
}
