//! Logging utilities for the Trellis framework.
//!
//! A thin setup layer over `tracing` and `tracing-subscriber`: environment
//! filtering via `RUST_LOG`, an optional explicit directive, and compact
//! formatting suited to server logs.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    directive: Option<String>,
    with_target: bool,
}

impl LoggingBuilder {
    /// Starts a builder with default settings.
    pub fn new() -> Self {
        Self {
            directive: None,
            with_target: true,
        }
    }

    /// Sets the default filter directive, e.g. `"trellis=debug"`. `RUST_LOG`
    /// still overrides it.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Whether log lines carry the emitting module target.
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Installs the global subscriber. Returns `false` when a subscriber was
    /// already set (tests set their own).
    pub fn init(self) -> bool {
        let directive = self.directive.unwrap_or_else(|| "info".to_string());
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(self.with_target))
            .try_init()
            .is_ok()
    }
}

/// Initializes logging with the default `info` filter.
pub fn init() {
    LoggingBuilder::new().init();
}

/// Initializes logging with an explicit filter directive.
pub fn init_with_filter(directive: &str) {
    LoggingBuilder::new().directive(directive).init();
}
