//! Tracing subscriber setup for the CLI binary.
//!
//! Library modules only emit `tracing` and `log` events; installing a
//! subscriber is the binary's job so embedders keep control of their own
//! logging pipeline.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output style for console traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored output for interactive terminals
    #[default]
    Pretty,
    /// Color-free output for CI logs and piped invocations
    Plain,
}

/// Subscriber configuration assembled before any processing starts
#[derive(Debug, Default)]
pub struct TracingConfig {
    verbosity: u8,
    format: TracingFormat,
    filter_override: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `-v` flags passed on the command line
    #[must_use]
    pub fn verbosity(mut self, count: u8) -> Self {
        self.verbosity = count;
        self
    }

    #[must_use]
    pub fn format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Explicit filter directives, taking precedence over both the
    /// verbosity mapping and `RUST_LOG`
    #[must_use]
    pub fn filter<S: Into<String>>(mut self, directives: S) -> Self {
        self.filter_override = Some(directives.into());
        self
    }

    /// Level directive implied by the `-v` count
    #[must_use]
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn effective_filter(&self) -> anyhow::Result<EnvFilter> {
        let filter = match &self.filter_override {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.default_directive()))?,
        };
        Ok(filter)
    }

    /// Install the global subscriber.
    ///
    /// When no explicit filter is configured, `RUST_LOG` wins over the
    /// verbosity mapping so users can scope directives per module without
    /// extra flags.
    ///
    /// # Errors
    /// - Malformed filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(self.format == TracingFormat::Pretty)
            .with_target(false)
            .compact();

        Registry::default()
            .with(self.effective_filter()?)
            .with(fmt_layer)
            .try_init()?;
        Ok(())
    }
}

/// Install the subscriber the `nobg` binary uses.
///
/// # Errors
/// - A global subscriber is already installed
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::new().verbosity(verbosity).init()
}
