//! Logging setup pinned to the standard error stream.
//!
//! Stdout belongs to the JSON-RPC channel, so the subscriber's writer is
//! stderr and nothing else — the stream-separation contract is enforced
//! where the subscriber is built, not by caller discipline. Initialization
//! must happen before any component emits a message.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Maps a controller-supplied level name onto a tracing level.
///
/// Accepts the conventional host names (`WARNING`, `CRITICAL`) alongside
/// the native ones; unknown names fall back to `INFO`.
pub fn parse_level(name: &str) -> Level {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Builder for the host's logging configuration.
///
/// ```rust,ignore
/// LoggingBuilder::new()
///     .with_level(Level::DEBUG)
///     .directive("crucible_framework=trace")
///     .init();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    level: Option<Level>,
    directives: Vec<String>,
    with_target: bool,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a filter directive, e.g. `"crucible_rpc=debug"`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Include the emitting module path in each line.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self
            .level
            .map(|level| level.to_string().to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        // RUST_LOG wins over the configured level when set.
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));
        for directive in &self.directives {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
        filter
    }

    /// Installs the subscriber. Panics if one is already set.
    pub fn init(self) {
        let filter = self.build_filter();
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(self.with_target),
            )
            .with(filter)
            .init();
    }

    /// Installs the subscriber, returning an error instead of panicking
    /// when one is already set.
    pub fn try_init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.build_filter();
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(self.with_target),
            )
            .with(filter)
            .try_init()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_level_names_map_to_tracing_levels() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("INFO"), Level::INFO);
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level("ERROR"), Level::ERROR);
        assert_eq!(parse_level("CRITICAL"), Level::ERROR);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
