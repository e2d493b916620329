//! `tracing` subscriber installation and span timing.

use crate::config::TracingConfig;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber for the crate's structured events.
///
/// `RUST_LOG` wins over [`TracingConfig::filter`] when set. Returns false if
/// a global subscriber was already installed, which is common in tests and
/// in applications that configure logging themselves.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        ::tracing::debug!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    installed
}

/// Wall-clock timer for a named span of work.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer, emits a `trace!` event for the span and returns the
    /// duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.elapsed_ms();
        ::tracing::trace!(span = %self.name, elapsed_ms, "Span finished");
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("drain");
        thread::sleep(Duration::from_millis(10));
        let midway = timer.elapsed_ms();
        assert!(midway >= 10.0);
        assert!(timer.finish() >= midway);
    }

    #[test]
    fn test_init_tracing_only_once() {
        let config = TracingConfig::default().with_filter("stagechain=debug");
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
