/*!
 * Structured Tracing
 * Subscriber setup and run spans for the workload driver
 *
 * The shield's hot path never logs misuse; it only emits `trace!` events for
 * slow-path allocations. Everything else here serves the driver binary.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SHIELD_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("SHIELD_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Span covering one driver run, timing it on drop
pub struct RunSpan {
    span: tracing::Span,
    start: Instant,
    run_id: u64,
}

impl RunSpan {
    pub fn new(name: &str, threads: usize) -> Self {
        let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::INFO,
            "run",
            run_id = run_id,
            workload = name,
            threads = threads,
            operations = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        {
            let _entered = span.enter();
            debug!(workload = name, threads, "run started");
        }

        Self {
            span,
            start: Instant::now(),
            run_id,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn record_operations(&self, count: u64) {
        self.span.record("operations", count);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for RunSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_ms", duration.as_millis() as u64);

        if duration.as_secs() >= 60 {
            warn!(run_id = self.run_id, duration_ms = duration.as_millis() as u64, "slow run");
        } else {
            debug!(run_id = self.run_id, duration_us = duration.as_micros() as u64, "run completed");
        }
    }
}

/// Helper to open a run span
#[inline]
pub fn span_run(name: &str, threads: usize) -> RunSpan {
    RunSpan::new(name, threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_distinct() {
        let a = span_run("flat", 1);
        let b = span_run("flat", 1);
        assert_ne!(a.run_id(), b.run_id());
        a.record_operations(10);
    }
}
