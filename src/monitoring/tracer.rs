/*!
 * Tracing Setup
 * Structured logging for the lock and scheduler subsystems
 *
 * Library code only emits `tracing` events; installing a subscriber is up
 * to the embedder (or tests) through [`init_tracing`].
 */

use std::time::Instant;
use tracing::{debug, info, span, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - GPU_SYNC_TRACE_JSON: Enable JSON output (default: false)
///
/// Calling it again, or after another subscriber was installed, is a no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("GPU_SYNC_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "structured tracing initialized");
    }
}

/// Timed span around a runtime-level operation
///
/// Records `duration_us` when dropped.
pub struct OperationSpan {
    span: Span,
    start: Instant,
}

impl OperationSpan {
    pub fn new(operation: &'static str) -> Self {
        let span = span!(
            Level::DEBUG,
            "operation",
            operation,
            duration_us = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let micros = self.start.elapsed().as_micros() as u64;
        self.span.record("duration_us", micros);
        let _entered = self.span.enter();
        debug!(duration_us = micros, "operation finished");
    }
}

pub fn span_operation(operation: &'static str) -> OperationSpan {
    OperationSpan::new(operation)
}
