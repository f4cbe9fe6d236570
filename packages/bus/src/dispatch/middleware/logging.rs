//! Command logging middleware.
//!
//! Opens a `tracing` span per dispatched command and emits start/finish
//! lines at the levels declared on the handler registration, recording
//! duration and outcome. This is the bus's observability surface; there is
//! no separate metrics pipeline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::call::{CommandCall, CommandError, CommandOutcome};
use crate::dispatch::registry::CommandLog;

/// Emits one log line at the registration-declared level.
fn log_at(level: CommandLog, command_name: &str, message: &str) {
    match level {
        CommandLog::Off => {}
        CommandLog::Trace => tracing::trace!(command = command_name, "{message}"),
        CommandLog::Debug => tracing::debug!(command = command_name, "{message}"),
        CommandLog::Info => tracing::info!(command = command_name, "{message}"),
    }
}

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments commands with spans and start/finish lines.
#[derive(Debug, Clone)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService { inner }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

/// Service wrapper that records command duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
}

impl<S> Service<CommandCall> for LoggingService<S>
where
    S: Service<CommandCall, Response = CommandOutcome, Error = CommandError> + Send,
    S::Future: Send + 'static,
{
    type Response = CommandOutcome;
    type Error = CommandError;
    type Future = Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: CommandCall) -> Self::Future {
        let command_name = call.command_name();
        let command_id = call.command_id();
        let tenant = call
            .tenant()
            .map(|tenant| tenant.as_str().to_string())
            .unwrap_or_default();
        let options = call.registration().options().clone();

        let span = info_span!(
            "command",
            command = command_name,
            command_id = %command_id,
            tenant = %tenant,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                log_at(options.log_start, command_name, "command started");
                let start = Instant::now();
                let result = fut.await;
                let duration_ms = start.elapsed().as_millis();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_u64 = duration_ms as u64;
                tracing::Span::current().record("duration_ms", duration_u64);
                tracing::Span::current().record("outcome", outcome);

                log_at(options.log_finish, command_name, "command finished");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use switchyard_core::ContextSnapshot;
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::middleware::tests::{make_registration, SlowService};

    #[tokio::test]
    async fn logging_layer_passes_through_response() {
        let layer = LoggingLayer;
        let svc = layer.layer(SlowService { delay_ms: 1 });

        let call = CommandCall::new(
            Box::new(()),
            make_registration(),
            ContextSnapshot::for_tenant(switchyard_core::TenantId::new("alpha")),
            5_000,
            Arc::new(AtomicBool::new(false)),
        );
        let outcome = svc.oneshot(call).await;
        assert!(outcome.is_ok());
    }
}
