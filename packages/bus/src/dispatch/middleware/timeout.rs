//! Caller-wait timeout middleware.
//!
//! Bounds how long a caller waits for a command with
//! `CommandError::Timeout`. This does not cancel the handler: the executor
//! runs it to completion on a detached task, so the transaction still
//! resolves and committed work still emits its event. The timeout is read
//! from each call's `timeout_ms` (registration override or bus default).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::dispatch::call::{CommandCall, CommandError, CommandOutcome};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-command wait deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces per-command wait deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<CommandCall> for TimeoutService<S>
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
        let timeout_ms = call.timeout_ms();
        let command_name = call.command_name();
        let fut = self.inner.call(call);
        Box::pin(async move {
            let duration = Duration::from_millis(timeout_ms);
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(CommandError::Timeout {
                    command_name,
                    timeout_ms,
                }),
            }
        })
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

    fn make_call(timeout_ms: u64) -> CommandCall {
        CommandCall::new(
            Box::new(()),
            make_registration(),
            ContextSnapshot::empty(),
            timeout_ms,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn completes_within_deadline() {
        let layer = TimeoutLayer;
        let svc = layer.layer(SlowService { delay_ms: 10 });
        let outcome = svc.oneshot(make_call(1_000)).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn exceeding_the_deadline_returns_timeout() {
        let layer = TimeoutLayer;
        let svc = layer.layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(make_call(50)).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Timeout { timeout_ms: 50, .. }
        ));
    }
}
