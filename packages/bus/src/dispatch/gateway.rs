//! Command gateway: the sole entry point services use to effect state
//! changes.
//!
//! `process` resolves the command's registration, captures the ambient
//! context at the invocation point, and runs the handler through the
//! dispatch pipeline (load shed -> timeout -> logging -> executor), blocking
//! the caller until completion. `process_detached` submits the same dispatch
//! on a background task for callers that do not need the result
//! synchronously; both modes capture context at submission, never lazily
//! inside the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tower::ServiceExt;
use uuid::Uuid;

use switchyard_core::{Command, MessageTransport, TransactionManager};

use super::call::{CommandCall, CommandError, CommandOutcome};
use super::executor::CommandExecutor;
use super::middleware::pipeline::{build_dispatch_pipeline, DispatchPipeline};
use super::registry::AggregateRegistry;
use crate::ambient;
use crate::config::BusConfig;
use crate::emitter::EventEmitter;

/// Routes commands to their registered handlers and publishes the declared
/// events after commit.
///
/// No completion ordering is guaranteed between commands, even from one
/// caller — a caller that needs sequencing waits for each dispatch before
/// submitting the next.
pub struct CommandGateway {
    registry: Arc<AggregateRegistry>,
    pipeline: DispatchPipeline,
    emitter: Arc<EventEmitter>,
    default_timeout_ms: u64,
}

impl CommandGateway {
    /// Assembles a gateway from a frozen registry and the external
    /// collaborators.
    #[must_use]
    pub fn new(
        registry: AggregateRegistry,
        transactions: Arc<dyn TransactionManager>,
        transport: Arc<dyn MessageTransport>,
        config: BusConfig,
    ) -> Self {
        let emitter = Arc::new(EventEmitter::new(transport, &config));
        let executor = CommandExecutor::new(transactions, emitter.clone());
        let pipeline = build_dispatch_pipeline(executor, &config);
        Self {
            registry: Arc::new(registry),
            pipeline,
            emitter,
            default_timeout_ms: config.default_command_timeout_ms,
        }
    }

    /// The frozen registry this gateway routes against.
    #[must_use]
    pub fn registry(&self) -> &Arc<AggregateRegistry> {
        &self.registry
    }

    /// The emitter, exposing the dead-letter buffer for operational replay.
    #[must_use]
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// Dispatches `command` and waits for its result.
    ///
    /// The ambient context is captured here, at the caller's execution
    /// point, and travels with the dispatch; the handler never reads
    /// whatever context the worker happens to hold.
    ///
    /// # Errors
    ///
    /// See [`CommandError`] for the full taxonomy. `Timeout` means the
    /// caller stopped waiting, not that execution was cancelled.
    pub async fn process<C: Command>(&self, command: C) -> Result<C::Output, CommandError> {
        let call = self.prepare(command, Arc::new(AtomicBool::new(false)))?;
        let outcome = self.pipeline.clone().oneshot(call).await?;
        downcast_output::<C::Output>(outcome)
    }

    /// Dispatches `command` without waiting: the returned handle can be
    /// joined for the result, cancelled (before execution starts), or
    /// dropped outright — execution proceeds either way.
    ///
    /// # Errors
    ///
    /// Fails fast with [`CommandError::Unregistered`] when no handler
    /// matches; all later failures surface through
    /// [`CommandHandle::join`].
    pub fn process_detached<C: Command>(
        &self,
        command: C,
    ) -> Result<CommandHandle<C::Output>, CommandError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let call = self.prepare(command, cancelled.clone())?;
        let command_id = call.command_id();
        let pipeline = self.pipeline.clone();
        let join = tokio::spawn(async move {
            let outcome = pipeline.oneshot(call).await?;
            downcast_output::<C::Output>(outcome)
        });
        Ok(CommandHandle {
            command_id,
            cancelled,
            join,
        })
    }

    fn prepare<C: Command>(
        &self,
        command: C,
        cancelled: Arc<AtomicBool>,
    ) -> Result<CommandCall, CommandError> {
        // Capture before any suspension point: the snapshot must reflect the
        // submitter, not the worker the handler later lands on.
        let snapshot = ambient::capture();
        let registration =
            self.registry
                .resolve::<C>()
                .ok_or(CommandError::Unregistered {
                    command_name: C::name(),
                })?;
        let timeout_ms = registration
            .options()
            .timeout_ms
            .unwrap_or(self.default_timeout_ms);
        Ok(CommandCall::new(
            Box::new(command),
            registration,
            snapshot,
            timeout_ms,
            cancelled,
        ))
    }
}

fn downcast_output<T: 'static>(outcome: CommandOutcome) -> Result<T, CommandError> {
    outcome
        .output
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| CommandError::Internal(anyhow::anyhow!("handler output type mismatch")))
}

/// Handle on a detached dispatch.
pub struct CommandHandle<T> {
    command_id: Uuid,
    cancelled: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<Result<T, CommandError>>,
}

impl<T> CommandHandle<T> {
    /// Unique id assigned to the dispatch.
    #[must_use]
    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// Requests cancellation. Takes effect only if the handler has not
    /// started: the dispatch then resolves to `CommandError::Cancelled`,
    /// no transaction is begun, and no event is emitted. Once execution has
    /// begun this is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Waits for the dispatch to finish and returns its result.
    ///
    /// # Errors
    ///
    /// Propagates the dispatch's [`CommandError`].
    pub async fn join(self) -> Result<T, CommandError> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => Err(CommandError::Internal(anyhow::anyhow!(
                "detached command task failed: {join_error}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
