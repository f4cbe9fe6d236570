//! Innermost dispatch service: runs the handler under the captured context
//! and the transaction bracket, then publishes the declared event.
//!
//! Execution happens on a detached task that always runs to completion.
//! A caller that stops waiting (timeout layer, dropped handle) does not
//! cancel the handler mid-flight: the transaction still commits or rolls
//! back on its own, and committed work still emits its event. There is no
//! cooperative mid-handler cancellation point by design; cancellation is
//! honored only before the handler starts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;

use switchyard_core::{EventEnvelope, TransactionManager};

use super::call::{CommandCall, CommandError, CommandOutcome};
use crate::ambient;
use crate::emitter::EventEmitter;

/// Executes [`CommandCall`]s against the transaction manager and emitter.
#[derive(Clone)]
pub struct CommandExecutor {
    transactions: Arc<dyn TransactionManager>,
    emitter: Arc<EventEmitter>,
}

impl CommandExecutor {
    /// Creates an executor over the given collaborators.
    #[must_use]
    pub fn new(transactions: Arc<dyn TransactionManager>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            transactions,
            emitter,
        }
    }
}

impl Service<CommandCall> for CommandExecutor {
    type Response = CommandOutcome;
    type Error = CommandError;
    type Future = Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: CommandCall) -> Self::Future {
        let transactions = self.transactions.clone();
        let emitter = self.emitter.clone();
        Box::pin(async move {
            let handle = tokio::spawn(execute(call, transactions, emitter));
            handle.await.map_err(|join_error| {
                CommandError::Internal(anyhow::anyhow!("execution task failed: {join_error}"))
            })?
        })
    }
}

async fn execute(
    call: CommandCall,
    transactions: Arc<dyn TransactionManager>,
    emitter: Arc<EventEmitter>,
) -> Result<CommandOutcome, CommandError> {
    if call.is_cancelled() {
        return Err(CommandError::Cancelled);
    }

    let CommandCall {
        command,
        registration,
        snapshot,
        ..
    } = call;
    let tenant = snapshot.tenant.clone();

    // The snapshot captured at submission is the only context the handler
    // ever sees; the scope tears it down on every exit path.
    ambient::scope(snapshot, async move {
        let tx = if registration.options().transactional {
            Some(transactions.begin().await?)
        } else {
            None
        };

        match registration.invoke(command).await {
            Ok(handler_output) => {
                if let Some(tx) = tx {
                    tx.commit().await?;
                }
                // Commit-then-publish: the event describes state that is
                // already durable.
                if let (Some(descriptor), Some(payload)) =
                    (registration.options().emits.as_ref(), handler_output.payload)
                {
                    emitter
                        .publish(EventEnvelope::new(descriptor, tenant, payload))
                        .await;
                }
                Ok(CommandOutcome {
                    output: handler_output.output,
                })
            }
            Err(error) => {
                if let Some(tx) = tx {
                    if let Err(rollback_error) = tx.rollback().await {
                        tracing::error!(%rollback_error, "rollback failed after handler error");
                    }
                }
                Err(CommandError::Handler(error))
            }
        }
    })
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
