//! The erased unit of dispatch and the command error taxonomy.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use switchyard_core::{ContextSnapshot, TenantId, TransactionError};
use uuid::Uuid;

use super::registry::HandlerRegistration;

/// One command travelling through the dispatch pipeline: the erased command
/// value, its resolved registration, and the context snapshot captured at
/// the submission point.
pub struct CommandCall {
    pub(crate) command: Box<dyn Any + Send>,
    pub(crate) registration: Arc<HandlerRegistration>,
    pub(crate) snapshot: ContextSnapshot,
    pub(crate) command_id: Uuid,
    pub(crate) timeout_ms: u64,
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl CommandCall {
    pub(crate) fn new(
        command: Box<dyn Any + Send>,
        registration: Arc<HandlerRegistration>,
        snapshot: ContextSnapshot,
        timeout_ms: u64,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            command,
            registration,
            snapshot,
            command_id: Uuid::new_v4(),
            timeout_ms,
            cancelled,
        }
    }

    /// Short command type name, for logs and errors.
    #[must_use]
    pub fn command_name(&self) -> &'static str {
        self.registration.command_name()
    }

    /// Unique id assigned to this dispatch.
    #[must_use]
    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// Tenant from the submission-time snapshot, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&TenantId> {
        self.snapshot.tenant.as_ref()
    }

    /// How long the caller waits before `CommandError::Timeout`.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Registration resolved for this command's type.
    #[must_use]
    pub fn registration(&self) -> &Arc<HandlerRegistration> {
        &self.registration
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CommandCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCall")
            .field("command_name", &self.command_name())
            .field("command_id", &self.command_id)
            .field("tenant", &self.snapshot.tenant)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Successful pipeline response: the handler's typed output, still erased.
pub struct CommandOutcome {
    pub(crate) output: Box<dyn Any + Send>,
}

impl std::fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandOutcome").finish_non_exhaustive()
    }
}

/// Errors surfaced to a command's caller.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No handler matches the command's type. Surfaced immediately, never
    /// retried automatically.
    #[error("no handler registered for command type: {command_name}")]
    Unregistered { command_name: &'static str },

    /// The caller stopped waiting. Execution is *not* cancelled: the
    /// transaction still commits or rolls back on its own, and a committed
    /// result still emits its event.
    #[error("command {command_name} still running after {timeout_ms}ms; outcome unknown")]
    Timeout {
        command_name: &'static str,
        timeout_ms: u64,
    },

    /// Too many commands in flight; try again later.
    #[error("bus overloaded, try again later")]
    Overloaded,

    /// The dispatch was cancelled before the handler started. No transaction
    /// was begun and no event will be emitted.
    #[error("command cancelled before execution")]
    Cancelled,

    /// The handler raised a domain error. The transaction rolled back and no
    /// event was emitted.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// The transaction manager failed to begin or commit.
    #[error("transaction failed: {0}")]
    Transaction(#[from] TransactionError),

    /// Dispatch-internal fault (type mismatch, executor task failure).
    #[error("internal dispatch error: {0}")]
    Internal(anyhow::Error),
}
