//! Contracts for the external collaborators the bus calls into.
//!
//! The bus depends only on these narrow traits: a transaction manager
//! bracketing handler execution, a message transport with header-based
//! filtering, and a per-tenant schema migration tool. Implementations live
//! outside the core (the bus crate ships in-process reference
//! implementations).

use async_trait::async_trait;

use crate::context::TenantId;
use crate::envelope::{EventEnvelope, SelectorFilter};

/// Error handing an envelope to the transport.
///
/// A transport failure after a successful commit is a *secondary* fault: the
/// caller's state change stands, and the envelope is retried or logged for
/// manual replay. It must never trigger a compensating rollback.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport cannot currently accept messages.
    #[error("transport unavailable: {reason}")]
    Unavailable { reason: String },
    /// Broker- or implementation-specific failure.
    #[error("transport error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error from the transaction manager.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// A transaction could not be started.
    #[error("failed to begin transaction: {reason}")]
    Begin { reason: String },
    /// Commit failed; the handler's side effects were not applied.
    #[error("commit failed: {reason}")]
    Commit { reason: String },
    /// Rollback failed; the store may need operator attention.
    #[error("rollback failed: {reason}")]
    Rollback { reason: String },
}

/// One transaction, consumed by exactly one of `commit` or `rollback`.
#[async_trait]
pub trait Transaction: Send {
    /// Applies all side effects performed under this transaction.
    async fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    /// Discards all side effects. Rollback is total: no partial application.
    async fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Provides begin/commit/rollback semantics around a handler invocation.
///
/// Used as `Arc<dyn TransactionManager>`.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Starts a transaction for the current unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError>;
}

/// Receiving half of a subscription, yielding envelopes that passed the
/// subscription's filter.
#[async_trait]
pub trait EventStream: Send {
    /// Next matching envelope, or `None` once the transport shuts down.
    async fn recv(&mut self) -> Option<EventEnvelope>;
}

/// Message transport with destination + header-filtered subscribe semantics.
///
/// Any broker providing topic/queue destinations with header-based filtering
/// satisfies this contract; the bus never depends on a particular wire
/// format. Used as `Arc<dyn MessageTransport>`.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hands one envelope to the transport for delivery to all matching
    /// subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the envelope could not be accepted;
    /// the caller retries or records it for manual replay.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), TransportError>;

    /// Registers a subscriber on `destination`, filtered by `filter`.
    fn subscribe(&self, destination: &str, filter: SelectorFilter) -> Box<dyn EventStream>;
}

/// Schema version a tenant's data store is at after migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(pub u32);

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Per-tenant schema migration tool.
///
/// Implementations own the mapping from tenant to data-store connection.
/// `migrate` must be idempotent: re-running against an already-migrated
/// tenant is a no-op that reports the current version.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    /// Migrates the tenant's store to the latest schema, returning the
    /// version the store is now at.
    ///
    /// # Errors
    ///
    /// Any failure must leave the tenant's store exactly as it was; the
    /// migration controller reports the tenant as unprovisioned.
    async fn migrate(&self, tenant: &TenantId) -> anyhow::Result<SchemaVersion>;
}
