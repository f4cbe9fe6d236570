//! No-op transaction manager.
//!
//! Reference implementation of the
//! [`TransactionManager`](switchyard_core::TransactionManager) contract for
//! deployments whose handlers manage their own atomicity (and for tests
//! asserting the gateway's bracketing discipline). Counters expose how many
//! transactions were begun, committed, and rolled back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use switchyard_core::{Transaction, TransactionError, TransactionManager};

#[derive(Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

/// Transaction manager whose transactions do nothing but count.
#[derive(Default)]
pub struct NoopTransactionManager {
    counters: Arc<Counters>,
}

impl NoopTransactionManager {
    /// Creates a manager with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transactions begun so far.
    #[must_use]
    pub fn begun(&self) -> u64 {
        self.counters.begun.load(Ordering::SeqCst)
    }

    /// Transactions committed so far.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.counters.committed.load(Ordering::SeqCst)
    }

    /// Transactions rolled back so far.
    #[must_use]
    pub fn rolled_back(&self) -> u64 {
        self.counters.rolled_back.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionManager for NoopTransactionManager {
    async fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NoopTransaction {
            counters: self.counters.clone(),
        }))
    }
}

struct NoopTransaction {
    counters: Arc<Counters>,
}

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
