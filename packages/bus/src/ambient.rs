//! Ambient context carrier and the context-propagating scope.
//!
//! Tenant and caller identity for the current logical unit of work live in a
//! per-task cell (`tokio::task_local!`), never in process-global state. The
//! cell is installed by [`scope`] and exists only for the duration of that
//! scope:
//!
//! 1. Entering a scope installs a *fresh* cell seeded from the snapshot, so a
//!    reused worker can never hand residue from an unrelated prior task to
//!    the wrapped work.
//! 2. The cell is dropped when the scope exits — on normal return, on error,
//!    and on cancellation alike — so nothing leaks forward into the next
//!    unit of work, or backward into whatever scheduled this one.
//!
//! [`scope`] is the only place ambient state is mutated outside of the
//! original capture. Handlers read it with [`current_tenant`] /
//! [`current_caller`]; the request boundary installs it before the gateway
//! is ever called.

use std::cell::RefCell;
use std::future::Future;

use switchyard_core::{CallerIdentity, ContextSnapshot, TenantId};

tokio::task_local! {
    static ACTIVE: RefCell<ContextSnapshot>;
}

/// Runs `work` with `snapshot` installed as the ambient context.
///
/// The snapshot is consumed exactly once: it seeds a fresh per-task cell
/// that lives for the duration of `work` and is torn down on every exit
/// path. Nesting is allowed; an inner scope shadows the outer one and the
/// outer state is untouched when the inner scope ends.
pub async fn scope<F: Future>(snapshot: ContextSnapshot, work: F) -> F::Output {
    ACTIVE.scope(RefCell::new(snapshot), work).await
}

/// Captures the ambient context at the caller's execution point.
///
/// Returns an empty snapshot outside of any scope (system-level work).
#[must_use]
pub fn capture() -> ContextSnapshot {
    ACTIVE
        .try_with(|cell| cell.borrow().clone())
        .unwrap_or_default()
}

/// Tenant of the currently executing unit of work, if any.
#[must_use]
pub fn current_tenant() -> Option<TenantId> {
    ACTIVE
        .try_with(|cell| cell.borrow().tenant.clone())
        .ok()
        .flatten()
}

/// Caller identity of the currently executing unit of work, if any.
#[must_use]
pub fn current_caller() -> Option<CallerIdentity> {
    ACTIVE
        .try_with(|cell| cell.borrow().caller.clone())
        .ok()
        .flatten()
}

/// Sets the tenant for the remainder of the current scope.
///
/// Outside an installed scope this is a no-op: ambient state exists only
/// within [`scope`].
pub fn set_tenant(tenant: TenantId) {
    let _ = ACTIVE.try_with(|cell| cell.borrow_mut().tenant = Some(tenant));
}

/// Clears the tenant for the remainder of the current scope.
pub fn clear_tenant() {
    let _ = ACTIVE.try_with(|cell| cell.borrow_mut().tenant = None);
}

/// Sets the caller identity for the remainder of the current scope.
///
/// Outside an installed scope this is a no-op.
pub fn set_caller(caller: CallerIdentity) {
    let _ = ACTIVE.try_with(|cell| cell.borrow_mut().caller = Some(caller));
}

/// Clears the caller identity for the remainder of the current scope.
pub fn clear_caller() {
    let _ = ACTIVE.try_with(|cell| cell.borrow_mut().caller = None);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
