//! The command contract: typed, immutable instructions to change state.
//!
//! Commands carry no ambient context themselves; tenant and caller travel
//! beside the command as a
//! [`ContextSnapshot`](crate::context::ContextSnapshot) captured at
//! submission time.

use serde::Serialize;

/// A typed, immutable value object describing an intended state change.
///
/// Implementors are plain data (`CreateLedger { name }`, `InitializeTenant`);
/// the authoritative logic lives in the handler registered for the type.
/// Exactly one handler may be registered per command type.
pub trait Command: Send + 'static {
    /// Value produced by a successful handler invocation.
    ///
    /// Returned to the caller, and — when the registration declares an event
    /// descriptor — serialized as the payload of the emitted domain event.
    type Output: Serialize + Send + 'static;

    /// Short name used in logs and spans. Defaults to the unqualified type
    /// name.
    #[must_use]
    fn name() -> &'static str {
        short_type_name::<Self>()
    }
}

/// Strips the module path from a type name: `a::b::CreateLedger` -> `CreateLedger`.
///
/// Generic parameters are truncated naively, which is good enough for log
/// output.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
