//! Ambient identity types carried with every unit of work.
//!
//! A unit of work executes on behalf of exactly one tenant (or none, for
//! system-initiated work) and optionally an authenticated caller. Both travel
//! beside the command as a [`ContextSnapshot`], never inside the command
//! payload itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque key identifying a logical tenant.
///
/// Absence of a tenant is an explicit state (`Option<TenantId>`), never an
/// empty-string default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant identifier from any string-like value.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(identifier: &str) -> Self {
        Self(identifier.to_string())
    }
}

/// Authenticated principal for the current unit of work.
///
/// Carries the subject identifier plus any token-derived attributes needed
/// downstream (e.g. signature claims an audit sink wants). Absent for
/// system-initiated commands such as tenant provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    /// Subject identifier of the authenticated principal.
    pub subject: String,
    /// Token-derived attributes, keyed by claim name.
    /// Uses `BTreeMap` for deterministic serialization order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl CallerIdentity {
    /// Creates an identity with no attributes.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a token-derived attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Immutable capture of the ambient identity state at submission time.
///
/// Created by the submitter of a unit of work, installed exactly once by the
/// context scope that runs the work, and discarded afterward. The snapshot a
/// handler observes is always the one captured at submission, never residue
/// from an unrelated task that previously used the same worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Tenant the work executes for, if any.
    pub tenant: Option<TenantId>,
    /// Authenticated caller, absent for system-initiated work.
    pub caller: Option<CallerIdentity>,
}

impl ContextSnapshot {
    /// An empty snapshot: no tenant, no caller (system-level work).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot scoped to a tenant with no caller.
    #[must_use]
    pub fn for_tenant(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            caller: None,
        }
    }

    /// Snapshot scoped to a tenant and an authenticated caller.
    #[must_use]
    pub fn for_caller(tenant: TenantId, caller: CallerIdentity) -> Self {
        Self {
            tenant: Some(tenant),
            caller: Some(caller),
        }
    }
}
