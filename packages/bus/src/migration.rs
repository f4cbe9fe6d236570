//! Tenant provisioning: idempotent, per-tenant schema migration driven
//! through the normal command path.
//!
//! `InitializeTenant` is a handler registered like any other; the tenant
//! comes from the ambient context installed by the gateway, never from the
//! command payload. A tenant's observable schema state is either
//! unprovisioned or ready-at-a-version; the transient migrating phase lives
//! inside the handler invocation and is intentionally unobservable. A failed
//! migration leaves the catalog untouched, so the tenant stays
//! unprovisioned.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use switchyard_core::{
    Command, EventDescriptor, SchemaMigrator, SchemaVersion, TenantId,
};

use crate::ambient;
use crate::dispatch::registry::{CommandLog, HandlerOptions, RegistryBuilder};

/// Selector key shared by every event this module emits.
pub const SELECTOR_NAME: &str = "action";
/// Selector value of the tenant-initialized event.
pub const INITIALIZE: &str = "initialize";

/// Command that provisions (or re-provisions) the calling tenant's schema.
///
/// Carries no payload: the tenant travels in the ambient context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeTenant;

impl Command for InitializeTenant {
    type Output = TenantInitialized;
}

/// Completion marker returned by the migration handler and published as the
/// initialize event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInitialized {
    /// Tenant whose schema is now ready.
    pub tenant: TenantId,
    /// Schema version the tenant's store is at.
    pub version: u32,
}

/// Observable schema state of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantSchemaState {
    /// No successful migration has completed for this tenant.
    Unprovisioned,
    /// The tenant's store is migrated to the given version.
    Ready(SchemaVersion),
}

/// One record per tenant: created on first successful initialize, version
/// advanced by later ones, never deleted through normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Version the tenant's store is at.
    pub version: SchemaVersion,
}

/// Per-tenant migration records. Safe for concurrent reads and writes.
#[derive(Default)]
pub struct TenantSchemaCatalog {
    records: DashMap<TenantId, MigrationRecord>,
}

impl TenantSchemaCatalog {
    /// Creates an empty catalog (every tenant unprovisioned).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observable state of `tenant`.
    #[must_use]
    pub fn state(&self, tenant: &TenantId) -> TenantSchemaState {
        self.records
            .get(tenant)
            .map_or(TenantSchemaState::Unprovisioned, |record| {
                TenantSchemaState::Ready(record.version)
            })
    }

    /// Number of provisioned tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no tenant has been provisioned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_ready(&self, tenant: TenantId, version: SchemaVersion) {
        self.records.insert(tenant, MigrationRecord { version });
    }
}

/// Aggregate owning the `InitializeTenant` command.
pub struct MigrationAggregate {
    migrator: Arc<dyn SchemaMigrator>,
    catalog: Arc<TenantSchemaCatalog>,
    locks: DashMap<TenantId, Arc<tokio::sync::Mutex<()>>>,
}

impl MigrationAggregate {
    /// Creates the aggregate over a migration tool and a shared catalog.
    #[must_use]
    pub fn new(migrator: Arc<dyn SchemaMigrator>, catalog: Arc<TenantSchemaCatalog>) -> Arc<Self> {
        Arc::new(Self {
            migrator,
            catalog,
            locks: DashMap::new(),
        })
    }

    /// Registers the `InitializeTenant` handler, emitting the initialize
    /// event on `destination`.
    #[must_use]
    pub fn register(
        self: &Arc<Self>,
        builder: RegistryBuilder,
        destination: impl Into<String>,
    ) -> RegistryBuilder {
        let aggregate = self.clone();
        builder.register::<InitializeTenant, _, _>(
            HandlerOptions::default()
                .log(CommandLog::Info, CommandLog::Info)
                .emits(EventDescriptor::new(destination, SELECTOR_NAME, INITIALIZE)),
            move |command| {
                let aggregate = aggregate.clone();
                async move { aggregate.initialize(command).await }
            },
        )
    }

    async fn initialize(&self, _command: InitializeTenant) -> anyhow::Result<TenantInitialized> {
        let tenant = ambient::current_tenant()
            .ok_or_else(|| anyhow::anyhow!("initialize requires a tenant context"))?;

        // Serialize concurrent initializes per tenant; the migrator itself
        // is idempotent, so the second caller converges on the same version.
        let lock = self
            .locks
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        tracing::debug!(tenant = tenant.as_str(), "starting schema migration");
        let version = self.migrator.migrate(&tenant).await?;
        self.catalog.record_ready(tenant.clone(), version);
        tracing::debug!(tenant = tenant.as_str(), %version, "schema migration finished");

        Ok(TenantInitialized {
            tenant,
            version: version.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
