//! Domain event envelope and selector model.
//!
//! An event is addressed by a *destination* (named channel) plus a *selector*
//! (key/value tag), with the tenant identifier attached as a header. Listeners
//! filter on destination, selector, and tenant without deserializing payloads
//! they don't care about. Payloads are `MsgPack` via `rmp-serde`
//! (`to_vec_named`), so listeners in other processes can decode by field name.
//!
//! Every envelope carries a unique `event_id`. Delivery is at-least-once;
//! deduplication is a listener responsibility, keyed on that identifier.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::TenantId;

/// Where and how a command's result is published, declared at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    /// Named channel the event is published to (e.g. `"accounting-v1"`).
    pub destination: String,
    /// Selector key listeners filter on (e.g. `"action"`).
    pub selector_key: String,
    /// Selector value for this command family (e.g. `"post-ledger"`).
    pub selector_value: String,
}

impl EventDescriptor {
    /// Creates a descriptor from destination and selector key/value.
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        selector_key: impl Into<String>,
        selector_value: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            selector_key: selector_key.into(),
            selector_value: selector_value.into(),
        }
    }
}

/// A published domain event: addressing headers plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique identifier for listener-side deduplication.
    pub event_id: Uuid,
    /// Named channel this event was published to.
    pub destination: String,
    /// Selector key (header), matched exactly by subscribers.
    pub selector_key: String,
    /// Selector value (header), matched exactly by subscribers.
    pub selector_value: String,
    /// Tenant the originating command executed for. `None` for system events.
    pub tenant: Option<TenantId>,
    /// `MsgPack`-serialized handler output.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl EventEnvelope {
    /// Builds an envelope with a fresh `event_id` from a registration's
    /// descriptor, the snapshot tenant, and an already-serialized payload.
    #[must_use]
    pub fn new(descriptor: &EventDescriptor, tenant: Option<TenantId>, payload: Vec<u8>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            destination: descriptor.destination.clone(),
            selector_key: descriptor.selector_key.clone(),
            selector_value: descriptor.selector_value.clone(),
            tenant,
            payload,
        }
    }

    /// Decodes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the `rmp-serde` decode error if the payload does not match `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }
}

/// Subscription filter: exact selector key/value match, with the tenant as an
/// implicit extra filter dimension when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorFilter {
    /// Selector key to match exactly.
    pub key: String,
    /// Selector value to match exactly.
    pub value: String,
    /// When set, only events tagged with this tenant match.
    pub tenant: Option<TenantId>,
}

impl SelectorFilter {
    /// Filter on selector key/value across all tenants.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            tenant: None,
        }
    }

    /// Restricts the filter to a single tenant.
    #[must_use]
    pub fn for_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Whether an envelope passes this filter.
    ///
    /// Selector key and value must match exactly. If the filter names a
    /// tenant, the envelope must be tagged with the same tenant; untagged
    /// (system) events never match a tenant-scoped filter.
    #[must_use]
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if envelope.selector_key != self.key || envelope.selector_value != self.value {
            return false;
        }
        match &self.tenant {
            Some(tenant) => envelope.tenant.as_ref() == Some(tenant),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct LedgerCreated {
        identifier: String,
    }

    fn envelope(key: &str, value: &str, tenant: Option<&str>) -> EventEnvelope {
        EventEnvelope::new(
            &EventDescriptor::new("accounting-v1", key, value),
            tenant.map(TenantId::from),
            Vec::new(),
        )
    }

    #[test]
    fn payload_decodes_by_field_name() {
        let payload = rmp_serde::to_vec_named(&LedgerCreated {
            identifier: "GL".to_string(),
        })
        .unwrap();
        let descriptor = EventDescriptor::new("accounting-v1", "action", "post-ledger");
        let envelope = EventEnvelope::new(&descriptor, Some(TenantId::new("alpha")), payload);

        let decoded: LedgerCreated = envelope.decode_payload().unwrap();
        assert_eq!(decoded.identifier, "GL");
    }

    #[test]
    fn each_envelope_gets_a_distinct_event_id() {
        let descriptor = EventDescriptor::new("accounting-v1", "action", "post-ledger");
        let first = EventEnvelope::new(&descriptor, None, Vec::new());
        let second = EventEnvelope::new(&descriptor, None, Vec::new());
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn tenant_scoped_filter_rejects_untagged_events() {
        let filter =
            SelectorFilter::new("action", "initialize").for_tenant(TenantId::new("alpha"));
        assert!(!filter.matches(&envelope("action", "initialize", None)));
        assert!(!filter.matches(&envelope("action", "initialize", Some("beta"))));
        assert!(filter.matches(&envelope("action", "initialize", Some("alpha"))));
    }

    #[test]
    fn tenant_agnostic_filter_matches_any_tenant() {
        let filter = SelectorFilter::new("action", "post-ledger");
        assert!(filter.matches(&envelope("action", "post-ledger", None)));
        assert!(filter.matches(&envelope("action", "post-ledger", Some("alpha"))));
        assert!(!filter.matches(&envelope("action", "post-account", Some("alpha"))));
        assert!(!filter.matches(&envelope("kind", "post-ledger", Some("alpha"))));
    }

    proptest! {
        /// A filter without a tenant dimension matches exactly when both
        /// selector components are equal.
        #[test]
        fn selector_match_is_exact_key_value_equality(
            fk in "[a-z]{1,8}", fv in "[a-z-]{1,12}",
            ek in "[a-z]{1,8}", ev in "[a-z-]{1,12}",
        ) {
            let filter = SelectorFilter::new(fk.clone(), fv.clone());
            let matched = filter.matches(&envelope(&ek, &ev, Some("alpha")));
            prop_assert_eq!(matched, fk == ek && fv == ev);
        }

        /// Adding a tenant dimension only ever narrows the match set.
        #[test]
        fn tenant_dimension_never_widens_a_filter(
            key in "[a-z]{1,8}", value in "[a-z-]{1,12}",
            filter_tenant in "[a-z]{1,6}", event_tenant in proptest::option::of("[a-z]{1,6}"),
        ) {
            let broad = SelectorFilter::new(key.clone(), value.clone());
            let narrow = broad.clone().for_tenant(TenantId::new(filter_tenant));
            let event = envelope(&key, &value, event_tenant.as_deref());
            prop_assert!(!(narrow.matches(&event) && !broad.matches(&event)));
        }
    }
}
