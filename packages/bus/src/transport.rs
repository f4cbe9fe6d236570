//! In-process message transport with selector-filtered fan-out.
//!
//! Reference implementation of
//! [`MessageTransport`](switchyard_core::MessageTransport): destinations are
//! named in-memory channels, and each subscriber registers a
//! [`SelectorFilter`] evaluated against envelope headers at publish time —
//! subscribers never see (or deserialize) events they didn't ask for.
//! A broker-backed transport satisfies the same trait with header filters.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use switchyard_core::{EventEnvelope, EventStream, MessageTransport, SelectorFilter, TransportError};

// ---------------------------------------------------------------------------
// InProcessTransport
// ---------------------------------------------------------------------------

struct SubscriberEntry {
    filter: SelectorFilter,
    sender: mpsc::UnboundedSender<EventEnvelope>,
}

/// Destination -> subscriber list, fanned out on publish.
///
/// Publishing to a destination with no (matching) subscribers succeeds: the
/// transport makes no delivery promise beyond currently registered
/// subscribers, and at-least-once semantics are per subscriber.
#[derive(Default)]
pub struct InProcessTransport {
    subscriptions: DashMap<String, Vec<SubscriberEntry>>,
}

impl InProcessTransport {
    /// Creates a transport with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on `destination`.
    #[must_use]
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.subscriptions
            .get(destination)
            .map_or(0, |entry| {
                entry.iter().filter(|sub| !sub.sender.is_closed()).count()
            })
    }
}

#[async_trait]
impl MessageTransport for InProcessTransport {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), TransportError> {
        if let Some(mut entry) = self.subscriptions.get_mut(envelope.destination.as_str()) {
            // Prune subscribers whose receiving half was dropped.
            entry.retain(|sub| !sub.sender.is_closed());
            for sub in entry.iter() {
                if sub.filter.matches(envelope) {
                    // Send only fails when the receiver just closed; the
                    // next publish prunes it.
                    let _ = sub.sender.send(envelope.clone());
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, destination: &str, filter: SelectorFilter) -> Box<dyn EventStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions
            .entry(destination.to_string())
            .or_default()
            .push(SubscriberEntry { filter, sender });
        Box::new(InProcessStream { receiver })
    }
}

/// Receiving half of an in-process subscription.
struct InProcessStream {
    receiver: mpsc::UnboundedReceiver<EventEnvelope>,
}

#[async_trait]
impl EventStream for InProcessStream {
    async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use switchyard_core::{EventDescriptor, TenantId};

    use super::*;

    fn envelope(destination: &str, value: &str, tenant: &str) -> EventEnvelope {
        EventEnvelope::new(
            &EventDescriptor::new(destination, "action", value),
            Some(TenantId::new(tenant)),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn delivers_only_matching_selectors() {
        let transport = InProcessTransport::new();
        let mut ledgers = transport.subscribe("accounting-v1", SelectorFilter::new("action", "post-ledger"));
        let mut accounts =
            transport.subscribe("accounting-v1", SelectorFilter::new("action", "post-account"));

        transport
            .publish(&envelope("accounting-v1", "post-ledger", "alpha"))
            .await
            .unwrap();

        let received = ledgers.recv().await.unwrap();
        assert_eq!(received.selector_value, "post-ledger");
        assert_eq!(received.tenant, Some(TenantId::new("alpha")));

        // The other subscriber saw nothing.
        transport
            .publish(&envelope("accounting-v1", "post-account", "alpha"))
            .await
            .unwrap();
        let received = accounts.recv().await.unwrap();
        assert_eq!(received.selector_value, "post-account");
    }

    #[tokio::test]
    async fn tenant_scoped_subscription_filters_other_tenants() {
        let transport = InProcessTransport::new();
        let mut stream = transport.subscribe(
            "accounting-v1",
            SelectorFilter::new("action", "initialize").for_tenant(TenantId::new("beta")),
        );

        transport
            .publish(&envelope("accounting-v1", "initialize", "alpha"))
            .await
            .unwrap();
        transport
            .publish(&envelope("accounting-v1", "initialize", "beta"))
            .await
            .unwrap();

        let received = stream.recv().await.unwrap();
        assert_eq!(received.tenant, Some(TenantId::new("beta")));
    }

    #[tokio::test]
    async fn destinations_are_independent() {
        let transport = InProcessTransport::new();
        let mut accounting =
            transport.subscribe("accounting-v1", SelectorFilter::new("action", "initialize"));
        let _portfolio =
            transport.subscribe("portfolio-v1", SelectorFilter::new("action", "initialize"));

        transport
            .publish(&envelope("accounting-v1", "initialize", "alpha"))
            .await
            .unwrap();

        assert_eq!(
            accounting.recv().await.unwrap().destination,
            "accounting-v1"
        );
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_succeeds() {
        let transport = InProcessTransport::new();
        transport
            .publish(&envelope("nowhere-v1", "initialize", "alpha"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let transport = InProcessTransport::new();
        let stream = transport.subscribe("accounting-v1", SelectorFilter::new("action", "initialize"));
        assert_eq!(transport.subscriber_count("accounting-v1"), 1);

        drop(stream);
        transport
            .publish(&envelope("accounting-v1", "initialize", "alpha"))
            .await
            .unwrap();
        assert_eq!(transport.subscriber_count("accounting-v1"), 0);
    }
}
