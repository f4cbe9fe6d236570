//! Event emitter: hands committed-state events to the transport.
//!
//! Called by the executor only after the handler's transaction has
//! committed. A publish failure here is a delivery problem, not a command
//! failure: the envelope goes to the redelivery worker (backoff retries,
//! then the dead-letter buffer) and the caller's already-committed state
//! change is never compensated.

use std::sync::Arc;

use parking_lot::Mutex;

use switchyard_core::{EventEnvelope, MessageTransport};

use crate::config::BusConfig;
use crate::worker::RedeliveryWorker;

/// Publishes domain events with at-least-once delivery.
pub struct EventEmitter {
    transport: Arc<dyn MessageTransport>,
    redelivery: RedeliveryWorker,
    dead_letters: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl EventEmitter {
    /// Creates an emitter over `transport` and starts its redelivery worker.
    #[must_use]
    pub fn new(transport: Arc<dyn MessageTransport>, config: &BusConfig) -> Self {
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let redelivery = RedeliveryWorker::start(transport.clone(), dead_letters.clone(), config);
        Self {
            transport,
            redelivery,
            dead_letters,
        }
    }

    /// Publishes one envelope. Infallible from the caller's perspective:
    /// failures are retried in the background and eventually dead-lettered.
    pub async fn publish(&self, envelope: EventEnvelope) {
        match self.transport.publish(&envelope).await {
            Ok(()) => {
                tracing::trace!(
                    event_id = %envelope.event_id,
                    destination = %envelope.destination,
                    selector = %envelope.selector_value,
                    tenant = envelope.tenant.as_ref().map(switchyard_core::TenantId::as_str),
                    "event published"
                );
            }
            Err(error) => {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    destination = %envelope.destination,
                    %error,
                    "publish failed after commit; scheduling redelivery"
                );
                if let Err(envelope) = self.redelivery.submit(envelope).await {
                    // Worker already stopped: park directly rather than drop.
                    self.dead_letters.lock().push(envelope);
                }
            }
        }
    }

    /// Envelopes that exhausted redelivery, awaiting manual replay.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<EventEnvelope> {
        self.dead_letters.lock().clone()
    }

    /// Stops the redelivery worker, parking anything still pending.
    pub async fn shutdown(&self) {
        self.redelivery.stop().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use switchyard_core::{EventDescriptor, SelectorFilter, TenantId};

    use super::*;
    use crate::transport::InProcessTransport;

    fn make_envelope() -> EventEnvelope {
        EventEnvelope::new(
            &EventDescriptor::new("accounting-v1", "action", "post-ledger"),
            Some(TenantId::new("alpha")),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn publishes_to_matching_subscribers() {
        let transport = Arc::new(InProcessTransport::new());
        let mut stream =
            transport.subscribe("accounting-v1", SelectorFilter::new("action", "post-ledger"));
        let emitter = EventEmitter::new(transport, &BusConfig::default());

        let envelope = make_envelope();
        let event_id = envelope.event_id;
        emitter.publish(envelope).await;

        assert_eq!(stream.recv().await.unwrap().event_id, event_id);
        assert!(emitter.dead_letters().is_empty());
        emitter.shutdown().await;
    }

    #[tokio::test]
    async fn failed_publish_lands_in_dead_letters_after_shutdown() {
        use std::sync::atomic::AtomicU32;

        use async_trait::async_trait;
        use switchyard_core::{EventStream, TransportError};

        struct DownTransport {
            calls: AtomicU32,
        }

        #[async_trait]
        impl MessageTransport for DownTransport {
            async fn publish(&self, _: &EventEnvelope) -> Result<(), TransportError> {
                self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(TransportError::Unavailable {
                    reason: "broker down".to_string(),
                })
            }

            fn subscribe(&self, _: &str, _: SelectorFilter) -> Box<dyn EventStream> {
                unimplemented!("not used")
            }
        }

        let transport = Arc::new(DownTransport {
            calls: AtomicU32::new(0),
        });
        let emitter = EventEmitter::new(transport, &BusConfig::default());

        let envelope = make_envelope();
        let event_id = envelope.event_id;
        emitter.publish(envelope).await;
        emitter.shutdown().await;

        let parked = emitter.dead_letters();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].event_id, event_id);
    }
}
