//! Background redelivery worker for envelopes the transport rejected.
//!
//! A transport failure after a successful commit must not undo the commit;
//! the envelope is handed to this worker instead. The worker retries each
//! envelope with exponential backoff and jitter, and parks envelopes that
//! exhaust their attempts in the shared dead-letter buffer for manual
//! replay.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use switchyard_core::{EventEnvelope, MessageTransport};

use crate::config::BusConfig;

// Backoff doubling cap: 2^10 * base is already minutes at any sane base.
const MAX_BACKOFF_SHIFT: u32 = 10;

#[derive(Debug, Clone, Copy)]
struct RedeliveryPolicy {
    max_attempts: u32,
    base_backoff_ms: u64,
    tick_ms: u64,
}

struct PendingRedelivery {
    envelope: EventEnvelope,
    attempt: u32,
    due: Instant,
}

fn backoff(policy: RedeliveryPolicy, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    let jitter = rand::rng().random_range(0..=policy.base_backoff_ms);
    Duration::from_millis(policy.base_backoff_ms.saturating_mul(1 << shift) + jitter)
}

// ---------------------------------------------------------------------------
// RedeliveryWorker
// ---------------------------------------------------------------------------

/// Retries failed envelope deliveries on a dedicated task.
///
/// The worker loop:
/// 1. Receives failed envelopes on an mpsc channel and schedules their first
///    retry one backoff interval out.
/// 2. On each tick, republishes every due envelope; failures reschedule with
///    doubled backoff until the attempt budget is spent.
/// 3. Exhausted envelopes go to the dead-letter buffer with an error log —
///    delivery gave up, the committed state change stands.
pub struct RedeliveryWorker {
    tx: mpsc::Sender<EventEnvelope>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RedeliveryWorker {
    /// Starts the worker task. The channel capacity is fixed at 256.
    pub(crate) fn start(
        transport: Arc<dyn MessageTransport>,
        dead_letters: Arc<Mutex<Vec<EventEnvelope>>>,
        config: &BusConfig,
    ) -> Self {
        let policy = RedeliveryPolicy {
            max_attempts: config.redelivery_max_attempts,
            base_backoff_ms: config.redelivery_base_backoff_ms,
            tick_ms: config.redelivery_tick_ms,
        };
        let (tx, mut rx) = mpsc::channel::<EventEnvelope>(256);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut pending: Vec<PendingRedelivery> = Vec::new();
            let mut tick = tokio::time::interval(Duration::from_millis(policy.tick_ms));
            // Skip the first immediate tick so retries never fire at startup.
            tick.tick().await;

            loop {
                tokio::select! {
                    envelope = rx.recv() => {
                        match envelope {
                            Some(envelope) => pending.push(PendingRedelivery {
                                due: Instant::now() + backoff(policy, 1),
                                envelope,
                                attempt: 1,
                            }),
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick.tick() => {
                        retry_due(&transport, &dead_letters, policy, &mut pending).await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            // Nothing in flight may be lost silently: park the remainder for
            // manual replay.
            if !pending.is_empty() {
                tracing::warn!(
                    count = pending.len(),
                    "redelivery worker stopping with undelivered envelopes; parking in dead-letter buffer"
                );
                let mut parked = dead_letters.lock();
                parked.extend(pending.into_iter().map(|entry| entry.envelope));
            }
        });

        Self {
            tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Hands a failed envelope to the worker.
    ///
    /// # Errors
    ///
    /// Returns the envelope back when the worker has stopped, so the caller
    /// can park it in the dead-letter buffer itself.
    pub(crate) async fn submit(&self, envelope: EventEnvelope) -> Result<(), EventEnvelope> {
        self.tx.send(envelope).await.map_err(|failed| failed.0)
    }

    /// Stops the worker, parking any still-pending envelopes.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn retry_due(
    transport: &Arc<dyn MessageTransport>,
    dead_letters: &Arc<Mutex<Vec<EventEnvelope>>>,
    policy: RedeliveryPolicy,
    pending: &mut Vec<PendingRedelivery>,
) {
    let now = Instant::now();
    let mut still_pending = Vec::with_capacity(pending.len());

    for mut entry in pending.drain(..) {
        if entry.due > now {
            still_pending.push(entry);
            continue;
        }
        match transport.publish(&entry.envelope).await {
            Ok(()) => {
                tracing::info!(
                    event_id = %entry.envelope.event_id,
                    destination = %entry.envelope.destination,
                    attempt = entry.attempt,
                    "envelope redelivered"
                );
            }
            Err(error) if entry.attempt >= policy.max_attempts => {
                tracing::error!(
                    event_id = %entry.envelope.event_id,
                    destination = %entry.envelope.destination,
                    attempts = entry.attempt,
                    %error,
                    "redelivery attempts exhausted; parking envelope for manual replay"
                );
                dead_letters.lock().push(entry.envelope);
            }
            Err(error) => {
                tracing::warn!(
                    event_id = %entry.envelope.event_id,
                    attempt = entry.attempt,
                    %error,
                    "redelivery failed, backing off"
                );
                entry.attempt += 1;
                entry.due = now + backoff(policy, entry.attempt);
                still_pending.push(entry);
            }
        }
    }

    *pending = still_pending;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use switchyard_core::{EventDescriptor, EventStream, SelectorFilter, TransportError};

    use super::*;

    /// Transport that fails the first `fail_first` publishes, then succeeds.
    struct FlakyTransport {
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageTransport for FlakyTransport {
        async fn publish(&self, _envelope: &EventEnvelope) -> Result<(), TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(TransportError::Unavailable {
                    reason: "broker down".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn subscribe(&self, _destination: &str, _filter: SelectorFilter) -> Box<dyn EventStream> {
            unimplemented!("redelivery never subscribes")
        }
    }

    fn make_envelope() -> EventEnvelope {
        EventEnvelope::new(
            &EventDescriptor::new("accounting-v1", "action", "post-ledger"),
            None,
            Vec::new(),
        )
    }

    fn fast_config() -> BusConfig {
        BusConfig {
            redelivery_max_attempts: 3,
            redelivery_base_backoff_ms: 5,
            redelivery_tick_ms: 5,
            ..BusConfig::default()
        }
    }

    #[tokio::test]
    async fn redelivers_after_transient_failures() {
        let transport = Arc::new(FlakyTransport::new(1));
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let worker = RedeliveryWorker::start(transport.clone(), dead_letters.clone(), &fast_config());

        worker.submit(make_envelope()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.stop().await;

        // One failed attempt, then success; nothing dead-lettered.
        assert!(transport.calls.load(Ordering::SeqCst) >= 2);
        assert!(dead_letters.lock().is_empty());
    }

    #[tokio::test]
    async fn exhausted_envelopes_are_dead_lettered() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX));
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let worker = RedeliveryWorker::start(transport, dead_letters.clone(), &fast_config());

        let envelope = make_envelope();
        let event_id = envelope.event_id;
        worker.submit(envelope).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        worker.stop().await;

        let parked = dead_letters.lock();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].event_id, event_id);
    }

    #[tokio::test]
    async fn stop_parks_pending_envelopes() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX));
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let config = BusConfig {
            redelivery_base_backoff_ms: 60_000,
            redelivery_tick_ms: 60_000,
            ..BusConfig::default()
        };
        let worker = RedeliveryWorker::start(transport, dead_letters.clone(), &config);

        worker.submit(make_envelope()).await.unwrap();
        // Give the worker loop a moment to pick the envelope up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.stop().await;

        assert_eq!(dead_letters.lock().len(), 1);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_the_envelope() {
        let transport = Arc::new(FlakyTransport::new(0));
        let dead_letters = Arc::new(Mutex::new(Vec::new()));
        let worker = RedeliveryWorker::start(transport, dead_letters, &fast_config());
        worker.stop().await;

        let envelope = make_envelope();
        let event_id = envelope.event_id;
        let returned = worker.submit(envelope).await.unwrap_err();
        assert_eq!(returned.event_id, event_id);
    }
}
