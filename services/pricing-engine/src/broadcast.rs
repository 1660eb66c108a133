//! Change-event fan-out to push subscribers
//!
//! Maintains a dynamically changing set of subscriber outboxes (bounded
//! channels) and pushes pricing change events to all of them without ever
//! blocking the producer:
//!
//! - Enqueue is `try_send`; a full or closed outbox marks the subscriber
//!   dead. Dead subscribers are collected during the publish pass and pruned
//!   after it, never mid-iteration.
//! - Delivery is best-effort and never retried; a reconnecting subscriber
//!   re-subscribes and receives a fresh full dump.
//! - Idle outboxes receive a synthetic keepalive so consumers can tell "no
//!   news" apart from a dead connection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::ids::Sku;
use types::snapshot::PricingSnapshot;

use crate::events::PricingEvent;
use crate::metrics::ServiceMetrics;

/// Unique subscriber identifier.
pub type SubscriberId = u64;

/// Configuration for the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Bounded outbox capacity per subscriber.
    pub outbox_capacity: usize,
    /// Idle interval after which a keepalive is sent (default: 30s).
    pub keepalive_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 64,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// A live subscription: the id and the event stream to drain.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<PricingEvent>,
}

struct SubscriberHandle {
    tx: mpsc::Sender<PricingEvent>,
    /// Last successful enqueue, for keepalive scheduling.
    last_event: Mutex<Instant>,
}

/// Fans out pricing change events to all registered subscribers.
pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, SubscriberHandle>,
    next_id: AtomicU64,
    config: BroadcastConfig,
    metrics: Arc<ServiceMetrics>,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            config,
            metrics,
        }
    }

    /// Register a new subscriber outbox.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_inner(None)
    }

    /// Register a new subscriber and enqueue a one-time `connected` event
    /// carrying the full current snapshot dump, so the subscriber does not
    /// have to wait for the next change to get state.
    pub fn subscribe_with_snapshot(
        &self,
        pricing: BTreeMap<Sku, PricingSnapshot>,
    ) -> Subscription {
        self.subscribe_inner(Some(PricingEvent::Connected {
            pricing,
            timestamp: Utc::now(),
        }))
    }

    fn subscribe_inner(&self, initial: Option<PricingEvent>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.outbox_capacity);

        if let Some(event) = initial {
            // Freshly created outbox, cannot be full
            let _ = tx.try_send(event);
        }

        self.subscribers.insert(
            id,
            SubscriberHandle {
                tx,
                last_event: Mutex::new(Instant::now()),
            },
        );

        debug!(subscriber_id = id, "Subscriber registered");
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber. Safe to call repeatedly.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber_id = id, "Subscriber removed");
        }
    }

    /// Push a pricing change to every registered subscriber.
    ///
    /// Never blocks and never fails from the caller's perspective;
    /// unreachable subscribers are pruned after the pass.
    pub fn publish(&self, sku: &Sku, snapshot: &PricingSnapshot) {
        let event = PricingEvent::PricingUpdate {
            sku: sku.clone(),
            pricing: snapshot.clone(),
            timestamp: Utc::now(),
        };

        let outcome = self.fanout(&event, |_| true);
        self.metrics.record_broadcast();
        self.prune(outcome.dead);

        debug!(
            sku = sku.as_str(),
            delivered = outcome.delivered,
            subscribers = self.subscribers.len(),
            "Broadcast pricing update"
        );
    }

    /// Send a keepalive to every outbox idle longer than the configured
    /// interval.
    pub fn send_keepalives(&self) {
        let interval = self.config.keepalive_interval;
        let event = PricingEvent::Keepalive {
            timestamp: Utc::now(),
        };

        let outcome = self.fanout(&event, |handle| {
            handle
                .last_event
                .lock()
                .map(|last| last.elapsed() >= interval)
                .unwrap_or(false)
        });

        if outcome.delivered > 0 {
            self.metrics.record_keepalives(outcome.delivered as u64);
        }
        self.prune(outcome.dead);
    }

    /// Spawn the keepalive ticker task. Exits promptly on the stop signal.
    pub fn spawn_keepalive(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => self.send_keepalives(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Drop every subscriber outbox so draining consumers observe
    /// termination instead of hanging.
    pub fn close_all(&self) {
        let count = self.subscribers.len();
        self.subscribers.clear();
        if count > 0 {
            info!(subscribers = count, "Closed all subscriber channels");
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Attempt a non-blocking enqueue to every subscriber passing the
    /// filter. Dead subscribers are collected, not removed, during the pass.
    fn fanout(
        &self,
        event: &PricingEvent,
        should_send: impl Fn(&SubscriberHandle) -> bool,
    ) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();

        for entry in self.subscribers.iter() {
            let handle = entry.value();
            if !should_send(handle) {
                continue;
            }
            match handle.tx.try_send(event.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    if let Ok(mut last) = handle.last_event.lock() {
                        *last = Instant::now();
                    }
                }
                Err(mpsc::error::TrySendError::Full(_))
                | Err(mpsc::error::TrySendError::Closed(_)) => {
                    outcome.dead.push(*entry.key());
                }
            }
        }

        outcome
    }

    fn prune(&self, dead: Vec<SubscriberId>) {
        for id in dead {
            if self.subscribers.remove(&id).is_some() {
                self.metrics.record_pruned();
                warn!(subscriber_id = id, "Pruned unreachable subscriber");
            }
        }
    }
}

#[derive(Default)]
struct FanoutOutcome {
    delivered: usize,
    dead: Vec<SubscriberId>,
}
