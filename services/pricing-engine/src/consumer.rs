//! Transport boundary and the background consume loop
//!
//! The engine treats its inbound transport as an opaque boundary: anything
//! implementing `UpdateTransport` (a bounded poll with timeout plus close)
//! can feed it. `ChannelTransport` is the in-process implementation used by
//! tests and by the operator-facing manual publish path; a broker-backed
//! implementation plugs in the same way, including its own reconnection
//! policy.
//!
//! `PricingConsumer::spawn` starts the single background writer task:
//!
//! - polls the transport with a bounded timeout so the stop signal is
//!   observed within one poll interval
//! - applies each message through the ingester and publishes every
//!   resulting change to the broadcaster
//! - on transport failure, logs and backs off — the service degrades to
//!   serving the last known cache instead of dying
//! - on stop, closes the transport and all subscriber channels; the store
//!   and cache are memory-only and left as-is

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::errors::TransportError;
use types::ids::Sku;
use types::material::Material;
use types::snapshot::PricingSnapshot;

use crate::broadcast::Broadcaster;
use crate::events::{topics, UpdateEnvelope};
use crate::ingestion::UpdateIngester;

/// Inbound update transport boundary.
#[async_trait]
pub trait UpdateTransport: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the
    /// timeout elapsed with nothing to deliver.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<UpdateEnvelope>, TransportError>;

    /// Release the underlying connection.
    async fn close(&mut self);
}

/// In-process transport over a bounded channel.
pub struct ChannelTransport {
    rx: mpsc::Receiver<UpdateEnvelope>,
}

#[async_trait]
impl UpdateTransport for ChannelTransport {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<UpdateEnvelope>, TransportError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(envelope)) => Ok(Some(envelope)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a connected publisher/transport pair.
pub fn channel_transport(capacity: usize) -> (UpdatePublisher, ChannelTransport) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        UpdatePublisher {
            tx,
            clock: Arc::new(AtomicI64::new(0)),
        },
        ChannelTransport { rx },
    )
}

/// Producer-side handle feeding the update channel.
///
/// Stamps each update with an ISO-8601 timestamp and a monotonic
/// millisecond-epoch version, the same contract external producers follow.
/// Operator-issued updates (e.g. a manual rate publish from an admin UI) go
/// through this same path, so the engine cannot distinguish them from
/// automated ones.
#[derive(Clone)]
pub struct UpdatePublisher {
    tx: mpsc::Sender<UpdateEnvelope>,
    /// Producer-local logical clock; strictly increasing even when two
    /// updates land in the same millisecond.
    clock: Arc<AtomicI64>,
}

impl UpdatePublisher {
    /// Publish a rate quote for one material.
    pub async fn publish_rate(&self, material: Material, rate: Decimal) -> Result<(), TransportError> {
        let envelope = UpdateEnvelope {
            topic: topics::RATES.to_string(),
            key: Some(material.as_str().to_string()),
            payload: json!({
                "rate": rate,
                "rate_version": self.next_version(),
                "timestamp": Utc::now(),
            }),
        };
        self.send(envelope).await
    }

    /// Publish the composition for one SKU.
    pub async fn publish_weights(
        &self,
        sku: &Sku,
        material: Material,
        weight_gram: Decimal,
        stone_weight: Decimal,
        labor_cost: Decimal,
        markup_percent: Decimal,
    ) -> Result<(), TransportError> {
        let envelope = UpdateEnvelope {
            topic: topics::WEIGHTS.to_string(),
            key: Some(sku.as_str().to_string()),
            payload: json!({
                "material": material,
                "weight_gram": weight_gram,
                "stone_weight": stone_weight,
                "labor_cost": labor_cost,
                "markup_percent": markup_percent,
                "weights_version": self.next_version(),
                "timestamp": Utc::now(),
            }),
        };
        self.send(envelope).await
    }

    /// Forward an externally-computed snapshot from a peer aggregator.
    pub async fn publish_snapshot(&self, snapshot: &PricingSnapshot) -> Result<(), TransportError> {
        let payload = serde_json::to_value(snapshot)
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?;
        let envelope = UpdateEnvelope {
            topic: topics::PRICING_SNAPSHOT.to_string(),
            key: Some(snapshot.sku.as_str().to_string()),
            payload,
        };
        self.send(envelope).await
    }

    /// Publish a raw envelope.
    pub async fn send(&self, envelope: UpdateEnvelope) -> Result<(), TransportError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn next_version(&self) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        match self.clock.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
            Some(now_ms.max(prev + 1))
        }) {
            Ok(prev) | Err(prev) => now_ms.max(prev + 1),
        }
    }
}

/// Configuration for the consume loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Bounded poll interval; also the worst-case stop latency.
    pub poll_timeout: Duration,
    /// Pause after a transport failure before polling again.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Handle to the running consumer; dropping it leaves the task running,
/// `stop` shuts it down cleanly.
pub struct ConsumerHandle {
    stop_tx: watch::Sender<bool>,
    consume_task: JoinHandle<()>,
    keepalive_task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal the loop to stop and wait for it to wind down. The signal is
    /// observed within one poll interval.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.consume_task.await;
        let _ = self.keepalive_task.await;
    }
}

/// The background consume loop: sole writer of the store and cache.
pub struct PricingConsumer;

impl PricingConsumer {
    /// Spawn the consume loop and the broadcaster's keepalive ticker.
    pub fn spawn<T>(
        transport: T,
        ingester: UpdateIngester,
        broadcaster: Arc<Broadcaster>,
        config: ConsumerConfig,
    ) -> ConsumerHandle
    where
        T: UpdateTransport + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let keepalive_task = broadcaster.clone().spawn_keepalive(stop_rx.clone());
        let consume_task = tokio::spawn(run_loop(
            transport, ingester, broadcaster, config, stop_rx,
        ));
        ConsumerHandle {
            stop_tx,
            consume_task,
            keepalive_task,
        }
    }
}

async fn run_loop<T: UpdateTransport>(
    mut transport: T,
    ingester: UpdateIngester,
    broadcaster: Arc<Broadcaster>,
    config: ConsumerConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!("Pricing consumer started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            polled = transport.poll(config.poll_timeout) => match polled {
                Ok(Some(envelope)) => {
                    let changed = ingester.apply_envelope(&envelope);
                    for change in &changed {
                        broadcaster.publish(&change.sku, &change.snapshot);
                    }
                }
                Ok(None) => {
                    // Poll timeout; loop around to observe the stop signal
                }
                Err(err) => {
                    ingester.metrics().record_transport_error();
                    warn!(
                        error = %err,
                        "Transport failure, serving last known snapshots until updates resume"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(config.error_backoff) => {}
                        _ = stop_rx.changed() => {}
                    }
                }
            }
        }
    }

    transport.close().await;
    broadcaster.close_all();
    info!("Pricing consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastConfig;
    use crate::calculator::PricingCalculator;
    use crate::events::parse_update;
    use crate::events::UpdateEvent;
    use crate::metrics::ServiceMetrics;

    #[tokio::test]
    async fn test_poll_times_out_with_none() {
        let (_publisher, mut transport) = channel_transport(8);
        let polled = transport.poll(Duration::from_millis(10)).await.unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_poll_errors_when_publisher_dropped() {
        let (publisher, mut transport) = channel_transport(8);
        drop(publisher);
        let polled = transport.poll(Duration::from_millis(10)).await;
        assert_eq!(polled.unwrap_err(), TransportError::Closed);
    }

    #[tokio::test]
    async fn test_publisher_versions_strictly_increase() {
        let (publisher, mut transport) = channel_transport(8);

        publisher
            .publish_rate(Material::Gold, Decimal::from(75_500_000_i64))
            .await
            .unwrap();
        publisher
            .publish_rate(Material::Gold, Decimal::from(75_600_000_i64))
            .await
            .unwrap();

        let mut versions = Vec::new();
        for _ in 0..2 {
            let envelope = transport
                .poll(Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            match parse_update(&envelope).unwrap() {
                UpdateEvent::Rate(rate) => versions.push(rate.rate_version),
                other => panic!("Expected Rate, got {}", other.label()),
            }
        }
        assert!(versions[1] > versions[0]);
    }

    #[tokio::test]
    async fn test_stop_closes_subscriber_channels() {
        let metrics = Arc::new(ServiceMetrics::new());
        let calculator = PricingCalculator::with_defaults().into_shared();
        let broadcaster = Arc::new(Broadcaster::new(BroadcastConfig::default(), metrics.clone()));
        let ingester = UpdateIngester::new(calculator, metrics);
        let (_publisher, transport) = channel_transport(8);

        let mut subscription = broadcaster.subscribe();
        let handle = PricingConsumer::spawn(
            transport,
            ingester,
            broadcaster.clone(),
            ConsumerConfig {
                poll_timeout: Duration::from_millis(20),
                error_backoff: Duration::from_millis(20),
            },
        );

        handle.stop().await;
        assert!(subscription.receiver.recv().await.is_none());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_loop_survives_malformed_messages() {
        let metrics = Arc::new(ServiceMetrics::new());
        let calculator = PricingCalculator::with_defaults().into_shared();
        let broadcaster = Arc::new(Broadcaster::new(BroadcastConfig::default(), metrics.clone()));
        let ingester = UpdateIngester::new(calculator, metrics.clone());
        let (publisher, transport) = channel_transport(8);

        let handle = PricingConsumer::spawn(
            transport,
            ingester,
            broadcaster,
            ConsumerConfig {
                poll_timeout: Duration::from_millis(20),
                error_backoff: Duration::from_millis(20),
            },
        );

        publisher
            .send(UpdateEnvelope {
                topic: "garbage".to_string(),
                key: None,
                payload: serde_json::Value::Null,
            })
            .await
            .unwrap();
        publisher
            .publish_rate(Material::Gold, Decimal::from(75_500_000_i64))
            .await
            .unwrap();

        // Both messages are consumed; one malformed, one applied
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = metrics.snapshot();
                if snapshot.events_malformed == 1 && snapshot.updates_applied == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        handle.stop().await;
    }
}
