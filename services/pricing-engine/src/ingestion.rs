//! Update ingestion adapter for the pricing engine
//!
//! Translates inbound update messages into calculator calls and owns the
//! "which SKUs are affected" fan-out that the calculator deliberately does
//! not do itself:
//!
//! - Rate admitted → recompute every SKU priced against that material
//! - Weights admitted → the calculator already recomputed that one SKU
//! - External snapshot strictly newer → installed directly into the cache
//!
//! Malformed messages are logged and dropped; nothing on this path can abort
//! the consume loop. The adapter reports every resulting snapshot change to
//! its caller and knows nothing about the broadcaster.

use std::sync::Arc;

use tracing::{info, warn};
use types::ids::Sku;
use types::rate::Rate;
use types::snapshot::PricingSnapshot;
use types::weights::ProductWeights;

use crate::calculator::{write_shared, SharedCalculator};
use crate::events::{parse_update, UpdateEnvelope, UpdateEvent};
use crate::metrics::ServiceMetrics;

/// A snapshot change produced by applying one update.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedPricing {
    pub sku: Sku,
    pub snapshot: PricingSnapshot,
}

/// Adapter between the update transport and the calculator.
pub struct UpdateIngester {
    calculator: SharedCalculator,
    metrics: Arc<ServiceMetrics>,
}

impl UpdateIngester {
    pub fn new(calculator: SharedCalculator, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            calculator,
            metrics,
        }
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Parse and apply one inbound envelope.
    ///
    /// Returns the snapshot changes to broadcast; empty for stale, malformed,
    /// or not-yet-priceable updates.
    pub fn apply_envelope(&self, envelope: &UpdateEnvelope) -> Vec<ChangedPricing> {
        match parse_update(envelope) {
            Ok(event) => self.apply(event),
            Err(err) => {
                self.metrics.record_malformed();
                warn!(
                    topic = %envelope.topic,
                    key = envelope.key.as_deref().unwrap_or(""),
                    error = %err,
                    "Dropping malformed update message"
                );
                Vec::new()
            }
        }
    }

    /// Apply one validated update event.
    pub fn apply(&self, event: UpdateEvent) -> Vec<ChangedPricing> {
        match event {
            UpdateEvent::Rate(rate) => self.apply_rate(rate),
            UpdateEvent::Weights(weights) => self.apply_weights(weights),
            UpdateEvent::Snapshot(snapshot) => self.apply_snapshot(snapshot),
        }
    }

    fn apply_rate(&self, rate: Rate) -> Vec<ChangedPricing> {
        let material = rate.material;
        let mut calculator = write_shared(&self.calculator);

        if !calculator.update_rate(rate) {
            self.metrics.record_stale();
            return Vec::new();
        }
        self.metrics.record_applied();

        let affected = calculator.skus_for_material(material);
        let mut changed = Vec::with_capacity(affected.len());
        for sku in affected {
            if let Some(snapshot) = calculator.recompute(&sku) {
                self.metrics.record_snapshot_computed();
                changed.push(ChangedPricing { sku, snapshot });
            }
        }
        drop(calculator);

        info!(
            material = material.as_str(),
            affected = changed.len(),
            "Applied rate update"
        );
        changed
    }

    fn apply_weights(&self, weights: ProductWeights) -> Vec<ChangedPricing> {
        let sku = weights.sku.clone();
        let mut calculator = write_shared(&self.calculator);

        if !calculator.update_weights(weights) {
            self.metrics.record_stale();
            return Vec::new();
        }
        self.metrics.record_applied();

        // update_weights already recomputed this SKU; fetch the result
        let snapshot = calculator.get_pricing(&sku);
        drop(calculator);

        match snapshot {
            Some(snapshot) => {
                self.metrics.record_snapshot_computed();
                info!(sku = sku.as_str(), "Applied weights update");
                vec![ChangedPricing { sku, snapshot }]
            }
            None => {
                info!(
                    sku = sku.as_str(),
                    "Applied weights update, SKU not yet priceable"
                );
                Vec::new()
            }
        }
    }

    fn apply_snapshot(&self, snapshot: PricingSnapshot) -> Vec<ChangedPricing> {
        let sku = snapshot.sku.clone();
        let mut calculator = write_shared(&self.calculator);

        if !calculator.install_snapshot(snapshot.clone()) {
            self.metrics.record_stale();
            return Vec::new();
        }
        drop(calculator);

        self.metrics.record_applied();
        self.metrics.record_snapshot_installed();
        info!(
            sku = sku.as_str(),
            snapshot_version = snapshot.snapshot_version,
            "Installed external pricing snapshot"
        );
        vec![ChangedPricing { sku, snapshot }]
    }
}
