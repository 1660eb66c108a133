//! Pricing calculator owning the versioned store and the snapshot cache
//!
//! Computes a `PricingSnapshot` for a SKU whenever both its weights and the
//! matching material rate are present:
//!
//! ```text
//! base_price  = max(0, rate * weight_gram + labor_cost)
//! final_price = base_price * (1 + markup_percent / 100)
//! ```
//!
//! All monetary math is `Decimal`. Snapshot versions form a per-SKU logical
//! clock (`max(now_ms, prev + 1)`), so a locally recomputed snapshot is
//! always strictly newer than its predecessor regardless of wall-clock
//! resolution. Version admission control applies only to externally-supplied
//! snapshots (`install_snapshot`); a local recompute always wins.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::ids::Sku;
use types::material::Material;
use types::rate::Rate;
use types::snapshot::{PricingSnapshot, DEFAULT_TTL_SEC};
use types::weights::ProductWeights;

use crate::store::VersionedStore;

/// Configuration for the pricing calculator.
#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    /// Validity window stamped on locally computed snapshots, in seconds.
    pub ttl_sec: i64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            ttl_sec: DEFAULT_TTL_SEC,
        }
    }
}

/// Current rate view returned by `get_current_rates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRate {
    pub rate: Decimal,
    pub rate_version: i64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters exposed by `get_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatorStats {
    pub rates_count: usize,
    pub weights_count: usize,
    pub snapshot_count: usize,
    /// Snapshots whose TTL has not elapsed as of the call.
    pub valid_snapshot_count: usize,
    pub materials: Vec<Material>,
    /// Timestamp of the newest rate quote, if any.
    pub last_update: Option<DateTime<Utc>>,
}

/// Calculator shared between the consumer task (sole writer) and the
/// query-side readers.
pub type SharedCalculator = Arc<RwLock<PricingCalculator>>;

/// Acquire a read guard, recovering from lock poisoning.
pub fn read_shared(calculator: &SharedCalculator) -> RwLockReadGuard<'_, PricingCalculator> {
    calculator.read().unwrap_or_else(|e| e.into_inner())
}

/// Acquire a write guard, recovering from lock poisoning.
pub fn write_shared(calculator: &SharedCalculator) -> RwLockWriteGuard<'_, PricingCalculator> {
    calculator.write().unwrap_or_else(|e| e.into_inner())
}

/// Owns the versioned store and the derived snapshot cache.
pub struct PricingCalculator {
    store: VersionedStore,
    /// Latest snapshot per SKU; replaced wholesale on recompute.
    cache: BTreeMap<Sku, PricingSnapshot>,
    config: CalculatorConfig,
}

impl PricingCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self {
            store: VersionedStore::new(),
            cache: BTreeMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CalculatorConfig::default())
    }

    /// Wrap the calculator for shared single-writer/multi-reader access.
    pub fn into_shared(self) -> SharedCalculator {
        Arc::new(RwLock::new(self))
    }

    /// Admit a rate update.
    ///
    /// Fan-out to affected SKUs is the caller's responsibility; the
    /// calculator does not auto-discover them.
    pub fn update_rate(&mut self, rate: Rate) -> bool {
        self.store.admit_rate(rate)
    }

    /// Admit a weights update; on success, immediately recompute that SKU.
    pub fn update_weights(&mut self, weights: ProductWeights) -> bool {
        let sku = weights.sku.clone();
        if !self.store.admit_weights(weights) {
            return false;
        }
        self.recompute(&sku);
        true
    }

    /// Recompute the snapshot for one SKU from current store state.
    ///
    /// Returns `None` when the SKU is unknown or no rate exists yet for its
    /// material; both are normal "not yet priceable" states, not faults.
    pub fn recompute(&mut self, sku: &Sku) -> Option<PricingSnapshot> {
        let weights = self.store.weights(sku)?.clone();
        let rate = match self.store.rate(weights.material) {
            Some(rate) => rate.clone(),
            None => {
                debug!(
                    sku = sku.as_str(),
                    material = weights.material.as_str(),
                    "No rate available, SKU not yet priceable"
                );
                return None;
            }
        };

        let base_price =
            (rate.rate * weights.weight_gram + weights.labor_cost).max(Decimal::ZERO);
        let final_price =
            base_price * (Decimal::ONE + weights.markup_percent / Decimal::ONE_HUNDRED);

        let now = Utc::now();
        let prev_version = self.cache.get(sku).map(|s| s.snapshot_version);
        let snapshot = PricingSnapshot {
            sku: sku.clone(),
            material: weights.material,
            weight_gram: weights.weight_gram,
            stone_weight: weights.stone_weight,
            labor_cost: weights.labor_cost,
            markup_percent: weights.markup_percent,
            rate_used: rate.rate,
            base_price,
            final_price,
            snapshot_version: next_snapshot_version(prev_version, now),
            ttl_sec: self.config.ttl_sec,
            as_of: now,
        };

        debug!(
            sku = sku.as_str(),
            final_price = %snapshot.final_price,
            snapshot_version = snapshot.snapshot_version,
            "Recomputed pricing snapshot"
        );

        self.cache.insert(sku.clone(), snapshot.clone());
        Some(snapshot)
    }

    /// Install an externally-computed snapshot, bypassing local computation.
    ///
    /// Only a strictly greater `snapshot_version` is admitted; equal or
    /// lower versions are discarded so redelivered or late peer snapshots
    /// can never regress the cache.
    pub fn install_snapshot(&mut self, snapshot: PricingSnapshot) -> bool {
        if let Some(current) = self.cache.get(&snapshot.sku) {
            if snapshot.snapshot_version <= current.snapshot_version {
                debug!(
                    sku = snapshot.sku.as_str(),
                    incoming_version = snapshot.snapshot_version,
                    current_version = current.snapshot_version,
                    "Ignoring stale external snapshot"
                );
                return false;
            }
        }
        self.cache.insert(snapshot.sku.clone(), snapshot);
        true
    }

    /// Current snapshot for one SKU, if any.
    pub fn get_pricing(&self, sku: &Sku) -> Option<PricingSnapshot> {
        self.cache.get(sku).cloned()
    }

    /// Point-in-time copy of every cached snapshot.
    pub fn get_all_pricing(&self) -> BTreeMap<Sku, PricingSnapshot> {
        self.cache.clone()
    }

    /// All SKUs whose stored weights use the given material.
    pub fn skus_for_material(&self, material: Material) -> Vec<Sku> {
        self.store.skus_for_material(material)
    }

    /// Current rates keyed by material.
    pub fn get_current_rates(&self) -> BTreeMap<Material, CurrentRate> {
        self.store
            .rates()
            .map(|rate| {
                (
                    rate.material,
                    CurrentRate {
                        rate: rate.rate,
                        rate_version: rate.rate_version,
                        timestamp: rate.timestamp,
                    },
                )
            })
            .collect()
    }

    /// Aggregate statistics over the store and the snapshot cache.
    pub fn get_stats(&self) -> CalculatorStats {
        let now = Utc::now();
        CalculatorStats {
            rates_count: self.store.rates_count(),
            weights_count: self.store.weights_count(),
            snapshot_count: self.cache.len(),
            valid_snapshot_count: self
                .cache
                .values()
                .filter(|s| !s.is_expired_at(now))
                .count(),
            materials: self.store.materials(),
            last_update: self.store.rates().map(|r| r.timestamp).max(),
        }
    }
}

/// Next value of the per-SKU snapshot logical clock.
///
/// Millisecond epoch by convention, but always strictly greater than the
/// previous version even when the clock has not advanced.
fn next_snapshot_version(prev: Option<i64>, now: DateTime<Utc>) -> i64 {
    let now_ms = now.timestamp_millis();
    match prev {
        Some(prev) => now_ms.max(prev + 1),
        None => now_ms,
    }
}
