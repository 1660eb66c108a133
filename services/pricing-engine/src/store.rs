//! Versioned entity store for rates and product weights
//!
//! Holds exactly one current `Rate` per material and one current
//! `ProductWeights` per SKU. Admission is strictly version-ordered: an update
//! whose version is less than or equal to the stored one is a silent no-op.
//! Staleness is a normal condition (clock skew, at-least-once redelivery),
//! signaled only via the boolean return and a debug-level log line.
//!
//! Uses `BTreeMap` for deterministic sorted iteration.

use std::collections::BTreeMap;

use tracing::debug;
use types::ids::Sku;
use types::material::Material;
use types::rate::Rate;
use types::weights::ProductWeights;

/// Current-state table for rates and weights with version admission control.
#[derive(Debug, Default)]
pub struct VersionedStore {
    /// Latest accepted rate per material.
    rates: BTreeMap<Material, Rate>,
    /// Latest accepted weights per SKU.
    weights: BTreeMap<Sku, ProductWeights>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a rate update.
    ///
    /// Returns false (no-op) when the stored rate for that material already
    /// carries an equal or newer version.
    pub fn admit_rate(&mut self, rate: Rate) -> bool {
        if let Some(current) = self.rates.get(&rate.material) {
            if rate.rate_version <= current.rate_version {
                debug!(
                    material = rate.material.as_str(),
                    incoming_version = rate.rate_version,
                    current_version = current.rate_version,
                    "Ignoring stale rate update"
                );
                return false;
            }
        }
        self.rates.insert(rate.material, rate);
        true
    }

    /// Admit a weights update, keyed by SKU. Same rule as `admit_rate`.
    pub fn admit_weights(&mut self, weights: ProductWeights) -> bool {
        if let Some(current) = self.weights.get(&weights.sku) {
            if weights.weights_version <= current.weights_version {
                debug!(
                    sku = weights.sku.as_str(),
                    incoming_version = weights.weights_version,
                    current_version = current.weights_version,
                    "Ignoring stale weights update"
                );
                return false;
            }
        }
        self.weights.insert(weights.sku.clone(), weights);
        true
    }

    /// Current rate for a material, if any has been admitted.
    pub fn rate(&self, material: Material) -> Option<&Rate> {
        self.rates.get(&material)
    }

    /// Current weights for a SKU, if any have been admitted.
    pub fn weights(&self, sku: &Sku) -> Option<&ProductWeights> {
        self.weights.get(sku)
    }

    /// All SKUs whose stored weights are priced against the given material.
    pub fn skus_for_material(&self, material: Material) -> Vec<Sku> {
        self.weights
            .iter()
            .filter(|(_, w)| w.material == material)
            .map(|(sku, _)| sku.clone())
            .collect()
    }

    /// Iterator over all stored rates in material order.
    pub fn rates(&self) -> impl Iterator<Item = &Rate> {
        self.rates.values()
    }

    /// Materials a rate is currently known for.
    pub fn materials(&self) -> Vec<Material> {
        self.rates.keys().copied().collect()
    }

    /// Number of stored rates.
    pub fn rates_count(&self) -> usize {
        self.rates.len()
    }

    /// Number of stored weights entries.
    pub fn weights_count(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn gold_rate(version: i64, rate: i64) -> Rate {
        Rate::new(Material::Gold, Decimal::from(rate), version, Utc::now())
    }

    fn ring_weights(sku: &str, material: Material, version: i64) -> ProductWeights {
        ProductWeights {
            sku: Sku::new(sku),
            material,
            weight_gram: "5.5".parse().unwrap(),
            stone_weight: Decimal::ZERO,
            labor_cost: Decimal::from(500_000),
            markup_percent: Decimal::from(15),
            weights_version: version,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_first_rate_admitted() {
        let mut store = VersionedStore::new();
        assert!(store.admit_rate(gold_rate(1, 75_500_000)));
        assert_eq!(store.rates_count(), 1);
    }

    #[test]
    fn test_out_of_order_rate_rejected() {
        let mut store = VersionedStore::new();
        assert!(store.admit_rate(gold_rate(2, 80_000_000)));
        assert!(!store.admit_rate(gold_rate(1, 75_500_000)));

        // Stored rate still carries version 2
        let stored = store.rate(Material::Gold).unwrap();
        assert_eq!(stored.rate_version, 2);
        assert_eq!(stored.rate, Decimal::from(80_000_000_i64));
    }

    #[test]
    fn test_duplicate_rate_version_is_idempotent() {
        let mut store = VersionedStore::new();
        assert!(store.admit_rate(gold_rate(5, 75_500_000)));
        assert!(!store.admit_rate(gold_rate(5, 99_000_000)));
        assert_eq!(
            store.rate(Material::Gold).unwrap().rate,
            Decimal::from(75_500_000_i64)
        );
    }

    #[test]
    fn test_rates_keyed_per_material() {
        let mut store = VersionedStore::new();
        store.admit_rate(gold_rate(1, 75_500_000));
        store.admit_rate(Rate::new(
            Material::Silver,
            Decimal::from(850_000),
            1,
            Utc::now(),
        ));

        assert_eq!(store.rates_count(), 2);
        assert_eq!(store.materials(), vec![Material::Gold, Material::Silver]);
    }

    #[test]
    fn test_out_of_order_weights_rejected() {
        let mut store = VersionedStore::new();
        assert!(store.admit_weights(ring_weights("RING_001", Material::Gold, 3)));
        assert!(!store.admit_weights(ring_weights("RING_001", Material::Gold, 3)));
        assert!(!store.admit_weights(ring_weights("RING_001", Material::Gold, 2)));
        assert!(store.admit_weights(ring_weights("RING_001", Material::Gold, 4)));
        assert_eq!(store.weights_count(), 1);
    }

    #[test]
    fn test_skus_for_material_filters() {
        let mut store = VersionedStore::new();
        store.admit_weights(ring_weights("RING_GOLD_001", Material::Gold, 1));
        store.admit_weights(ring_weights("RING_GOLD_002", Material::Gold, 1));
        store.admit_weights(ring_weights("RING_SILVER_001", Material::Silver, 1));

        let gold_skus = store.skus_for_material(Material::Gold);
        assert_eq!(
            gold_skus,
            vec![Sku::new("RING_GOLD_001"), Sku::new("RING_GOLD_002")]
        );

        let silver_skus = store.skus_for_material(Material::Silver);
        assert_eq!(silver_skus, vec![Sku::new("RING_SILVER_001")]);
    }

    proptest! {
        /// For any v1 < v2: admitting v2 then v1 leaves the store at v2.
        #[test]
        fn prop_higher_version_always_wins(v1 in 0_i64..1_000_000, delta in 1_i64..1_000_000) {
            let v2 = v1 + delta;
            let mut store = VersionedStore::new();

            prop_assert!(store.admit_rate(gold_rate(v2, 80_000_000)));
            prop_assert!(!store.admit_rate(gold_rate(v1, 75_500_000)));
            prop_assert_eq!(store.rate(Material::Gold).unwrap().rate_version, v2);
        }
    }
}
