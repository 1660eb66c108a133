//! Synchronous read path over the snapshot cache
//!
//! Applies the configured offline strategy when a snapshot is expired:
//!
//! - `Deny` — expired data is a typed failure, no price is returned
//! - `Freeze` (default) — the last known snapshot is returned unmodified
//! - `Surcharge` — the returned copy carries a fixed 5% penalty on the
//!   final price; the cached snapshot is never mutated
//!
//! All failures are structured results with a success flag; nothing on this
//! path panics or blocks on I/O.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use types::errors::QueryError;
use types::ids::Sku;
use types::material::Material;
use types::snapshot::{OfflineStrategy, PricingSnapshot};

use crate::calculator::{read_shared, CalculatorStats, CurrentRate, SharedCalculator};

/// Fixed multiplier applied by the `Surcharge` strategy.
fn surcharge_multiplier() -> Decimal {
    // 1.05
    Decimal::new(105, 2)
}

/// Structured result of a pricing query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PricingSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
    pub is_cached: bool,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_applied: Option<OfflineStrategy>,
}

impl PricingResponse {
    fn failure(error: QueryError, is_expired: bool) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            is_cached: false,
            is_expired,
            strategy_applied: None,
        }
    }

    fn cached(
        snapshot: PricingSnapshot,
        is_expired: bool,
        strategy_applied: Option<OfflineStrategy>,
    ) -> Self {
        Self {
            success: true,
            data: Some(snapshot),
            error: None,
            is_cached: true,
            is_expired,
            strategy_applied,
        }
    }
}

/// All cached snapshots plus a count; no staleness filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllPricing {
    pub data: BTreeMap<Sku, PricingSnapshot>,
    pub count: usize,
}

/// External-facing read path over the calculator's cache.
pub struct PricingQueryService {
    calculator: SharedCalculator,
}

impl PricingQueryService {
    pub fn new(calculator: SharedCalculator) -> Self {
        Self { calculator }
    }

    /// Fetch the snapshot for one SKU, resolving expiry via `strategy`.
    pub fn get_pricing(&self, sku: &Sku, strategy: OfflineStrategy) -> PricingResponse {
        let snapshot = read_shared(&self.calculator).get_pricing(sku);

        let Some(snapshot) = snapshot else {
            return PricingResponse::failure(QueryError::NotFound(sku.clone()), false);
        };

        if !snapshot.is_expired() {
            return PricingResponse::cached(snapshot, false, None);
        }

        match strategy {
            OfflineStrategy::Deny => {
                PricingResponse::failure(QueryError::Expired(sku.clone()), true)
            }
            OfflineStrategy::Freeze => {
                PricingResponse::cached(snapshot, true, Some(OfflineStrategy::Freeze))
            }
            OfflineStrategy::Surcharge => {
                // Penalty applies to the returned copy only
                let mut surcharged = snapshot;
                surcharged.final_price *= surcharge_multiplier();
                PricingResponse::cached(surcharged, true, Some(OfflineStrategy::Surcharge))
            }
        }
    }

    /// Every cached snapshot, expired or not; the caller decides.
    pub fn get_all_pricing(&self) -> AllPricing {
        let data = read_shared(&self.calculator).get_all_pricing();
        let count = data.len();
        AllPricing { data, count }
    }

    /// Aggregate store/cache statistics.
    pub fn get_stats(&self) -> CalculatorStats {
        read_shared(&self.calculator).get_stats()
    }

    /// Current rates keyed by material.
    pub fn get_current_rates(&self) -> BTreeMap<Material, CurrentRate> {
        read_shared(&self.calculator).get_current_rates()
    }
}
