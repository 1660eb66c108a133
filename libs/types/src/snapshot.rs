//! Computed pricing snapshots with expiry metadata
//!
//! A `PricingSnapshot` is the derived, cached pricing result for one SKU at a
//! point in time. It copies the inputs it was computed from, carries a
//! per-SKU monotonic `snapshot_version` so duplicate or late snapshots from
//! external producers can be rejected, and reports expiry against its TTL.
//!
//! `OfflineStrategy` is the policy a query applies when only an expired
//! snapshot is available.

use crate::ids::Sku;
use crate::material::Material;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default snapshot validity window in seconds.
pub const DEFAULT_TTL_SEC: i64 = 300;

fn default_ttl() -> i64 {
    DEFAULT_TTL_SEC
}

/// Derived pricing result for one SKU
///
/// Never partially mutated: recomputation replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    /// Product identifier
    pub sku: Sku,
    /// Material the price was computed against
    pub material: Material,
    /// Primary material weight used (grams)
    pub weight_gram: Decimal,
    /// Stone weight carried from the composition (grams)
    #[serde(default)]
    pub stone_weight: Decimal,
    /// Flat labor cost used
    #[serde(default)]
    pub labor_cost: Decimal,
    /// Markup percentage used
    #[serde(default)]
    pub markup_percent: Decimal,
    /// Rate value applied (price per gram)
    pub rate_used: Decimal,
    /// `rate_used * weight_gram + labor_cost`, clamped at zero
    pub base_price: Decimal,
    /// `base_price * (1 + markup_percent / 100)`
    pub final_price: Decimal,
    /// Per-SKU logical clock for this computation
    pub snapshot_version: i64,
    /// Validity window in seconds
    #[serde(default = "default_ttl")]
    pub ttl_sec: i64,
    /// Point in time the snapshot was computed
    pub as_of: DateTime<Utc>,
}

impl PricingSnapshot {
    /// Whether the snapshot has outlived its TTL as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.as_of).num_milliseconds() > self.ttl_sec * 1000
    }

    /// Whether the snapshot has outlived its TTL as of the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Policy applied when a query finds only an expired snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineStrategy {
    /// Return the last known snapshot unmodified
    #[default]
    Freeze,
    /// Return the last known snapshot with a fixed penalty on the final price
    Surcharge,
    /// Treat expired data as a failure; do not return a price
    Deny,
}

impl OfflineStrategy {
    /// Parse a wire-form strategy string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "freeze" => Some(OfflineStrategy::Freeze),
            "surcharge" => Some(OfflineStrategy::Surcharge),
            "deny" => Some(OfflineStrategy::Deny),
            _ => None,
        }
    }

    /// Wire-form string for this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfflineStrategy::Freeze => "freeze",
            OfflineStrategy::Surcharge => "surcharge",
            OfflineStrategy::Deny => "deny",
        }
    }
}
