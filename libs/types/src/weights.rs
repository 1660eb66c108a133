//! Versioned per-SKU product composition
//!
//! `ProductWeights` captures the physical and cost composition of one SKU:
//! primary material weight, stone weight, flat labor cost, and the percentage
//! markup applied on top of the base price. Like rates, weights carry a
//! producer-assigned version used to discard out-of-order updates.

use crate::ids::Sku;
use crate::material::Material;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Physical/cost composition of one SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductWeights {
    /// Product identifier
    pub sku: Sku,
    /// Material the primary weight is priced against
    pub material: Material,
    /// Primary material weight in grams
    pub weight_gram: Decimal,
    /// Stone weight in grams (not priced, carried for display)
    #[serde(default)]
    pub stone_weight: Decimal,
    /// Flat additive labor cost
    #[serde(default)]
    pub labor_cost: Decimal,
    /// Percentage added on top of the base price
    #[serde(default)]
    pub markup_percent: Decimal,
    /// Producer-assigned logical clock, per SKU
    pub weights_version: i64,
    /// Point in time the composition was issued
    pub timestamp: DateTime<Utc>,
}
