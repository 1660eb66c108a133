//! Versioned per-material rate quotes
//!
//! A `Rate` is a price-per-gram quote for one material. Producers stamp each
//! quote with a monotonically increasing `rate_version` (millisecond epoch by
//! convention) that the store uses as a logical clock to reject out-of-order
//! and redelivered updates.

use crate::material::Material;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "VND".to_string()
}

/// Price-per-gram quote for one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// Material this quote applies to
    pub material: Material,
    /// Price per gram, currency-denominated
    pub rate: Decimal,
    /// Denominating currency
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Producer-assigned logical clock; only the highest version observed
    /// per material is ever retained
    pub rate_version: i64,
    /// Point in time the quote was issued
    pub timestamp: DateTime<Utc>,
}

impl Rate {
    /// Create a new VND-denominated rate quote.
    pub fn new(
        material: Material,
        rate: Decimal,
        rate_version: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            material,
            rate,
            currency: default_currency(),
            rate_version,
            timestamp,
        }
    }
}
