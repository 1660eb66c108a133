//! Unique identifier types for pricing entities
//!
//! Products are keyed by their stock keeping unit (SKU) as assigned by the
//! upstream catalog; the pricing system never generates identifiers itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stock keeping unit identifying one sellable product
///
/// Opaque, producer-assigned string (e.g. "RING_GOLD_001"). The pricing
/// system treats it purely as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Create a new Sku from a string
    ///
    /// # Panics
    /// Panics if the string is empty
    pub fn new(sku: impl Into<String>) -> Self {
        let s = sku.into();
        assert!(!s.is_empty(), "Sku must not be empty");
        Self(s)
    }

    /// Try to create a Sku, returning None if empty
    pub fn try_new(sku: impl Into<String>) -> Option<Self> {
        let s = sku.into();
        if s.is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Get the SKU string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Sku {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
