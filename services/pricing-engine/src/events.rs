//! Wire contract for the pricing engine
//!
//! Inbound, the engine consumes three logical message kinds from the update
//! transport, addressed by topic and keyed by material or SKU:
//!
//! - `rates` (key: material) — a rate quote payload
//! - `weights` (key: SKU) — a product composition payload
//! - `pricing.snapshot` (key: SKU) — an externally-computed snapshot from a
//!   peer aggregator
//!
//! `parse_update` validates required fields, fills defaults, tolerates
//! unknown extra fields, and maps every unrecognizable shape to
//! `EventParseError` — malformed messages are a logged, dropped, normal
//! occurrence, never a crash.
//!
//! Outbound, `PricingEvent` is the tagged payload pushed to subscribers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::errors::EventParseError;
use types::ids::Sku;
use types::material::Material;
use types::rate::Rate;
use types::snapshot::PricingSnapshot;
use types::weights::ProductWeights;

/// Inbound topic names, as published by the upstream producers.
pub mod topics {
    pub const RATES: &str = "rates";
    pub const WEIGHTS: &str = "weights";
    pub const PRICING_SNAPSHOT: &str = "pricing.snapshot";
}

/// Transport-agnostic inbound message shape: topic, optional key, raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Value,
}

/// Validated inbound update event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    Rate(Rate),
    Weights(ProductWeights),
    Snapshot(PricingSnapshot),
}

impl UpdateEvent {
    /// Get the event kind as a string label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            UpdateEvent::Rate(_) => "Rate",
            UpdateEvent::Weights(_) => "Weights",
            UpdateEvent::Snapshot(_) => "Snapshot",
        }
    }
}

/// Raw `rates` payload; the material rides in the message key.
#[derive(Debug, Deserialize)]
struct RatePayload {
    rate: Decimal,
    #[serde(default)]
    currency: Option<String>,
    rate_version: i64,
    timestamp: DateTime<Utc>,
}

/// Raw `weights` payload; the SKU rides in the message key.
#[derive(Debug, Deserialize)]
struct WeightsPayload {
    material: Material,
    weight_gram: Decimal,
    #[serde(default)]
    stone_weight: Decimal,
    #[serde(default)]
    labor_cost: Decimal,
    #[serde(default)]
    markup_percent: Decimal,
    weights_version: i64,
    timestamp: DateTime<Utc>,
}

/// Raw `pricing.snapshot` payload; the SKU may ride in the payload or fall
/// back to the message key.
#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    #[serde(default)]
    sku: Option<Sku>,
    material: Material,
    weight_gram: Decimal,
    #[serde(default)]
    stone_weight: Decimal,
    #[serde(default)]
    labor_cost: Decimal,
    #[serde(default)]
    markup_percent: Decimal,
    rate_used: Decimal,
    base_price: Decimal,
    final_price: Decimal,
    snapshot_version: i64,
    #[serde(default = "default_ttl")]
    ttl_sec: i64,
    as_of: DateTime<Utc>,
}

fn default_ttl() -> i64 {
    types::snapshot::DEFAULT_TTL_SEC
}

/// Parse and validate an inbound envelope into a typed update event.
pub fn parse_update(envelope: &UpdateEnvelope) -> Result<UpdateEvent, EventParseError> {
    match envelope.topic.as_str() {
        topics::RATES => parse_rate(envelope),
        topics::WEIGHTS => parse_weights(envelope),
        topics::PRICING_SNAPSHOT => parse_snapshot(envelope),
        other => Err(EventParseError::UnknownTopic(other.to_string())),
    }
}

fn require_key<'a>(envelope: &'a UpdateEnvelope) -> Result<&'a str, EventParseError> {
    envelope
        .key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| EventParseError::MissingKey {
            topic: envelope.topic.clone(),
        })
}

fn parse_rate(envelope: &UpdateEnvelope) -> Result<UpdateEvent, EventParseError> {
    let key = require_key(envelope)?;
    let material =
        Material::parse(key).ok_or_else(|| EventParseError::UnknownMaterial(key.to_string()))?;

    let payload: RatePayload = serde_json::from_value(envelope.payload.clone())
        .map_err(|e| EventParseError::InvalidPayload(e.to_string()))?;

    if payload.rate <= Decimal::ZERO {
        return Err(EventParseError::InvalidField {
            field: "rate",
            reason: format!("must be positive, got {}", payload.rate),
        });
    }

    let mut rate = Rate::new(material, payload.rate, payload.rate_version, payload.timestamp);
    if let Some(currency) = payload.currency {
        rate.currency = currency;
    }
    Ok(UpdateEvent::Rate(rate))
}

fn parse_weights(envelope: &UpdateEnvelope) -> Result<UpdateEvent, EventParseError> {
    let key = require_key(envelope)?;
    let sku = Sku::try_new(key).ok_or_else(|| EventParseError::MissingKey {
        topic: envelope.topic.clone(),
    })?;

    let payload: WeightsPayload = serde_json::from_value(envelope.payload.clone())
        .map_err(|e| EventParseError::InvalidPayload(e.to_string()))?;

    if payload.weight_gram < Decimal::ZERO {
        return Err(EventParseError::InvalidField {
            field: "weight_gram",
            reason: format!("must be non-negative, got {}", payload.weight_gram),
        });
    }
    if payload.stone_weight < Decimal::ZERO {
        return Err(EventParseError::InvalidField {
            field: "stone_weight",
            reason: format!("must be non-negative, got {}", payload.stone_weight),
        });
    }
    if payload.markup_percent < Decimal::ZERO {
        return Err(EventParseError::InvalidField {
            field: "markup_percent",
            reason: format!("must be non-negative, got {}", payload.markup_percent),
        });
    }
    // Negative labor cost is tolerated here; the price clamp bounds it.

    Ok(UpdateEvent::Weights(ProductWeights {
        sku,
        material: payload.material,
        weight_gram: payload.weight_gram,
        stone_weight: payload.stone_weight,
        labor_cost: payload.labor_cost,
        markup_percent: payload.markup_percent,
        weights_version: payload.weights_version,
        timestamp: payload.timestamp,
    }))
}

fn parse_snapshot(envelope: &UpdateEnvelope) -> Result<UpdateEvent, EventParseError> {
    let payload: SnapshotPayload = serde_json::from_value(envelope.payload.clone())
        .map_err(|e| EventParseError::InvalidPayload(e.to_string()))?;

    let sku = match payload.sku {
        Some(sku) => sku,
        None => {
            let key = require_key(envelope)?;
            Sku::try_new(key).ok_or_else(|| EventParseError::MissingKey {
                topic: envelope.topic.clone(),
            })?
        }
    };

    Ok(UpdateEvent::Snapshot(PricingSnapshot {
        sku,
        material: payload.material,
        weight_gram: payload.weight_gram,
        stone_weight: payload.stone_weight,
        labor_cost: payload.labor_cost,
        markup_percent: payload.markup_percent,
        rate_used: payload.rate_used,
        base_price: payload.base_price,
        final_price: payload.final_price,
        snapshot_version: payload.snapshot_version,
        ttl_sec: payload.ttl_sec,
        as_of: payload.as_of,
    }))
}

/// Outbound change event pushed to subscribers.
///
/// Per-subscriber ordering matches publish order; there is no global
/// sequencing across SKUs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PricingEvent {
    /// One-time event on subscribe carrying the full current snapshot dump.
    Connected {
        pricing: BTreeMap<Sku, PricingSnapshot>,
        timestamp: DateTime<Utc>,
    },
    /// A SKU's snapshot changed.
    PricingUpdate {
        sku: Sku,
        pricing: PricingSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// Synthetic liveness signal for idle channels.
    Keepalive { timestamp: DateTime<Utc> },
}

impl PricingEvent {
    /// Get the event kind as a string label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            PricingEvent::Connected { .. } => "connected",
            PricingEvent::PricingUpdate { .. } => "pricing_update",
            PricingEvent::Keepalive { .. } => "keepalive",
        }
    }
}
