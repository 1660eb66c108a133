//! Error types for the pricing service
//!
//! Comprehensive error taxonomy using thiserror. Staleness and "no data yet"
//! conditions are deliberately NOT errors anywhere in the system; only
//! genuinely exceptional conditions appear here.

use crate::ids::Sku;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Failure to turn an inbound update message into a typed event
///
/// Malformed events are logged and dropped by the ingestion layer; they never
/// abort the consume loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("missing message key for topic {topic}")]
    MissingKey { topic: String },

    #[error("unknown material: {0}")]
    UnknownMaterial(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Transport-level failures on the inbound update channel
///
/// Recoverable by design: the service degrades to serving the last known
/// cache; reconnection is the transport's responsibility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport connection failed: {0}")]
    ConnectionFailed(String),

    #[error("failed to publish update: {0}")]
    PublishFailed(String),

    #[error("transport closed")]
    Closed,
}

/// Typed failure surfaced by the pricing query service
///
/// Returned inside a structured response (callers check a success flag);
/// never thrown across the module boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("no pricing data for SKU: {0}")]
    NotFound(Sku),

    #[error("pricing data expired for SKU: {0}")]
    Expired(Sku),
}

impl Serialize for QueryError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
