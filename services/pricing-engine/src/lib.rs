//! Real-time Pricing Engine
//!
//! Consumes rate, product-weights, and peer-snapshot updates and produces:
//! - A versioned current-state store (one rate per material, one set of
//!   weights per SKU) with out-of-order rejection
//! - Recomputed pricing snapshots with TTL-based expiry
//! - Change-event fan-out to an open-ended set of push subscribers
//! - A synchronous query path with offline strategies for expired data
//!
//! # Architecture
//!
//! ```text
//!  Update transport (rates / weights / peer snapshots)
//!        │
//!    ┌───▼────┐
//!    │Consumer│  ← cancellable poll loop, sole writer
//!    └───┬────┘
//!        │
//!    ┌───▼────┐      ┌──────────────────┐
//!    │Ingester│─────▶│Calculator + Store│
//!    └───┬────┘      └────────▲─────────┘
//!        │                    │ reads
//!    ┌───▼─────────┐    ┌─────┴───────┐
//!    │ Broadcaster │    │Query Service│
//!    └─────────────┘    └─────────────┘
//! ```

pub mod broadcast;
pub mod calculator;
pub mod consumer;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod query;
pub mod store;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
