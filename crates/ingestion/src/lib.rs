//! RoboDigest ingestion
//!
//! Source adapters, the per-kind fetch pass, citation enrichment and
//! the scheduler that keeps at most one pass in flight. [`Aggregator`]
//! is the entry point used by both binaries.

pub mod enricher;
pub mod errors;
pub mod fetcher;
pub mod http;
pub mod ratelimit;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod telemetry;

pub use enricher::{EnrichSummary, Enricher};
pub use errors::FetchError;
pub use fetcher::{FetchSummary, Fetcher};
pub use scheduler::{Pipeline, Scheduler, TriggerError};
pub use service::{Aggregator, ItemKind, Items, TriggerResponse};
