//! RoboDigest Common Library
//!
//! Shared code for the ingestion pipeline and the HTTP edge:
//! - Canonical records and the embodied-AI taxonomy
//! - Keyword classifier and fuzzy-title dedup
//! - `Store` trait with in-memory and SeaORM backends
//! - Shared fetch progress state
//! - Error types, configuration and metrics

pub mod classifier;
pub mod config;
pub mod db;
pub mod dedup;
pub mod errors;
pub mod kind;
pub mod metrics;
pub mod progress;
pub mod records;
pub mod store;
pub mod taxonomy;

// Re-export commonly used types
pub use classifier::Classifier;
pub use config::{AppConfig, FetchConfig};
pub use errors::{AppError, Result};
pub use kind::SourceKind;
pub use progress::{ProgressHub, ProgressSnapshot, RunStatus};
pub use records::CanonicalRecord;
pub use store::{SharedStore, Store, UpsertOutcome};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
