//! API handlers module

pub mod fetch;
pub mod health;
pub mod listings;

use robodigest_common::{AppError, SourceKind};

/// Kind from a path segment; unknown names are a 400
pub(crate) fn parse_kind(raw: &str) -> Result<SourceKind, AppError> {
    raw.parse()
}
