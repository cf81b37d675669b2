//! Session gate: the store that owns the canonical feed list.
//!
//! Every call carries the admin secret; a mismatch is rejected with
//! [`GateError::Unauthorized`] and there is no other authorization state.
//!
//! - [`http`] - Remote store reached over HTTP (`reqwest`)
//! - [`local`] - SQLite-backed store (`storage::Database`)

pub mod http;
pub mod local;

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashSet;
use thiserror::Error;

use crate::categories::path::{sanitize_category, strip_control_chars};
use crate::feed::FeedRecord;

pub use http::HttpGate;
pub use local::LocalGate;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum GateError {
    /// Rejected before any call was made.
    #[error("Invalid feed: {0}")]
    Validation(String),

    #[error("Unauthorized: the admin secret was rejected")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    Status(u16),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,

    /// A write failed and reloading the saved order failed as well.
    #[error("{write}; reloading the saved order also failed: {reload}")]
    Rollback {
        write: Box<GateError>,
        reload: Box<GateError>,
    },
}

impl GateError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        GateError::Storage(err.to_string())
    }

    /// Failures that say nothing about the stored data and warrant a reload.
    pub fn is_transient(&self) -> bool {
        match self {
            GateError::Network(_) | GateError::Status(_) | GateError::Storage(_) => true,
            GateError::Rollback { .. } => true,
            GateError::Validation(_) | GateError::Unauthorized | GateError::InsecureBaseUrl => false,
        }
    }
}

// ============================================================================
// Gate Contract
// ============================================================================

/// Operations the canonical store exposes.
///
/// `reorder` receives the complete desired order and replaces the stored
/// order wholesale. `upsert` never changes a record's position.
#[async_trait]
pub trait SessionGate: Send + Sync {
    /// Canonical flat list, in stored order.
    async fn list(&self, secret: &SecretString) -> Result<Vec<FeedRecord>, GateError>;

    /// Create or update one record.
    async fn upsert(&self, record: &FeedRecord, secret: &SecretString) -> Result<(), GateError>;

    async fn remove(&self, id: &str, secret: &SecretString) -> Result<(), GateError>;

    /// Replace the stored order with `ids`.
    async fn reorder(&self, ids: &[String], secret: &SecretString) -> Result<(), GateError>;
}

// ============================================================================
// Validation
// ============================================================================

/// Check required fields and normalize a record before it is sent.
///
/// The store does not normalize, so category paths are cleaned here: control
/// characters stripped, empty segments and stray separators removed.
pub fn validate_record(record: FeedRecord) -> Result<FeedRecord, GateError> {
    let id = record.id.trim();
    if id.is_empty() {
        return Err(GateError::Validation("id is required".into()));
    }

    let url = record.url.trim();
    if url.is_empty() {
        return Err(GateError::Validation("url is required".into()));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| GateError::Validation(format!("url '{}' is not valid: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GateError::Validation(format!(
            "url scheme '{}' is not supported (only http/https)",
            parsed.scheme()
        )));
    }

    let custom_title = record
        .custom_title
        .as_deref()
        .map(|title| strip_control_chars(title).trim().to_owned())
        .filter(|title| !title.is_empty());

    Ok(FeedRecord {
        id: id.to_owned(),
        url: url.to_owned(),
        category: record.category.as_deref().and_then(sanitize_category),
        custom_title,
        is_sub: record.is_sub,
    })
}

/// Check an order write: ids must be non-empty and unique.
pub fn validate_order(ids: &[String]) -> Result<(), GateError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if id.trim().is_empty() {
            return Err(GateError::Validation("order contains an empty id".into()));
        }
        if !seen.insert(id.as_str()) {
            return Err(GateError::Validation(format!(
                "order lists id '{}' more than once",
                id
            )));
        }
    }
    Ok(())
}
