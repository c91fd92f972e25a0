//! Error types for geoquery.

use geoquery_types::InvalidLocation;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoQueryError>;

/// Errors reported by a backing store.
///
/// These reach application code through `GeoQueryEventListener::on_query_error`
/// when they happen on a subscription, or as a returned error from writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store disconnected")]
    Disconnected,

    #[error("Store error: {0}")]
    Other(String),
}

/// Main error type.
#[derive(Debug, Clone, Error)]
pub enum GeoQueryError {
    /// Caller supplied bad input or misused the listener protocol.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant was broken. Indicates a bug, not bad input.
    #[error("Logic error: {0}")]
    Logic(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GeoQueryError {
    /// Whether this error came from the backing store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, GeoQueryError::Store(_))
    }
}

impl From<InvalidLocation> for GeoQueryError {
    fn from(err: InvalidLocation) -> Self {
        GeoQueryError::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for GeoQueryError {
    fn from(err: serde_json::Error) -> Self {
        GeoQueryError::Config(err.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for GeoQueryError {
    fn from(err: toml::de::Error) -> Self {
        GeoQueryError::Config(err.to_string())
    }
}
