use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main library error type covering every failure the resolver surfaces as an error.
///
/// A lookup that simply finds nothing is not an error: the resolver roles return
/// `Ok(None)` and leave the decision to the caller.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Invalid base URI: {uri} - {details}")]
    InvalidBaseUri { uri: String, details: String },

    #[error("Invalid URI: {uri} - {details}")]
    InvalidUri { uri: String, details: String },

    #[error("Failed to open {system_id}: {details}")]
    Open { system_id: String, details: String },

    #[error("Unsupported URI scheme: {scheme} in {uri}")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transformer configuration error: {0}")]
    Transformer(String),
}

/// Catalog loading errors. All of them are fatal for resolver construction.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse catalog {location}: {details}")]
    Parse {
        location: String,
        details: String,
        /// 1-based line and column of the offending markup, when known
        position: Option<(u32, u32)>,
    },

    #[error("Failed to fetch catalog {location}: {details}")]
    Fetch { location: String, details: String },

    #[error("Catalog not found: {spec} (not a URL, packaged resource or file under {base_dir})")]
    NotFound { spec: String, base_dir: PathBuf },

    #[error("Invalid catalog entry in {location}: <{element}> {details}")]
    InvalidEntry {
        location: String,
        element: String,
        details: String,
    },

    #[error("Catalog nesting too deep at {location} (limit {limit})")]
    Recursion { location: String, limit: usize },
}

/// Convert ConfigError to ResolverError
impl From<ConfigError> for ResolverError {
    fn from(error: ConfigError) -> Self {
        ResolverError::Config(error.to_string())
    }
}

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Result type alias for catalog loading
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
