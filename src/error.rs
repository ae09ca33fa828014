use std::path::PathBuf;
use thiserror::Error;

use crate::transport::TransportOption;

/// The main error type for dap4link operations.
///
/// Callers get a distinguishable kind for every failure class so they can
/// decide whether a failure is retryable (e.g. a fetch timeout) or
/// configuration-fixable (e.g. an unreadable cookie jar).
#[derive(Debug, Error)]
pub enum Dap4Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed source URL '{url}': {source}")]
    UrlParse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Constraint expression '{expression}' supplied for unconstrainable scheme '{scheme}'")]
    ConstraintConflict { scheme: String, expression: String },

    #[error("Failed to apply transport option {option:?}: {message}")]
    TransportConfig {
        option: TransportOption,
        message: String,
    },

    #[error("Manifest fetch from {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Failed to decode manifest ({length} bytes): {message}")]
    ManifestDecode { length: usize, message: String },

    #[error("Failed to build metadata substrate '{name}': {message}")]
    SubstrateBuild { name: String, message: String },

    #[error("Resource failure on {path}: {message}")]
    Resource { path: PathBuf, message: String },

    #[error("Session is already closed")]
    AlreadyClosed,

    #[error("Failed to render report as JSON: {0}")]
    Render(#[from] serde_json::Error),
}
