//! Error types for compose-config

use std::path::PathBuf;

/// Result type for compose-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading override manifests
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest is not valid TOML or has the wrong shape
    #[error("failed to parse override manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    /// An `[extensions."name"]` entry is not a table
    #[error("invalid override for extension '{extension}': {reason}")]
    InvalidOverride { extension: String, reason: String },

    /// A manifest file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Applying the overrides to a composer failed
    #[error(transparent)]
    Core(#[from] compose_core::Error),
}
