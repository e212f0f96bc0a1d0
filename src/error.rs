//! Error types for the media preprocessor.

use std::path::PathBuf;

use crate::pipeline::options::UploadField;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required cloud upload option: {field}. Set {} to override.", .field.env_var())]
    MissingField { field: UploadField },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while transforming a single message.
///
/// None of these escape `Preprocessor::process`; they are logged and the
/// message is passed through.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Cloud upload is not configured")]
    NotConfigured,

    #[error("Message sent by the host account and host uploads are ignored")]
    HostAccountIgnored,

    #[error("Upload options invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Media decryption failed for {id}: {reason}")]
    Decrypt { id: String, reason: String },

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Failed to write {path}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to enqueue upload of {filename}: {reason}")]
    Enqueue { filename: String, reason: String },

    #[error("Upload of {filename} failed: {reason}")]
    Upload { filename: String, reason: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
