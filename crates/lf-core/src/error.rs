//! Error types for lf-core

use thiserror::Error;

/// Core error type for Labelforge
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Invalid configuration value
    #[error("[C002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C003: Split ratio does not add up
    #[error("[C003] Invalid split ratio {train}/{dev}/{test}: {reason}")]
    InvalidRatio {
        train: u32,
        dev: u32,
        test: u32,
        reason: String,
    },

    /// C004: Unknown split value
    #[error("[C004] Unknown split '{value}': expected training, dev, test, or empty")]
    InvalidSplit { value: String },

    /// C005: Unknown status discriminator read back from storage
    #[error("[C005] Unknown {kind} '{value}'")]
    UnknownDiscriminator { kind: &'static str, value: String },

    /// C006: Malformed JSON parameter
    #[error("[C006] Malformed {field}: {message}")]
    MalformedJson { field: String, message: String },

    /// C007: Label geometry that cannot be normalized
    #[error("[C007] Invalid label position: {message}")]
    InvalidGeometry { message: String },

    /// C008: IO error with file path context
    #[error("[C008] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C009: YAML parse error
    #[error("[C009] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
