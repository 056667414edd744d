// src/error.rs

//! Unified error handling for the notice mailer.

use std::fmt;

use thiserror::Error;

/// Result type alias for mailer operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed (after retries are exhausted)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ledger storage failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Article regex failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No source has a listing URL configured
    #[error("No source has a listing URL configured")]
    NoSources,

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ledger schema is in a shape that cannot be migrated
    #[error("Ledger migration failed: {0}")]
    Migration(String),

    /// Digest delivery failed
    #[error("Notification failed: {0}")]
    Notification(String),

    /// One or more sources failed during a run
    #[error("Run failed for source(s): {}", failed.join(", "))]
    SourcesFailed { failed: Vec<String> },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a ledger migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration(message.into())
    }

    /// Create a notification error from any displayable cause.
    pub fn notification(message: impl fmt::Display) -> Self {
        Self::Notification(message.to_string())
    }
}
