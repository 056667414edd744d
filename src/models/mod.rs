// src/models/mod.rs

//! Domain models for the notice mailer.
//!
//! This module contains the data structures shared by the pipeline,
//! organized by their primary purpose.

mod article;
mod config;

// Re-export all public types
pub use article::{Article, SeenRecord};
pub use config::{
    Config, CrawlerConfig, ExtractionConfig, HostParam, LedgerConfig, MailConfig,
    PaginationConfig, SourceConfig, TlsConfig, TlsVersion,
};
