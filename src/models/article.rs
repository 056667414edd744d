//! Article and seen-record data structures.

use serde::{Deserialize, Serialize};

/// A notice extracted from a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    /// Identifier unique within a source (opaque text)
    pub article_id: String,

    /// Display title, never empty
    pub title: String,

    /// Absolute URL to the notice
    pub href: String,

    /// Best-effort date text from the listing row, may be empty
    pub date: String,
}

impl Article {
    /// Sort key approximating publication order.
    ///
    /// Non-digits are stripped before the value is compared; an id without
    /// digits ranks as zero.
    pub fn recency_key(&self) -> (usize, String) {
        let digits: String = self
            .article_id
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let trimmed = digits.trim_start_matches('0');
        (trimmed.len(), trimmed.to_string())
    }
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRecord {
    pub source: String,
    pub article_id: String,
    pub title: String,
    /// Unix epoch seconds, UTC
    pub first_seen_ts: i64,
}
