//! Seen-ledger persistence.
//!
//! The ledger records every article that has already been reported (or
//! seeded) so later runs only mail what is genuinely new.
//!
//! ## Schema
//!
//! ```text
//! seen(source TEXT, article_id TEXT, title TEXT, first_seen_ts INTEGER,
//!      PRIMARY KEY(source, article_id))
//! ```
//!
//! Databases written by the single-source mailer lack the `source` column;
//! they are upgraded in place on startup (see [`schema`]).

pub mod schema;
pub mod sqlite;

use crate::error::Result;
use crate::models::Article;

// Re-export for convenience
pub use schema::SchemaVersion;
pub use sqlite::SqliteLedger;

/// Trait for seen-ledger backends.
///
/// Inserts are insert-if-absent: an existing `(source, article_id)` row is
/// never overwritten.
pub trait Ledger: Send + Sync {
    /// Whether the article was recorded before.
    fn is_seen(&self, source: &str, article_id: &str) -> Result<bool>;

    /// Record one article. Returns `false` if it was already present.
    fn mark_seen(&self, source: &str, article_id: &str, title: &str) -> Result<bool>;

    /// Record a batch of articles in a single transaction.
    ///
    /// Returns the number of rows actually inserted.
    fn mark_all_seen(&self, source: &str, articles: &[Article]) -> Result<usize>;
}
