//! Digest delivery.

mod email;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Article;

pub use email::{EmailNotifier, render_html, subject};

/// New articles of one source, ready to be delivered.
#[derive(Debug, Clone)]
pub struct Digest {
    pub subject_prefix: String,
    pub recipients: Vec<String>,
    /// Articles in presentation order
    pub articles: Vec<Article>,
}

/// Delivers a digest. An `Ok` return means the articles may be marked seen.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, digest: &Digest) -> Result<()>;
}

/// Stand-in used when delivery is not wanted (seed runs). Every call fails.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, digest: &Digest) -> Result<()> {
        Err(crate::error::AppError::notification(format!(
            "{} mail delivery is disabled",
            digest.subject_prefix
        )))
    }
}
