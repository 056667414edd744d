// src/pipeline/detect.rs

//! Per-source change detection.

use std::fmt;

use url::Url;

use crate::error::Result;
use crate::models::{Article, Config, SourceConfig};
use crate::notify::{Digest, Notifier};
use crate::services::{ArticleExtractor, ArticleSet, PaginationPlanner};
use crate::storage::Ledger;
use crate::utils::http::Fetcher;

/// What a source run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// No listing URL configured
    Skipped,
    /// Seed mode recorded `count` articles without notifying
    Seeded { count: usize },
    /// All `total` extracted articles were already seen
    Unchanged { total: usize },
    /// A digest of `count` new articles was delivered and recorded
    Notified { count: usize },
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Seeded { count } => write!(f, "seeded {count}"),
            Self::Unchanged { total } => write!(f, "no new articles ({total} seen)"),
            Self::Notified { count } => write!(f, "notified {count}"),
        }
    }
}

/// Run one source: fetch, extract, diff against the ledger, notify, record.
///
/// Articles are only recorded after the notifier succeeds, so a failed
/// delivery is retried on the next run.
pub async fn run_source(
    config: &Config,
    source: &SourceConfig,
    fetcher: &dyn Fetcher,
    ledger: &dyn Ledger,
    notifier: &dyn Notifier,
) -> Result<SourceOutcome> {
    let key = source.key.as_str();
    if !source.is_configured() {
        log::info!("[{key}] No listing URL configured, skipping");
        return Ok(SourceOutcome::Skipped);
    }

    log::info!("[{key}] Collecting listing pages");
    let articles = collect_articles(config, source, fetcher).await?.into_vec();

    if config.seed_mode {
        let inserted = ledger.mark_all_seen(key, &articles)?;
        log::info!(
            "[{key}] Seed mode: recorded {} article(s) as seen ({inserted} new), no mail sent",
            articles.len()
        );
        return Ok(SourceOutcome::Seeded {
            count: articles.len(),
        });
    }

    let total = articles.len();
    let mut fresh = Vec::new();
    for article in articles {
        if !ledger.is_seen(key, &article.article_id)? {
            fresh.push(article);
        }
    }

    if fresh.is_empty() {
        log::info!("[{key}] No new articles ({total} extracted)");
        return Ok(SourceOutcome::Unchanged { total });
    }

    order_newest_first(&mut fresh);
    let digest = Digest {
        subject_prefix: source.subject_prefix.clone(),
        recipients: source.recipients(&config.mail).to_vec(),
        articles: fresh,
    };
    notifier.notify(&digest).await?;
    ledger.mark_all_seen(key, &digest.articles)?;

    let count = digest.articles.len();
    log::info!("[{key}] Notified and recorded {count} new article(s)");
    Ok(SourceOutcome::Notified { count })
}

/// Fetch every planned page of every listing URL, in order.
async fn collect_articles(
    config: &Config,
    source: &SourceConfig,
    fetcher: &dyn Fetcher,
) -> Result<ArticleSet> {
    let extractor =
        ArticleExtractor::new(source.compile_regex()?, &source.base_url, &config.extraction)?;
    let planner = PaginationPlanner::new(&config.pagination, config.crawler.pages);

    let mut articles = ArticleSet::new();
    for list_url in source.list_urls.iter().filter(|u| !u.trim().is_empty()) {
        for page_url in planner.plan(list_url.trim())? {
            let body = fetcher.fetch(&page_url).await?;
            let page = Url::parse(&page_url)?;
            let found = extractor.extract(&body, Some(&page));
            log::debug!("[{}] {} article(s) on {}", source.key, found.len(), page_url);
            articles.extend(found.into_vec());
        }
    }
    Ok(articles)
}

/// Sort by the numeric value of each id, largest first. Ties keep their order.
pub fn order_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}
