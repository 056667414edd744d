// src/pipeline/run.rs

//! Sequential run over all sources.

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::notify::Notifier;
use crate::storage::Ledger;
use crate::utils::http::Fetcher;

use super::detect::{SourceOutcome, run_source};

/// Fail unless at least one source has a listing URL.
pub fn ensure_sources(config: &Config) -> Result<()> {
    if config.configured_sources().next().is_none() {
        return Err(AppError::NoSources);
    }
    Ok(())
}

/// Run every source in configuration order.
///
/// A failing source is logged and the remaining sources still run; the
/// failures are reported together at the end.
pub async fn run_all(
    config: &Config,
    fetcher: &dyn Fetcher,
    ledger: &dyn Ledger,
    notifier: &dyn Notifier,
) -> Result<Vec<(String, SourceOutcome)>> {
    ensure_sources(config)?;

    let mut outcomes = Vec::with_capacity(config.sources.len());
    let mut failed = Vec::new();

    for source in &config.sources {
        match run_source(config, source, fetcher, ledger, notifier).await {
            Ok(outcome) => outcomes.push((source.key.clone(), outcome)),
            Err(e) => {
                log::error!("[{}] Run failed: {}", source.key, e);
                failed.push(source.key.clone());
            }
        }
    }

    if !failed.is_empty() {
        return Err(AppError::SourcesFailed { failed });
    }
    Ok(outcomes)
}
