//! Test doubles for the fetcher and notifier seams.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::notify::{Digest, Notifier};
use crate::utils::http::Fetcher;

/// Serves canned bodies by URL and records every request.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::config(format!("no page for {url}")))
    }
}

/// Records digests; fails every call when `fail` is set.
#[derive(Default)]
pub struct FakeNotifier {
    fail: bool,
    pub sent: Mutex<Vec<Digest>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Digest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, digest: &Digest) -> Result<()> {
        if self.fail {
            return Err(AppError::notification("smtp unavailable"));
        }
        self.sent.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

/// Listing markup with one anchor per id, in the given order.
pub fn listing(ids: &[&str]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td><a href="/bbs/csai/4929/{id}/artclView.do">notice {id}</a></td><td>2024.03.05</td></tr>"#
            )
        })
        .collect();
    format!("<html><body><table>{rows}</table></body></html>")
}
