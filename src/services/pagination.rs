//! Listing page planner.
//!
//! Boards disagree on the query parameter that carries the page number, so
//! the planner reuses whatever the configured listing URL already has,
//! otherwise falls back to a host rule or the default name.

use url::Url;

use crate::error::Result;
use crate::models::{HostParam, PaginationConfig};

/// Page parameter chosen for a listing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParam {
    pub name: String,
    pub start: i64,
}

/// Plans the page URLs fetched for one listing URL.
#[derive(Debug, Clone)]
pub struct PaginationPlanner {
    page_params: Vec<String>,
    default_param: String,
    host_params: Vec<HostParam>,
    pages: u32,
}

impl PaginationPlanner {
    /// Create a planner emitting `pages` URLs per listing.
    pub fn new(config: &PaginationConfig, pages: u32) -> Self {
        Self {
            page_params: config.page_params.clone(),
            default_param: config.default_param.clone(),
            host_params: config.host_params.clone(),
            pages,
        }
    }

    /// Decide the page parameter and first page for `url`.
    pub fn page_param(&self, url: &Url) -> PageParam {
        for name in &self.page_params {
            if let Some((_, value)) = url.query_pairs().find(|(key, _)| key == name.as_str()) {
                return PageParam {
                    name: name.clone(),
                    start: value.trim().parse().unwrap_or(1),
                };
            }
        }

        let host = url.host_str().unwrap_or_default();
        let name = self
            .host_params
            .iter()
            .find(|rule| rule.host.eq_ignore_ascii_case(host))
            .map(|rule| rule.param.clone())
            .unwrap_or_else(|| self.default_param.clone());

        PageParam { name, start: 1 }
    }

    /// URLs to fetch for `list_url`, in page order.
    pub fn plan(&self, list_url: &str) -> Result<Vec<String>> {
        let url = Url::parse(list_url)?;
        let param = self.page_param(&url);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        let urls = (0..i64::from(self.pages))
            .map(|offset| {
                let page = (param.start + offset).to_string();
                let mut page_url = url.clone();
                page_url
                    .query_pairs_mut()
                    .clear()
                    .extend_pairs(with_page(&pairs, &param.name, &page));
                page_url.to_string()
            })
            .collect();

        Ok(urls)
    }
}

/// Set `name` to `page`, keeping the position of its first occurrence and
/// every other pair untouched.
fn with_page(pairs: &[(String, String)], name: &str, page: &str) -> Vec<(String, String)> {
    let mut placed = false;
    let mut result = Vec::with_capacity(pairs.len() + 1);

    for (key, value) in pairs {
        if key == name {
            if !placed {
                result.push((key.clone(), page.to_string()));
                placed = true;
            }
        } else {
            result.push((key.clone(), value.clone()));
        }
    }
    if !placed {
        result.push((name.to_string(), page.to_string()));
    }
    result
}
