// src/services/articles.rs

//! Article extraction from listing pages.
//!
//! Each anchor is tried against two strategies: script-triggered navigation
//! (a no-op href with the board id passed to an `onclick` handler) and a
//! regex search over the raw href.

use std::collections::HashMap;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Article, ExtractionConfig};
use crate::utils::{normalize_whitespace, resolve_url};

const SCRIPT_CALL: &str = r#"[A-Za-z_$][\w$.]*\s*\(\s*['"]?(\d+)['"]?\s*[,)]"#;
const ROW_DATE: &str = r"\d{4}[-./]\d{1,2}[-./]\d{1,2}";

/// Result of classifying one anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    NoMatch,
    Matched { id: String, href: String },
}

/// Articles keyed by id.
///
/// Re-inserting an id replaces its values but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct ArticleSet {
    articles: Vec<Article>,
    index: HashMap<String, usize>,
}

impl ArticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, article: Article) {
        match self.index.get(&article.article_id) {
            Some(&pos) => self.articles[pos] = article,
            None => {
                self.index
                    .insert(article.article_id.clone(), self.articles.len());
                self.articles.push(article);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.articles.iter()
    }

    pub fn into_vec(self) -> Vec<Article> {
        self.articles
    }
}

impl Extend<Article> for ArticleSet {
    fn extend<I: IntoIterator<Item = Article>>(&mut self, iter: I) {
        for article in iter {
            self.insert(article);
        }
    }
}

impl FromIterator<Article> for ArticleSet {
    fn from_iter<I: IntoIterator<Item = Article>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Extracts articles for one source.
pub struct ArticleExtractor {
    id_pattern: Regex,
    base_url: Url,
    config: ExtractionConfig,
    script_call: Regex,
    row_date: Regex,
    anchor_selector: Selector,
    cell_selector: Selector,
}

impl ArticleExtractor {
    pub fn new(id_pattern: Regex, base_url: &str, config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            id_pattern,
            base_url: Url::parse(base_url)?,
            config: config.clone(),
            script_call: Regex::new(SCRIPT_CALL)?,
            row_date: Regex::new(ROW_DATE)?,
            anchor_selector: parse_selector("a[href]")?,
            cell_selector: parse_selector("td")?,
        })
    }

    /// Extract the deduplicated articles of one page, in document order.
    ///
    /// `listing_url` supplies the query parameters carried onto synthesized
    /// detail links.
    pub fn extract(&self, markup: &str, listing_url: Option<&Url>) -> ArticleSet {
        let document = Html::parse_document(markup);
        let mut articles = ArticleSet::new();

        for anchor in document.select(&self.anchor_selector) {
            let Extraction::Matched { id, href } = self.classify(&anchor, listing_url) else {
                continue;
            };

            let text: String = anchor.text().collect();
            let mut title = normalize_whitespace(&text);
            if title.is_empty() {
                title = self.config.untitled.clone();
            }

            articles.insert(Article {
                article_id: id,
                title,
                href,
                date: self.row_date(&anchor),
            });
        }

        articles
    }

    /// Apply the extraction strategies to one anchor.
    pub fn classify(&self, anchor: &ElementRef, listing_url: Option<&Url>) -> Extraction {
        let Some(raw_href) = anchor.value().attr("href") else {
            return Extraction::NoMatch;
        };

        if is_script_href(raw_href) {
            let scripted = anchor
                .value()
                .attr("onclick")
                .and_then(|handler| self.script_call.captures(handler))
                .and_then(|caps| caps.get(1))
                .and_then(|m| self.script_target(m.as_str(), listing_url));
            if let Some(extraction) = scripted {
                return extraction;
            }
        }

        match self.id_pattern.captures(raw_href).and_then(|caps| caps.get(1)) {
            Some(m) => Extraction::Matched {
                id: m.as_str().to_string(),
                href: resolve_url(&self.base_url, raw_href),
            },
            None => Extraction::NoMatch,
        }
    }

    /// Build the detail link for an identifier passed to a script handler.
    ///
    /// An identifier too large for an integer is used as-is, without the
    /// offset.
    fn script_target(&self, raw: &str, listing_url: Option<&Url>) -> Option<Extraction> {
        let number = raw.parse::<i128>().ok();
        let raw_id = number.map_or_else(|| raw.to_string(), |n| n.to_string());
        let id = number
            .and_then(|n| n.checked_add(i128::from(self.config.id_offset)))
            .map_or_else(|| raw.to_string(), |n| n.to_string());

        let path = self
            .config
            .detail_path_template
            .replace("{id}", &id)
            .replace("{raw_id}", &raw_id);
        let mut href = self.base_url.join(&path).ok()?;

        let carried: Vec<(String, String)> = listing_url
            .map(|listing| {
                self.config
                    .carry_params
                    .iter()
                    .filter_map(|name| {
                        listing
                            .query_pairs()
                            .find(|(key, _)| key == name.as_str())
                            .map(|(_, value)| (name.clone(), value.into_owned()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if !carried.is_empty() {
            href.query_pairs_mut().extend_pairs(carried);
        }

        Some(Extraction::Matched {
            id,
            href: href.to_string(),
        })
    }

    /// Text of the last date-like cell in the enclosing table row.
    fn row_date(&self, anchor: &ElementRef) -> String {
        let Some(row) = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "tr")
        else {
            return String::new();
        };

        let cells: Vec<String> = row
            .select(&self.cell_selector)
            .map(|td| normalize_whitespace(&td.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect();

        cells
            .into_iter()
            .rev()
            .find(|text| self.row_date.is_match(text))
            .unwrap_or_default()
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::config(format!("invalid selector {s:?}: {e:?}")))
}

/// `#`, `javascript:`, `javascript:;` and `javascript:void(0)`.
fn is_script_href(href: &str) -> bool {
    let href = href.trim().to_ascii_lowercase();
    if href == "#" {
        return true;
    }
    match href.strip_prefix("javascript:") {
        Some(rest) => {
            let rest = rest.trim().trim_end_matches(';').trim();
            rest.is_empty() || rest == "void(0)"
        }
        None => false,
    }
}
