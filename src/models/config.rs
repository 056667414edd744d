//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Record every extracted article as seen without sending mail
    #[serde(default)]
    pub seed_mode: bool,

    /// HTTP behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Page parameter selection rules
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Article extraction rules
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Seen-ledger location
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// SMTP settings
    #[serde(default)]
    pub mail: MailConfig,

    /// Notice board definitions
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or return defaults if the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config not found at {:?}. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path).map_err(|e| AppError::config(format!("{}: {e}", path.display())))
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("PAGES") {
            self.crawler.pages = parse_env("PAGES", &v)?;
        }
        if let Some(v) = get("USER_AGENT") {
            self.crawler.user_agent = v;
        }
        if let Some(v) = get("RETRY") {
            self.crawler.retry = parse_env("RETRY", &v)?;
        }
        if let Some(v) = get("CONNECT_TIMEOUT") {
            self.crawler.connect_timeout_secs = parse_env("CONNECT_TIMEOUT", &v)?;
        }
        if let Some(v) = get("READ_TIMEOUT") {
            self.crawler.read_timeout_secs = parse_env("READ_TIMEOUT", &v)?;
        }
        if let Some(v) = get("SEED_MODE") {
            self.seed_mode = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("TLS_COMPAT") {
            self.crawler.tls.legacy_compat = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("TLS_LEGACY_HOSTS") {
            self.crawler.tls.legacy_hosts = split_list(&v);
        }
        if let Some(v) = get("DB_PATH") {
            self.ledger.path = v;
        }

        if let Some(v) = get("SMTP_HOST") {
            self.mail.smtp_host = Some(v);
        }
        if let Some(v) = get("SMTP_PORT") {
            self.mail.smtp_port = parse_env("SMTP_PORT", &v)?;
        }
        if let Some(v) = get("SMTP_USER") {
            self.mail.smtp_user = Some(v);
        }
        if let Some(v) = get("SMTP_PASS") {
            self.mail.smtp_pass = Some(v);
        }
        if let Some(v) = get("MAIL_FROM") {
            self.mail.from = Some(v);
        }
        if let Some(v) = get("MAIL_TO") {
            self.mail.to = split_list(&v);
        }
        // Sender and recipient fall back to the SMTP account.
        if let Some(user) = self.mail.smtp_user.clone() {
            if self.mail.from.is_none() {
                self.mail.from = Some(user.clone());
            }
            if self.mail.to.is_empty() {
                self.mail.to = vec![user];
            }
        }

        for &(key, list_var, base_var, regex_var) in defaults::SOURCE_ENV {
            let Some(source) = self.sources.iter_mut().find(|s| s.key == key) else {
                continue;
            };
            if let Some(v) = get(list_var) {
                source.list_urls = split_list(&v);
            }
            if let Some(v) = get(base_var) {
                source.base_url = v;
            }
            if let Some(v) = get(regex_var) {
                source.article_regex = v;
            }
        }

        Ok(())
    }

    /// Sources with at least one listing URL.
    pub fn configured_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.is_configured())
    }

    /// Look up a source by key.
    pub fn source(&self, key: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.key == key)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.connect_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.connect_timeout_secs must be > 0",
            ));
        }
        if self.crawler.read_timeout_secs == 0 {
            return Err(AppError::validation("crawler.read_timeout_secs must be > 0"));
        }
        if self.crawler.tls.min_version > self.crawler.tls.max_version {
            return Err(AppError::validation(
                "crawler.tls.min_version must not exceed max_version",
            ));
        }
        // rustls implements TLS 1.2 and 1.3 only.
        if self.crawler.tls.max_version < TlsVersion::Tls1_2 {
            return Err(AppError::validation(
                "crawler.tls.max_version must be tls1.2 or later",
            ));
        }
        if self.pagination.default_param.trim().is_empty() {
            return Err(AppError::validation("pagination.default_param is empty"));
        }
        let template = &self.extraction.detail_path_template;
        if !template.contains("{id}") && !template.contains("{raw_id}") {
            return Err(AppError::validation(
                "extraction.detail_path_template needs an {id} or {raw_id} placeholder",
            ));
        }
        if self.ledger.legacy_source.trim().is_empty() {
            return Err(AppError::validation("ledger.legacy_source is empty"));
        }

        let mut keys = HashSet::new();
        for source in &self.sources {
            if source.key.trim().is_empty() {
                return Err(AppError::validation("source key is empty"));
            }
            if !keys.insert(source.key.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source key '{}'",
                    source.key
                )));
            }
            source.validate()?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_mode: false,
            crawler: CrawlerConfig::default(),
            pagination: PaginationConfig::default(),
            extraction: ExtractionConfig::default(),
            ledger: LedgerConfig::default(),
            mail: MailConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::config(format!("{name}={value:?}: {e}")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds
    #[serde(default = "defaults::read_timeout")]
    pub read_timeout_secs: u64,

    /// Additional attempts after a failed request
    #[serde(default = "defaults::retry")]
    pub retry: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Listing pages fetched per listing URL
    #[serde(default = "defaults::pages")]
    pub pages: u32,

    /// Host-scoped TLS compatibility
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            connect_timeout_secs: defaults::connect_timeout(),
            read_timeout_secs: defaults::read_timeout(),
            retry: defaults::retry(),
            retry_delay_ms: defaults::retry_delay(),
            pages: defaults::pages(),
            tls: TlsConfig::default(),
        }
    }
}

/// TLS protocol versions a legacy policy may pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "tls1.0")]
    Tls1_0,
    #[serde(rename = "tls1.1")]
    Tls1_1,
    #[serde(rename = "tls1.2")]
    Tls1_2,
    #[serde(rename = "tls1.3")]
    Tls1_3,
}

/// Legacy TLS settings for old university servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Enable the legacy policy for `legacy_hosts`
    #[serde(default)]
    pub legacy_compat: bool,

    /// Host patterns (`host` or `*.suffix`) needing the legacy policy
    #[serde(default = "defaults::legacy_hosts")]
    pub legacy_hosts: Vec<String>,

    #[serde(default = "defaults::legacy_min_version")]
    pub min_version: TlsVersion,

    #[serde(default = "defaults::legacy_max_version")]
    pub max_version: TlsVersion,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            legacy_compat: false,
            legacy_hosts: defaults::legacy_hosts(),
            min_version: defaults::legacy_min_version(),
            max_version: defaults::legacy_max_version(),
        }
    }
}

/// Page parameter selection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Parameter names recognized in an existing query, in priority order
    #[serde(default = "defaults::page_params")]
    pub page_params: Vec<String>,

    /// Parameter used when neither the query nor a host rule decides
    #[serde(default = "defaults::default_page_param")]
    pub default_param: String,

    /// Host-specific parameter names
    #[serde(default = "defaults::host_params")]
    pub host_params: Vec<HostParam>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_params: defaults::page_params(),
            default_param: defaults::default_page_param(),
            host_params: defaults::host_params(),
        }
    }
}

/// A host whose listing pages use a particular page parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostParam {
    pub host: String,
    pub param: String,
}

/// Script-navigation and fallback rules for article extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Added to the identifier found in an `onclick` handler. Identifiers
    /// outside the 128-bit integer range are used without the offset.
    #[serde(default = "defaults::id_offset")]
    pub id_offset: i64,

    /// Detail link template; `{id}` is the offset id, `{raw_id}` the original
    #[serde(default = "defaults::detail_path_template")]
    pub detail_path_template: String,

    /// Listing query parameters copied onto synthesized detail links
    #[serde(default = "defaults::carry_params")]
    pub carry_params: Vec<String>,

    /// Title used when an anchor has no visible text
    #[serde(default = "defaults::untitled")]
    pub untitled: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            id_offset: defaults::id_offset(),
            detail_path_template: defaults::detail_path_template(),
            carry_params: defaults::carry_params(),
            untitled: defaults::untitled(),
        }
    }
}

/// Seen-ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file
    #[serde(default = "defaults::ledger_path")]
    pub path: String,

    /// Source key assigned to rows migrated from the single-source schema
    #[serde(default = "defaults::legacy_source")]
    pub legacy_source: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: defaults::ledger_path(),
            legacy_source: defaults::legacy_source(),
        }
    }
}

/// SMTP delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default, skip_serializing)]
    pub smtp_pass: Option<String>,

    /// Sender address
    #[serde(default)]
    pub from: Option<String>,

    /// Default recipients for every source
    #[serde(default)]
    pub to: Vec<String>,

    #[serde(default = "defaults::smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: defaults::smtp_port(),
            smtp_user: None,
            smtp_pass: None,
            from: None,
            to: Vec::new(),
            timeout_secs: defaults::smtp_timeout(),
        }
    }
}

/// A notice board polled for new articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable partition key stored in the ledger (e.g., "bs")
    pub key: String,

    /// Mail subject prefix (e.g., "[학사공지 알림]")
    pub subject_prefix: String,

    /// Listing pages; an empty list disables the source
    #[serde(default)]
    pub list_urls: Vec<String>,

    /// Base URL for resolving article links
    pub base_url: String,

    /// Regex searched in each anchor href; group 1 is the article id
    pub article_regex: String,

    /// Overrides `mail.to` for this source
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
}

impl SourceConfig {
    /// Whether any listing URL is set.
    pub fn is_configured(&self) -> bool {
        self.list_urls.iter().any(|u| !u.trim().is_empty())
    }

    /// Compile the article regex.
    pub fn compile_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.article_regex)?)
    }

    /// Recipients for this source's digest.
    pub fn recipients<'a>(&'a self, mail: &'a MailConfig) -> &'a [String] {
        self.recipients.as_deref().unwrap_or(&mail.to)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url).map_err(|e| {
            AppError::validation(format!("[{}] invalid base_url: {e}", self.key))
        })?;
        for list_url in self.list_urls.iter().filter(|u| !u.trim().is_empty()) {
            Url::parse(list_url).map_err(|e| {
                AppError::validation(format!("[{}] invalid list url {list_url}: {e}", self.key))
            })?;
        }
        let regex = self.compile_regex().map_err(|e| {
            AppError::validation(format!("[{}] invalid article_regex: {e}", self.key))
        })?;
        if regex.captures_len() < 2 {
            return Err(AppError::validation(format!(
                "[{}] article_regex needs a capture group for the article id",
                self.key
            )));
        }
        Ok(())
    }
}

mod defaults {
    use super::{HostParam, SourceConfig, TlsVersion};

    /// (source key, listing URL var, base URL var, regex var)
    pub const SOURCE_ENV: &[(&str, &str, &str, &str)] = &[
        ("bs", "LIST_URL", "BASE_URL", "ARTICLE_REGEX"),
        (
            "campus",
            "CAMPUS_LIST_URLS",
            "CAMPUS_BASE_URL",
            "CAMPUS_ARTICLE_REGEX",
        ),
        (
            "swuniv",
            "SWUNIV_LIST_URL",
            "SWUNIV_BASE_URL",
            "SWUNIV_ARTICLE_REGEX",
        ),
    ];

    // Crawler defaults
    pub fn user_agent() -> String {
        "JBNU-Notice-Mailer/1.1".into()
    }
    pub fn connect_timeout() -> u64 {
        3
    }
    pub fn read_timeout() -> u64 {
        10
    }
    pub fn retry() -> u32 {
        1
    }
    pub fn retry_delay() -> u64 {
        2000
    }
    pub fn pages() -> u32 {
        1
    }

    // TLS defaults
    pub fn legacy_hosts() -> Vec<String> {
        vec!["www.jbnu.ac.kr".into()]
    }
    pub fn legacy_min_version() -> TlsVersion {
        TlsVersion::Tls1_2
    }
    pub fn legacy_max_version() -> TlsVersion {
        TlsVersion::Tls1_2
    }

    // Pagination defaults
    pub fn page_params() -> Vec<String> {
        vec![
            "pageIndex".into(),
            "page".into(),
            "pageNo".into(),
            "curPage".into(),
        ]
    }
    pub fn default_page_param() -> String {
        "page".into()
    }
    pub fn host_params() -> Vec<HostParam> {
        vec![HostParam {
            host: "www.jbnu.ac.kr".into(),
            param: "pageIndex".into(),
        }]
    }

    // Extraction defaults
    pub fn id_offset() -> i64 {
        1
    }
    pub fn detail_path_template() -> String {
        "/web/Board/{id}/detailView.do".into()
    }
    pub fn carry_params() -> Vec<String> {
        vec!["menu".into(), "pageIndex".into()]
    }
    pub fn untitled() -> String {
        "(제목 없음)".into()
    }

    // Ledger defaults
    pub fn ledger_path() -> String {
        "seen.sqlite".into()
    }
    pub fn legacy_source() -> String {
        "bs".into()
    }

    // Mail defaults
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn smtp_timeout() -> u64 {
        20
    }

    // Source defaults
    pub fn default_sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig {
                key: "bs".to_string(),
                subject_prefix: "[학사공지 알림]".to_string(),
                list_urls: Vec::new(),
                base_url: "https://csai.jbnu.ac.kr".to_string(),
                article_regex: r"^/bbs/csai/4929/(\d+)/artclView\.do(?:\?.*)?$".to_string(),
                recipients: None,
            },
            SourceConfig {
                key: "campus".to_string(),
                subject_prefix: "[교내공지 알림]".to_string(),
                list_urls: Vec::new(),
                base_url: "https://www.jbnu.ac.kr".to_string(),
                article_regex: r".*\bmode=view\b.*\b(?:no|pid)=([0-9]+)\b".to_string(),
                recipients: None,
            },
            SourceConfig {
                key: "swuniv".to_string(),
                subject_prefix: "[소중대공지 알림]".to_string(),
                list_urls: Vec::new(),
                base_url: "https://swuniv.jbnu.ac.kr".to_string(),
                article_regex: r".*[\?&]program_id=([A-Za-z0-9]+)".to_string(),
                recipients: None,
            },
        ]
    }
}
