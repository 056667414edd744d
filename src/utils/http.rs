// src/utils/http.rs

//! HTTP transport with host-scoped TLS policy and bounded retry.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, TlsConfig, TlsVersion};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Source of listing page bodies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the response body.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// TLS behavior applied to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsPolicy {
    /// Platform defaults
    Modern,
    /// Pinned protocol range for servers that cannot negotiate modern TLS
    Legacy { min: TlsVersion, max: TlsVersion },
}

/// Ordered host pattern to policy rules. First match wins.
///
/// Patterns are exact hostnames or `*.suffix` wildcards matching any
/// subdomain of `suffix`.
#[derive(Debug, Clone, Default)]
pub struct TlsPolicyMap {
    rules: Vec<(String, TlsPolicy)>,
}

impl TlsPolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn with_rule(mut self, pattern: impl Into<String>, policy: TlsPolicy) -> Self {
        self.rules.push((pattern.into().to_lowercase(), policy));
        self
    }

    /// Build the map from `crawler.tls`. Empty unless `legacy_compat` is set.
    pub fn from_config(config: &TlsConfig) -> Self {
        if !config.legacy_compat {
            return Self::new();
        }
        let policy = TlsPolicy::Legacy {
            min: config.min_version,
            max: config.max_version,
        };
        config
            .legacy_hosts
            .iter()
            .fold(Self::new(), |map, host| map.with_rule(host.as_str(), policy))
    }

    /// Policy for a host; `Modern` when no rule matches.
    pub fn policy_for(&self, host: &str) -> TlsPolicy {
        let host = host.to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, _)| host_matches(pattern, &host))
            .map(|(_, policy)| *policy)
            .unwrap_or(TlsPolicy::Modern)
    }

    fn policies(&self) -> impl Iterator<Item = TlsPolicy> + '_ {
        self.rules.iter().map(|(_, policy)| *policy)
    }
}

fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.')),
        None => pattern == host,
    }
}

fn reqwest_version(version: TlsVersion) -> reqwest::tls::Version {
    match version {
        TlsVersion::Tls1_0 => reqwest::tls::Version::TLS_1_0,
        TlsVersion::Tls1_1 => reqwest::tls::Version::TLS_1_1,
        TlsVersion::Tls1_2 => reqwest::tls::Version::TLS_1_2,
        TlsVersion::Tls1_3 => reqwest::tls::Version::TLS_1_3,
    }
}

/// Create an HTTP client for one TLS policy.
///
/// Legacy bounds are intersected with what rustls implements (TLS 1.2+);
/// a range with no implemented version fails at build time.
pub fn create_client(config: &CrawlerConfig, policy: TlsPolicy) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

    let builder = Client::builder()
        .use_rustls_tls()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs));

    let builder = match policy {
        TlsPolicy::Modern => builder,
        TlsPolicy::Legacy { min, max } => builder
            .min_tls_version(reqwest_version(min))
            .max_tls_version(reqwest_version(max)),
    };

    Ok(builder.build()?)
}

/// Run `op` up to `retries + 1` times with a fixed delay between attempts.
///
/// The error of the final attempt is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    retries: u32,
    delay: Duration,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                log::warn!(
                    "Attempt {}/{} failed for {}: {}",
                    attempt + 1,
                    attempts,
                    label,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    clients: HashMap<TlsPolicy, Client>,
    /// Policies whose client could not be built, with the reason
    unavailable: HashMap<TlsPolicy, String>,
    policies: TlsPolicyMap,
    retry: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    /// Build one client per distinct policy up front.
    ///
    /// Only the default client is required. A legacy policy whose client
    /// cannot be built makes requests to its hosts fail instead.
    pub fn new(config: &CrawlerConfig, policies: TlsPolicyMap) -> Result<Self> {
        let mut clients = HashMap::new();
        let mut unavailable = HashMap::new();
        clients.insert(TlsPolicy::Modern, create_client(config, TlsPolicy::Modern)?);

        for policy in policies.policies() {
            if clients.contains_key(&policy) || unavailable.contains_key(&policy) {
                continue;
            }
            match create_client(config, policy) {
                Ok(client) => {
                    clients.insert(policy, client);
                }
                Err(e) => {
                    log::warn!("HTTP client for {policy:?} unavailable: {e}");
                    unavailable.insert(policy, e.to_string());
                }
            }
        }

        Ok(Self {
            clients,
            unavailable,
            policies,
            retry: config.retry,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Policy that applies to `url`.
    pub fn policy_for_url(&self, url: &str) -> Result<TlsPolicy> {
        let parsed = Url::parse(url)?;
        Ok(parsed
            .host_str()
            .map(|host| self.policies.policy_for(host))
            .unwrap_or(TlsPolicy::Modern))
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let policy = self.policy_for_url(url)?;
        let client = self.clients.get(&policy).ok_or_else(|| {
            let reason = self
                .unavailable
                .get(&policy)
                .map(String::as_str)
                .unwrap_or("not configured");
            AppError::config(format!("no HTTP client for {policy:?}: {reason}"))
        })?;
        let response = client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        with_retry(self.retry, self.retry_delay, url, |_| self.fetch_once(url)).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    use super::*;

    fn legacy() -> TlsPolicy {
        TlsPolicy::Legacy {
            min: TlsVersion::Tls1_0,
            max: TlsVersion::Tls1_2,
        }
    }

    #[test]
    fn test_policy_exact_host() {
        let map = TlsPolicyMap::new().with_rule("www.jbnu.ac.kr", legacy());

        assert_eq!(map.policy_for("www.jbnu.ac.kr"), legacy());
        assert_eq!(map.policy_for("WWW.JBNU.AC.KR"), legacy());
        assert_eq!(map.policy_for("csai.jbnu.ac.kr"), TlsPolicy::Modern);
    }

    #[test]
    fn test_policy_wildcard_host() {
        let map = TlsPolicyMap::new().with_rule("*.jbnu.ac.kr", legacy());

        assert_eq!(map.policy_for("swuniv.jbnu.ac.kr"), legacy());
        assert_eq!(map.policy_for("jbnu.ac.kr"), TlsPolicy::Modern);
        assert_eq!(map.policy_for("notjbnu.ac.kr"), TlsPolicy::Modern);
    }

    #[test]
    fn test_policy_first_rule_wins() {
        let map = TlsPolicyMap::new()
            .with_rule("www.jbnu.ac.kr", TlsPolicy::Modern)
            .with_rule("*.jbnu.ac.kr", legacy());

        assert_eq!(map.policy_for("www.jbnu.ac.kr"), TlsPolicy::Modern);
        assert_eq!(map.policy_for("csai.jbnu.ac.kr"), legacy());
    }

    #[test]
    fn test_policy_map_from_config() {
        let mut tls = TlsConfig::default();
        assert_eq!(
            TlsPolicyMap::from_config(&tls).policy_for("www.jbnu.ac.kr"),
            TlsPolicy::Modern
        );

        tls.legacy_compat = true;
        tls.max_version = TlsVersion::Tls1_2;
        assert_eq!(
            TlsPolicyMap::from_config(&tls).policy_for("www.jbnu.ac.kr"),
            TlsPolicy::Legacy {
                min: TlsVersion::Tls1_2,
                max: TlsVersion::Tls1_2,
            }
        );
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::ZERO, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(AppError::config(format!("attempt {attempt}"))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(AppError::Config(message)) => assert_eq!(message, "attempt 2"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(5, Duration::ZERO, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 1 {
                    Err(AppError::config("flaky"))
                } else {
                    Ok("body")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_tries_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(0, Duration::ZERO, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::config("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_fixed_delay() {
        let start = tokio::time::Instant::now();
        let _: Result<()> = with_retry(2, Duration::from_millis(2000), "test", |_| async {
            Err(AppError::config("down"))
        })
        .await;

        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }

    /// Serve every connection on a local port with `status` and `body`.
    ///
    /// Returns the base URL and a counter of accepted connections.
    fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (format!("http://{addr}/list"), hits)
    }

    fn fast_config(retry: u32) -> CrawlerConfig {
        CrawlerConfig {
            retry,
            retry_delay_ms: 0,
            ..CrawlerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let (url, hits) = serve("200 OK", "<html>ok</html>");
        let fetcher = HttpFetcher::new(&fast_config(1), TlsPolicyMap::new()).unwrap();

        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_retried_then_returned() {
        let (url, hits) = serve("500 Internal Server Error", "");
        let fetcher = HttpFetcher::new(&fast_config(1), TlsPolicyMap::new()).unwrap();

        match fetcher.fetch(&url).await {
            Err(AppError::Http(e)) => {
                assert_eq!(e.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbuildable_legacy_client_fails_only_its_hosts() {
        let map = TlsPolicyMap::new().with_rule(
            "www.jbnu.ac.kr",
            TlsPolicy::Legacy {
                min: TlsVersion::Tls1_0,
                max: TlsVersion::Tls1_1,
            },
        );
        let fetcher = HttpFetcher::new(&fast_config(0), map).unwrap();

        assert!(matches!(
            fetcher.fetch("https://www.jbnu.ac.kr/kor/").await,
            Err(AppError::Config(_))
        ));

        let (url, _) = serve("200 OK", "fine");
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "fine");
    }

    #[test]
    fn test_policy_for_url() {
        let config = CrawlerConfig::default();
        let map = TlsPolicyMap::new().with_rule("www.jbnu.ac.kr", legacy());
        let fetcher = HttpFetcher::new(&config, map).unwrap();

        assert_eq!(
            fetcher
                .policy_for_url("https://www.jbnu.ac.kr/kor/?menuID=139")
                .unwrap(),
            legacy()
        );
        assert_eq!(
            fetcher.policy_for_url("https://csai.jbnu.ac.kr/").unwrap(),
            TlsPolicy::Modern
        );
        assert_eq!(fetcher.clients.len(), 2);
    }
}
