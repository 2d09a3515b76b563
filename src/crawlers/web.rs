//! WebDriver-backed page fetcher.
//!
//! Every fetch runs in its own WebDriver session, so cookies and storage never
//! leak between pages. The session is wrapped in a [`SessionGuard`] that closes
//! it on every exit path.

use crate::config::{CrawlerConfig, ResourceType};
use crate::crawlers::fetcher::Fetcher;
use crate::filter::Scope;
use crate::normalize::{NormalizedUrl, Normalizer};
use crate::parsers::html;
use crate::results::{CrawlFailure, CrawlResult, CrawlStatus, CrawlSuccess, PageContent};
use crate::utils::error_trace;
use fantoccini::error::{CmdError, NewSessionError};
use fantoccini::wd::{Capabilities, WebDriverCompatibleCommand};
use fantoccini::{Client, ClientBuilder};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

/// Common local WebDriver endpoints tried when the configured one is unreachable
const FALLBACK_WEBDRIVER_URLS: &[&str] = &[
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // Selenium / standalone default
    "http://127.0.0.1:4444",
];

/// Live-DOM anchor targets, already resolved by the browser
const LINKS_SCRIPT: &str = "return Array.from(document.querySelectorAll('a[href]'))\
    .map(a => a.href)\
    .filter(h => typeof h === 'string' && h.length > 0);";

/// HTTP status of the main document from Navigation Timing, 0 if unavailable
const STATUS_SCRIPT: &str = "const nav = performance.getEntriesByType('navigation')[0];\
    return nav && typeof nav.responseStatus === 'number' ? nav.responseStatus : 0;";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to open browser session at {webdriver_url}")]
    Session {
        webdriver_url: String,
        #[source]
        source: NewSessionError,
    },

    #[error("no WebDriver server reachable (tried {0})")]
    NoWebDriver(String),

    #[error("navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u128 },

    #[error("reading {url} timed out after {timeout_ms} ms")]
    ReadTimeout { url: String, timeout_ms: u128 },

    #[error("navigation to {url} failed")]
    Navigation {
        url: String,
        #[source]
        source: CmdError,
    },

    #[error("failed to read {what} of {url}")]
    Read {
        what: &'static str,
        url: String,
        #[source]
        source: CmdError,
    },
}

/// Chrome DevTools command sent through chromedriver's vendor endpoint
#[derive(Debug)]
struct CdpCommand {
    cmd: &'static str,
    params: Value,
}

impl WebDriverCompatibleCommand for CdpCommand {
    fn endpoint(&self, base_url: &Url, session_id: Option<&str>) -> Result<Url, url::ParseError> {
        let session_id = session_id.ok_or(url::ParseError::EmptyHost)?;
        base_url.join(&format!("session/{session_id}/goog/cdp/execute"))
    }

    fn method_and_body(&self, _request_url: &Url) -> (http::Method, Option<String>) {
        let body = json!({ "cmd": self.cmd, "params": self.params });
        (http::Method::POST, Some(body.to_string()))
    }
}

/// Closes the wrapped WebDriver session when released.
///
/// [`SessionGuard::close`] is the normal path. If the guard is dropped
/// instead (early return, cancelled task), the close is spawned onto the runtime.
pub struct SessionGuard {
    client: Option<Client>,
    url: String,
}

impl SessionGuard {
    fn new(client: Client, url: &str) -> Self {
        Self {
            client: Some(client),
            url: url.to_string(),
        }
    }

    fn client(&self) -> &Client {
        self.client
            .as_ref()
            .expect("SessionGuard: session already closed")
    }

    /// Close the session, logging failures
    pub async fn close(mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                ::log::warn!("Failed to close browser session for {}: {}", self.url, e);
            } else {
                ::log::trace!("Closed browser session for {}", self.url);
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let url = std::mem::take(&mut self.url);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = client.close().await {
                            ::log::warn!("Deferred close of browser session for {} failed: {}", url, e);
                        }
                    });
                }
                Err(_) => {
                    ::log::warn!("No runtime to close browser session for {}", url);
                }
            }
        }
    }
}

/// A browser reachable over WebDriver plus the settings every page load uses
#[derive(Debug, Clone)]
pub struct BrowserSession {
    webdriver_url: String,
    capabilities: Capabilities,
    blocked_patterns: Vec<String>,
    navigation_timeout: Duration,
    settle_delay: Duration,
    normalizer: Normalizer,
}

impl BrowserSession {
    /// Build a session description without contacting the WebDriver server
    pub fn new(config: &CrawlerConfig, normalizer: Normalizer) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            capabilities: browser_capabilities(config),
            blocked_patterns: blocked_url_patterns(&config.blocked_resources),
            navigation_timeout: config.navigation_timeout(),
            settle_delay: config.settle_delay(),
            normalizer,
        }
    }

    /// Build a session and make sure a WebDriver server answers.
    ///
    /// Falls back to common local endpoints when the configured one is down.
    pub async fn connect(config: &CrawlerConfig, normalizer: Normalizer) -> Result<Self, FetchError> {
        let mut session = Self::new(config, normalizer);

        let mut candidates = vec![session.webdriver_url.clone()];
        candidates.extend(
            FALLBACK_WEBDRIVER_URLS
                .iter()
                .filter(|url| **url != session.webdriver_url)
                .map(|url| url.to_string()),
        );

        for candidate in &candidates {
            match session.open_at(candidate, "about:blank").await {
                Ok(guard) => {
                    guard.close().await;
                    if *candidate != session.webdriver_url {
                        ::log::info!("Using fallback WebDriver at {}", candidate);
                    }
                    session.webdriver_url = candidate.clone();
                    ::log::debug!("Connected to WebDriver at {}", candidate);
                    return Ok(session);
                }
                Err(e) => {
                    ::log::debug!("WebDriver at {} unavailable: {}", candidate, e);
                }
            }
        }

        ::log::error!(
            "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
        );
        Err(FetchError::NoWebDriver(candidates.join(", ")))
    }

    pub fn webdriver_url(&self) -> &str {
        &self.webdriver_url
    }

    /// Open a fresh, isolated browsing context
    async fn open_context(&self, url: &str) -> Result<SessionGuard, FetchError> {
        self.open_at(&self.webdriver_url, url).await
    }

    async fn open_at(&self, webdriver_url: &str, url: &str) -> Result<SessionGuard, FetchError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities.clone());
        let client = builder
            .connect(webdriver_url)
            .await
            .map_err(|source| FetchError::Session {
                webdriver_url: webdriver_url.to_string(),
                source,
            })?;
        Ok(SessionGuard::new(client, url))
    }

    /// Abort stylesheet/image/font requests before they are sent
    async fn install_blocking(&self, client: &Client) {
        if self.blocked_patterns.is_empty() {
            return;
        }

        let enable = CdpCommand {
            cmd: "Network.enable",
            params: json!({}),
        };
        let block = CdpCommand {
            cmd: "Network.setBlockedURLs",
            params: json!({ "urls": self.blocked_patterns }),
        };

        let result = match client.issue_cmd(enable).await {
            Ok(_) => client.issue_cmd(block).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            ::log::warn!("Could not install resource blocking: {}", e);
        }
    }

    async fn load(&self, client: &Client, url: &NormalizedUrl, scope: &Scope) -> Result<CrawlSuccess, FetchError> {
        self.install_blocking(client).await;

        bounded(
            self.navigation_timeout,
            async {
                client.goto(url.as_str()).await.map_err(|source| FetchError::Navigation {
                    url: url.to_string(),
                    source,
                })
            },
            || FetchError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: self.navigation_timeout.as_millis(),
            },
        )
        .await?;

        // Give client-side rendering and late XHRs a chance to finish
        tokio::time::sleep(self.settle_delay).await;

        let snapshot = bounded(
            self.navigation_timeout,
            self.snapshot(client, url),
            || FetchError::ReadTimeout {
                url: url.to_string(),
                timeout_ms: self.navigation_timeout.as_millis(),
            },
        )
        .await?;
        ::log::debug!(
            "Page loaded: {} ({} {})",
            url,
            snapshot.status.code,
            snapshot.status.text
        );

        let links = scoped_links(&self.normalizer, &snapshot.real_url, &snapshot.hrefs, scope);
        Ok(CrawlSuccess {
            status: snapshot.status,
            content: PageContent {
                title: html::title(&snapshot.html),
                html: snapshot.html,
            },
            links,
            url: url.clone(),
            real_url: snapshot.real_url.to_string(),
        })
    }

    /// Read status, final URL, rendered source and link targets from the settled page
    async fn snapshot(&self, client: &Client, url: &NormalizedUrl) -> Result<Snapshot, FetchError> {
        let status = match client.execute(STATUS_SCRIPT, vec![]).await {
            Ok(value) => CrawlStatus::from_code(value.as_u64().unwrap_or(0).try_into().unwrap_or(0)),
            Err(e) => {
                ::log::debug!("Could not read status of {}: {}", url, e);
                CrawlStatus::from_code(0)
            }
        };

        let real_url = client
            .current_url()
            .await
            .map_err(|source| read_error("current URL", url, source))?;
        let html = client
            .source()
            .await
            .map_err(|source| read_error("source", url, source))?;

        let hrefs = match client.execute(LINKS_SCRIPT, vec![]).await {
            Ok(value) => serde_json::from_value::<Vec<String>>(value).unwrap_or_else(|e| {
                ::log::warn!("Unexpected link list from {}: {}", url, e);
                html::anchor_hrefs(&html)
            }),
            Err(e) => {
                ::log::warn!("Link script failed on {}, parsing snapshot instead: {}", url, e);
                html::anchor_hrefs(&html)
            }
        };

        Ok(Snapshot {
            status,
            real_url,
            html,
            hrefs,
        })
    }
}

/// What is read from a page once it has settled
struct Snapshot {
    status: CrawlStatus,
    real_url: Url,
    html: String,
    hrefs: Vec<String>,
}

/// Run a browser step, failing with `on_timeout()` if it exceeds `limit`
async fn bounded<T, F>(
    limit: Duration,
    step: F,
    on_timeout: impl FnOnce() -> FetchError,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    timeout(limit, step).await.unwrap_or_else(|_| Err(on_timeout()))
}

impl Fetcher for BrowserSession {
    async fn fetch(&self, url: &NormalizedUrl, scope: &Scope) -> CrawlResult {
        let start = Instant::now();

        let result = match self.open_context(url.as_str()).await {
            Ok(guard) => {
                let result = self.load(guard.client(), url, scope).await;
                guard.close().await;
                result
            }
            Err(e) => Err(e),
        };

        ::log::debug!(
            "Fetched {} in {:.2} seconds",
            url,
            start.elapsed().as_secs_f64()
        );

        match result {
            Ok(page) => CrawlResult::Success(page),
            Err(e) => CrawlResult::Failure(CrawlFailure {
                error: e.to_string(),
                trace: error_trace(&e),
                url: url.clone(),
            }),
        }
    }
}

fn read_error(what: &'static str, url: &NormalizedUrl, source: CmdError) -> FetchError {
    FetchError::Read {
        what,
        url: url.to_string(),
        source,
    }
}

/// Normalize discovered hrefs against the page URL and keep the in-scope ones
pub fn scoped_links(
    normalizer: &Normalizer,
    base: &Url,
    hrefs: &[String],
    scope: &Scope,
) -> BTreeSet<NormalizedUrl> {
    hrefs
        .iter()
        .filter_map(|href| match normalizer.normalize_relative(base, href) {
            Ok(url) => Some(url),
            Err(e) => {
                ::log::trace!("Dropping link {:?}: {}", href, e);
                None
            }
        })
        .filter(|url| scope.contains(url.as_url()))
        .collect()
}

/// WebDriver capabilities for an isolated, resource-light Chrome session
pub fn browser_capabilities(config: &CrawlerConfig) -> Capabilities {
    let mut args = vec![
        format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        ),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    let mut prefs = serde_json::Map::new();
    if config.blocked_resources.contains(&ResourceType::Image) {
        prefs.insert(
            "profile.managed_default_content_settings.images".to_string(),
            json!(2),
        );
    }

    let mut caps = Capabilities::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("pageLoadStrategy".to_string(), json!("normal"));
    caps.insert(
        "timeouts".to_string(),
        json!({ "pageLoad": config.navigation_timeout_ms }),
    );
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({ "args": args, "prefs": prefs }),
    );
    caps
}

/// URL patterns for `Network.setBlockedURLs`, deduplicated, in input order
pub fn blocked_url_patterns(types: &[ResourceType]) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    for resource in types {
        for pattern in resource.url_patterns() {
            if !patterns.iter().any(|p| p == pattern) {
                patterns.push(pattern.to_string());
            }
        }
    }
    patterns
}
