use crate::normalize::{Normalizer, QueryPolicy, QueryPolicyConfig};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON")]
    Json(#[from] serde_json::Error),

    #[error("invalid query policy pattern")]
    Pattern(#[from] regex::Error),

    #[error("config must be a JSON object")]
    NotAnObject,

    #[error("workers must be at least 1")]
    NoWorkers,
}

/// Resource types the browser is told to abort before sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Stylesheet,
    Image,
    Font,
    Media,
}

impl ResourceType {
    /// URL patterns matching requests of this type
    pub fn url_patterns(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Stylesheet => &["*.css", "*.css?*"],
            ResourceType::Image => &[
                "*.png", "*.png?*", "*.jpg", "*.jpg?*", "*.jpeg", "*.jpeg?*", "*.gif", "*.gif?*",
                "*.webp", "*.webp?*", "*.svg", "*.svg?*", "*.ico", "*.ico?*", "*.avif", "*.avif?*",
            ],
            ResourceType::Font => &[
                "*.woff", "*.woff?*", "*.woff2", "*.woff2?*", "*.ttf", "*.ttf?*", "*.otf",
                "*.otf?*", "*.eot", "*.eot?*",
            ],
            ResourceType::Media => &["*.mp4", "*.mp4?*", "*.webm", "*.webm?*", "*.mp3", "*.mp3?*"],
        }
    }
}

/// Configuration for a crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Run the browser without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Number of parallel frontier workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum page visits for the whole run
    #[serde(default = "default_max_visits")]
    pub max_visits: usize,

    /// Per-page navigation timeout
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Wait after the load event so client-side rendering can finish
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Requests of these types are aborted before being sent
    #[serde(default = "default_blocked_resources")]
    pub blocked_resources: Vec<ResourceType>,

    /// Hosts whose content may be written to the store
    #[serde(default = "default_persist_domains")]
    pub persist_domains: Vec<String>,

    /// Root directory of the filesystem content store
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Which query parameters are dropped during normalization
    #[serde(default)]
    pub query_policy: QueryPolicyConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
            workers: default_workers(),
            max_visits: default_max_visits(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: None,
            blocked_resources: default_blocked_resources(),
            persist_domains: default_persist_domains(),
            store_dir: default_store_dir(),
            query_policy: QueryPolicyConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        // serde would also accept a sequence here and fill every field with defaults
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (currently `WEBDRIVER_URL`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        QueryPolicy::new(&self.query_policy)?;
        Ok(())
    }

    /// Build the URL normalizer described by `query_policy`
    pub fn normalizer(&self) -> Result<Normalizer, ConfigError> {
        Ok(Normalizer::new(QueryPolicy::new(&self.query_policy)?))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_max_visits() -> usize {
    500
}

fn default_navigation_timeout_ms() -> u64 {
    10_000
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_blocked_resources() -> Vec<ResourceType> {
    vec![ResourceType::Stylesheet, ResourceType::Image, ResourceType::Font]
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("crawled-content")
}

/// Publishers whose pages are worth storing
fn default_persist_domains() -> Vec<String> {
    [
        "cnn.com",
        "usatoday.com",
        "reuters.com",
        "foxnews.com",
        "cbssports.com",
        "espn.com",
        "androidpolice.com",
        "nydailynews.com",
        "politico.com",
        "theguardian.com",
        "news.yahoo.com",
        "digitaltrends.com",
        "gizmodo.com",
        "techradar.com",
        "9to5mac.com",
        "macworld.com",
        "people.com",
        "nfl.com",
        "247sports.com",
        "space.com",
        "vice.com",
        "ndtv.com",
        "msn.com",
        "indiatoday.in",
        "politifact.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}
