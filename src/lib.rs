pub mod config;
pub mod crawlers;
pub mod filter;
pub mod manifest;
pub mod normalize;
pub mod parsers;
pub mod results;
pub mod store;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::CrawlerConfig;
pub use crawlers::{BrowserSession, Engine, Fetcher, Frontier, FrontierEntry};
pub use filter::{Scope, eligible_for_persistence, in_target_scope};
pub use manifest::{CrawlInput, SeedEntry};
pub use normalize::{NormalizedUrl, Normalizer, normalize};
pub use results::{CrawlReport, CrawlResult, PageContent};
pub use store::{ContentSink, FsContentStore, MemoryStore, StoreGate};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors that stop a run before any page is fetched
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),

    #[error(transparent)]
    Browser(#[from] crawlers::FetchError),
}

/// Builder wiring config, manifest, browser and content store into one run
#[derive(Debug, Clone)]
pub struct Crawl {
    config: CrawlerConfig,
}

impl Default for Crawl {
    fn default() -> Self {
        Self::new()
    }
}

impl Crawl {
    /// Start from the default configuration plus environment overrides
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default().with_env_overrides(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: CrawlerConfig) -> Self {
        self.config = config.with_env_overrides();
        self
    }

    /// Load configuration from a JSON file
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = CrawlerConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Load configuration from a JSON string
    pub fn with_config_str(self, json: &str) -> Result<Self, Error> {
        let config = CrawlerConfig::from_json(json)?;
        Ok(self.with_config(config))
    }

    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    /// Set the number of parallel workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    /// Set the run-wide visit cap
    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.config.max_visits = max_visits;
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = dir.into();
        self
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Parse a seed manifest with this configuration's normalizer
    pub fn load_input(&self, manifest: impl AsRef<Path>) -> Result<CrawlInput, Error> {
        let normalizer = self.config.normalizer()?;
        Ok(CrawlInput::from_file(manifest, &normalizer)?)
    }

    /// A frontier sized for this configuration, for callers that want to cancel a run
    pub fn frontier(&self) -> Arc<Frontier> {
        Arc::new(Frontier::new(self.config.max_visits))
    }

    /// Connect to the browser and build the engine
    pub async fn engine(&self) -> Result<Engine<BrowserSession, FsContentStore>, Error> {
        self.config.validate()?;
        let normalizer = self.config.normalizer()?;
        let session = BrowserSession::connect(&self.config, normalizer.clone()).await?;
        let gate = StoreGate::new(
            FsContentStore::new(&self.config.store_dir),
            self.config.persist_domains.clone(),
        );

        Ok(Engine::new(session, gate)
            .with_workers(self.config.workers)
            .with_max_visits(self.config.max_visits)
            .with_normalizer(normalizer))
    }

    /// Crawl `input` to completion
    pub async fn run(&self, input: &CrawlInput) -> Result<CrawlReport, Error> {
        self.run_with(input, self.frontier()).await
    }

    /// Crawl `input` over a caller-owned frontier
    pub async fn run_with(&self, input: &CrawlInput, frontier: Arc<Frontier>) -> Result<CrawlReport, Error> {
        let engine = self.engine().await?;
        Ok(engine.run_with(input, frontier).await)
    }
}
