//! Persistence gate and content sinks.
//!
//! Only pages on the persistence allow-list reach a sink. Writes are keyed by
//! the hash of the normalized URL, so re-crawling a page overwrites its entry.

use crate::filter::eligible_for_persistence;
use crate::normalize::NormalizedUrl;
use crate::results::{PageContent, PersistedContent};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode metadata for {key}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable destination for approved page content
pub trait ContentSink: Send + Sync {
    /// Write (or overwrite) the entry for `content.key`
    fn write(&self, content: &PersistedContent) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: ContentSink> ContentSink for Arc<S> {
    fn write(&self, content: &PersistedContent) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).write(content)
    }
}

/// Stores `<key>.html` with a `<key>.json` metadata sidecar under one directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    dir: PathBuf,
}

impl FsContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn html_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.html"))
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read back a stored entry, if present
    pub async fn read(&self, key: &str) -> Result<Option<PersistedContent>, StoreError> {
        let meta_path = self.metadata_path(key);
        let meta = match tokio::fs::read_to_string(&meta_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&meta_path, source)),
        };
        let mut content: PersistedContent =
            serde_json::from_str(&meta).map_err(|source| StoreError::Metadata {
                key: key.to_string(),
                source,
            })?;

        let html_path = self.html_path(key);
        content.html = tokio::fs::read_to_string(&html_path)
            .await
            .map_err(|source| io_error(&html_path, source))?;
        Ok(Some(content))
    }
}

impl ContentSink for FsContentStore {
    async fn write(&self, content: &PersistedContent) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let metadata =
            serde_json::to_string_pretty(content).map_err(|source| StoreError::Metadata {
                key: content.key.clone(),
                source,
            })?;

        let html_path = self.html_path(&content.key);
        tokio::fs::write(&html_path, content.html.as_bytes())
            .await
            .map_err(|source| io_error(&html_path, source))?;

        let meta_path = self.metadata_path(&content.key);
        tokio::fs::write(&meta_path, metadata.as_bytes())
            .await
            .map_err(|source| io_error(&meta_path, source))?;

        ::log::debug!("Wrote {} ({} bytes)", html_path.display(), content.html.len());
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, PersistedContent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<PersistedContent> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.lock().values().map(|c| c.url.clone()).collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PersistedContent>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ContentSink for MemoryStore {
    async fn write(&self, content: &PersistedContent) -> Result<(), StoreError> {
        self.lock().insert(content.key.clone(), content.clone());
        Ok(())
    }
}

/// Decides per page whether its content reaches the sink
#[derive(Debug)]
pub struct StoreGate<S> {
    sink: S,
    allow_list: Vec<String>,
}

impl<S: ContentSink> StoreGate<S> {
    pub fn new(sink: S, allow_list: Vec<String>) -> Self {
        Self { sink, allow_list }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Write `content` under `hash` if `url` is on the allow-list.
    ///
    /// Returns `Ok(false)` when the host is not allowed; nothing is written then.
    pub async fn maybe_persist(
        &self,
        hash: &str,
        url: &NormalizedUrl,
        content: &PageContent,
        tag: &str,
        crawl_id: &str,
    ) -> Result<bool, StoreError> {
        if !eligible_for_persistence(url.as_url(), &self.allow_list) {
            ::log::debug!("Not persisting {}: host not on allow-list", url);
            return Ok(false);
        }

        let persisted = PersistedContent {
            key: hash.to_string(),
            url: url.to_string(),
            title: content.title.clone(),
            tag: tag.to_string(),
            crawl_id: crawl_id.to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
            html: content.html.clone(),
        };
        self.sink.write(&persisted).await?;
        ::log::info!("Saved content for {} as {}", url, hash);
        Ok(true)
    }
}
