use crate::normalize::NormalizedUrl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// HTTP status of the main document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStatus {
    pub code: u16,
    pub text: String,
}

impl CrawlStatus {
    /// Build a status from its code, using the canonical reason phrase
    pub fn from_code(code: u16) -> Self {
        let text = http::StatusCode::from_u16(code)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self { code, text }
    }
}

/// Content extracted from a rendered page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    /// Text of the first `<title>` element
    pub title: String,

    /// Full rendered HTML
    pub html: String,
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct CrawlSuccess {
    pub status: CrawlStatus,
    pub content: PageContent,

    /// In-scope links discovered on the page
    pub links: BTreeSet<NormalizedUrl>,

    /// URL that was requested
    pub url: NormalizedUrl,

    /// URL the browser ended on after redirects
    pub real_url: String,
}

/// A page that could not be fetched
#[derive(Debug, Clone)]
pub struct CrawlFailure {
    pub error: String,
    pub trace: String,
    pub url: NormalizedUrl,
}

/// Outcome of fetching one URL
#[derive(Debug, Clone)]
pub enum CrawlResult {
    Success(CrawlSuccess),
    Failure(CrawlFailure),
}

/// Content handed to a storage sink, keyed by the hash of its normalized URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedContent {
    pub key: String,
    pub url: String,
    pub title: String,
    pub tag: String,
    pub crawl_id: String,
    pub fetched_at: String,
    #[serde(skip)]
    pub html: String,
}

/// Summary of one crawl run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub crawl_id: String,

    /// Pages fetched (successfully or not)
    pub visited: usize,

    /// Fetches that ended in a failure
    pub failed: usize,

    /// Entries discarded because their hash was already seen
    pub skipped_duplicates: usize,

    /// Pages written to the content store
    pub persisted: usize,

    /// Pages whose write to the content store failed
    pub persist_errors: usize,

    /// Every (tag, url) pair enqueued after seeding, in enqueue order
    pub discovered: Vec<(String, String)>,

    /// Whether the run stopped because the visit cap was reached
    pub cap_reached: bool,
}

impl CrawlReport {
    /// Fold a worker's partial report into this one
    pub fn merge(&mut self, other: CrawlReport) {
        self.visited += other.visited;
        self.failed += other.failed;
        self.skipped_duplicates += other.skipped_duplicates;
        self.persisted += other.persisted;
        self.persist_errors += other.persist_errors;
        self.discovered.extend(other.discovered);
        self.cap_reached |= other.cap_reached;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason_phrase() {
        assert_eq!(CrawlStatus::from_code(200).text, "OK");
        assert_eq!(CrawlStatus::from_code(404).text, "Not Found");
        assert_eq!(CrawlStatus::from_code(0).text, "");
    }

    #[test]
    fn test_report_merge() {
        let mut total = CrawlReport {
            crawl_id: "run".to_string(),
            visited: 2,
            ..CrawlReport::default()
        };
        total.merge(CrawlReport {
            visited: 3,
            failed: 1,
            persisted: 2,
            discovered: vec![("tech".to_string(), "https://a.example/".to_string())],
            cap_reached: true,
            ..CrawlReport::default()
        });
        assert_eq!(total.crawl_id, "run");
        assert_eq!(total.visited, 5);
        assert_eq!(total.failed, 1);
        assert_eq!(total.persisted, 2);
        assert_eq!(total.discovered.len(), 1);
        assert!(total.cap_reached);
    }
}
