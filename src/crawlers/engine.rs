//! Traversal engine: drives workers over a shared [`Frontier`].
//!
//! Each worker repeatedly claims an entry, fetches it, queues the in-scope
//! links it found under the same tag, and hands non-seed content to the
//! [`StoreGate`]. A failed page is logged and skipped; nothing short of the
//! visit cap or cancellation stops the run early.

use crate::crawlers::fetcher::Fetcher;
use crate::crawlers::frontier::{Claim, Frontier, FrontierEntry};
use crate::filter::Scope;
use crate::manifest::CrawlInput;
use crate::normalize::{NormalizedUrl, Normalizer};
use crate::results::{CrawlReport, CrawlResult, CrawlSuccess};
use crate::store::{ContentSink, StoreGate};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Default run-wide visit cap
pub const DEFAULT_MAX_VISITS: usize = 500;

pub struct Engine<F, S> {
    fetcher: Arc<F>,
    gate: Arc<StoreGate<S>>,
    normalizer: Normalizer,
    workers: usize,
    max_visits: usize,
}

/// Everything a worker needs for one run
struct RunContext<F, S> {
    crawl_id: String,
    fetcher: Arc<F>,
    gate: Arc<StoreGate<S>>,
    normalizer: Normalizer,
    frontier: Arc<Frontier>,
    scope: Scope,
    seeds: HashSet<String>,
}

impl<F, S> Engine<F, S>
where
    F: Fetcher + 'static,
    S: ContentSink + 'static,
{
    pub fn new(fetcher: F, gate: StoreGate<S>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            gate: Arc::new(gate),
            normalizer: Normalizer::default(),
            workers: 1,
            max_visits: DEFAULT_MAX_VISITS,
        }
    }

    /// Set the number of parallel workers (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    /// Normalizer applied to post-redirect URLs
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn gate(&self) -> &StoreGate<S> {
        &self.gate
    }

    /// A fresh frontier sized for this engine
    pub fn frontier(&self) -> Arc<Frontier> {
        Arc::new(Frontier::new(self.max_visits))
    }

    /// Crawl from the input's seeds until the frontier drains or the cap is hit
    pub async fn run(&self, input: &CrawlInput) -> CrawlReport {
        self.run_with(input, self.frontier()).await
    }

    /// Like [`Engine::run`], over a caller-owned frontier (e.g. to cancel it)
    pub async fn run_with(&self, input: &CrawlInput, frontier: Arc<Frontier>) -> CrawlReport {
        ::log::info!(
            "[{}] Starting crawl: {} seeds, {} domains, {} paths, {} workers, cap {}",
            input.crawl_id,
            input.seed_entries.len(),
            input.target_domains.len(),
            input.target_paths.len(),
            self.workers,
            frontier.max_visits()
        );

        frontier.seed(
            input
                .seed_entries
                .iter()
                .map(|seed| FrontierEntry::new(seed.tag.clone(), seed.url.clone())),
        );

        let context = Arc::new(RunContext {
            crawl_id: input.crawl_id.clone(),
            fetcher: Arc::clone(&self.fetcher),
            gate: Arc::clone(&self.gate),
            normalizer: self.normalizer.clone(),
            frontier: Arc::clone(&frontier),
            scope: input.scope(),
            seeds: input.seed_entries.iter().map(|s| s.url.hash()).collect(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let context = Arc::clone(&context);
            workers.spawn(async move { run_worker(worker_id, &context).await });
        }

        let mut report = CrawlReport {
            crawl_id: input.crawl_id.clone(),
            ..CrawlReport::default()
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(partial) => report.merge(partial),
                Err(e) => ::log::error!("[{}] Worker task failed: {}", input.crawl_id, e),
            }
        }

        report.skipped_duplicates = frontier.skipped_duplicates();
        report.cap_reached = frontier.cap_reached();

        ::log::info!(
            "[{}] Crawl finished: {} visited, {} failed, {} persisted, {} persist errors{}",
            report.crawl_id,
            report.visited,
            report.failed,
            report.persisted,
            report.persist_errors,
            if report.cap_reached {
                " (visit cap reached)"
            } else {
                ""
            }
        );
        report
    }
}

async fn run_worker<F, S>(worker_id: usize, context: &RunContext<F, S>) -> CrawlReport
where
    F: Fetcher,
    S: ContentSink,
{
    ::log::debug!("[{}] Worker {} started", context.crawl_id, worker_id);
    let mut report = CrawlReport::default();

    while let Some(claim) = context.frontier.next().await {
        report.visited += 1;
        process_claim(worker_id, context, claim, &mut report).await;
    }

    ::log::debug!(
        "[{}] Worker {} done after {} pages",
        context.crawl_id,
        worker_id,
        report.visited
    );
    report
}

async fn process_claim<F, S>(
    worker_id: usize,
    context: &RunContext<F, S>,
    claim: Claim<'_>,
    report: &mut CrawlReport,
) where
    F: Fetcher,
    S: ContentSink,
{
    let entry = claim.entry().clone();
    ::log::info!(
        "[{}] Worker {} visiting {} (tag {})",
        context.crawl_id,
        worker_id,
        entry.url,
        entry.tag
    );

    let page = match context.fetcher.fetch(&entry.url, &context.scope).await {
        CrawlResult::Success(page) => page,
        CrawlResult::Failure(failure) => {
            report.failed += 1;
            ::log::error!(
                "[{}] Could not visit {}: {}",
                context.crawl_id,
                failure.url,
                failure.error
            );
            ::log::error!("{}", failure.trace);
            claim.complete(Vec::new());
            return;
        }
    };

    ::log::debug!(
        "[{}] {} -> {} {}",
        context.crawl_id,
        entry.url,
        page.status.code,
        page.status.text
    );

    let real_url = resolve_real_url(&context.normalizer, &page);
    let real_hash = real_url.hash();
    if real_url != entry.url {
        ::log::debug!("[{}] {} redirected to {}", context.crawl_id, entry.url, real_url);
        if !context.frontier.mark_seen(&real_hash) {
            ::log::info!(
                "[{}] {} already processed under another URL, skipping",
                context.crawl_id,
                real_url
            );
            claim.complete(Vec::new());
            return;
        }
    }

    let discovered: Vec<FrontierEntry> = page
        .links
        .iter()
        .map(|url| FrontierEntry::new(entry.tag.clone(), url.clone()))
        .collect();
    let found = discovered.len();
    let enqueued = claim.complete(discovered);

    ::log::info!(
        "[{}] Title: {:?}, tag {}, found {} links, queued {}",
        context.crawl_id,
        page.content.title,
        entry.tag,
        found,
        enqueued.len()
    );
    report.discovered.extend(
        enqueued
            .into_iter()
            .map(|e| (e.tag, e.url.to_string())),
    );

    if context.seeds.contains(&entry.url.hash()) || context.seeds.contains(&real_hash) {
        ::log::debug!("[{}] Not persisting seed page {}", context.crawl_id, real_url);
        return;
    }

    match context
        .gate
        .maybe_persist(&real_hash, &real_url, &page.content, &entry.tag, &context.crawl_id)
        .await
    {
        Ok(true) => report.persisted += 1,
        Ok(false) => {}
        Err(e) => {
            report.persist_errors += 1;
            ::log::error!(
                "[{}] Failed to persist {}: {}",
                context.crawl_id,
                real_url,
                crate::utils::error_trace(&e)
            );
        }
    }
}

/// The normalized post-redirect URL, or the requested one if it cannot be normalized
fn resolve_real_url(normalizer: &Normalizer, page: &CrawlSuccess) -> NormalizedUrl {
    match normalizer.normalize(&page.real_url) {
        Ok(url) => url,
        Err(e) => {
            ::log::debug!(
                "Keeping requested URL {} (real URL unusable: {})",
                page.url,
                e
            );
            page.url.clone()
        }
    }
}
