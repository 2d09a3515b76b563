//! Shared crawl frontier.
//!
//! One `Frontier` is owned per run and shared by every worker. It holds the
//! FIFO work queue, the seen-set of URL hashes and the run-wide visit counter.
//! Dequeue, the seen check and the seen insert happen under one lock, so two
//! workers can never claim the same URL.

use crate::normalize::NormalizedUrl;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// A (tag, URL) pair waiting to be visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub tag: String,
    pub url: NormalizedUrl,
}

impl FrontierEntry {
    pub fn new(tag: impl Into<String>, url: NormalizedUrl) -> Self {
        Self {
            tag: tag.into(),
            url,
        }
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    in_flight: usize,
    skipped_duplicates: usize,
    cap_reached: bool,
}

impl FrontierState {
    /// Whether any queued entry would still be claimed
    fn has_unseen(&self) -> bool {
        self.queue
            .iter()
            .any(|entry| !self.seen.contains(&entry.url.hash()))
    }
}

#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    visits: AtomicUsize,
    max_visits: usize,
    cancelled: AtomicBool,
}

enum Attempt<'a> {
    Claimed(Claim<'a>),
    Wait,
    Done,
}

impl Frontier {
    pub fn new(max_visits: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            visits: AtomicUsize::new(0),
            max_visits,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Queue entries without any seen check; duplicates are dropped at dequeue
    pub fn seed(&self, entries: impl IntoIterator<Item = FrontierEntry>) {
        let mut state = self.lock();
        state.queue.extend(entries);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Claim the next unseen entry.
    ///
    /// Waits while the queue is empty but other workers still have pages in
    /// flight. Returns `None` once the queue is drained with nothing in flight,
    /// the visit cap is reached, or the run is cancelled.
    pub async fn next(&self) -> Option<Claim<'_>> {
        loop {
            // Registered before checking so a completion in between is not missed
            let notified = self.notify.notified();
            match self.try_claim() {
                Attempt::Claimed(claim) => return Some(claim),
                Attempt::Done => {
                    self.notify.notify_waiters();
                    return None;
                }
                Attempt::Wait => notified.await,
            }
        }
    }

    fn try_claim(&self) -> Attempt<'_> {
        if self.is_cancelled() {
            return Attempt::Done;
        }

        let mut state = self.lock();
        if self.visits.load(Ordering::SeqCst) >= self.max_visits {
            if !state.cap_reached && state.has_unseen() {
                state.cap_reached = true;
                ::log::info!(
                    "Visit cap of {} reached with {} entries still queued",
                    self.max_visits,
                    state.queue.len()
                );
            }
            return Attempt::Done;
        }

        while let Some(entry) = state.queue.pop_front() {
            let hash = entry.url.hash();
            if !state.seen.insert(hash.clone()) {
                state.skipped_duplicates += 1;
                ::log::trace!("Skipping already visited: {}", entry.url);
                continue;
            }

            self.visits.fetch_add(1, Ordering::SeqCst);
            state.in_flight += 1;
            return Attempt::Claimed(Claim {
                frontier: self,
                entry,
                hash,
                released: false,
            });
        }

        if state.in_flight == 0 {
            Attempt::Done
        } else {
            Attempt::Wait
        }
    }

    /// Insert a hash into the seen-set; false if it was already there
    pub fn mark_seen(&self, hash: &str) -> bool {
        self.lock().seen.insert(hash.to_string())
    }

    /// Stop handing out entries; pages already claimed finish normally
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            ::log::info!("Crawl cancelled, workers will stop after their current page");
        }
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of entries claimed so far
    pub fn visits(&self) -> usize {
        self.visits.load(Ordering::SeqCst)
    }

    pub fn max_visits(&self) -> usize {
        self.max_visits
    }

    /// Entries still queued (including not-yet-discarded duplicates)
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn skipped_duplicates(&self) -> usize {
        self.lock().skipped_duplicates
    }

    pub fn cap_reached(&self) -> bool {
        self.lock().cap_reached
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // The state is plain data; a panicking worker cannot leave it half-updated
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, discovered: Vec<FrontierEntry>) -> Vec<FrontierEntry> {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        let mut enqueued = Vec::with_capacity(discovered.len());
        for entry in discovered {
            if state.seen.contains(&entry.url.hash()) {
                ::log::trace!("Not queuing already visited link: {}", entry.url);
                continue;
            }
            state.queue.push_back(entry.clone());
            enqueued.push(entry);
        }

        if self.visits.load(Ordering::SeqCst) >= self.max_visits && state.has_unseen() {
            state.cap_reached = true;
        }
        drop(state);

        self.notify.notify_waiters();
        enqueued
    }
}

/// An entry handed to one worker.
///
/// Dropping a claim without calling [`Claim::complete`] still releases its
/// in-flight slot, so a worker that bails out never stalls the others.
#[derive(Debug)]
pub struct Claim<'a> {
    frontier: &'a Frontier,
    entry: FrontierEntry,
    hash: String,
    released: bool,
}

impl Claim<'_> {
    pub fn entry(&self) -> &FrontierEntry {
        &self.entry
    }

    /// Hash of the claimed URL
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Release the claim and queue links discovered on the page.
    ///
    /// Links whose hash is already seen are not queued. Returns the entries that were.
    pub fn complete(mut self, discovered: Vec<FrontierEntry>) -> Vec<FrontierEntry> {
        self.released = true;
        self.frontier.finish(discovered)
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.frontier.finish(Vec::new());
        }
    }
}
