use crate::filter::Scope;
use crate::normalize::NormalizedUrl;
use crate::results::CrawlResult;
use std::future::Future;
use std::sync::Arc;

/// Loads one page and reports its content and in-scope links.
///
/// Implementations never fail outright: navigation problems come back as
/// [`CrawlResult::Failure`] so the engine can log them and move on.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &NormalizedUrl, scope: &Scope) -> impl Future<Output = CrawlResult> + Send;
}

impl<F: Fetcher> Fetcher for Arc<F> {
    fn fetch(&self, url: &NormalizedUrl, scope: &Scope) -> impl Future<Output = CrawlResult> + Send {
        (**self).fetch(url, scope)
    }
}
