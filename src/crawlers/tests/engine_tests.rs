use super::site::{StaticSite, key};
use crate::crawlers::engine::Engine;
use crate::filter::in_target_scope;
use crate::manifest::{CrawlInput, SeedEntry};
use crate::normalize::normalize;
use crate::results::PersistedContent;
use crate::store::{ContentSink, MemoryStore, StoreError, StoreGate};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

fn input(seeds: &[(&str, &str)], domains: &[&str], paths: &[&str]) -> CrawlInput {
    CrawlInput {
        crawl_id: "test-run".to_string(),
        seed_entries: seeds
            .iter()
            .map(|(tag, url)| SeedEntry {
                tag: tag.to_string(),
                url: normalize(url).unwrap(),
            })
            .collect(),
        target_domains: domains.iter().map(|d| d.to_string()).collect(),
        target_paths: paths.iter().map(|p| p.to_string()).collect(),
    }
}

fn engine(
    site: StaticSite,
    allow_list: &[&str],
) -> (Arc<StaticSite>, Engine<Arc<StaticSite>, Arc<MemoryStore>>) {
    let site = Arc::new(site);
    let store = Arc::new(MemoryStore::new());
    let gate = StoreGate::new(store, allow_list.iter().map(|d| d.to_string()).collect());
    (Arc::clone(&site), Engine::new(site, gate))
}

fn stored_urls(engine: &Engine<Arc<StaticSite>, Arc<MemoryStore>>) -> Vec<String> {
    engine.gate().sink().urls()
}

#[tokio::test]
async fn test_seed_page_scenario() {
    let site = StaticSite::new()
        .page(
            "https://news.example.com/tech",
            &["https://news.example.com/tech/a", "https://ads.example.com/x"],
        )
        .page("https://news.example.com/tech/a", &[]);
    let (site, engine) = engine(site, &["example.com"]);

    let run = input(
        &[("tech", "https://news.example.com/tech")],
        &["news.example.com"],
        &["/tech"],
    );
    let report = engine.run(&run).await;

    assert_eq!(
        report.discovered,
        vec![(
            "tech".to_string(),
            "https://news.example.com/tech/a".to_string()
        )]
    );
    assert_eq!(
        site.fetched(),
        vec![key("https://news.example.com/tech"), key("https://news.example.com/tech/a")]
    );
    // The seed is on the allow-list but is never stored
    assert_eq!(stored_urls(&engine), vec!["https://news.example.com/tech/a"]);
    assert_eq!(report.crawl_id, "test-run");
    assert_eq!(report.visited, 2);
    assert_eq!(report.persisted, 1);
    assert!(!report.cap_reached);
}

#[tokio::test]
async fn test_converging_redirects_are_processed_once() {
    let site = StaticSite::new()
        .page(
            "https://example.com/tech",
            &["/tech/a", "/tech/b", "/tech/c"],
        )
        .redirect("https://example.com/tech/a", "https://example.com/tech/c")
        .redirect("https://example.com/tech/b", "https://example.com/tech/c")
        .page("https://example.com/tech/c", &["/tech"]);
    let (site, engine) = engine(site, &["example.com"]);

    let report = engine
        .run(&input(&[("tech", "https://example.com/tech")], &["example.com"], &["/tech"]))
        .await;

    let fetched = site.fetched();
    let unique: HashSet<&String> = fetched.iter().collect();
    assert_eq!(unique.len(), fetched.len());
    assert!(!fetched.contains(&key("https://example.com/tech/c")));

    // c's content arrives through a and is stored exactly once
    let store = engine.gate().sink();
    assert_eq!(store.len(), 1);
    let c = normalize("https://example.com/tech/c").unwrap();
    assert!(store.get(&c.hash()).is_some());
    assert_eq!(report.skipped_duplicates, 1);
}

#[tokio::test]
async fn test_visit_cap_bounds_fetches() {
    let mut site = StaticSite::new();
    let urls: Vec<String> = (0..50).map(|i| format!("https://example.com/tech/{i}")).collect();
    for pair in urls.windows(2) {
        site = site.page(&pair[0], &[pair[1].as_str()]);
    }
    let (site, engine) = engine(site, &[]);
    let engine = engine.with_max_visits(10);

    let report = engine
        .run(&input(&[("tech", urls[0].as_str())], &["example.com"], &["/tech"]))
        .await;

    assert_eq!(site.fetched().len(), 10);
    assert_eq!(report.visited, 10);
    assert!(report.cap_reached);
}

#[tokio::test]
async fn test_tags_follow_links() {
    let site = StaticSite::new()
        .page("https://example.com/tech", &["/tech/a"])
        .page("https://example.com/tech/a", &["/tech/a/deeper"])
        .page("https://example.com/world", &["/world/b"])
        .page("https://example.com/world/b", &[]);
    let (_, engine) = engine(site, &[]);

    let report = engine
        .run(&input(
            &[
                ("tech", "https://example.com/tech"),
                ("world", "https://example.com/world"),
            ],
            &["example.com"],
            &["/"],
        ))
        .await;

    assert_eq!(report.discovered.len(), 3);
    for (tag, url) in &report.discovered {
        let path = Url::parse(url).unwrap().path().to_string();
        assert!(path.starts_with(&format!("/{tag}")), "{url} queued with tag {tag}");
    }
}

#[tokio::test]
async fn test_failed_page_does_not_stop_run() {
    let site = StaticSite::new()
        .page("https://example.com/", &["/a", "/b", "/c"])
        .page("https://example.com/a", &[])
        .timeout("https://example.com/b")
        .page("https://example.com/c", &[]);
    let (site, engine) = engine(site, &["example.com"]);

    let report = engine
        .run(&input(&[("t", "https://example.com/")], &["example.com"], &["/"]))
        .await;

    assert_eq!(site.fetched().len(), 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.visited, 4);
    assert_eq!(
        stored_urls(&engine),
        vec!["https://example.com/a", "https://example.com/c"]
    );
}

#[tokio::test]
async fn test_only_in_scope_links_are_queued() {
    let site = StaticSite::new()
        .page(
            "https://news.example.com/tech",
            &[
                "/tech/1",
                "/sport/2",
                "https://blog.news.example.com/tech/3",
                "https://example.org/tech/4",
                "javascript:void(0)",
                "https://news.example.com/TECH/5?utm_source=x",
            ],
        )
        .page("https://news.example.com/tech/1", &["/tech/6", "/about"]);
    let (_, engine) = engine(site, &[]);

    let run = input(
        &[("tech", "https://news.example.com/tech")],
        &["news.example.com"],
        &["/tech"],
    );
    let report = engine.run(&run).await;

    let queued: Vec<&str> = report.discovered.iter().map(|(_, u)| u.as_str()).collect();
    assert_eq!(
        queued,
        vec![
            "https://blog.news.example.com/tech/3",
            "https://news.example.com/TECH/5",
            "https://news.example.com/tech/1",
            "https://news.example.com/tech/6",
        ]
    );
    for url in queued {
        let url = Url::parse(url).unwrap();
        assert!(in_target_scope(&url, &run.target_domains, &run.target_paths));
    }
}

#[tokio::test]
async fn test_persistence_allow_list() {
    let site = StaticSite::new()
        .page(
            "https://hub.example.com/",
            &["https://partner.example.com/story", "https://hub.example.com/story"],
        )
        .page("https://partner.example.com/story", &[])
        .page("https://hub.example.com/story", &[]);
    let (_, engine) = engine(site, &["partner.example.com"]);

    let report = engine
        .run(&input(&[("news", "https://hub.example.com/")], &["example.com"], &["/"]))
        .await;

    assert_eq!(report.visited, 3);
    assert_eq!(stored_urls(&engine), vec!["https://partner.example.com/story"]);
    let stored: PersistedContent = engine
        .gate()
        .sink()
        .get(&normalize("https://partner.example.com/story").unwrap().hash())
        .unwrap();
    assert_eq!(stored.tag, "news");
    assert_eq!(stored.crawl_id, "test-run");
    assert_eq!(stored.title, "/story");
}

#[tokio::test]
async fn test_parallel_workers_visit_each_page_once() {
    let pages: Vec<String> = (0..40).map(|i| format!("https://example.com/p/{i}")).collect();
    let mut site = StaticSite::new().page(
        "https://example.com/p",
        &pages.iter().map(String::as_str).collect::<Vec<_>>(),
    );
    for i in 0..40 {
        let next = format!("/p/{}", (i + 1) % 40);
        let jump = format!("/p/{}", (i + 13) % 40);
        site = site.page(&pages[i], &[next.as_str(), jump.as_str(), "/p"]);
    }
    let (site, engine) = engine(site, &["example.com"]);
    let engine = engine.with_workers(4);

    let report = engine
        .run(&input(&[("p", "https://example.com/p")], &["example.com"], &["/p"]))
        .await;

    let fetched = site.fetched();
    let unique: HashSet<&String> = fetched.iter().collect();
    assert_eq!(fetched.len(), 41);
    assert_eq!(unique.len(), 41);
    assert_eq!(report.visited, 41);
    assert_eq!(report.persisted, 40);
}

#[tokio::test]
async fn test_parallel_workers_respect_cap() {
    let pages: Vec<String> = (0..30).map(|i| format!("https://example.com/p/{i}")).collect();
    let mut site = StaticSite::new().page(
        "https://example.com/p",
        &pages.iter().map(String::as_str).collect::<Vec<_>>(),
    );
    for page in &pages {
        site = site.page(page, &[]);
    }
    let (site, engine) = engine(site, &[]);
    let engine = engine.with_workers(3).with_max_visits(7);

    let report = engine
        .run(&input(&[("p", "https://example.com/p")], &["example.com"], &["/p"]))
        .await;

    assert_eq!(site.fetched().len(), 7);
    assert!(report.cap_reached);
}

struct BrokenSink;

impl ContentSink for BrokenSink {
    async fn write(&self, content: &PersistedContent) -> Result<(), StoreError> {
        Err(StoreError::Io {
            path: content.key.clone(),
            source: std::io::Error::other("disk full"),
        })
    }
}

#[tokio::test]
async fn test_persist_errors_are_logged_and_skipped() {
    let site = Arc::new(
        StaticSite::new()
            .page("https://example.com/", &["/a", "/b"])
            .page("https://example.com/a", &[])
            .page("https://example.com/b", &[]),
    );
    let gate = StoreGate::new(BrokenSink, vec!["example.com".to_string()]);
    let engine = Engine::new(Arc::clone(&site), gate);

    let report = engine
        .run(&input(&[("t", "https://example.com/")], &["example.com"], &["/"]))
        .await;

    assert_eq!(site.fetched().len(), 3);
    assert_eq!(report.persist_errors, 2);
    assert_eq!(report.persisted, 0);
}

#[tokio::test]
async fn test_cancelled_frontier_fetches_nothing() {
    let site = StaticSite::new().page("https://example.com/", &[]);
    let (site, engine) = engine(site, &[]);

    let frontier = engine.frontier();
    frontier.cancel();
    let report = engine
        .run_with(
            &input(&[("t", "https://example.com/")], &["example.com"], &["/"]),
            frontier,
        )
        .await;

    assert!(site.fetched().is_empty());
    assert_eq!(report.visited, 0);
}
