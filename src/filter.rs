use serde::{Deserialize, Serialize};
use url::Url;

/// Domain and path allow-lists restricting which discovered links are followed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    /// Registrable domains, matched against the host or any of its parents
    pub domains: Vec<String>,

    /// Path prefixes; a URL must start with at least one of them
    pub paths: Vec<String>,
}

impl Scope {
    pub fn new<D, P>(domains: D, paths: P) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| clean_domain(d.as_ref()))
                .filter(|d| !d.is_empty())
                .collect(),
            paths: paths
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a URL should be crawled for this run
    pub fn contains(&self, url: &Url) -> bool {
        in_target_scope(url, &self.domains, &self.paths)
    }
}

/// True iff the host is (a subdomain of) one of `domains` and the path starts with one of `paths`.
///
/// An empty `paths` list matches nothing; callers wanting every path pass `/`.
pub fn in_target_scope<D: AsRef<str>, P: AsRef<str>>(url: &Url, domains: &[D], paths: &[P]) -> bool {
    url_is_from_any_domain(url, domains) && url_has_any_path(url, paths)
}

/// True iff the host is (a subdomain of) an entry of the persistence allow-list.
///
/// Independent of the crawl scope: a page may be crawled for links and never stored.
pub fn eligible_for_persistence<D: AsRef<str>>(url: &Url, allow_list: &[D]) -> bool {
    url_is_from_any_domain(url, allow_list)
}

/// Case-insensitive host match: exact, or suffix match on `.` + domain
pub fn url_is_from_any_domain<D: AsRef<str>>(url: &Url, domains: &[D]) -> bool {
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.trim_end_matches('.').to_lowercase(),
        _ => return false,
    };

    domains.iter().any(|domain| {
        let domain = clean_domain(domain.as_ref());
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.')))
    })
}

/// Case-insensitive path prefix match
pub fn url_has_any_path<P: AsRef<str>>(url: &Url, paths: &[P]) -> bool {
    let path = url.path().to_lowercase();
    paths.iter().any(|prefix| {
        let prefix = prefix.as_ref().trim().to_lowercase();
        !prefix.is_empty() && path.starts_with(&prefix)
    })
}

pub(crate) fn clean_domain(domain: &str) -> String {
    domain.trim().trim_matches('.').to_lowercase()
}
