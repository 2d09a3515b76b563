//! Seed manifest parsing.
//!
//! A manifest has three sections, each introduced by a single header line and
//! terminated by a blank line (or end of file):
//!
//! ```text
//! # start urls
//! tech https://news.example.com/tech
//! world https://news.example.com/world
//!
//! # target domains
//! news.example.com
//!
//! # target paths
//! /tech
//! /world
//! ```

use crate::filter::{Scope, clean_domain};
use crate::normalize::{NormalizeError, NormalizedUrl, Normalizer};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest is missing the {0} section")]
    MissingSection(&'static str),

    #[error("line {line}: expected `tag url`, found {content:?}")]
    MalformedSeed { line: usize, content: String },

    #[error("line {line}: invalid seed URL")]
    InvalidSeedUrl {
        line: usize,
        #[source]
        source: NormalizeError,
    },

    #[error("line {line}: expected a bare domain name, found {content:?}")]
    MalformedDomain { line: usize, content: String },

    #[error("line {line}: path must start with `/`, found {content:?}")]
    MalformedPath { line: usize, content: String },

    #[error("manifest {0} section is empty")]
    EmptySection(&'static str),
}

/// A seed: a category tag and the URL to start from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub tag: String,
    pub url: NormalizedUrl,
}

/// Immutable configuration of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlInput {
    pub crawl_id: String,
    pub seed_entries: Vec<SeedEntry>,
    pub target_domains: Vec<String>,
    pub target_paths: Vec<String>,
}

impl CrawlInput {
    /// Read and parse a manifest file
    pub fn from_file<P: AsRef<Path>>(path: P, normalizer: &Normalizer) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents, normalizer)
    }

    /// Parse manifest text
    pub fn parse(contents: &str, normalizer: &Normalizer) -> Result<Self, ManifestError> {
        let mut lines = contents.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        let seed_lines = read_section(&mut lines, "start urls")?;
        let domains = read_section(&mut lines, "target domains")?;
        let paths = read_section(&mut lines, "target paths")?;

        let mut seed_entries = Vec::with_capacity(seed_lines.len());
        for (line, content) in seed_lines {
            let fields: Vec<&str> = content.split_whitespace().collect();
            let [tag, url] = fields.as_slice() else {
                return Err(ManifestError::MalformedSeed {
                    line,
                    content: content.to_string(),
                });
            };
            let url = normalizer
                .normalize(url)
                .map_err(|source| ManifestError::InvalidSeedUrl { line, source })?;
            seed_entries.push(SeedEntry {
                tag: tag.to_string(),
                url,
            });
        }

        for (line, content) in &domains {
            check_domain(*line, content)?;
        }
        for (line, content) in &paths {
            if !content.starts_with('/') {
                return Err(ManifestError::MalformedPath {
                    line: *line,
                    content: content.to_string(),
                });
            }
        }

        if seed_entries.is_empty() {
            return Err(ManifestError::EmptySection("start urls"));
        }
        if domains.is_empty() {
            return Err(ManifestError::EmptySection("target domains"));
        }
        if paths.is_empty() {
            return Err(ManifestError::EmptySection("target paths"));
        }

        let scope = Scope::new(
            domains.iter().map(|(_, d)| *d),
            paths.iter().map(|(_, p)| *p),
        );

        Ok(Self {
            crawl_id: generate_crawl_id(),
            seed_entries,
            target_domains: scope.domains,
            target_paths: scope.paths,
        })
    }

    /// Replace the generated crawl id
    pub fn with_crawl_id(mut self, crawl_id: impl Into<String>) -> Self {
        self.crawl_id = crawl_id.into();
        self
    }

    pub fn scope(&self) -> Scope {
        Scope {
            domains: self.target_domains.clone(),
            paths: self.target_paths.clone(),
        }
    }
}

/// A domain line must be a bare host name, not a URL or a list
fn check_domain(line: usize, content: &str) -> Result<(), ManifestError> {
    let malformed = || ManifestError::MalformedDomain {
        line,
        content: content.to_string(),
    };
    if content.contains(|c: char| c.is_whitespace() || c == '/' || c == ':') {
        return Err(malformed());
    }
    let domain = clean_domain(content);
    if domain.is_empty() || url::Host::parse(&domain).is_err() {
        return Err(malformed());
    }
    Ok(())
}

/// Skip the header line, then collect non-blank lines until a blank one
fn read_section<'a, I>(lines: &mut I, name: &'static str) -> Result<Vec<(usize, &'a str)>, ManifestError>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    // Tolerate extra blank lines between sections
    let header = lines.by_ref().find(|(_, l)| !l.is_empty());
    if header.is_none() {
        return Err(ManifestError::MissingSection(name));
    }

    Ok(lines.by_ref().take_while(|(_, l)| !l.is_empty()).collect())
}

/// Timestamp plus a random component, unique per run
pub fn generate_crawl_id() -> String {
    format!(
        "{}-{}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
        uuid::Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "# start urls
tech https://News.Example.com/tech?utm_source=feed
world https://news.example.com/world

# target domains
News.Example.com

# target paths
/tech
/World
";

    #[test]
    fn test_parse_manifest() {
        let input = CrawlInput::parse(MANIFEST, &Normalizer::default()).unwrap();
        assert_eq!(input.seed_entries.len(), 2);
        assert_eq!(input.seed_entries[0].tag, "tech");
        assert_eq!(
            input.seed_entries[0].url.as_str(),
            "https://news.example.com/tech"
        );
        assert_eq!(input.seed_entries[1].tag, "world");
        assert_eq!(input.target_domains, vec!["news.example.com"]);
        assert_eq!(input.target_paths, vec!["/tech", "/world"]);
        assert!(!input.crawl_id.is_empty());
    }

    #[test]
    fn test_malformed_seed_line() {
        let manifest = "# start urls\ntech\n\n# domains\nexample.com\n\n# paths\n/\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(err, ManifestError::MalformedSeed { line: 2, .. }));

        let manifest = "# start urls\ntech https://a.com extra\n\n# domains\na.com\n\n# paths\n/\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(err, ManifestError::MalformedSeed { line: 2, .. }));
    }

    #[test]
    fn test_invalid_seed_url() {
        let manifest = "# start urls\ntech ftp://example.com/x\n\n# domains\nexample.com\n\n# paths\n/\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidSeedUrl { line: 2, .. }));
    }

    #[test]
    fn test_missing_and_empty_sections() {
        let manifest = "# start urls\ntech https://example.com/\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingSection("target domains")));

        let manifest = "# start urls\ntech https://example.com/\n\n# domains\nexample.com\n\n# paths\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(err, ManifestError::EmptySection("target paths")));
    }

    #[test]
    fn test_malformed_domain_lines() {
        let parse = |domain: &str| {
            let manifest = format!(
                "# start urls\ntech https://example.com/\n\n# domains\nexample.com\n{domain}\n\n# paths\n/\n"
            );
            CrawlInput::parse(&manifest, &Normalizer::default())
        };

        for bad in ["https://news.example.com/", "news example.com", "example.com:8080", ".", "ex<ample.com"] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, ManifestError::MalformedDomain { line: 6, ref content } if content == bad),
                "{bad:?} gave {err:?}"
            );
        }
        assert!(parse(".news.example.com").is_ok());
        assert!(parse("127.0.0.1").is_ok());
    }

    #[test]
    fn test_malformed_path_line() {
        let manifest = "# start urls\ntech https://example.com/\n\n# domains\nexample.com\n\n# paths\n/world\ntech\n";
        let err = CrawlInput::parse(manifest, &Normalizer::default()).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MalformedPath { line: 9, ref content } if content == "tech"
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl_input.txt");
        std::fs::write(&path, MANIFEST).unwrap();

        let input = CrawlInput::from_file(&path, &Normalizer::default()).unwrap();
        assert_eq!(input.seed_entries.len(), 2);

        let missing = CrawlInput::from_file(dir.path().join("nope.txt"), &Normalizer::default());
        assert!(matches!(missing, Err(ManifestError::Io { .. })));
    }

    #[test]
    fn test_crawl_ids_are_unique() {
        assert_ne!(generate_crawl_id(), generate_crawl_id());
    }
}
