//! Domain allow-list: the curated set of documentation sites docqa may use.
//!
//! Loaded once at startup from a CSV source and read-only afterwards, so it
//! can be shared across requests without locking. A missing or malformed
//! source is not fatal: the list degrades to empty and callers surface
//! "no sites configured" as a limitation.

mod parser;

use std::path::Path;

use docqa_shared::{DomainEntry, Result};
use tracing::{info, instrument, warn};
use url::Url;

pub use parser::{ParsedSites, SkippedRow, normalize_hostname};

// ---------------------------------------------------------------------------
// DomainAllowList
// ---------------------------------------------------------------------------

/// Immutable set of allowed documentation hosts.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowList {
    entries: Vec<DomainEntry>,
}

impl DomainAllowList {
    /// Build from already-normalised entries.
    pub fn new(entries: Vec<DomainEntry>) -> Self {
        Self { entries }
    }

    /// An allow-list that permits nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse CSV content. Skipped rows are logged as warnings.
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let parsed = parser::parse_sites_csv(content)?;
        for row in &parsed.skipped {
            warn!(line = row.line, reason = %row.reason, "skipping allow-list row");
        }
        Ok(Self::new(parsed.entries))
    }

    /// Load from a CSV file, degrading to an empty list on any failure.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "could not read allow-list source, no sites allowed");
                return Self::empty();
            }
        };

        match Self::from_csv_str(&content) {
            Ok(list) if list.is_empty() => {
                warn!("allow-list source has no usable rows, no sites allowed");
                list
            }
            Ok(list) => {
                info!(sites = list.len(), "allow-list loaded");
                list
            }
            Err(e) => {
                warn!(error = %e, "malformed allow-list source, no sites allowed");
                Self::empty()
            }
        }
    }

    pub fn entries(&self) -> &[DomainEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hostnames in source order, for provider-side domain restriction.
    pub fn hostnames(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.hostname.clone()).collect()
    }

    /// Whether `hostname` is an allowed host or a subdomain of one.
    pub fn is_allowed(&self, hostname: &str) -> bool {
        self.match_host(hostname).is_some()
    }

    /// The most specific entry covering `hostname`, if any.
    ///
    /// `api.docs.example.com` matches an entry for `docs.example.com` or
    /// `example.com`; when both exist the longer hostname wins.
    pub fn match_host(&self, hostname: &str) -> Option<&DomainEntry> {
        let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .filter(|e| host_covers(&e.hostname, &host))
            .max_by_key(|e| e.hostname.len())
    }

    /// Match the host of an absolute http(s) URL.
    pub fn match_url(&self, url: &str) -> Option<&DomainEntry> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return None;
        }
        self.match_host(parsed.host_str()?)
    }

    /// Description for a domain key.
    pub fn describe(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.description.as_str())
    }

    /// Render the knowledge sources as Markdown for the reasoning prompt.
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "## {}\n\n- {}: {}\n\n",
                entry.key, entry.hostname, entry.description
            ));
        }
        out
    }
}

fn host_covers(allowed: &str, host: &str) -> bool {
    host == allowed
        || host
            .strip_suffix(allowed)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, hostname: &str) -> DomainEntry {
        DomainEntry {
            key: key.into(),
            hostname: hostname.into(),
            description: format!("{key} docs"),
        }
    }

    fn sample() -> DomainAllowList {
        DomainAllowList::new(vec![
            entry("langchain", "docs.langchain.com"),
            entry("example", "example.com"),
            entry("example-docs", "docs.example.com"),
        ])
    }

    #[test]
    fn exact_and_subdomain_matches() {
        let list = sample();
        assert!(list.is_allowed("docs.langchain.com"));
        assert!(list.is_allowed("DOCS.LangChain.com."));
        assert!(list.is_allowed("api.docs.langchain.com"));
        assert!(!list.is_allowed("langchain.com"));
        assert!(!list.is_allowed("evildocs.langchain.com.attacker.io"));
        assert!(!list.is_allowed("notdocs.langchain.com.evil"));
        assert!(!list.is_allowed(""));
    }

    #[test]
    fn suffix_without_dot_boundary_does_not_match() {
        let list = sample();
        assert!(!list.is_allowed("myexample.com"));
        assert!(list.is_allowed("www.example.com"));
    }

    #[test]
    fn most_specific_entry_wins() {
        let list = sample();
        let hit = list.match_host("v2.docs.example.com").unwrap();
        assert_eq!(hit.key, "example-docs");
        let hit = list.match_host("blog.example.com").unwrap();
        assert_eq!(hit.key, "example");
    }

    #[test]
    fn match_url_requires_http() {
        let list = sample();
        assert_eq!(
            list.match_url("https://docs.langchain.com/docs/intro").map(|e| e.key.as_str()),
            Some("langchain")
        );
        assert!(list.match_url("ftp://docs.langchain.com/file").is_none());
        assert!(list.match_url("not a url").is_none());
    }

    #[test]
    fn describe_by_key() {
        let list = sample();
        assert_eq!(list.describe("langchain"), Some("langchain docs"));
        assert_eq!(list.describe("missing"), None);
    }

    #[test]
    fn empty_list_allows_nothing() {
        let list = DomainAllowList::empty();
        assert!(list.is_empty());
        assert!(!list.is_allowed("docs.langchain.com"));
        assert!(list.render_markdown().is_empty());
    }

    #[test]
    fn load_fixture() {
        let list = DomainAllowList::load(Path::new("../../../fixtures/sites/sites_data.csv"));
        assert_eq!(list.len(), 4);
        assert!(list.is_allowed("fastapi.tiangolo.com"));
        assert_eq!(list.describe("python"), Some("Python 3 docs, latest release"));
    }

    #[test]
    fn load_missing_file_degrades_to_empty() {
        let list = DomainAllowList::load(Path::new("../../../fixtures/sites/does-not-exist.csv"));
        assert!(list.is_empty());
    }

    #[test]
    fn load_malformed_source_degrades_to_empty() {
        let dir = std::env::temp_dir().join(format!("docqa-domains-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.csv");
        std::fs::write(&path, "just,some,columns\n1,2,3\n").unwrap();

        let list = DomainAllowList::load(&path);
        assert!(list.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn render_lists_every_site() {
        let md = sample().render_markdown();
        assert!(md.contains("## langchain"));
        assert!(md.contains("- docs.example.com: example-docs docs"));
    }
}
