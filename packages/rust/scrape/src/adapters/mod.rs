//! Platform adapters for pulling the main content out of documentation pages.
//!
//! Adapters detect specific documentation platforms (Docusaurus, Read the Docs)
//! and select the article body, leaving sidebars and page chrome behind.

mod docusaurus;
mod generic;
mod readthedocs;

use scraper::{Html, Selector};
use url::Url;

pub use docusaurus::DocusaurusAdapter;
pub use generic::GenericAdapter;
pub use readthedocs::ReadTheDocsAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Content extraction result from an adapter.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Content HTML with platform chrome removed.
    pub html: String,
    /// Page title (first H1, falling back to `<title>`).
    pub title: Option<String>,
}

/// Trait for platform-specific content extraction.
///
/// Adapters are tried in priority order; `GenericAdapter` is the always-last fallback.
pub trait PlatformAdapter: Send + Sync {
    /// Returns `true` if this adapter should handle the document.
    fn detect(&self, doc: &Html, url: &Url) -> bool;

    /// Extract the main content as HTML.
    fn extract_content(&self, doc: &Html) -> ExtractedContent;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered adapters in priority order.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PlatformAdapter>>,
    fallback: GenericAdapter,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: vec![Box::new(DocusaurusAdapter), Box::new(ReadTheDocsAdapter)],
            fallback: GenericAdapter,
        }
    }

    /// Detect the best adapter for the given HTML document.
    pub fn detect(&self, doc: &Html, url: &Url) -> &dyn PlatformAdapter {
        self.adapters
            .iter()
            .find(|a| a.detect(doc, url))
            .map(|a| a.as_ref())
            .unwrap_or(&self.fallback)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a selector known at compile time.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// First H1 text, falling back to the document `<title>`.
pub(crate) fn extract_title(doc: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|css| {
        doc.select(&selector(css))
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Inner HTML of the first element matching any of `candidates`, in order.
pub(crate) fn first_match(doc: &Html, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|css| doc.select(&selector(css)).next().map(|el| el.inner_html()))
}

/// Remove every element matching `css` from an HTML fragment.
pub(crate) fn strip_matching(html: &str, css: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();
    for el in fragment.select(&selector(css)) {
        result = result.replace(&el.html(), "");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn load_fixture(name: &str) -> Html {
        let path = format!("../../../fixtures/html/{name}");
        let content =
            std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"));
        Html::parse_document(&content)
    }

    fn dummy_url() -> Url {
        Url::parse("https://docs.example.com/page").unwrap()
    }

    #[test]
    fn detect_docusaurus() {
        let doc = load_fixture("docusaurus.html");
        let registry = AdapterRegistry::new();
        assert_eq!(registry.detect(&doc, &dummy_url()).name(), "docusaurus");
    }

    #[test]
    fn detect_readthedocs() {
        let doc = load_fixture("readthedocs.html");
        let registry = AdapterRegistry::new();
        assert_eq!(registry.detect(&doc, &dummy_url()).name(), "readthedocs");
    }

    #[test]
    fn detect_generic_fallback() {
        let doc = load_fixture("generic.html");
        let registry = AdapterRegistry::new();
        assert_eq!(registry.detect(&doc, &dummy_url()).name(), "generic");
    }

    #[test]
    fn title_falls_back_to_title_tag() {
        let doc = Html::parse_document("<html><head><title>Only Title</title></head><body><p>x</p></body></html>");
        assert_eq!(extract_title(&doc).as_deref(), Some("Only Title"));
    }

    #[test]
    fn strip_matching_removes_elements() {
        let html = r#"<p>keep</p><div role="navigation"><a href="/">prev</a></div>"#;
        let stripped = strip_matching(html, r#"[role="navigation"]"#);
        assert!(stripped.contains("keep"));
        assert!(!stripped.contains("prev"));
    }
}
