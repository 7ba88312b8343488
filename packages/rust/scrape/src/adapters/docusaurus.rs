//! Docusaurus platform adapter.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_title, first_match, selector};

/// Detects and extracts content from Docusaurus-powered documentation sites.
pub struct DocusaurusAdapter;

impl PlatformAdapter for DocusaurusAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        // <meta name="generator" content="Docusaurus ...">
        let generator = doc
            .select(&selector(r#"meta[name="generator"]"#))
            .filter_map(|el| el.value().attr("content"))
            .any(|content| content.to_lowercase().contains("docusaurus"));

        generator || doc.select(&selector("[data-docusaurus-version]")).next().is_some()
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let html = first_match(doc, &["article .markdown", "article", ".markdown", "main", "body"])
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_title(doc),
        }
    }

    fn name(&self) -> &str {
        "docusaurus"
    }
}
