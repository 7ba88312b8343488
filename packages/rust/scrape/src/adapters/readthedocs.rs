//! Read the Docs (Sphinx) platform adapter.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_title, first_match, selector, strip_matching};

/// Detects and extracts content from Read the Docs documentation sites.
pub struct ReadTheDocsAdapter;

impl PlatformAdapter for ReadTheDocsAdapter {
    fn detect(&self, doc: &Html, _url: &Url) -> bool {
        [
            r#"meta[name="readthedocs"]"#,
            ".wy-nav-side",
            ".wy-body-for-nav",
            // _static/ asset paths are the common Sphinx marker
            r#"link[href*="_static"]"#,
        ]
        .iter()
        .any(|css| doc.select(&selector(css)).next().is_some())
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let html = first_match(doc, &[r#"[role="main"]"#, ".document", ".rst-content", "main"])
            .map(|html| strip_matching(&html, r#"footer, [role="navigation"]"#))
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_title(doc),
        }
    }

    fn name(&self) -> &str {
        "readthedocs"
    }
}
