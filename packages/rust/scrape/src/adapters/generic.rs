//! Generic (fallback) platform adapter.
//!
//! Used when no platform-specific adapter matches. Picks the most likely
//! main-content container and strips navigation chrome from it.

use scraper::Html;
use url::Url;

use super::{ExtractedContent, PlatformAdapter, extract_title, first_match, strip_matching};

/// Generic adapter that works on arbitrary HTML pages.
pub struct GenericAdapter;

impl PlatformAdapter for GenericAdapter {
    fn detect(&self, _doc: &Html, _url: &Url) -> bool {
        true
    }

    fn extract_content(&self, doc: &Html) -> ExtractedContent {
        let html = first_match(doc, &["main", "article", r#"[role="main"]"#, ".content", "body"])
            .map(|html| {
                strip_matching(&html, "nav, header, footer, aside, script, style, .sidebar, .nav")
            })
            .unwrap_or_default();

        ExtractedContent {
            html,
            title: extract_title(doc),
        }
    }

    fn name(&self) -> &str {
        "generic"
    }
}
