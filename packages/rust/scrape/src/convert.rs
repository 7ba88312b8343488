//! HTML to Markdown conversion for extracted page content.

use std::sync::LazyLock;

use docqa_shared::{Capability, DocQaError, Result};
use regex::Regex;

use crate::adapters::ExtractedContent;

static MULTI_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank-line regex"));

static TRAILING_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("trailing whitespace regex"));

/// Convert extracted content HTML to Markdown.
///
/// Chrome tags that survived extraction are skipped, blank-line runs are
/// collapsed, and the title is prepended as an H1 when the body lacks one.
pub(crate) fn to_markdown(content: &ExtractedContent) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
        ])
        .build();

    let raw = converter
        .convert(&content.html)
        .map_err(|e| DocQaError::malformed(Capability::Scrape, format!("HTML conversion failed: {e}")))?;

    let cleaned = TRAILING_WS_RE.replace_all(&raw, "");
    let cleaned = MULTI_BLANK_RE.replace_all(&cleaned, "\n\n");
    let body = cleaned.trim();

    Ok(match &content.title {
        Some(title) if !body.starts_with("# ") => format!("# {title}\n\n{body}\n"),
        _ => format!("{body}\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(html: &str, title: Option<&str>) -> ExtractedContent {
        ExtractedContent {
            html: html.into(),
            title: title.map(String::from),
        }
    }

    #[test]
    fn converts_headings_and_code() {
        let md = to_markdown(&content(
            "<h1>Install</h1><p>Run:</p><pre><code>pip install x</code></pre>",
            Some("Install"),
        ))
        .unwrap();

        assert!(md.starts_with("# Install"));
        assert!(md.contains("pip install x"));
        assert_eq!(md.matches("# Install").count(), 1);
    }

    #[test]
    fn prepends_missing_title() {
        let md = to_markdown(&content("<p>Body only</p>", Some("Guide"))).unwrap();
        assert!(md.starts_with("# Guide\n\nBody only"));
    }

    #[test]
    fn collapses_blank_runs_and_skips_chrome() {
        let md = to_markdown(&content(
            "<p>one</p><br><br><br><br><p>two</p><nav>menu</nav>",
            None,
        ))
        .unwrap();
        assert!(!md.contains("\n\n\n"));
        assert!(!md.contains("menu"));
        assert!(md.contains("one") && md.contains("two"));
    }
}
