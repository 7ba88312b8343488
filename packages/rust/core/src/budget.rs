//! Size ceilings for text entering the reasoning loop.
//!
//! Truncation is a normal outcome, never an error. Cut text carries a
//! trailing [`TRUNCATION_MARKER`] so the reasoning step knows it is partial.

/// Appended to text that was cut at its ceiling.
pub const TRUNCATION_MARKER: &str = "\n[...truncated]";

/// Search and scrape ceilings, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentBudget {
    pub search_ceiling: usize,
    pub scrape_ceiling: usize,
}

impl ContentBudget {
    pub fn new(search_ceiling: usize, scrape_ceiling: usize) -> Self {
        Self {
            search_ceiling,
            scrape_ceiling,
        }
    }

    pub fn truncate_search_text(&self, text: &str) -> (String, bool) {
        truncate_to(text, self.search_ceiling)
    }

    pub fn truncate_scrape_text(&self, text: &str) -> (String, bool) {
        truncate_to(text, self.scrape_ceiling)
    }
}

/// Bound `text` to `ceiling` bytes, marker included.
///
/// Text at or under the ceiling is returned unchanged with `false`. Longer
/// text is cut on a char boundary and suffixed with the marker; if the
/// ceiling cannot even hold the marker, the bare prefix is returned.
pub fn truncate_to(text: &str, ceiling: usize) -> (String, bool) {
    if text.len() <= ceiling {
        return (text.to_string(), false);
    }

    if ceiling < TRUNCATION_MARKER.len() {
        let end = floor_char_boundary(text, ceiling);
        return (text[..end].to_string(), true);
    }

    let end = floor_char_boundary(text, ceiling - TRUNCATION_MARKER.len());
    let mut out = String::with_capacity(end + TRUNCATION_MARKER.len());
    out.push_str(&text[..end]);
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}

/// Whether `text` ends with the truncation marker.
pub fn is_truncated(text: &str) -> bool {
    text.ends_with(TRUNCATION_MARKER)
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}
