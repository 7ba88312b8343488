//! Tabular allow-list parser.
//!
//! The source is a CSV file with a required header row naming three columns:
//! - the domain key (`domain_key`, `key`, or `domain`)
//! - the hostname (`hostname`, `host`, or `site`)
//! - `description`
//!
//! Fields may be double-quoted; `""` inside a quoted field is a literal quote.
//! Records are single-line.

use std::collections::HashMap;
use std::sync::LazyLock;

use docqa_shared::{DocQaError, DomainEntry, Result};
use regex::Regex;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parsed representation of an allow-list source.
#[derive(Debug, Clone, Default)]
pub struct ParsedSites {
    /// Entries in first-seen key order; a repeated key keeps its slot but takes the later row.
    pub entries: Vec<DomainEntry>,
    /// Rows that were dropped, with the reason.
    pub skipped: Vec<SkippedRow>,
}

/// A data row that did not produce an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line number in the source.
    pub line: usize,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// A DNS hostname: dot-separated labels of letters, digits and inner hyphens.
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")
        .expect("hostname regex")
});

const KEY_COLUMNS: &[&str] = &["domain_key", "domainkey", "key", "domain"];
const HOST_COLUMNS: &[&str] = &["hostname", "host", "site"];
const DESCRIPTION_COLUMNS: &[&str] = &["description"];

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse CSV allow-list content.
///
/// Fails only when the header row is missing or lacks a required column;
/// bad data rows are skipped and reported in [`ParsedSites::skipped`].
pub(crate) fn parse_sites_csv(content: &str) -> Result<ParsedSites> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_start_matches('\u{feff}')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| DocQaError::parse("allow-list source is empty"))?;
    let header = split_record(header).map_err(|e| {
        DocQaError::parse(format!("line {header_line}: invalid header row: {e}"))
    })?;

    let key_idx = find_column(&header, KEY_COLUMNS)?;
    let host_idx = find_column(&header, HOST_COLUMNS)?;
    let desc_idx = find_column(&header, DESCRIPTION_COLUMNS)?;

    let mut parsed = ParsedSites::default();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for (line_no, line) in lines {
        let fields = match split_record(line) {
            Ok(fields) => fields,
            Err(reason) => {
                parsed.skipped.push(SkippedRow { line: line_no, reason });
                continue;
            }
        };

        let field = |idx: usize| fields.get(idx).map(|s| s.trim()).unwrap_or("");

        let raw_host = field(host_idx);
        if raw_host.is_empty() {
            parsed.skipped.push(SkippedRow {
                line: line_no,
                reason: "empty hostname".into(),
            });
            continue;
        }

        let Some(hostname) = normalize_hostname(raw_host) else {
            parsed.skipped.push(SkippedRow {
                line: line_no,
                reason: format!("invalid hostname '{raw_host}'"),
            });
            continue;
        };

        let key = match field(key_idx) {
            "" => hostname.clone(),
            k => k.to_string(),
        };

        let entry = DomainEntry {
            key: key.clone(),
            hostname,
            description: field(desc_idx).to_string(),
        };

        // Duplicate key: last row wins
        match slots.get(&key) {
            Some(&slot) => parsed.entries[slot] = entry,
            None => {
                slots.insert(key, parsed.entries.len());
                parsed.entries.push(entry);
            }
        }
    }

    Ok(parsed)
}

/// Normalize a hostname cell: lowercase, drop scheme, path, port and trailing dot.
///
/// Returns `None` if what remains is not a valid DNS hostname.
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);

    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .trim_end_matches('.');

    HOSTNAME_RE.is_match(host).then(|| host.to_string())
}

fn find_column(header: &[String], names: &[&str]) -> Result<usize> {
    header
        .iter()
        .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        .ok_or_else(|| {
            DocQaError::parse(format!(
                "header row is missing a '{}' column (found: {})",
                names[0],
                header.join(",")
            ))
        })
}

/// Split one CSV record into fields.
fn split_record(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.trim().is_empty() => {
                current.clear();
                in_quotes = true;
            }
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".into());
    }
    fields.push(current);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixture() {
        let content = std::fs::read_to_string("../../../fixtures/sites/sites_data.csv")
            .expect("read fixture");
        let parsed = parse_sites_csv(&content).unwrap();

        let keys: Vec<&str> = parsed.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["langchain", "fastapi", "python", "rust"]);

        // Scheme and trailing slash stripped
        assert_eq!(parsed.entries[1].hostname, "fastapi.tiangolo.com");

        // Duplicate key: later row replaced the earlier one in place
        assert_eq!(parsed.entries[2].hostname, "docs.python.org");
        assert_eq!(parsed.entries[2].description, "Python 3 docs, latest release");

        // Quoted description with an embedded comma
        assert_eq!(
            parsed.entries[0].description,
            "LangChain framework docs: chains, agents, tools"
        );

        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 5);
        assert_eq!(parsed.skipped[0].reason, "empty hostname");
    }

    #[test]
    fn accepts_site_and_domain_column_names() {
        let content = "site,domain,description\ndocs.langchain.com,AI,LLM framework\n";
        let parsed = parse_sites_csv(content).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].key, "AI");
        assert_eq!(parsed.entries[0].hostname, "docs.langchain.com");
    }

    #[test]
    fn empty_source_fails() {
        assert!(parse_sites_csv("").is_err());
        assert!(parse_sites_csv("\n\n").is_err());
    }

    #[test]
    fn header_without_hostname_column_fails() {
        let err = parse_sites_csv("key,description\nx,y\n").unwrap_err();
        assert!(err.to_string().contains("hostname"));
    }

    #[test]
    fn header_only_yields_no_entries() {
        let parsed = parse_sites_csv("domain_key,hostname,description\n").unwrap();
        assert!(parsed.entries.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let content = "domain_key,hostname,description\n\
                       a,\"unterminated,desc\n\
                       b,not a host!,desc\n\
                       c,example.com,ok\n";
        let parsed = parse_sites_csv(content).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].key, "c");
        assert_eq!(parsed.skipped.len(), 2);
    }

    #[test]
    fn missing_key_falls_back_to_hostname() {
        let parsed = parse_sites_csv("domain_key,hostname,description\n,example.org,Example\n")
            .unwrap();
        assert_eq!(parsed.entries[0].key, "example.org");
    }

    #[test]
    fn normalize_hostname_variants() {
        assert_eq!(normalize_hostname("Docs.Example.com").as_deref(), Some("docs.example.com"));
        assert_eq!(
            normalize_hostname("http://docs.example.com:8080/guide?x=1").as_deref(),
            Some("docs.example.com")
        );
        assert_eq!(normalize_hostname("example.com.").as_deref(), Some("example.com"));
        assert_eq!(normalize_hostname("exa mple.com"), None);
        assert_eq!(normalize_hostname("https://"), None);
    }

    #[test]
    fn split_record_handles_escaped_quotes() {
        let fields = split_record(r#"a,"say ""hi""",c"#).unwrap();
        assert_eq!(fields, vec!["a", r#"say "hi""#, "c"]);
    }
}
