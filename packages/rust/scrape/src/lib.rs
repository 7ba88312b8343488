//! Page retrieval for the scrape capability.
//!
//! Fetches a single URL, rejects unsafe targets and non-text responses,
//! then reduces HTML to Markdown using platform-aware content extraction.
//! Redirects may stay on the requested host or move to an allow-listed one.
//! Bodies are read up to a hard byte cap; length budgeting of the resulting
//! text is applied by the caller.

pub mod adapters;
mod convert;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_domains::DomainAllowList;
use docqa_shared::{Capability, DocQaError, Result, ScrapeCapability, ScrapeSection};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::adapters::AdapterRegistry;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("docqa/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

/// Raw body bytes read per byte of scrape content ceiling.
const BODY_CAP_FACTOR: usize = 100;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings for [`PageScraper`].
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub timeout: Duration,
    /// Permit loopback and private-network targets.
    pub allow_private_hosts: bool,
    /// Reading stops once the body reaches this many bytes.
    pub max_body_bytes: usize,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::from(&ScrapeSection::default())
    }
}

impl From<&ScrapeSection> for ScrapeOptions {
    fn from(section: &ScrapeSection) -> Self {
        Self {
            timeout: Duration::from_secs(section.timeout_secs),
            allow_private_hosts: section.allow_private_hosts,
            max_body_bytes: section.content_ceiling.saturating_mul(BODY_CAP_FACTOR),
        }
    }
}

// ---------------------------------------------------------------------------
// PageScraper
// ---------------------------------------------------------------------------

/// Scrape capability backed by a plain HTTP client.
pub struct PageScraper {
    client: Client,
    registry: AdapterRegistry,
    options: ScrapeOptions,
}

impl PageScraper {
    /// Scraper whose redirects must stay on the requested host.
    pub fn new(options: ScrapeOptions) -> Result<Self> {
        Self::build(options, None)
    }

    /// Scraper that may also follow redirects to hosts on `allow_list`.
    pub fn with_allow_list(options: ScrapeOptions, allow_list: Arc<DomainAllowList>) -> Result<Self> {
        Self::build(options, Some(allow_list))
    }

    pub fn from_config(section: &ScrapeSection, allow_list: Arc<DomainAllowList>) -> Result<Self> {
        Self::with_allow_list(ScrapeOptions::from(section), allow_list)
    }

    fn build(options: ScrapeOptions, allow_list: Option<Arc<DomainAllowList>>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(options.allow_private_hosts, allow_list))
            .timeout(options.timeout)
            .build()
            .map_err(|e| DocQaError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            registry: AdapterRegistry::new(),
            options,
        })
    }

    fn map_transport_error(&self, url: &Url, e: reqwest::Error) -> DocQaError {
        if e.is_timeout() {
            DocQaError::CapabilityTimeout {
                capability: Capability::Scrape,
                timeout: self.options.timeout,
            }
        } else {
            DocQaError::unavailable(Capability::Scrape, format!("{url}: {e}"))
        }
    }

    /// Read the body up to `max_body_bytes`, decoding as UTF-8.
    async fn read_capped(&self, mut response: Response, url: &Url) -> Result<String> {
        let cap = self.options.max_body_bytes;
        let declared = response
            .content_length()
            .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let mut body = Vec::with_capacity(declared.min(cap));

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_transport_error(url, e))?
        {
            let room = cap - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                warn!(cap, declared, "response body over cap, reading stopped");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Reduce an HTML document to Markdown.
    fn html_to_text(&self, body: &str, url: &Url) -> Result<String> {
        let doc = Html::parse_document(body);
        let adapter = self.registry.detect(&doc, url);
        debug!(adapter = adapter.name(), "extracting page content");
        let extracted = adapter.extract_content(&doc);
        convert::to_markdown(&extracted)
    }
}

#[async_trait]
impl ScrapeCapability for PageScraper {
    #[instrument(skip_all, fields(url = %url))]
    async fn scrape(&self, url: &Url) -> Result<String> {
        if !self.options.allow_private_hosts && is_ssrf_target(url) {
            return Err(DocQaError::unavailable(
                Capability::Scrape,
                format!("{url}: refusing to fetch non-public target"),
            ));
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.map_transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocQaError::unavailable(
                Capability::Scrape,
                format!("{url}: HTTP {status}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        let kind = classify_content_type(content_type.as_deref());
        if kind == BodyKind::Binary {
            return Err(DocQaError::unavailable(
                Capability::Scrape,
                format!(
                    "{url}: non-text content ({})",
                    content_type.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        let body = self.read_capped(response, url).await?;

        let text = match kind {
            BodyKind::Html => self.html_to_text(&body, url)?,
            _ => body,
        };

        info!(bytes = text.len(), "page scraped");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Content type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Html,
    Text,
    Binary,
}

/// Classify a response by its `Content-Type`. A missing header is treated as HTML.
fn classify_content_type(content_type: Option<&str>) -> BodyKind {
    let Some(ct) = content_type else {
        return BodyKind::Html;
    };
    let mime = ct.split(';').next().unwrap_or("").trim();

    match mime {
        "text/html" | "application/xhtml+xml" => BodyKind::Html,
        "application/xml" | "application/json" => BodyKind::Text,
        m if m.starts_with("text/") => BodyKind::Text,
        _ => BodyKind::Binary,
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Checks every redirect hop with [`redirect_allowed`].
fn redirect_policy(allow_private_hosts: bool, allow_list: Option<Arc<DomainAllowList>>) -> Policy {
    Policy::custom(move |attempt| {
        let previous = attempt.previous();
        let verdict = match previous.first() {
            _ if previous.len() > MAX_REDIRECTS => Err("too many redirects".to_string()),
            Some(origin) => {
                redirect_allowed(attempt.url(), origin, allow_private_hosts, allow_list.as_deref())
            }
            None => Ok(()),
        };

        match verdict {
            Ok(()) => attempt.follow(),
            Err(reason) => {
                debug!(location = %attempt.url(), %reason, "redirect refused");
                attempt.error(reason)
            }
        }
    })
}

/// Whether a redirect to `target` may be followed for a request that started at `origin`.
fn redirect_allowed(
    target: &Url,
    origin: &Url,
    allow_private_hosts: bool,
    allow_list: Option<&DomainAllowList>,
) -> std::result::Result<(), String> {
    if !matches!(target.scheme(), "http" | "https") {
        return Err(format!("redirect to unsupported scheme '{}'", target.scheme()));
    }
    if !allow_private_hosts && is_ssrf_target(target) {
        return Err(format!("redirect to non-public target {target}"));
    }

    let host = target.host_str().unwrap_or_default();
    let same_host = target.host_str() == origin.host_str();
    let listed = allow_list.is_some_and(|list| list.is_allowed(host));
    if same_host || listed {
        Ok(())
    } else {
        Err(format!("redirect to {host} leaves the allowed sites"))
    }
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}
