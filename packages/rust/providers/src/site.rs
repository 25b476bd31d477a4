//! Company website fetcher.
//!
//! Fetches one page, refuses private and loopback targets, caps the body
//! size, and reduces HTML to readable text for the extraction prompt.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use outreach_shared::{ContentFetcher, FetchConfig, OutreachError, PageContent, ProviderError, Result};

use crate::http::{USER_AGENT, check_response, transport_error};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title, h1").expect("valid selector"));
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("nav, header, footer, aside, script, style, noscript, form, .cookie, .sidebar")
        .expect("valid selector")
});

/// Readability heuristics, most specific first.
const CONTENT_SELECTORS: [&str; 4] = ["main", "article", r#"[role="main"]"#, ".content"];

/// [`ContentFetcher`] for public company websites.
pub struct SiteFetcher {
    client: Client,
    max_bytes: usize,
    max_chars: usize,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl SiteFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutreachError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            max_chars: config.max_chars,
            allow_localhost: false,
        })
    }

    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }
}

#[async_trait]
impl ContentFetcher for SiteFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> std::result::Result<PageContent, ProviderError> {
        if !self.allow_localhost && is_ssrf_target(url) {
            warn!("refusing to fetch private or non-http target");
            return Err(ProviderError::Network(format!("blocked target: {url}")));
        }

        let resp = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| transport_error("fetch", &e))?;
        let mut resp = check_response(resp, url.as_str()).await?;

        if resp.content_length().is_some_and(|len| len as usize > self.max_bytes) {
            return Err(ProviderError::InvalidResponse(format!(
                "{url}: body exceeds {} bytes",
                self.max_bytes
            )));
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| transport_error("fetch", &e))? {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(ProviderError::InvalidResponse(format!(
                    "{url}: body exceeds {} bytes",
                    self.max_bytes
                )));
            }
        }
        let body = String::from_utf8_lossy(&body);

        let (title, text) = if is_html {
            extract_text(&body)?
        } else {
            (None, body.trim().to_string())
        };
        let text = truncate_chars(&text, self.max_chars);

        debug!(chars = text.chars().count(), "page fetched");
        Ok(PageContent {
            url: url.clone(),
            title,
            text,
        })
    }
}

// ---------------------------------------------------------------------------
// Content extraction
// ---------------------------------------------------------------------------

/// Title and main text of an HTML document.
fn extract_text(html: &str) -> std::result::Result<(Option<String>, String), ProviderError> {
    let doc = Html::parse_document(html);
    let title = doc
        .select(&TITLE)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty());

    let content = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next().map(|el| el.inner_html()))
        .or_else(|| doc.select(&BODY).next().map(|el| el.inner_html()))
        .unwrap_or_default();
    let content = strip_chrome(&content);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg", "img"])
        .build();
    let markdown = converter
        .convert(&content)
        .map_err(|e| ProviderError::InvalidResponse(format!("html conversion failed: {e}")))?;

    Ok((title, collapse_blank_lines(&markdown)))
}

/// Remove navigation and other page chrome.
fn strip_chrome(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();
    for el in doc.select(&CHROME) {
        result = result.replace(&el.html(), "");
    }
    result
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank = false;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            if !blank && !out.is_empty() {
                out.push("");
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    out.join("\n").trim().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => text[..cut].to_string(),
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

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
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
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
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
