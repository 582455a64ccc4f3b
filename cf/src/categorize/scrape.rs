//! Web page fetching for task suggestions
//!
//! Fetches the page linked from a task description and reduces it to a
//! bounded run of plain text for the prompt.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::ScrapeConfig;

/// Matches the first http(s) URL in free text
const URL_PATTERN: &str = r"https?://[^\s]+";

/// Characters that end a sentence rather than a URL
const URL_TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\'', '>'];

/// Errors from fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL must start with http:// or https://: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch URL: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Page has no readable text")]
    Empty,
}

/// Source of page text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its readable text
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Find the first http(s) URL in `text`
pub fn find_first_url(text: &str) -> Option<String> {
    let re = Regex::new(URL_PATTERN).ok()?;
    let found = re.find(text)?.as_str().trim_end_matches(URL_TRAILING);
    // A bare scheme is not a URL
    if found.ends_with("://") {
        return None;
    }
    Some(found.to_string())
}

/// Reduce a response body to collapsed plain text of at most `max_chars`
pub fn page_text(body: &str, content_type: &str, max_chars: usize) -> String {
    let text = if content_type.contains("text/html") || content_type.contains("application/xhtml") {
        debug!("page_text: converting HTML to markdown");
        html2md::rewrite_html(body, false)
    } else {
        body.to_string()
    };

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

/// Fetches pages over HTTP with a timeout and a body size cap
pub struct HttpFetcher {
    http: Client,
    max_bytes: usize,
    max_chars: usize,
}

impl HttpFetcher {
    pub fn from_config(config: &ScrapeConfig) -> Result<Self, FetchError> {
        debug!(timeout_ms = config.timeout_ms, max_bytes = config.max_bytes, "HttpFetcher::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            max_bytes: config.max_bytes,
            max_chars: config.max_chars,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(%url, "HttpFetcher::fetch_text: called");
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let mut response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "HttpFetcher::fetch_text: HTTP error status");
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Read at most max_bytes; anything past the cap is dropped
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_bytes {
                debug!(max_bytes = self.max_bytes, "HttpFetcher::fetch_text: size cap reached");
                break;
            }
        }

        let text = page_text(&String::from_utf8_lossy(&body), &content_type, self.max_chars);
        debug!(%content_type, text_len = text.len(), "HttpFetcher::fetch_text: extracted");
        if text.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_first_url() {
        assert_eq!(
            find_first_url("pay via https://bank.example/invoice today"),
            Some("https://bank.example/invoice".to_string())
        );
        assert_eq!(
            find_first_url("a http://one.example b https://two.example"),
            Some("http://one.example".to_string())
        );
        assert_eq!(find_first_url("no links here"), None);
        assert_eq!(find_first_url("ftp://files.example"), None);
    }

    #[test]
    fn test_find_first_url_strips_sentence_punctuation() {
        assert_eq!(
            find_first_url("Read (https://docs.example/guide)."),
            Some("https://docs.example/guide".to_string())
        );
        assert_eq!(find_first_url("just https:// alone"), None);
    }

    #[test]
    fn test_page_text_converts_html_and_collapses_whitespace() {
        let html = "<html><body><h1>Invoice</h1>\n\n<p>Amount   due:\n 1200</p></body></html>";
        let text = page_text(html, "text/html; charset=utf-8", 1000);

        assert!(text.contains("Invoice"));
        assert!(text.contains("Amount due"));
        assert!(text.contains("1200"));
        assert!(!text.contains('\n'));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_page_text_truncates_on_char_boundary() {
        let text = page_text("héllo wörld", "text/plain", 4);
        assert_eq!(text, "héll");
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_http() {
        let fetcher = HttpFetcher::from_config(&ScrapeConfig::default()).unwrap();
        let err = fetcher.fetch_text("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
