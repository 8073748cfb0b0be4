use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use search_core::html::page_title;
use search_core::{Config, Error, Result};
use std::time::Duration;
use url::Url;

lazy_static! {
    static ref LINKS: Selector = Selector::parse("a[href]").expect("valid selector");
}

/// A fetched document. Error statuses still carry their body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
    pub title: String,
    /// Absolute http(s) link targets in document order.
    pub links: Vec<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Fetches over HTTP with the configured crawl identity.
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let referrer = header::HeaderValue::from_str(&config.referrer)
            .map_err(|e| Error::Config(format!("invalid referrer: {e}")))?;
        headers.insert(header::REFERER, referrer);
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.crawl.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, max_body_bytes: config.crawl.max_body_bytes })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let failure = |reason: String| Error::Fetch { url: url.to_string(), reason };
        let mut resp = self.client.get(url).send().await.map_err(|e| failure(e.to_string()))?;
        let status = resp.status().as_u16();
        let limit = self.max_body_bytes;
        if let Some(len) = resp.content_length().filter(|len| *len > limit as u64) {
            return Err(failure(format!("body of {len} bytes exceeds limit")));
        }
        let charset = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_param)
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| failure(e.to_string()))? {
            if body.len() + chunk.len() > limit {
                return Err(failure(format!("body exceeds {limit} bytes")));
            }
            body.extend_from_slice(&chunk);
        }
        parse_document(url, status, decode_body(&body, charset.as_deref()))
    }
}

/// `charset` parameter of a Content-Type value.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Charset named by a `<meta>` tag near the top of the document.
fn meta_charset(head: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&head[..head.len().min(1024)]).to_ascii_lowercase();
    let at = head.find("charset=")? + "charset=".len();
    let label: String = head[at..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    Encoding::for_label(label.as_bytes())
}

/// Decodes a response body: BOM first, then the declared charset, then a
/// `<meta>` charset, then UTF-8.
pub fn decode_body(bytes: &[u8], declared: Option<&str>) -> String {
    let encoding = declared
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| meta_charset(bytes))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Title and absolute link targets of an HTML body fetched from `url`.
pub fn parse_document(url: &str, status: u16, html: String) -> Result<FetchedPage> {
    let base = Url::parse(url).map_err(|e| Error::Fetch { url: url.to_string(), reason: e.to_string() })?;
    let links = {
        let doc = Html::parse_document(&html);
        let mut links = Vec::new();
        for a in doc.select(&LINKS) {
            if let Some(h) = a.value().attr("href") {
                if let Ok(u) = base.join(h.trim()) {
                    if u.scheme().starts_with("http") {
                        links.push(u.to_string());
                    }
                }
            }
        }
        links
    };
    Ok(FetchedPage { url: url.to_string(), status, title: page_title(&html), html, links })
}
