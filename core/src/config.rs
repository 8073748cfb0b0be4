//! Process configuration: the site list, crawl identity and crawl tuning.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! user_agent = "LemmaSearchBot/0.1"
//! referrer = "https://www.google.com"
//! data_dir = "./data"
//!
//! [crawl]
//! concurrency = 16
//!
//! [[sites]]
//! name = "PlayBack.Ru"
//! url = "https://www.playback.ru"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

fn default_user_agent() -> String { "LemmaSearchBot/0.1 (+https://example.com/bot)".to_string() }
fn default_referrer() -> String { "https://www.google.com".to_string() }
fn default_concurrency() -> usize { 16 }
fn default_min_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 5000 }
fn default_timeout_secs() -> u64 { 12 }
fn default_max_body_bytes() -> usize { 2 * 1024 * 1024 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Size of the fetch worker pool shared by all sites of one run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Lower bound of the randomized pre-fetch delay
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound of the randomized pre-fetch delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Request timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Responses larger than this are treated as fetch failures
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referrer")]
    pub referrer: String,
    /// Directory of the persistent store; the store lives in memory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self {
            user_agent: default_user_agent(),
            referrer: default_referrer(),
            data_dir: None,
            crawl: CrawlConfig::default(),
            sites,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml(&raw)?;
        debug!(path = %path.display(), sites = config.sites.len(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trims trailing slashes so a site base URL compares equal however it was written.
    pub fn normalize(&mut self) {
        for site in &mut self.sites {
            site.url = normalize_url(&site.url).to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(Error::Config("no sites configured".into()));
        }
        let mut seen = HashSet::new();
        for site in &self.sites {
            let parsed = Url::parse(&site.url)
                .map_err(|e| Error::Config(format!("invalid site url {}: {e}", site.url)))?;
            if !parsed.scheme().starts_with("http") {
                return Err(Error::Config(format!("site url {} is not http(s)", site.url)));
            }
            if !seen.insert(site.url.as_str()) {
                return Err(Error::Config(format!("duplicate site url {}", site.url)));
            }
        }
        if self.crawl.concurrency == 0 {
            return Err(Error::Config("crawl.concurrency must be positive".into()));
        }
        if self.crawl.min_delay_ms > self.crawl.max_delay_ms {
            return Err(Error::Config("crawl.min_delay_ms exceeds crawl.max_delay_ms".into()));
        }
        Ok(())
    }

    /// The configured site whose base URL is a prefix of `url`.
    pub fn site_for_url(&self, url: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| url.starts_with(&s.url))
    }

    pub fn site_by_url(&self, url: &str) -> Option<&SiteConfig> {
        let url = normalize_url(url);
        self.sites.iter().find(|s| s.url == url)
    }
}

pub fn normalize_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
user_agent = "TestBot"
referrer = "https://ref.example"

[crawl]
concurrency = 4
min_delay_ms = 0
max_delay_ms = 10

[[sites]]
name = "Lenta"
url = "https://lenta.ru/"

[[sites]]
name = "Skillbox"
url = "https://www.skillbox.ru"
"#;

    #[test]
    fn parses_and_normalizes() {
        let cfg = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.user_agent, "TestBot");
        assert_eq!(cfg.crawl.concurrency, 4);
        assert_eq!(cfg.crawl.timeout_secs, 12);
        assert_eq!(cfg.sites[0].url, "https://lenta.ru");
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn resolves_site_by_prefix() {
        let cfg = Config::from_toml(SAMPLE).unwrap();
        let site = cfg.site_for_url("https://lenta.ru/news/1").unwrap();
        assert_eq!(site.name, "Lenta");
        assert!(cfg.site_for_url("https://example.com/").is_none());
        assert_eq!(cfg.site_by_url("https://www.skillbox.ru/").unwrap().name, "Skillbox");
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(matches!(Config::from_toml("user_agent = \"x\""), Err(Error::Config(_))));
        let dup = r#"
[[sites]]
name = "a"
url = "https://a.ru"
[[sites]]
name = "b"
url = "https://a.ru/"
"#;
        assert!(matches!(Config::from_toml(dup), Err(Error::Config(_))));
        let delays = r#"
[crawl]
min_delay_ms = 10
max_delay_ms = 1
[[sites]]
name = "a"
url = "https://a.ru"
"#;
        assert!(matches!(Config::from_toml(delays), Err(Error::Config(_))));
    }
}
