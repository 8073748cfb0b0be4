//! Site crawling: the HTTP fetch client, the recursive per-site crawl tree
//! and the indexing run lifecycle built on them.

pub mod crawl;
pub mod fetch;
pub mod lifecycle;

pub use crawl::{CrawlStats, SiteCrawl, Throttle};
pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use lifecycle::{IndexingRun, IndexingService, RunReport, SiteReport, STOPPED_BY_USER};
