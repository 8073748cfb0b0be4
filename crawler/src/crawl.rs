//! Recursive fork/join crawl of one site.
//!
//! Every discovered page is a task: it checks the run ticket, waits a random
//! throttle delay, fetches, indexes, then spawns one child per qualifying
//! link and joins them all before it completes. The root task therefore
//! finishes only when the whole reachable same-site graph is done.

use crate::fetch::Fetcher;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use rand::Rng;
use search_core::{CrawlConfig, IndexMaintainer, IndexOutcome, RunTicket, Site};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Terminal state of one crawl task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Indexed,
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
pub struct CrawlStats {
    indexed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl CrawlStats {
    fn record(&self, state: PageState) {
        let counter = match state {
            PageState::Indexed => &self.indexed,
            PageState::Skipped => &self.skipped,
            PageState::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn indexed(&self) -> usize { self.indexed.load(Ordering::Relaxed) }
    pub fn skipped(&self) -> usize { self.skipped.load(Ordering::Relaxed) }
    pub fn failed(&self) -> usize { self.failed.load(Ordering::Relaxed) }
}

/// Randomized pre-fetch delay.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    min_ms: u64,
    max_ms: u64,
}

impl Throttle {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms: max_ms.max(min_ms) }
    }

    pub fn from_config(cfg: &CrawlConfig) -> Self {
        Self::new(cfg.min_delay_ms, cfg.max_delay_ms)
    }

    pub fn next_delay(&self) -> Duration {
        let ms = rand::rng().random_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

/// Shared state of one site's crawl tree.
pub struct SiteCrawl {
    site: Site,
    maintainer: Arc<IndexMaintainer>,
    fetcher: Arc<dyn Fetcher>,
    ticket: RunTicket,
    pool: Arc<Semaphore>,
    throttle: Throttle,
    seen: Mutex<HashSet<String>>,
    stats: CrawlStats,
}

impl SiteCrawl {
    pub fn new(
        site: Site,
        maintainer: Arc<IndexMaintainer>,
        fetcher: Arc<dyn Fetcher>,
        ticket: RunTicket,
        pool: Arc<Semaphore>,
        throttle: Throttle,
    ) -> Arc<Self> {
        let mut seen = HashSet::new();
        seen.insert(site.url.clone());
        Arc::new(Self {
            site,
            maintainer,
            fetcher,
            ticket,
            pool,
            throttle,
            seen: Mutex::new(seen),
            stats: CrawlStats::default(),
        })
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// Crawls from the site's root URL and returns once the whole tree is joined.
    pub async fn run(self: Arc<Self>) {
        let root = self.site.url.clone();
        crawl_page(Arc::clone(&self), root).await;
        info!(
            site = %self.site.url,
            indexed = self.stats.indexed(),
            skipped = self.stats.skipped(),
            failed = self.stats.failed(),
            "site crawl finished"
        );
    }

    /// Same-site, fragment-free, not the root, not stored yet and not claimed by another task.
    fn claim(&self, link: &str) -> bool {
        let base = &self.site.url;
        if link.trim_end_matches('/') == base.as_str() || !link.contains(base.as_str()) || link.contains('#') {
            return false;
        }
        let stored = self.maintainer.store().read(|t| t.find_page_by_path(link).is_some());
        !stored && self.seen.lock().insert(link.to_string())
    }

    async fn visit(&self, url: &str) -> (PageState, Vec<String>) {
        if !self.ticket.is_live() {
            return (PageState::Skipped, Vec::new());
        }

        let fetched = {
            let _permit = match self.pool.acquire().await {
                Ok(p) => p,
                Err(_) => return (PageState::Skipped, Vec::new()),
            };
            self.throttle.wait().await;
            self.fetcher.fetch(url).await
        };
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                return (PageState::Failed, Vec::new());
            }
        };

        // A stopped run may already have been replaced by a newer one.
        if !self.ticket.is_live() {
            debug!(url, "run stopped while fetching, page dropped");
            return (PageState::Skipped, Vec::new());
        }
        self.maintainer.touch_site(self.site.id);
        let state = match self
            .maintainer
            .index_fetched(&self.site, url, page.status, &page.html, &page.title)
        {
            Ok(IndexOutcome::Created(_)) => {
                debug!(url, status = page.status, "page indexed");
                PageState::Indexed
            }
            Ok(IndexOutcome::AlreadyExists) => PageState::Skipped,
            Err(e) => {
                warn!(url, error = %e, "indexing failed");
                return (PageState::Failed, Vec::new());
            }
        };

        let links = page.links.into_iter().filter(|l| self.claim(l)).collect();
        (state, links)
    }
}

fn crawl_page(crawl: Arc<SiteCrawl>, url: String) -> BoxFuture<'static, ()> {
    async move {
        let (state, links) = crawl.visit(&url).await;
        crawl.stats.record(state);

        let mut children = JoinSet::new();
        for link in links {
            children.spawn(crawl_page(Arc::clone(&crawl), link));
        }
        while let Some(joined) = children.join_next().await {
            if let Err(e) = joined {
                warn!(parent = %url, error = %e, "crawl task aborted");
            }
        }
    }
    .boxed()
}
