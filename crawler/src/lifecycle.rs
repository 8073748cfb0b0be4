//! Indexing run lifecycle: full re-index of every configured site, user stop
//! and single-page re-index, all guarded by one process-wide run slot.

use crate::crawl::{SiteCrawl, Throttle};
use crate::fetch::{Fetcher, HttpFetcher};
use search_core::{
    Config, Error, IndexMaintainer, LemmaExtractor, Result, RunFlag, RunGuard, SiteStatus,
    StemmerMorphology, Store,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

pub const STOPPED_BY_USER: &str = "Indexing stopped by user";

#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub url: String,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sites: Vec<SiteReport>,
}

/// Handle to a detached indexing run.
pub struct IndexingRun {
    handle: JoinHandle<RunReport>,
}

impl IndexingRun {
    /// Waits for every site crawl and the final status update.
    pub async fn wait(self) -> RunReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "indexing run aborted");
                RunReport::default()
            }
        }
    }
}

#[derive(Clone)]
pub struct IndexingService {
    config: Arc<Config>,
    maintainer: Arc<IndexMaintainer>,
    fetcher: Arc<dyn Fetcher>,
    run_flag: Arc<RunFlag>,
}

impl IndexingService {
    /// Service over `store` that fetches over HTTP with the configured identity.
    pub fn new(config: Arc<Config>, store: Arc<Store>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        let lemmas = LemmaExtractor::new(Arc::new(StemmerMorphology::russian()));
        Ok(Self::with_fetcher(config, Arc::new(IndexMaintainer::new(store, lemmas)), fetcher))
    }

    pub fn with_fetcher(config: Arc<Config>, maintainer: Arc<IndexMaintainer>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, maintainer, fetcher, run_flag: RunFlag::new() }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn maintainer(&self) -> &Arc<IndexMaintainer> {
        &self.maintainer
    }

    pub fn is_indexing(&self) -> bool {
        self.run_flag.is_active()
    }

    /// Claims the run slot and re-indexes every configured site in the background.
    pub fn start_indexing(&self) -> Result<IndexingRun> {
        let guard = self.run_flag.try_acquire().ok_or(Error::AlreadyRunning)?;
        info!(sites = self.config.sites.len(), "indexing started");
        let service = self.clone();
        let handle = tokio::spawn(async move { service.run_all(guard).await });
        Ok(IndexingRun { handle })
    }

    async fn run_all(self, guard: RunGuard) -> RunReport {
        let ticket = guard.ticket();
        let pool = Arc::new(Semaphore::new(self.config.crawl.concurrency));
        let throttle = Throttle::from_config(&self.config.crawl);

        let mut crawls = Vec::new();
        let mut tasks = JoinSet::new();
        for cfg in &self.config.sites {
            let site = self.maintainer.replace_site(cfg);
            let crawl = SiteCrawl::new(
                site.clone(),
                Arc::clone(&self.maintainer),
                Arc::clone(&self.fetcher),
                ticket.clone(),
                Arc::clone(&pool),
                throttle,
            );
            tasks.spawn(Arc::clone(&crawl).run());
            crawls.push((site, crawl));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "site crawl aborted");
            }
        }

        // A stop that lands before a site row was replaced leaves that row INDEXING.
        let (status, error) = if ticket.is_live() {
            (SiteStatus::Indexed, None)
        } else {
            (SiteStatus::Failed, Some(STOPPED_BY_USER.to_string()))
        };
        self.maintainer.store().write(|t| {
            for (site, _) in &crawls {
                if let Some(row) = t.site_mut(site.id) {
                    if row.status == SiteStatus::Indexing {
                        row.set_status(status, error.clone());
                    }
                }
            }
        });
        info!(status = %status, "indexing run ended");
        if let Err(e) = self.maintainer.store().flush() {
            warn!(error = %e, "failed to flush index");
        }
        drop(guard);

        RunReport {
            sites: crawls
                .iter()
                .map(|(site, crawl)| SiteReport {
                    url: site.url.clone(),
                    indexed: crawl.stats().indexed(),
                    skipped: crawl.stats().skipped(),
                    failed: crawl.stats().failed(),
                })
                .collect(),
        }
    }

    /// Marks every INDEXING site FAILED and releases the run slot. Crawl
    /// tasks notice at their next entry check; fetches in flight complete.
    pub fn stop_indexing(&self) -> Result<()> {
        if !self.run_flag.cancel() {
            return Err(Error::NotRunning);
        }
        let stopped = self.maintainer.store().write(|t| {
            let ids = t.find_sites_by_status(SiteStatus::Indexing);
            for id in &ids {
                if let Some(site) = t.site_mut(*id) {
                    site.set_status(SiteStatus::Failed, Some(STOPPED_BY_USER.to_string()));
                }
            }
            ids.len()
        });
        info!(sites = stopped, "indexing stopped by user");
        self.maintainer.store().flush()
    }

    /// Re-indexes exactly one URL belonging to a configured site. No links are followed.
    pub async fn index_single_page(&self, url: &str) -> Result<()> {
        let _guard = self.run_flag.try_acquire().ok_or(Error::AlreadyRunning)?;
        let url = url.trim();

        let existing = self.maintainer.store().read(|t| t.find_page_by_path(url).map(|p| p.id));
        if let Some(id) = existing {
            self.maintainer.delete_page(id);
        }
        let cfg = self
            .config
            .site_for_url(url)
            .ok_or_else(|| Error::OutOfScope(url.to_string()))?;
        let (site, created) = self.maintainer.find_or_create_site(cfg);

        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                if created {
                    self.maintainer.set_site_status(site.id, SiteStatus::Failed, Some(e.to_string()));
                }
                return Err(e);
            }
        };
        self.maintainer.touch_site(site.id);
        self.maintainer
            .index_fetched(&site, url, page.status, &page.html, &page.title)?;
        if created {
            self.maintainer.set_site_status(site.id, SiteStatus::Indexed, None);
        }
        info!(url, status = page.status, "page re-indexed");
        self.maintainer.store().flush()
    }
}
