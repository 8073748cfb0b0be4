use crate::config::Config;
use crate::response::{DetailedStatisticsItem, StatisticsData, TotalStatistics};
use crate::store::Store;

/// Per-site and total counts over the configured sites.
pub fn statistics(config: &Config, store: &Store, indexing: bool) -> StatisticsData {
    store.read(|t| {
        let mut total = TotalStatistics { sites: config.sites.len(), pages: 0, lemmas: 0, indexing };
        let detailed = config
            .sites
            .iter()
            .map(|cfg| match t.find_site_by_url(&cfg.url) {
                Some(site) => {
                    let pages = t.count_pages(site.id);
                    let lemmas = t.count_lemmas(site.id);
                    total.pages += pages;
                    total.lemmas += lemmas;
                    DetailedStatisticsItem {
                        url: cfg.url.clone(),
                        name: cfg.name.clone(),
                        status: Some(site.status.to_string()),
                        status_time: (site.status_time.unix_timestamp_nanos() / 1_000_000) as i64,
                        error: site.last_error.clone(),
                        pages,
                        lemmas,
                    }
                }
                None => DetailedStatisticsItem {
                    url: cfg.url.clone(),
                    name: cfg.name.clone(),
                    status: None,
                    status_time: 0,
                    error: None,
                    pages: 0,
                    lemmas: 0,
                },
            })
            .collect();
        StatisticsData { total, detailed }
    })
}
