//! Query engine: lemma lookup, rarest-first posting intersection, relevance
//! scoring, pagination and snippets.

use crate::config::{normalize_url, Config};
use crate::error::{Error, Result};
use crate::flag::RunFlag;
use crate::lemmas::LemmaExtractor;
use crate::model::{Lemma, Page, PageId, Site};
use crate::response::SearchResult;
use crate::snippet::generate_snippet;
use crate::store::{Store, Tables};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Base URL of a configured site; all configured sites when absent.
    pub site: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), site: None, offset: 0, limit: 20 }
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SearchHits {
    /// Number of matching pages before pagination.
    pub count: usize,
    pub data: Vec<SearchResult>,
}

struct Scored {
    page: Page,
    site: Site,
    relevance: f64,
}

pub struct SearchEngine {
    config: Arc<Config>,
    store: Arc<Store>,
    lemmas: LemmaExtractor,
    in_flight: Arc<RunFlag>,
}

impl SearchEngine {
    pub fn new(config: Arc<Config>, store: Arc<Store>, lemmas: LemmaExtractor) -> Self {
        Self { config, store, lemmas, in_flight: RunFlag::new() }
    }

    pub fn search(&self, req: &SearchRequest) -> Result<SearchHits> {
        if req.query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        let _slot = self.in_flight.try_acquire().ok_or(Error::AlreadySearching)?;
        if req.offset < 0 || req.limit <= 0 {
            return Err(Error::InvalidRange { offset: req.offset, limit: req.limit });
        }

        let targets = self.target_sites(req.site.as_deref())?;
        let query_lemmas: Vec<String> = self.lemmas.extract(&req.query).into_keys().collect();

        let (ranked, matched_lemmas) = self.store.read(|t| rank(t, &targets, &query_lemmas))?;
        let count = ranked.len();
        debug!(query = %req.query, lemmas = matched_lemmas.len(), count, "search ranked");

        let offset = req.offset as usize;
        let end = offset.saturating_add(req.limit as usize).min(count);
        let data = ranked
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|s| SearchResult {
                uri: s.page.path.strip_prefix(&s.site.url).unwrap_or(&s.page.path).to_string(),
                site: s.site.url,
                site_name: s.site.name,
                title: s.page.title.clone(),
                snippet: generate_snippet(&s.page.content, &matched_lemmas, &self.lemmas),
                relevance: s.relevance,
            })
            .collect();
        Ok(SearchHits { count, data })
    }

    fn target_sites(&self, filter: Option<&str>) -> Result<Vec<String>> {
        match filter {
            Some(url) => self
                .config
                .site_by_url(url)
                .map(|s| vec![s.url.clone()])
                .ok_or_else(|| Error::OutOfScope(normalize_url(url).to_string())),
            None => Ok(self.config.sites.iter().map(|s| s.url.clone()).collect()),
        }
    }
}

/// Candidates of all target sites, sorted by relevance (page id breaks ties),
/// plus the set of query lemmas that resolved to stored lemma rows.
fn rank(t: &Tables, targets: &[String], query_lemmas: &[String]) -> Result<(Vec<Scored>, HashSet<String>)> {
    let mut matched: HashSet<String> = HashSet::new();
    let mut scores: HashMap<PageId, f64> = HashMap::new();

    for url in targets {
        let Some(site) = t.find_site_by_url(url) else { continue };
        let mut found: Vec<&Lemma> = query_lemmas
            .iter()
            .filter_map(|text| t.find_lemma(site.id, text))
            .collect();
        found.sort_by(|a, b| a.frequency.cmp(&b.frequency).then_with(|| a.text.cmp(&b.text)));
        matched.extend(found.iter().map(|l| l.text.clone()));

        for page_id in intersect(t, &found) {
            let score = found
                .iter()
                .filter_map(|l| t.find_posting(l.id, page_id))
                .map(|p| p.rank as f64)
                .sum::<f64>();
            scores.insert(page_id, score);
        }
    }

    if matched.is_empty() {
        return Err(Error::NoMatchingLemmas);
    }

    let max = scores.values().copied().fold(0.0, f64::max);
    let mut ranked = Vec::with_capacity(scores.len());
    for (page_id, score) in scores {
        let page = t
            .page(page_id)
            .ok_or_else(|| Error::ConfigMismatch(format!("posting references missing page {page_id}")))?;
        let site = t
            .site(page.site_id)
            .ok_or_else(|| Error::ConfigMismatch(format!("page {} has no site row", page.path)))?;
        let relevance = if max > 0.0 { score / max } else { 0.0 };
        ranked.push(Scored { page: page.clone(), site: site.clone(), relevance });
    }
    ranked.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.page.id.cmp(&b.page.id))
    });
    Ok((ranked, matched))
}

/// Pages carrying every lemma in `lemmas`, starting from the rarest.
fn intersect(t: &Tables, lemmas: &[&Lemma]) -> BTreeSet<PageId> {
    let Some((first, rest)) = lemmas.split_first() else { return BTreeSet::new() };
    let mut pages: BTreeSet<PageId> = t.find_postings_by_lemma(first.id).iter().map(|p| p.page_id).collect();
    for lemma in rest {
        if pages.is_empty() {
            break;
        }
        let with_lemma: HashSet<PageId> = t.find_postings_by_lemma(lemma.id).iter().map(|p| p.page_id).collect();
        pages.retain(|id| with_lemma.contains(id));
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::maintainer::IndexMaintainer;
    use crate::morphology::StemmerMorphology;

    struct Fixture {
        engine: SearchEngine,
        maintainer: IndexMaintainer,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(Config::new(vec![
            SiteConfig { name: "Кошки".into(), url: "https://cats.ru".into() },
            SiteConfig { name: "Собаки".into(), url: "https://dogs.ru".into() },
        ]));
        let store = Arc::new(Store::in_memory());
        let lemmas = LemmaExtractor::new(Arc::new(StemmerMorphology::russian()));
        Fixture {
            engine: SearchEngine::new(Arc::clone(&config), Arc::clone(&store), lemmas.clone()),
            maintainer: IndexMaintainer::new(store, lemmas),
        }
    }

    impl Fixture {
        fn add(&self, site_url: &str, path: &str, title: &str, body: &str) {
            let (site, _) = self.maintainer.find_or_create_site(&SiteConfig { name: "x".into(), url: site_url.into() });
            let html = format!("<html><head><title>{title}</title></head><body><p>{body}</p></body></html>");
            self.maintainer.index_fetched(&site, path, 200, &html, title).unwrap();
        }
    }

    #[test]
    fn relevance_is_normalized_by_best_page() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка сидит на окне кошка");
        f.add("https://cats.ru", "https://cats.ru/b", "B", "кошка");

        let hits = f.engine.search(&SearchRequest::new("кошка")).unwrap();
        assert_eq!(hits.count, 2);
        assert_eq!(hits.data[0].uri, "/a");
        assert_eq!(hits.data[0].relevance, 1.0);
        assert_eq!(hits.data[1].uri, "/b");
        assert_eq!(hits.data[1].relevance, 0.5);
        assert_eq!(hits.data[0].site, "https://cats.ru");
        assert_eq!(hits.data[0].title, "A");
    }

    #[test]
    fn all_lemmas_must_match() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка собака");
        f.add("https://cats.ru", "https://cats.ru/b", "B", "кошка");

        let hits = f.engine.search(&SearchRequest::new("кошка собака")).unwrap();
        assert_eq!(hits.count, 1);
        assert_eq!(hits.data[0].uri, "/a");
        assert_eq!(hits.data[0].relevance, 1.0);
    }

    #[test]
    fn resolved_lemmas_with_empty_intersection_give_empty_result() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка");
        f.add("https://cats.ru", "https://cats.ru/b", "B", "собака");

        let hits = f.engine.search(&SearchRequest::new("кошка собака")).unwrap();
        assert_eq!(hits.count, 0);
        assert!(hits.data.is_empty());
    }

    #[test]
    fn misuse_is_reported() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка");

        assert!(matches!(f.engine.search(&SearchRequest::new("")), Err(Error::EmptyQuery)));
        // blank but non-empty: no lemmas rather than an empty query
        assert!(matches!(f.engine.search(&SearchRequest::new("   ")), Err(Error::NoMatchingLemmas)));
        assert!(matches!(f.engine.search(&SearchRequest::new("жираф")), Err(Error::NoMatchingLemmas)));
        assert!(matches!(
            f.engine.search(&SearchRequest::new("кошка").page(-1, 10)),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            f.engine.search(&SearchRequest::new("кошка").page(0, 0)),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            f.engine.search(&SearchRequest::new("кошка").site("https://elsewhere.ru")),
            Err(Error::OutOfScope(_))
        ));
    }

    #[test]
    fn second_search_in_flight_is_rejected() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка");
        let held = f.engine.in_flight.try_acquire().unwrap();
        assert!(matches!(f.engine.search(&SearchRequest::new("кошка")), Err(Error::AlreadySearching)));
        drop(held);
        assert!(f.engine.search(&SearchRequest::new("кошка")).is_ok());
        // the slot is released after errors too
        let _ = f.engine.search(&SearchRequest::new("жираф"));
        assert!(!f.engine.in_flight.is_active());
    }

    #[test]
    fn site_filter_and_union_across_sites() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "кошка");
        f.add("https://dogs.ru", "https://dogs.ru/a", "D", "кошка кошка");

        let all = f.engine.search(&SearchRequest::new("кошка")).unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(all.data[0].site, "https://dogs.ru");

        let only = f.engine.search(&SearchRequest::new("кошка").site("https://cats.ru/")).unwrap();
        assert_eq!(only.count, 1);
        assert_eq!(only.data[0].site_name, "x");
        assert_eq!(only.data[0].relevance, 1.0);
    }

    #[test]
    fn pagination_slices_and_ties_break_by_page_id() {
        let f = fixture();
        for i in 0..5 {
            f.add("https://cats.ru", &format!("https://cats.ru/{i}"), "t", "кошка");
        }
        let first = f.engine.search(&SearchRequest::new("кошка").page(0, 2)).unwrap();
        assert_eq!(first.count, 5);
        let uris: Vec<_> = first.data.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["/0", "/1"]);

        let tail = f.engine.search(&SearchRequest::new("кошка").page(4, 2)).unwrap();
        assert_eq!(tail.data.len(), 1);
        let past = f.engine.search(&SearchRequest::new("кошка").page(5, 10)).unwrap();
        assert!(past.data.is_empty());
        assert_eq!(past.count, 5);
        let whole = f.engine.search(&SearchRequest::new("кошка").page(0, 10)).unwrap();
        assert_eq!(whole.data.len(), 5);
        assert!(whole.data.windows(2).all(|w| w[0].relevance >= w[1].relevance));
    }

    #[test]
    fn snippets_highlight_query_words() {
        let f = fixture();
        f.add("https://cats.ru", "https://cats.ru/a", "A", "Утром кошки спали, кошка ела");
        let hits = f.engine.search(&SearchRequest::new("кошка")).unwrap();
        assert_eq!(hits.data[0].snippet, "<b>кошки</b> спали, <b>кошка</b> ела");
    }
}
