//! Posting store: Site/Page/Lemma/Posting tables with the secondary indexes
//! every lookup of the indexer and the query engine needs.
//!
//! All access goes through [`Store::read`] / [`Store::write`]; a `write`
//! closure is one atomic step with respect to every other reader and writer.

use crate::error::Result;
use crate::model::{Lemma, LemmaId, NewPage, Page, PageId, Posting, PostingId, Site, SiteId, SiteStatus};
use crate::persist::{self, IndexPaths};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Default)]
pub struct Tables {
    sites: BTreeMap<SiteId, Site>,
    pages: HashMap<PageId, Page>,
    lemmas: HashMap<LemmaId, Lemma>,
    postings: HashMap<PostingId, Posting>,

    site_by_url: HashMap<String, SiteId>,
    page_by_path: HashMap<String, PageId>,
    pages_by_site: HashMap<SiteId, BTreeSet<PageId>>,
    lemma_by_key: HashMap<(SiteId, String), LemmaId>,
    lemmas_by_site: HashMap<SiteId, BTreeSet<LemmaId>>,
    posting_by_key: HashMap<(LemmaId, PageId), PostingId>,
    postings_by_page: HashMap<PageId, BTreeSet<PostingId>>,
    postings_by_lemma: HashMap<LemmaId, BTreeSet<PostingId>>,

    next_site: SiteId,
    next_page: PageId,
    next_lemma: LemmaId,
    next_posting: PostingId,
}

impl Tables {
    /// Rebuilds tables and indexes from persisted rows.
    pub fn from_rows(sites: Vec<Site>, pages: Vec<Page>, lemmas: Vec<Lemma>, postings: Vec<Posting>) -> Self {
        let mut t = Tables::default();
        for s in sites {
            t.next_site = t.next_site.max(s.id + 1);
            t.put_site(s);
        }
        for p in pages {
            t.next_page = t.next_page.max(p.id + 1);
            t.put_page(p);
        }
        for l in lemmas {
            t.next_lemma = t.next_lemma.max(l.id + 1);
            t.put_lemma(l);
        }
        for p in postings {
            t.next_posting = t.next_posting.max(p.id + 1);
            t.put_posting(p);
        }
        t
    }

    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }
    pub fn lemmas(&self) -> impl Iterator<Item = &Lemma> {
        self.lemmas.values()
    }
    pub fn postings(&self) -> impl Iterator<Item = &Posting> {
        self.postings.values()
    }

    // --- sites ---

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(&id)
    }

    pub fn find_site_by_url(&self, url: &str) -> Option<&Site> {
        self.site_by_url.get(url).and_then(|id| self.sites.get(id))
    }

    pub fn find_sites_by_status(&self, status: SiteStatus) -> Vec<SiteId> {
        self.sites.values().filter(|s| s.status == status).map(|s| s.id).collect()
    }

    pub fn insert_site(&mut self, url: &str, name: &str, status: SiteStatus) -> Site {
        let id = self.next_site;
        self.next_site += 1;
        let site = Site {
            id,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: OffsetDateTime::now_utc(),
            last_error: None,
        };
        self.put_site(site.clone());
        site
    }

    pub fn site_mut(&mut self, id: SiteId) -> Option<&mut Site> {
        self.sites.get_mut(&id)
    }

    /// Removes the site row only; callers cascade first.
    pub fn delete_site_row(&mut self, id: SiteId) -> Option<Site> {
        let site = self.sites.remove(&id)?;
        self.site_by_url.remove(&site.url);
        self.pages_by_site.remove(&id);
        self.lemmas_by_site.remove(&id);
        Some(site)
    }

    fn put_site(&mut self, site: Site) {
        self.site_by_url.insert(site.url.clone(), site.id);
        self.sites.insert(site.id, site);
    }

    // --- pages ---

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub fn find_page_by_path(&self, path: &str) -> Option<&Page> {
        self.page_by_path.get(path).and_then(|id| self.pages.get(id))
    }

    pub fn find_pages_by_site(&self, site_id: SiteId) -> Vec<PageId> {
        self.pages_by_site.get(&site_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub fn count_pages(&self, site_id: SiteId) -> usize {
        self.pages_by_site.get(&site_id).map_or(0, BTreeSet::len)
    }

    pub fn insert_page(&mut self, page: NewPage) -> Page {
        let id = self.next_page;
        self.next_page += 1;
        let page = Page {
            id,
            site_id: page.site_id,
            path: page.path,
            code: page.code,
            content: page.content,
            title: page.title,
        };
        self.put_page(page.clone());
        page
    }

    pub fn delete_page_row(&mut self, id: PageId) -> Option<Page> {
        let page = self.pages.remove(&id)?;
        self.page_by_path.remove(&page.path);
        if let Some(set) = self.pages_by_site.get_mut(&page.site_id) {
            set.remove(&id);
        }
        Some(page)
    }

    fn put_page(&mut self, page: Page) {
        self.page_by_path.insert(page.path.clone(), page.id);
        self.pages_by_site.entry(page.site_id).or_default().insert(page.id);
        self.pages.insert(page.id, page);
    }

    // --- lemmas ---

    pub fn lemma(&self, id: LemmaId) -> Option<&Lemma> {
        self.lemmas.get(&id)
    }

    pub fn lemma_mut(&mut self, id: LemmaId) -> Option<&mut Lemma> {
        self.lemmas.get_mut(&id)
    }

    pub fn find_lemma(&self, site_id: SiteId, text: &str) -> Option<&Lemma> {
        self.lemma_by_key
            .get(&(site_id, text.to_string()))
            .and_then(|id| self.lemmas.get(id))
    }

    pub fn find_lemmas_by_site(&self, site_id: SiteId) -> Vec<LemmaId> {
        self.lemmas_by_site.get(&site_id).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub fn count_lemmas(&self, site_id: SiteId) -> usize {
        self.lemmas_by_site.get(&site_id).map_or(0, BTreeSet::len)
    }

    pub fn insert_lemma(&mut self, site_id: SiteId, text: &str, frequency: u32) -> LemmaId {
        let id = self.next_lemma;
        self.next_lemma += 1;
        self.put_lemma(Lemma { id, site_id, text: text.to_string(), frequency });
        id
    }

    pub fn delete_lemma(&mut self, id: LemmaId) -> Option<Lemma> {
        let lemma = self.lemmas.remove(&id)?;
        self.lemma_by_key.remove(&(lemma.site_id, lemma.text.clone()));
        if let Some(set) = self.lemmas_by_site.get_mut(&lemma.site_id) {
            set.remove(&id);
        }
        self.postings_by_lemma.remove(&id);
        Some(lemma)
    }

    fn put_lemma(&mut self, lemma: Lemma) {
        self.lemma_by_key.insert((lemma.site_id, lemma.text.clone()), lemma.id);
        self.lemmas_by_site.entry(lemma.site_id).or_default().insert(lemma.id);
        self.lemmas.insert(lemma.id, lemma);
    }

    // --- postings ---

    pub fn find_posting(&self, lemma_id: LemmaId, page_id: PageId) -> Option<&Posting> {
        self.posting_by_key
            .get(&(lemma_id, page_id))
            .and_then(|id| self.postings.get(id))
    }

    pub fn find_postings_by_page(&self, page_id: PageId) -> Vec<&Posting> {
        self.postings_by_page
            .get(&page_id)
            .map(|ids| ids.iter().filter_map(|id| self.postings.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn find_postings_by_lemma(&self, lemma_id: LemmaId) -> Vec<&Posting> {
        self.postings_by_lemma
            .get(&lemma_id)
            .map(|ids| ids.iter().filter_map(|id| self.postings.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn insert_posting(&mut self, lemma_id: LemmaId, page_id: PageId, rank: f32) -> PostingId {
        let id = self.next_posting;
        self.next_posting += 1;
        self.put_posting(Posting { id, page_id, lemma_id, rank });
        id
    }

    pub fn delete_postings_by_page(&mut self, page_id: PageId) -> usize {
        let Some(ids) = self.postings_by_page.remove(&page_id) else { return 0 };
        for id in &ids {
            if let Some(p) = self.postings.remove(id) {
                self.posting_by_key.remove(&(p.lemma_id, p.page_id));
                if let Some(set) = self.postings_by_lemma.get_mut(&p.lemma_id) {
                    set.remove(id);
                }
            }
        }
        ids.len()
    }

    fn put_posting(&mut self, posting: Posting) {
        self.posting_by_key.insert((posting.lemma_id, posting.page_id), posting.id);
        self.postings_by_page.entry(posting.page_id).or_default().insert(posting.id);
        self.postings_by_lemma.entry(posting.lemma_id).or_default().insert(posting.id);
        self.postings.insert(posting.id, posting);
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (self.sites.len(), self.pages.len(), self.lemmas.len(), self.postings.len())
    }
}

/// Shared handle to the tables, optionally backed by an on-disk database.
pub struct Store {
    tables: RwLock<Tables>,
    disk: Option<(IndexPaths, sled::Db)>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self { tables: RwLock::new(Tables::default()), disk: None }
    }

    /// Opens (or creates) the store under `paths`, loading any saved rows.
    pub fn open(paths: IndexPaths) -> Result<Self> {
        let db = persist::open_db(&paths)?;
        let tables = persist::load_tables(&db)?;
        let (sites, pages, lemmas, postings) = tables.counts();
        info!(root = %paths.root.display(), sites, pages, lemmas, postings, "store opened");
        Ok(Self { tables: RwLock::new(tables), disk: Some((paths, db)) })
    }

    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.tables.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        f(&mut self.tables.write())
    }

    /// Writes the current rows to disk. No-op for an in-memory store.
    pub fn flush(&self) -> Result<()> {
        let Some((paths, db)) = &self.disk else { return Ok(()) };
        let tables = self.tables.read();
        persist::save_tables(db, paths, &tables)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_page(site_id: SiteId, path: &str) -> NewPage {
        NewPage { site_id, path: path.into(), code: 200, content: String::new(), title: String::new() }
    }

    #[test]
    fn lookups_follow_inserts_and_deletes() {
        let store = Store::in_memory();
        store.write(|t| {
            let site = t.insert_site("https://a.ru", "A", SiteStatus::Indexing);
            let page = t.insert_page(new_page(site.id, "https://a.ru/x"));
            let lemma = t.insert_lemma(site.id, "кошк", 1);
            t.insert_posting(lemma, page.id, 2.0);

            assert_eq!(t.find_site_by_url("https://a.ru").unwrap().id, site.id);
            assert_eq!(t.find_page_by_path("https://a.ru/x").unwrap().id, page.id);
            assert_eq!(t.find_lemma(site.id, "кошк").unwrap().frequency, 1);
            assert_eq!(t.find_posting(lemma, page.id).unwrap().rank, 2.0);
            assert_eq!(t.find_postings_by_lemma(lemma).len(), 1);

            assert_eq!(t.delete_postings_by_page(page.id), 1);
            assert!(t.find_posting(lemma, page.id).is_none());
            assert!(t.find_postings_by_lemma(lemma).is_empty());
            t.delete_lemma(lemma);
            t.delete_page_row(page.id);
            assert!(t.find_page_by_path("https://a.ru/x").is_none());
            assert_eq!(t.count_pages(site.id), 0);
        });
    }

    #[test]
    fn from_rows_continues_id_sequences() {
        let store = Store::in_memory();
        let (sites, pages) = store.write(|t| {
            let s = t.insert_site("https://a.ru", "A", SiteStatus::Indexed);
            t.insert_page(new_page(s.id, "https://a.ru/1"));
            (t.sites().cloned().collect::<Vec<_>>(), t.pages().cloned().collect::<Vec<_>>())
        });
        let mut t = Tables::from_rows(sites, pages, vec![], vec![]);
        let next = t.insert_page(new_page(0, "https://a.ru/2"));
        assert_eq!(next.id, 1);
        assert_eq!(t.find_pages_by_site(0), vec![0, 1]);
    }
}
