//! Index maintenance: keeps Site/Page/Lemma/Posting rows consistent while
//! pages are added, re-indexed and removed.
//!
//! Every public operation runs as a single [`Store::write`] step, so a
//! lemma's `frequency` always equals the number of postings that reference
//! it, including under concurrent crawls of the same site.

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use crate::html::page_text;
use crate::lemmas::LemmaExtractor;
use crate::model::{NewPage, Page, PageId, Site, SiteId, SiteStatus};
use crate::store::{Store, Tables};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Created(Page),
    AlreadyExists,
}

pub struct IndexMaintainer {
    store: Arc<Store>,
    lemmas: LemmaExtractor,
}

impl IndexMaintainer {
    pub fn new(store: Arc<Store>, lemmas: LemmaExtractor) -> Self {
        Self { store, lemmas }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn extractor(&self) -> &LemmaExtractor {
        &self.lemmas
    }

    /// Drops any site stored under the configured URL, with its whole subtree,
    /// and creates a fresh INDEXING row. Check and replace happen in one critical section.
    pub fn replace_site(&self, cfg: &SiteConfig) -> Site {
        self.store.write(|t| {
            if let Some(old) = t.find_site_by_url(&cfg.url).map(|s| s.id) {
                delete_site_in(t, old);
                debug!(url = %cfg.url, "replaced existing site");
            }
            t.insert_site(&cfg.url, &cfg.name, SiteStatus::Indexing)
        })
    }

    /// Returns the stored site for `cfg`, creating an INDEXING row if absent.
    /// The flag tells whether the row is new.
    pub fn find_or_create_site(&self, cfg: &SiteConfig) -> (Site, bool) {
        self.store.write(|t| match t.find_site_by_url(&cfg.url) {
            Some(site) => (site.clone(), false),
            None => (t.insert_site(&cfg.url, &cfg.name, SiteStatus::Indexing), true),
        })
    }

    /// Heartbeat: bumps the site's status time.
    pub fn touch_site(&self, site_id: SiteId) {
        self.store.write(|t| {
            if let Some(site) = t.site_mut(site_id) {
                site.touch();
            }
        });
    }

    pub fn set_site_status(&self, site_id: SiteId, status: SiteStatus, error: Option<String>) {
        self.store.write(|t| {
            if let Some(site) = t.site_mut(site_id) {
                site.set_status(status, error);
            }
        });
    }

    /// Inserts the page unless a page with the same path already exists.
    /// Fails with `ConfigMismatch` once the site row is gone, so no page outlives its site.
    pub fn index_page(&self, site: &Site, path: &str, code: u16, html: &str, title: &str) -> Result<IndexOutcome> {
        self.store.write(|t| {
            if t.site(site.id).is_none() {
                return Err(Error::ConfigMismatch(format!("site {} was removed before {path} was stored", site.url)));
            }
            if t.find_page_by_path(path).is_some() {
                return Ok(IndexOutcome::AlreadyExists);
            }
            Ok(IndexOutcome::Created(t.insert_page(NewPage {
                site_id: site.id,
                path: path.to_string(),
                code,
                content: html.to_string(),
                title: title.to_string(),
            })))
        })
    }

    /// `index_page` followed by lemma/posting creation for fresh pages with a non-error status.
    pub fn index_fetched(&self, site: &Site, path: &str, code: u16, html: &str, title: &str) -> Result<IndexOutcome> {
        let outcome = self.index_page(site, path, code, html, title)?;
        if let IndexOutcome::Created(page) = &outcome {
            if page.code < 400 {
                self.upsert_lemmas_and_postings(page)?;
            }
        }
        Ok(outcome)
    }

    /// Adds the page's lemmas and postings. Returns the number of postings created.
    pub fn upsert_lemmas_and_postings(&self, page: &Page) -> Result<usize> {
        let counts = self.lemmas.extract(&page_text(&page.content));
        self.store.write(|t| {
            if t.site(page.site_id).is_none() {
                return Err(Error::ConfigMismatch(format!(
                    "page {} belongs to unknown site {}",
                    page.path, page.site_id
                )));
            }
            if t.page(page.id).is_none() {
                debug!(path = %page.path, "page removed before its lemmas were stored");
                return Ok(0);
            }
            let mut created = 0;
            for (text, count) in &counts {
                let lemma_id = match t.find_lemma(page.site_id, text) {
                    Some(lemma) => lemma.id,
                    None => t.insert_lemma(page.site_id, text, 0),
                };
                if t.find_posting(lemma_id, page.id).is_some() {
                    continue;
                }
                if let Some(lemma) = t.lemma_mut(lemma_id) {
                    lemma.frequency += 1;
                }
                t.insert_posting(lemma_id, page.id, *count as f32);
                created += 1;
            }
            Ok(created)
        })
    }

    /// Removes a page, its postings and its share of lemma frequencies.
    /// Returns false when the page does not exist.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        self.store.write(|t| delete_page_in(t, page_id))
    }

    pub fn delete_site(&self, site_id: SiteId) -> bool {
        self.store.write(|t| delete_site_in(t, site_id))
    }
}

fn delete_page_in(t: &mut Tables, page_id: PageId) -> bool {
    if t.page(page_id).is_none() {
        return false;
    }
    let lemma_ids: Vec<_> = t.find_postings_by_page(page_id).iter().map(|p| p.lemma_id).collect();
    for lemma_id in lemma_ids {
        let remove = match t.lemma_mut(lemma_id) {
            Some(lemma) if lemma.frequency > 1 => {
                lemma.frequency -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if remove {
            t.delete_lemma(lemma_id);
        }
    }
    t.delete_postings_by_page(page_id);
    t.delete_page_row(page_id);
    true
}

/// Leaf to root: postings, lemmas, pages, then the site row.
fn delete_site_in(t: &mut Tables, site_id: SiteId) -> bool {
    if t.site(site_id).is_none() {
        return false;
    }
    let pages = t.find_pages_by_site(site_id);
    for page_id in &pages {
        t.delete_postings_by_page(*page_id);
    }
    for lemma_id in t.find_lemmas_by_site(site_id) {
        t.delete_lemma(lemma_id);
    }
    for page_id in pages {
        t.delete_page_row(page_id);
    }
    t.delete_site_row(site_id);
    true
}
