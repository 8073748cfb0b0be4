//! Lemma-based site search: data model, lemma extraction, posting store,
//! index maintenance and the query engine.

pub mod config;
pub mod error;
pub mod flag;
pub mod html;
pub mod lemmas;
pub mod maintainer;
pub mod model;
pub mod morphology;
pub mod persist;
pub mod response;
pub mod search;
pub mod snippet;
pub mod stats;
pub mod store;

pub use config::{Config, CrawlConfig, SiteConfig};
pub use error::{Error, PersistenceError, Result};
pub use flag::{RunFlag, RunGuard, RunTicket};
pub use lemmas::LemmaExtractor;
pub use maintainer::{IndexMaintainer, IndexOutcome};
pub use model::{Lemma, LemmaId, Page, PageId, Posting, PostingId, Site, SiteId, SiteStatus};
pub use morphology::{Morphology, PartOfSpeech, StemmerMorphology};
pub use search::{SearchEngine, SearchHits, SearchRequest};
pub use store::Store;

use persist::IndexPaths;
use std::sync::Arc;

/// Opens the store named by the configuration: on disk under `data_dir`, in memory otherwise.
pub fn open_store(config: &Config) -> Result<Arc<Store>> {
    let store = match &config.data_dir {
        Some(dir) => Store::open(IndexPaths::new(dir))?,
        None => Store::in_memory(),
    };
    Ok(Arc::new(store))
}
