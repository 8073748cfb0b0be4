use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

pub type SiteId = u32;
pub type PageId = u32;
pub type LemmaId = u32;
pub type PostingId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Last status change or crawl heartbeat.
    pub status_time: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Site {
    /// Status and status time always move together.
    pub fn set_status(&mut self, status: SiteStatus, error: Option<String>) {
        self.status = status;
        self.last_error = error;
        self.status_time = OffsetDateTime::now_utc();
    }

    pub fn touch(&mut self) {
        self.status_time = OffsetDateTime::now_utc();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Absolute URL of the page.
    pub path: String,
    pub code: u16,
    pub content: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub text: String,
    /// Number of pages of the site with a posting on this lemma.
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub rank: f32, // occurrences of the lemma in the page text
}

/// New rows before the store assigns them an id.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub site_id: SiteId,
    pub path: String,
    pub code: u16,
    pub content: String,
    pub title: String,
}
