//! Payloads handed to the outer API layer: a success flag plus either data or
//! a human-readable message.

use crate::error::Error;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub result: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { result: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub result: bool,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self { result: false, message: err.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub result: bool,
    pub count: usize,
    pub data: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatisticsItem {
    pub url: String,
    pub name: String,
    pub status: Option<String>,
    /// Epoch milliseconds; 0 for sites never indexed.
    pub status_time: i64,
    pub error: Option<String>,
    pub pages: usize,
    pub lemmas: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsData {
    pub total: TotalStatistics,
    pub detailed: Vec<DetailedStatisticsItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsResponse {
    pub result: bool,
    pub statistics: StatisticsData,
}
