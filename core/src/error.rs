//! Error taxonomy shared by the indexing and search operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("indexing is already running")]
    AlreadyRunning,

    #[error("indexing is not running")]
    NotRunning,

    #[error("page {0} is outside the sites listed in the configuration file")]
    OutOfScope(String),

    #[error("empty search query")]
    EmptyQuery,

    #[error("search is already running")]
    AlreadySearching,

    #[error("no matching lemmas found for the query")]
    NoMatchingLemmas,

    #[error("invalid pagination range: offset={offset} limit={limit}")]
    InvalidRange { offset: i64, limit: i64 },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("indexed data does not match the configuration: {0}")]
    ConfigMismatch(String),

    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database: {0}")]
    Db(#[from] sled::Error),

    #[error("encoding: {0}")]
    Codec(#[from] bincode::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
