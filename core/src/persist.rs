use crate::error::PersistenceError;
use crate::model::{Lemma, Page, Posting, Site};
use crate::store::Tables;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{IVec, Transactional};
use std::collections::HashSet;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, PersistenceError>;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub postings: usize,
    pub saved_at: String,
    pub version: u32,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn db(&self) -> PathBuf { self.root.join("db") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

const SITES: &str = "sites";
const PAGES: &str = "pages";
const LEMMAS: &str = "lemmas";
const POSTINGS: &str = "postings";

pub fn open_db(paths: &IndexPaths) -> Result<sled::Db> {
    create_dir_all(&paths.root)?;
    Ok(sled::open(paths.db())?)
}

type Rows = Vec<(Vec<u8>, Vec<u8>)>;

/// Replaces the saved rows with the current contents of `tables`.
///
/// All four trees change in one sled transaction, so a failed save leaves
/// the previous snapshot intact. `meta.json` is written only afterwards.
pub fn save_tables(db: &sled::Db, paths: &IndexPaths, tables: &Tables) -> Result<()> {
    let sites = db.open_tree(SITES)?;
    let pages = db.open_tree(PAGES)?;
    let lemmas = db.open_tree(LEMMAS)?;
    let postings = db.open_tree(POSTINGS)?;

    let rows: [Rows; 4] = [
        encode_rows(tables.sites().map(|s| (s.id, s)))?,
        encode_rows(tables.pages().map(|p| (p.id, p)))?,
        encode_rows(tables.lemmas().map(|l| (l.id, l)))?,
        encode_rows(tables.postings().map(|p| (p.id, p)))?,
    ];
    let stale: [Vec<IVec>; 4] = [
        stale_keys(&sites, &rows[0])?,
        stale_keys(&pages, &rows[1])?,
        stale_keys(&lemmas, &rows[2])?,
        stale_keys(&postings, &rows[3])?,
    ];

    (&sites, &pages, &lemmas, &postings)
        .transaction(|(s, p, l, po)| {
            for (tree, i) in [(s, 0), (p, 1), (l, 2), (po, 3)] {
                for key in &stale[i] {
                    tree.remove(key.clone())?;
                }
                for (key, value) in &rows[i] {
                    tree.insert(key.as_slice(), value.as_slice())?;
                }
            }
            Ok::<(), ConflictableTransactionError<()>>(())
        })
        .map_err(|e| match e {
            TransactionError::Storage(e) => PersistenceError::Db(e),
            TransactionError::Abort(()) => PersistenceError::Db(sled::Error::Unsupported("save aborted".into())),
        })?;
    db.flush()?;

    let (sites, pages, lemmas, postings) = tables.counts();
    let meta = MetaFile {
        sites,
        pages,
        lemmas,
        postings,
        saved_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::debug!(sites, pages, lemmas, postings, "store saved");
    Ok(())
}

/// Loads saved rows; a fresh database yields empty tables.
pub fn load_tables(db: &sled::Db) -> Result<Tables> {
    let sites: Vec<Site> = load_tree(db, SITES)?;
    let pages: Vec<Page> = load_tree(db, PAGES)?;
    let lemmas: Vec<Lemma> = load_tree(db, LEMMAS)?;
    let postings: Vec<Posting> = load_tree(db, POSTINGS)?;
    Ok(Tables::from_rows(sites, pages, lemmas, postings))
}

fn encode_rows<'a, T, I>(rows: I) -> Result<Rows>
where
    T: Serialize + 'a,
    I: Iterator<Item = (u32, &'a T)>,
{
    rows.map(|(id, row)| -> Result<(Vec<u8>, Vec<u8>)> { Ok((id.to_be_bytes().to_vec(), bincode::serialize(row)?)) })
        .collect()
}

/// Saved keys with no counterpart in `rows`.
fn stale_keys(tree: &sled::Tree, rows: &Rows) -> Result<Vec<IVec>> {
    let live: HashSet<&[u8]> = rows.iter().map(|(k, _)| k.as_slice()).collect();
    let mut stale = Vec::new();
    for key in tree.iter().keys() {
        let key = key?;
        if !live.contains(&*key) {
            stale.push(key);
        }
    }
    Ok(stale)
}

fn load_tree<T: DeserializeOwned>(db: &sled::Db, name: &str) -> Result<Vec<T>> {
    let tree = db.open_tree(name)?;
    let mut rows = Vec::with_capacity(tree.len());
    for entry in tree.iter() {
        let (_, bytes) = entry?;
        rows.push(bincode::deserialize(&bytes)?);
    }
    Ok(rows)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
