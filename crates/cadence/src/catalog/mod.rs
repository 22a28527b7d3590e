//! Track catalog: a SQLite index of track metadata and directory timestamps.
//!
//! [`Catalog`] methods are `async` and hand their work to tokio's blocking pool. Every
//! call checks out its own pooled connection, so reads can overlap with a running
//! [`Catalog::index`].

pub mod indexer;
pub mod probe;
pub mod schema;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadence_types::ClockTime;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use thiserror::Error;

pub use indexer::IndexReport;
pub use probe::{ProbeError, Prober, SymphoniaProber};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("nothing found: {0}")]
    NotFound(String),

    #[error("expected exactly one match for {query}, found {count}")]
    NotExactlyOne { query: String, count: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CatalogError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Metadata of one media file. Absent tags are `None`, never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRecord {
    pub file_path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub date: Option<String>,
    pub duration: Option<ClockTime>,
    /// Average bitrate in bits per second.
    pub bitrate: Option<u32>,
    pub audio_codec: Option<String>,
    pub container_format: Option<String>,
    pub encoder: Option<String>,
    /// File mtime in nanoseconds since the Unix epoch.
    pub modified_time: Option<i64>,
}

impl TrackRecord {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }

    /// Title if tagged, else the file name.
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.clone())
    }

    /// `artist - title` one-liner for lists and logs.
    pub fn label(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{artist} - {}", self.display_title()),
            None => self.display_title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub path: String,
    pub modified_time: i64,
}

/// Handle to the catalog database. Cheap to clone.
#[derive(Clone)]
pub struct Catalog {
    pool: Pool<SqliteConnectionManager>,
    prober: Arc<dyn Prober>,
}

impl Catalog {
    /// Open (creating if needed) the database at `db_path` and check its schema.
    pub fn open(db_path: &Path, prober: Arc<dyn Prober>) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
            store::register_functions(conn)
        });
        let pool = Pool::builder().max_size(4).build(manager)?;
        {
            let conn = pool.get()?;
            schema::init_schema(&conn)?;
        }
        tracing::debug!(path = %db_path.display(), "catalog opened");
        Ok(Self { pool, prober })
    }

    /// Run `f` on the blocking pool with a freshly checked-out connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }

    /// Incrementally index the tree under `root`. Unchanged directories are skipped.
    pub async fn index(&self, root: impl Into<PathBuf>) -> Result<IndexReport> {
        let root = root.into();
        let prober = self.prober.clone();
        self.with_conn(move |conn| indexer::index_tree(conn, prober.as_ref(), &root))
            .await
    }

    /// Index every root in turn. A root that fails is logged and skipped.
    pub async fn index_roots(&self, roots: &[PathBuf]) -> IndexReport {
        let mut total = IndexReport::default();
        for root in roots {
            match self.index(root.clone()).await {
                Ok(report) => total.merge(report),
                Err(e) => tracing::warn!(root = %root.display(), "index failed: {e}"),
            }
        }
        total
    }

    /// Tracks whose artist, album or title contains `query`, ignoring case.
    pub async fn search(&self, query: &str) -> Result<Vec<TrackRecord>> {
        let query = query.to_string();
        self.with_conn(move |conn| Ok(store::search(conn, &query)?))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<TrackRecord>> {
        self.with_conn(|conn| Ok(store::list_all(conn)?)).await
    }

    /// The single record stored for `path`.
    pub async fn track_by_path(&self, path: &str) -> Result<TrackRecord> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let mut found = store::tracks_by_path(conn, &path)?;
            if found.len() != 1 {
                return Err(CatalogError::NotExactlyOne {
                    query: path,
                    count: found.len(),
                });
            }
            Ok(found.remove(0))
        })
        .await
    }

    pub async fn get_random_track(&self) -> Result<TrackRecord> {
        self.with_conn(|conn| {
            store::random_track(conn)?
                .ok_or_else(|| CatalogError::NotFound("catalog has no tracks".to_string()))
        })
        .await
    }

    pub async fn get_random_album(&self) -> Result<String> {
        self.with_conn(|conn| {
            store::random_name(conn, store::Grouping::Album)?
                .ok_or_else(|| CatalogError::NotFound("catalog has no albums".to_string()))
        })
        .await
    }

    pub async fn get_random_artist(&self) -> Result<String> {
        self.with_conn(|conn| {
            store::random_name(conn, store::Grouping::Artist)?
                .ok_or_else(|| CatalogError::NotFound("catalog has no artists".to_string()))
        })
        .await
    }

    /// Tracks of album `name`, ordered by track number then path.
    pub async fn get_album_tracks(&self, name: &str) -> Result<Vec<TrackRecord>> {
        let name = name.to_string();
        self.with_conn(move |conn| Ok(store::tracks_in(conn, store::Grouping::Album, &name)?))
            .await
    }

    /// Tracks of artist `name`, ordered by track number then path.
    pub async fn get_artist_tracks(&self, name: &str) -> Result<Vec<TrackRecord>> {
        let name = name.to_string();
        self.with_conn(move |conn| Ok(store::tracks_in(conn, store::Grouping::Artist, &name)?))
            .await
    }
}
