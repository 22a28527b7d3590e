//! Incremental indexing of a directory tree.
//!
//! Directories are visited one at a time. A directory whose filesystem mtime equals the
//! stored one is skipped outright. Otherwise every accepted file directly inside it is
//! probed and upserted, then the directory's new mtime is recorded, all in one
//! transaction, so an interrupted run leaves finished directories intact and the rest
//! stale.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use walkdir::WalkDir;

use super::probe::{Prober, mtime_nanos};
use super::{CatalogError, DirectoryRecord, Result, store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Tracks probed and upserted.
    pub tracks_indexed: usize,
    /// Directories whose files were (re)probed.
    pub dirs_scanned: usize,
    /// Directories skipped because their mtime was unchanged.
    pub dirs_skipped: usize,
    pub probe_failures: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: IndexReport) {
        self.tracks_indexed += other.tracks_indexed;
        self.dirs_scanned += other.dirs_scanned;
        self.dirs_skipped += other.dirs_skipped;
        self.probe_failures += other.probe_failures;
    }
}

pub fn index_tree(conn: &mut Connection, prober: &dyn Prober, root: &Path) -> Result<IndexReport> {
    let meta = std::fs::metadata(root).map_err(|e| CatalogError::io(root, e))?;
    if !meta.is_dir() {
        return Err(CatalogError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "index root is not a directory"),
        ));
    }

    let mut report = IndexReport::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match index_dir(conn, prober, entry.path(), &mut report) {
            Ok(()) => {}
            Err(CatalogError::Io { path, source }) => {
                tracing::warn!(path = %path.display(), "skipping directory: {source}");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        root = %root.display(),
        tracks = report.tracks_indexed,
        scanned = report.dirs_scanned,
        skipped = report.dirs_skipped,
        failures = report.probe_failures,
        "index finished"
    );
    Ok(report)
}

fn index_dir(
    conn: &mut Connection,
    prober: &dyn Prober,
    dir: &Path,
    report: &mut IndexReport,
) -> Result<()> {
    let dir_key = dir.to_string_lossy().into_owned();
    let meta = std::fs::metadata(dir).map_err(|e| CatalogError::io(dir, e))?;
    let mtime = mtime_nanos(&meta).map_err(|e| CatalogError::io(dir, e))?;

    if store::dir_mtime(conn, &dir_key)? == Some(mtime) {
        report.dirs_skipped += 1;
        return Ok(());
    }

    let files = list_files(dir)?;
    let tx = conn.transaction()?;
    let mut indexed = 0usize;
    for file in files.iter().filter(|f| prober.accepts(f)) {
        match prober.probe(file) {
            Ok(track) => {
                store::upsert_track(&tx, &track)?;
                indexed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), "probe failed: {e}");
                report.probe_failures += 1;
            }
        }
    }
    store::upsert_dir(
        &tx,
        &DirectoryRecord {
            path: dir_key,
            modified_time: mtime,
        },
    )?;
    tx.commit()?;

    tracing::debug!(path = %dir.display(), count = indexed, "directory indexed");
    report.tracks_indexed += indexed;
    report.dirs_scanned += 1;
    Ok(())
}

/// Regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CatalogError::io(dir, e))? {
        let entry = entry.map_err(|e| CatalogError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
