use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cadence::catalog::{Catalog, CatalogError, ProbeError, Prober, TrackRecord};

/// Reads `*.tag` files made of `key=value` lines.
#[derive(Default)]
struct TagFileProber {
    probes: AtomicUsize,
}

impl TagFileProber {
    fn probes(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

impl Prober for TagFileProber {
    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|e| e == "tag")
    }

    fn probe(&self, path: &Path) -> Result<TrackRecord, ProbeError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        let mut record = TrackRecord::new(path.to_string_lossy());
        for line in std::fs::read_to_string(path)?.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match key.trim() {
                "title" => record.title = value,
                "artist" => record.artist = value,
                "album" => record.album = value,
                "track" => record.track_number = value.and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        Ok(record)
    }
}

struct Fixture {
    root: PathBuf,
    prober: Arc<TagFileProber>,
    catalog: Catalog,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn fixture(tag: &str) -> Fixture {
    let root = std::env::temp_dir().join(format!(
        "cadence-catalog-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(root.join("music")).unwrap();
    let prober = Arc::new(TagFileProber::default());
    let catalog = Catalog::open(&root.join("db").join("library.sqlite"), prober.clone()).unwrap();
    Fixture {
        root,
        prober,
        catalog,
    }
}

impl Fixture {
    fn music(&self) -> PathBuf {
        self.root.join("music")
    }

    fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.music().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }
}

fn paths(tracks: &[TrackRecord]) -> Vec<&str> {
    tracks
        .iter()
        .map(|t| t.path().file_name().unwrap().to_str().unwrap())
        .collect()
}

#[tokio::test]
async fn reindexing_unchanged_tree_probes_nothing() {
    let fx = fixture("idempotent");
    fx.write("a/01.tag", "title=One\nalbum=A");
    fx.write("a/02.tag", "title=Two\nalbum=A");
    fx.write("b/01.tag", "title=Three\nalbum=B");

    let first = fx.catalog.index(fx.music()).await.unwrap();
    assert_eq!(first.tracks_indexed, 3);
    assert_eq!(fx.prober.probes(), 3);
    let before = fx.catalog.list_all().await.unwrap();

    let second = fx.catalog.index(fx.music()).await.unwrap();
    assert_eq!(second.tracks_indexed, 0);
    assert_eq!(second.dirs_scanned, 0);
    assert_eq!(second.dirs_skipped, first.dirs_scanned);
    assert_eq!(fx.prober.probes(), 3);
    assert_eq!(fx.catalog.list_all().await.unwrap(), before);
}

#[tokio::test]
async fn rescanned_directory_updates_records_in_place() {
    let fx = fixture("upsert");
    let song = fx.write("a/01.tag", "title=Old");
    fx.catalog.index(fx.music()).await.unwrap();

    // Directory mtimes can be coarse; make sure the next change lands on a new tick.
    std::thread::sleep(Duration::from_millis(50));
    std::fs::write(&song, "title=New").unwrap();
    fx.write("a/02.tag", "title=Added");
    let report = fx.catalog.index(fx.music()).await.unwrap();
    assert_eq!(report.tracks_indexed, 2);

    let all = fx.catalog.list_all().await.unwrap();
    assert_eq!(all.len(), 2);
    let record = fx
        .catalog
        .track_by_path(&song.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(record.title.as_deref(), Some("New"));
}

#[tokio::test]
async fn empty_catalog_draws_are_not_found() {
    let fx = fixture("empty");
    assert!(matches!(
        fx.catalog.get_random_track().await,
        Err(CatalogError::NotFound(_))
    ));
    assert!(matches!(
        fx.catalog.get_random_album().await,
        Err(CatalogError::NotFound(_))
    ));
    assert!(matches!(
        fx.catalog.get_random_artist().await,
        Err(CatalogError::NotFound(_))
    ));
    assert!(fx.catalog.get_album_tracks("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn untagged_tracks_never_come_back_as_albums_or_artists() {
    let fx = fixture("untagged");
    fx.write("loose.tag", "title=Loose");
    fx.catalog.index(fx.music()).await.unwrap();

    assert_eq!(fx.catalog.get_random_track().await.unwrap().title.as_deref(), Some("Loose"));
    assert!(matches!(
        fx.catalog.get_random_album().await,
        Err(CatalogError::NotFound(_))
    ));
}

#[tokio::test]
async fn search_matches_substrings_ignoring_case() {
    let fx = fixture("search");
    fx.write("x/01.tag", "title=Kiss Your Feet\nartist=Someone\nalbum=Songs");
    fx.write("x/02.tag", "title=Other\nartist=Kissinger\nalbum=Songs");
    fx.write("y/01.tag", "title=Unrelated\nartist=Nobody\nalbum=Elsewhere");
    fx.catalog.index(fx.music()).await.unwrap();

    for query in ["kiss", "KISS", "Kiss"] {
        assert_eq!(fx.catalog.search(query).await.unwrap().len(), 2, "{query}");
    }
    let feet = fx.catalog.search("Feet").await.unwrap();
    assert_eq!(feet.len(), 1);
    assert_eq!(feet[0].title.as_deref(), Some("Kiss Your Feet"));
    assert!(fx.catalog.search("100%").await.unwrap().is_empty());
}

#[tokio::test]
async fn search_ignores_case_of_accented_letters() {
    let fx = fixture("unicode");
    fx.write("h/01.tag", "title=Hunter\nartist=Björk\nalbum=Homogenic");
    fx.write("s/01.tag", "title=Ögonblick\nartist=Someone\nalbum=Singles");
    fx.catalog.index(fx.music()).await.unwrap();

    let hits = fx.catalog.search("BJÖRK").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].artist.as_deref(), Some("Björk"));
    assert_eq!(fx.catalog.search("ögonblick").await.unwrap().len(), 1);
}

#[tokio::test]
async fn track_by_path_requires_exactly_one_match() {
    let fx = fixture("exact");
    let song = fx.write("a/01.tag", "title=One");
    fx.catalog.index(fx.music()).await.unwrap();

    assert!(fx.catalog.track_by_path(&song.to_string_lossy()).await.is_ok());
    match fx.catalog.track_by_path("/not/indexed.tag").await {
        Err(CatalogError::NotExactlyOne { count, .. }) => assert_eq!(count, 0),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn album_tracks_follow_track_numbers() {
    let fx = fixture("order");
    fx.write("a/c.tag", "album=A\ntrack=1");
    fx.write("a/a.tag", "album=A\ntrack=3");
    fx.write("a/b.tag", "album=A\ntrack=2");
    fx.write("a/z.tag", "album=A");
    fx.catalog.index(fx.music()).await.unwrap();

    let tracks = fx.catalog.get_album_tracks("A").await.unwrap();
    assert_eq!(paths(&tracks), vec!["c.tag", "b.tag", "a.tag", "z.tag"]);
}

#[tokio::test]
async fn missing_root_is_an_io_error_and_index_roots_skips_it() {
    let fx = fixture("missing");
    fx.write("a/01.tag", "title=One");
    let missing = fx.root.join("does-not-exist");

    assert!(matches!(
        fx.catalog.index(missing.clone()).await,
        Err(CatalogError::Io { .. })
    ));
    let report = fx.catalog.index_roots(&[missing, fx.music()]).await;
    assert_eq!(report.tracks_indexed, 1);
}
