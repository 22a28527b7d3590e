//! Row conversion and queries over a single connection.

use cadence_types::ClockTime;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{DirectoryRecord, TrackRecord};

const TRACK_COLUMNS: &str = "file_path, title, artist, album, genre, track_number, date, \
     duration_ns, bitrate, audio_codec, container_format, encoder, modified_time";

/// Grouping column used for album/artist shuffles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Album,
    Artist,
}

impl Grouping {
    fn column(self) -> &'static str {
        match self {
            Grouping::Album => "album",
            Grouping::Artist => "artist",
        }
    }
}

impl TrackRecord {
    /// Inverse of the parameter list bound in [`upsert_track`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_path: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            album: row.get(3)?,
            genre: row.get(4)?,
            track_number: row.get(5)?,
            date: row.get(6)?,
            duration: row
                .get::<_, Option<i64>>(7)?
                .map(|ns| ClockTime::from_nanos(ns.max(0) as u64)),
            bitrate: row.get(8)?,
            audio_codec: row.get(9)?,
            container_format: row.get(10)?,
            encoder: row.get(11)?,
            modified_time: row.get(12)?,
        })
    }
}

pub fn upsert_track(conn: &Connection, track: &TrackRecord) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tracks ({TRACK_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(file_path) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                genre = excluded.genre,
                track_number = excluded.track_number,
                date = excluded.date,
                duration_ns = excluded.duration_ns,
                bitrate = excluded.bitrate,
                audio_codec = excluded.audio_codec,
                container_format = excluded.container_format,
                encoder = excluded.encoder,
                modified_time = excluded.modified_time"
        ),
        params![
            track.file_path,
            track.title,
            track.artist,
            track.album,
            track.genre,
            track.track_number,
            track.date,
            track.duration.map(|d| d.nanos().min(i64::MAX as u64) as i64),
            track.bitrate,
            track.audio_codec,
            track.container_format,
            track.encoder,
            track.modified_time,
        ],
    )?;
    Ok(())
}

pub fn upsert_dir(conn: &Connection, dir: &DirectoryRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO dirs (path, modified_time) VALUES (?1, ?2)
         ON CONFLICT(path) DO UPDATE SET modified_time = excluded.modified_time",
        params![dir.path, dir.modified_time],
    )?;
    Ok(())
}

pub fn dir_mtime(conn: &Connection, path: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT modified_time FROM dirs WHERE path = ?1",
        [path],
        |row| row.get(0),
    )
    .optional()
}

fn query_tracks(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<TrackRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {TRACK_COLUMNS} FROM tracks {clause}"))?;
    let rows = stmt.query_map(params, TrackRecord::from_row)?;
    rows.collect()
}

pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<TrackRecord>> {
    query_tracks(conn, "ORDER BY file_path", [])
}

/// Case folding used by search on both sides of the comparison.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

/// Registers `fold(text)` on `conn`. Every connection that runs [`search`] needs it.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| fold(&t)))
        },
    )
}

/// Substring match on artist, album or title with Unicode case folding.
pub fn search(conn: &Connection, query: &str) -> rusqlite::Result<Vec<TrackRecord>> {
    query_tracks(
        conn,
        "WHERE instr(fold(artist), ?1) > 0
            OR instr(fold(album), ?1) > 0
            OR instr(fold(title), ?1) > 0
         ORDER BY artist, album, track_number IS NULL, track_number, file_path",
        [fold(query)],
    )
}

pub fn tracks_by_path(conn: &Connection, path: &str) -> rusqlite::Result<Vec<TrackRecord>> {
    query_tracks(conn, "WHERE file_path = ?1", [path])
}

pub fn random_track(conn: &Connection) -> rusqlite::Result<Option<TrackRecord>> {
    let mut found = query_tracks(conn, "ORDER BY RANDOM() LIMIT 1", [])?;
    Ok(found.pop())
}

/// A uniformly drawn distinct non-null album or artist name.
pub fn random_name(conn: &Connection, grouping: Grouping) -> rusqlite::Result<Option<String>> {
    let column = grouping.column();
    conn.query_row(
        &format!(
            "SELECT {column} FROM tracks WHERE {column} IS NOT NULL
             GROUP BY {column} ORDER BY RANDOM() LIMIT 1"
        ),
        [],
        |row| row.get(0),
    )
    .optional()
}

/// Exact-match members of a group, in a stable order for a fixed catalog state.
pub fn tracks_in(
    conn: &Connection,
    grouping: Grouping,
    name: &str,
) -> rusqlite::Result<Vec<TrackRecord>> {
    query_tracks(
        conn,
        &format!(
            "WHERE {} = ?1 ORDER BY track_number IS NULL, track_number, file_path",
            grouping.column()
        ),
        [name],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        schema::init_schema(&conn).expect("schema");
        register_functions(&conn).expect("functions");
        conn
    }

    fn track(path: &str, artist: &str, album: &str, n: Option<u32>) -> TrackRecord {
        TrackRecord {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            track_number: n,
            ..TrackRecord::new(path)
        }
    }

    #[test]
    fn upsert_replaces_by_path() {
        let conn = memory_db();
        upsert_track(&conn, &track("/m/a.flac", "A", "X", Some(1))).unwrap();
        let mut changed = track("/m/a.flac", "B", "Y", Some(2));
        changed.duration = Some(ClockTime::from_secs(200));
        upsert_track(&conn, &changed).unwrap();

        let all = list_all(&conn).unwrap();
        assert_eq!(all, vec![changed]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let conn = memory_db();
        let mut hit = TrackRecord::new("/m/1.mp3");
        hit.title = Some("100% Pure".to_string());
        let mut miss = TrackRecord::new("/m/2.mp3");
        miss.title = Some("1000 Pure".to_string());
        upsert_track(&conn, &hit).unwrap();
        upsert_track(&conn, &miss).unwrap();

        let found = search(&conn, "100%").unwrap();
        assert_eq!(found, vec![hit]);
    }

    #[test]
    fn search_folds_case_beyond_ascii() {
        let conn = memory_db();
        let bjork = track("/m/1.flac", "Björk", "Homogenic", Some(1));
        let other = track("/m/2.flac", "Bjorn", "Elsewhere", Some(1));
        upsert_track(&conn, &bjork).unwrap();
        upsert_track(&conn, &other).unwrap();

        for query in ["BJÖRK", "björk", "Björk", "ÖRK"] {
            assert_eq!(search(&conn, query).unwrap(), vec![bjork.clone()], "{query}");
        }
    }

    #[test]
    fn tracks_in_orders_by_number_then_path_with_untagged_last() {
        let conn = memory_db();
        upsert_track(&conn, &track("/m/c.flac", "A", "X", None)).unwrap();
        upsert_track(&conn, &track("/m/b.flac", "A", "X", Some(2))).unwrap();
        upsert_track(&conn, &track("/m/a.flac", "A", "X", Some(1))).unwrap();
        upsert_track(&conn, &track("/m/d.flac", "A", "Other", Some(1))).unwrap();

        let paths: Vec<String> = tracks_in(&conn, Grouping::Album, "X")
            .unwrap()
            .into_iter()
            .map(|t| t.file_path)
            .collect();
        assert_eq!(paths, vec!["/m/a.flac", "/m/b.flac", "/m/c.flac"]);
    }

    #[test]
    fn random_name_ignores_null_groups() {
        let conn = memory_db();
        upsert_track(&conn, &TrackRecord::new("/m/untagged.wav")).unwrap();
        assert_eq!(random_name(&conn, Grouping::Album).unwrap(), None);
        assert!(random_track(&conn).unwrap().is_some());

        upsert_track(&conn, &track("/m/a.flac", "Artist", "Album", None)).unwrap();
        assert_eq!(
            random_name(&conn, Grouping::Artist).unwrap(),
            Some("Artist".to_string())
        );
    }

    #[test]
    fn dir_mtime_round_trips_through_upsert() {
        let conn = memory_db();
        assert_eq!(dir_mtime(&conn, "/m").unwrap(), None);
        let mut dir = DirectoryRecord {
            path: "/m".to_string(),
            modified_time: 10,
        };
        upsert_dir(&conn, &dir).unwrap();
        dir.modified_time = 20;
        upsert_dir(&conn, &dir).unwrap();
        assert_eq!(dir_mtime(&conn, "/m").unwrap(), Some(20));
    }
}
