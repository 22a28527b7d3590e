//! Table descriptions and the open-time schema check.
//!
//! Each table is described statically. On open the on-disk columns (`pragma_table_info`)
//! are compared by name and declared type, in order; any difference drops and recreates
//! the table. Stored rows are lost in that case.

use rusqlite::Connection;

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub constraint: &'static str,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// `(index name, column)` pairs.
    pub indexes: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCheck {
    Created,
    Matched,
    Rebuilt,
}

const fn col(name: &'static str, sql_type: &'static str, constraint: &'static str) -> Column {
    Column {
        name,
        sql_type,
        constraint,
    }
}

pub const TRACKS: TableSchema = TableSchema {
    name: "tracks",
    columns: &[
        col("id", "INTEGER", "PRIMARY KEY"),
        col("file_path", "TEXT", "NOT NULL UNIQUE"),
        col("title", "TEXT", ""),
        col("artist", "TEXT", ""),
        col("album", "TEXT", ""),
        col("genre", "TEXT", ""),
        col("track_number", "INTEGER", ""),
        col("date", "TEXT", ""),
        col("duration_ns", "INTEGER", ""),
        col("bitrate", "INTEGER", ""),
        col("audio_codec", "TEXT", ""),
        col("container_format", "TEXT", ""),
        col("encoder", "TEXT", ""),
        col("modified_time", "INTEGER", ""),
    ],
    indexes: &[
        ("idx_tracks_album", "album"),
        ("idx_tracks_artist", "artist"),
    ],
};

pub const DIRS: TableSchema = TableSchema {
    name: "dirs",
    columns: &[
        col("id", "INTEGER", "PRIMARY KEY"),
        col("path", "TEXT", "NOT NULL UNIQUE"),
        col("modified_time", "INTEGER", "NOT NULL"),
    ],
    indexes: &[],
};

pub const ALL_TABLES: &[&TableSchema] = &[&TRACKS, &DIRS];

impl TableSchema {
    pub fn create_sql(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.constraint.is_empty() {
                    format!("{} {}", c.name, c.sql_type)
                } else {
                    format!("{} {} {}", c.name, c.sql_type, c.constraint)
                }
            })
            .collect();
        let mut sql = format!("CREATE TABLE {} ({});", self.name, cols.join(", "));
        for (index, column) in self.indexes {
            sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {index} ON {}({column});",
                self.name
            ));
        }
        sql
    }

    fn matches(&self, on_disk: &[(String, String)]) -> bool {
        on_disk.len() == self.columns.len()
            && self
                .columns
                .iter()
                .zip(on_disk)
                .all(|(c, (name, ty))| c.name == name && c.sql_type.eq_ignore_ascii_case(ty))
    }
}

/// `(name, declared type)` for every column of `table`, in declaration order.
pub fn on_disk_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Create `schema` if missing, or drop and recreate it when the columns differ.
pub fn ensure_table(conn: &Connection, schema: &TableSchema) -> rusqlite::Result<SchemaCheck> {
    let existing = on_disk_columns(conn, schema.name)?;
    if existing.is_empty() {
        conn.execute_batch(&schema.create_sql())?;
        return Ok(SchemaCheck::Created);
    }
    if schema.matches(&existing) {
        return Ok(SchemaCheck::Matched);
    }
    tracing::warn!(table = schema.name, "table schema changed, recreating");
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {};\n{}",
        schema.name,
        schema.create_sql()
    ))?;
    Ok(SchemaCheck::Rebuilt)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    for schema in ALL_TABLES {
        let check = ensure_table(conn, schema)?;
        tracing::debug!(table = schema.name, ?check, "schema checked");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_creates_tables() {
        let conn = Connection::open_in_memory().expect("open memory db");
        assert_eq!(ensure_table(&conn, &TRACKS).unwrap(), SchemaCheck::Created);
        assert_eq!(ensure_table(&conn, &TRACKS).unwrap(), SchemaCheck::Matched);
        let cols = on_disk_columns(&conn, "tracks").unwrap();
        assert_eq!(cols.len(), TRACKS.columns.len());
        assert_eq!(cols[1], ("file_path".to_string(), "TEXT".to_string()));
    }

    #[test]
    fn changed_column_type_rebuilds_table() {
        let conn = Connection::open_in_memory().expect("open memory db");
        conn.execute_batch(
            "CREATE TABLE dirs (id INTEGER PRIMARY KEY, path TEXT NOT NULL UNIQUE, modified_time REAL NOT NULL);
             INSERT INTO dirs (path, modified_time) VALUES ('/music', 1.5);",
        )
        .expect("legacy schema");

        assert_eq!(ensure_table(&conn, &DIRS).unwrap(), SchemaCheck::Rebuilt);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM dirs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            on_disk_columns(&conn, "dirs").unwrap()[2],
            ("modified_time".to_string(), "INTEGER".to_string())
        );
    }

    #[test]
    fn missing_column_rebuilds_table() {
        let conn = Connection::open_in_memory().expect("open memory db");
        conn.execute_batch("CREATE TABLE tracks (id INTEGER PRIMARY KEY, file_path TEXT NOT NULL UNIQUE);")
            .expect("legacy schema");
        assert_eq!(ensure_table(&conn, &TRACKS).unwrap(), SchemaCheck::Rebuilt);
        assert_eq!(ensure_table(&conn, &TRACKS).unwrap(), SchemaCheck::Matched);
    }

    #[test]
    fn create_sql_includes_indexes() {
        let sql = TRACKS.create_sql();
        assert!(sql.starts_with("CREATE TABLE tracks (id INTEGER PRIMARY KEY, file_path TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album);"));
    }
}
