//! Schema creation and migration.
//!
//! `user_version` starts at `0` for a brand-new database (migrated to `2`
//! immediately by [`ensure_schema`]), `1` for the legacy set-based
//! frontier/processing tables, `2` for the current ordered-queue layout.

use fstree_error::Result;
use rusqlite::Connection;
use tracing::info;

const CURRENT_VERSION: i64 = 2;

const CREATE_CURRENT_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS VERTEX (
    id          TEXT PRIMARY KEY NOT NULL,
    color       INTEGER NOT NULL,
    surname     TEXT,
    given_name  TEXT,
    iteration   INTEGER NOT NULL,
    lifespan    TEXT
);

CREATE TABLE IF NOT EXISTS EDGE (
    source      TEXT NOT NULL,
    destination TEXT NOT NULL,
    type        TEXT NOT NULL,
    id          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS EDGE_SOURCE_IDX ON EDGE(source);
CREATE INDEX IF NOT EXISTS EDGE_DESTINATION_IDX ON EDGE(destination);
CREATE INDEX IF NOT EXISTS EDGE_TYPE_IDX ON EDGE(type);
CREATE INDEX IF NOT EXISTS EDGE_ID_IDX ON EDGE(id);

CREATE TABLE IF NOT EXISTS FRONTIER_QUEUE (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    fs_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS PROCESSING_QUEUE (
    seq   INTEGER PRIMARY KEY AUTOINCREMENT,
    fs_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS LOG (
    iteration      INTEGER,
    duration       REAL,
    vertices       INTEGER,
    frontier       INTEGER,
    edges          INTEGER,
    spanning_edges INTEGER,
    frontier_edges INTEGER
);

CREATE TABLE IF NOT EXISTS JOB_METADATA (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Opens the durability pragmas spec §4.3 requires: WAL for readers that
/// don't block writers, full synchronous durability, and a 30s busy
/// timeout so concurrent short-lived readers don't spuriously fail.
pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA busy_timeout=30000;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Creates the schema if absent and migrates legacy layouts forward.
pub fn ensure_schema(conn: &mut Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    match version {
        0 => {
            conn.execute_batch(CREATE_CURRENT_SCHEMA)?;
            conn.pragma_update(None, "user_version", CURRENT_VERSION)?;
            info!("initialized a new graph store at schema version {CURRENT_VERSION}");
        }
        1 => migrate_from_legacy(conn)?,
        CURRENT_VERSION => {}
        other => {
            return Err(fstree_error::Error::storage(format!(
                "unsupported schema version {other}, expected 0, 1, or {CURRENT_VERSION}"
            )));
        }
    }
    Ok(())
}

/// Migrates the legacy set-based `FRONTIER_VERTEX`/`PROCESSING` tables
/// (`original_source/fscrawler/model/graph_db_impl.py`'s shape) into the
/// ordered-queue variant, preserving insertion order by `rowid`.
fn migrate_from_legacy(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_CURRENT_SCHEMA)?;
    tx.execute_batch(
        "INSERT INTO FRONTIER_QUEUE (fs_id)
         SELECT id FROM FRONTIER_VERTEX ORDER BY rowid;
         INSERT INTO PROCESSING_QUEUE (fs_id)
         SELECT id FROM PROCESSING ORDER BY rowid;
         DROP TABLE FRONTIER_VERTEX;
         DROP TABLE PROCESSING;",
    )?;
    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
    tx.commit()?;
    info!("migrated legacy schema (version 1) to the ordered-queue layout (version {CURRENT_VERSION})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE VERTEX (id TEXT PRIMARY KEY, color INTEGER, surname TEXT, given_name TEXT, iteration INTEGER, lifespan TEXT);
             CREATE TABLE EDGE (source TEXT, destination TEXT, type TEXT, id TEXT);
             CREATE TABLE FRONTIER_VERTEX (id TEXT PRIMARY KEY);
             CREATE TABLE PROCESSING (id TEXT PRIMARY KEY);
             CREATE TABLE LOG (iteration INTEGER, duration REAL, vertices INTEGER, frontier INTEGER, edges INTEGER, spanning_edges INTEGER, frontier_edges INTEGER);
             INSERT INTO FRONTIER_VERTEX (id) VALUES ('F1'), ('F2');
             INSERT INTO PROCESSING (id) VALUES ('P1');",
        )
        .unwrap();
        conn.pragma_update(None, "user_version", 1_i64).unwrap();
        conn
    }

    #[test]
    fn fresh_database_initializes_at_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn migrates_legacy_tables_preserving_order() {
        let mut conn = legacy_db();
        ensure_schema(&mut conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, CURRENT_VERSION);

        let frontier: Vec<String> = conn
            .prepare("SELECT fs_id FROM FRONTIER_QUEUE ORDER BY seq")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(frontier, vec!["F1", "F2"]);

        let processing: Vec<String> = conn
            .prepare("SELECT fs_id FROM PROCESSING_QUEUE ORDER BY seq")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(processing, vec!["P1"]);

        let legacy_gone: rusqlite::Result<i64> =
            conn.query_row("SELECT COUNT(*) FROM sqlite_master WHERE name IN ('FRONTIER_VERTEX','PROCESSING')", [], |r| r.get(0));
        assert_eq!(legacy_gone.unwrap(), 0);
    }
}
