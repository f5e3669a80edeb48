//! The durable, `rusqlite`-backed graph store: vertices, edges, the
//! frontier/processing queues, the iteration log, and job metadata.
//!
//! The store is the sole owner of this state (spec's Data Model
//! "Ownership" note): every other crate interacts with it exclusively
//! through the operations below, never through a shared connection or
//! cursor.

mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fstree_error::{Error, Result};
use fstree_types::{Color, FsId, Individual, RelationshipType};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Either side of `update_relationship`'s key, matching spec §4.3: a
/// relationship id, or the `(child, parent)` endpoint pair.
#[derive(Debug, Clone)]
pub enum UpdateKey {
    ById(FsId),
    ByEndpoints { child: FsId, parent: FsId },
}

/// Within/spanning/frontier edge counts, classified by how many endpoints
/// are resolved vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelationshipCounts {
    pub within: u64,
    pub spanning: u64,
    pub frontier: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastCheckpoint {
    pub iteration: i64,
    pub phase: String,
    pub timestamp: String,
    pub frontier_size: i64,
    pub processing_size: i64,
    pub frontier_preview: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointStatus {
    pub active_iteration: Option<i64>,
    pub starting_iteration: i64,
    pub frontier_size: i64,
    pub processing_size: i64,
    pub last_completed_iteration: Option<i64>,
    pub last_checkpoint: Option<LastCheckpoint>,
    pub run_configuration: Option<Value>,
    pub seed_history: Vec<String>,
    pub frontier_preview: Vec<String>,
}

/// The durable graph store. Cheap to clone: the connection is shared
/// behind a mutex, matching the single-writer discipline spec §5
/// describes ("the Store is the only shared mutable state across tasks").
#[derive(Clone)]
pub struct Store {
    conn: std::sync::Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Store {
    /// Opens (creating or migrating as needed) the store at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&db_path)?;
        schema::apply_pragmas(&conn)?;
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: std::sync::Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Opens an in-memory store, used by tests that don't need a file on
    /// disk.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::apply_pragmas(&conn).ok();
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: std::sync::Arc::new(Mutex::new(conn)),
            db_path: PathBuf::new(),
        })
    }

    fn is_vertex(conn: &Connection, fs_id: &str) -> Result<bool> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM VERTEX WHERE id = ?1", params![fs_id], |r| r.get(0))?;
        Ok(count == 1)
    }

    fn is_in_processing(conn: &Connection, fs_id: &str) -> Result<bool> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM PROCESSING_QUEUE WHERE fs_id = ?1", params![fs_id], |r| r.get(0))?;
        Ok(count == 1)
    }

    /// No-op if `fs_id` is already a vertex or already in the processing
    /// queue; otherwise inserts it, preserving first-seen ordering.
    pub fn add_to_frontier(&self, fs_id: &FsId) -> Result<()> {
        let conn = self.conn.lock();
        if Self::is_vertex(&conn, fs_id.as_str())? || Self::is_in_processing(&conn, fs_id.as_str())? {
            return Ok(());
        }
        conn.execute(
            "INSERT OR IGNORE INTO FRONTIER_QUEUE (fs_id) VALUES (?1)",
            params![fs_id.as_str()],
        )?;
        Ok(())
    }

    /// Inserts `person` into VERTEX if not already present, and drains the
    /// same id from PROCESSING_QUEUE. The only place a vertex is created.
    /// Returns whether an insertion actually happened.
    pub fn add_individual(&self, person: &Individual) -> Result<bool> {
        let conn = self.conn.lock();
        if Self::is_vertex(&conn, person.id.as_str())? {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO VERTEX (id, color, surname, given_name, iteration, lifespan) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                person.id.as_str(),
                person.color.as_i8(),
                person.surname,
                person.given_name,
                person.iteration,
                person.lifespan,
            ],
        )?;
        conn.execute("DELETE FROM PROCESSING_QUEUE WHERE fs_id = ?1", params![person.id.as_str()])?;
        Ok(true)
    }

    /// Ensures both endpoints are known to the frontier, then inserts an
    /// `UntypedParent` edge if no edge exists yet for this `(child, parent)`
    /// pair.
    pub fn add_parent_child_relationship(&self, child: &FsId, parent: &FsId, rel_id: &FsId) -> Result<()> {
        self.add_to_frontier(child)?;
        self.add_to_frontier(parent)?;
        let conn = self.conn.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM EDGE WHERE source = ?1 AND destination = ?2",
            params![child.as_str(), parent.as_str()],
            |r| r.get(0),
        )?;
        if exists == 0 {
            conn.execute(
                "INSERT INTO EDGE (source, destination, type, id) VALUES (?1, ?2, ?3, ?4)",
                params![child.as_str(), parent.as_str(), RelationshipType::UntypedParent.as_str(), rel_id.as_str()],
            )?;
        }
        Ok(())
    }

    /// Rewrites an edge's type. Monotonicity (a concrete type is never
    /// downgraded) is the caller's responsibility, per spec §4.3.
    pub fn update_relationship(&self, key: &UpdateKey, new_type: RelationshipType) -> Result<()> {
        let conn = self.conn.lock();
        match key {
            UpdateKey::ById(id) => {
                conn.execute("UPDATE EDGE SET type = ?1 WHERE id = ?2", params![new_type.as_str(), id.as_str()])?;
            }
            UpdateKey::ByEndpoints { child, parent } => {
                conn.execute(
                    "UPDATE EDGE SET type = ?1 WHERE source = ?2 AND destination = ?3",
                    params![new_type.as_str(), child.as_str(), parent.as_str()],
                )?;
            }
        }
        Ok(())
    }

    /// Atomically moves every frontier entry into the processing queue in
    /// the same insertion order, clears the frontier, marks this iteration
    /// active, and writes a "start" checkpoint.
    pub fn start_iteration(&self, iteration: u32) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM PROCESSING_QUEUE", [])?;
        tx.execute(
            "INSERT INTO PROCESSING_QUEUE (fs_id) SELECT fs_id FROM FRONTIER_QUEUE ORDER BY seq",
            [],
        )?;
        tx.execute("DELETE FROM FRONTIER_QUEUE", [])?;
        set_metadata(&tx, "active_iteration", &json!(iteration))?;
        tx.commit()?;
        drop(conn);
        self.checkpoint(iteration, "start")?;
        Ok(())
    }

    /// Appends a LOG row with computed counts, clears `active_iteration`,
    /// and records `last_completed_iteration`.
    pub fn end_iteration(&self, iteration: u32, duration_seconds: f64) -> Result<()> {
        let counts = self.get_relationship_count()?;
        let vertices = self.count_table("VERTEX")?;
        let frontier = self.count_table("FRONTIER_QUEUE")?;
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO LOG (iteration, duration, vertices, frontier, edges, spanning_edges, frontier_edges)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![iteration, duration_seconds, vertices, frontier, counts.within, counts.spanning, counts.frontier],
            )?;
            delete_metadata(&conn, "active_iteration")?;
            set_metadata(&conn, "last_completed_iteration", &json!(iteration))?;
        }
        self.checkpoint(iteration, "iteration-complete")?;
        info!(iteration, duration_seconds, "finished iteration; {}", self.get_graph_stats()?);
        Ok(())
    }

    /// Appends a LOG row for a completed relationship-resolution pass.
    /// Mirrors `end_iteration`'s shape but, like the original's
    /// `end_relationship_resolution`, only `duration` and `edges` (the
    /// number of relationships resolved) are meaningful here; the other
    /// LOG columns are left null.
    pub fn end_relationship_resolution(&self, count: u64, duration_seconds: f64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO LOG (duration, edges) VALUES (?1, ?2)",
            params![duration_seconds, count as i64],
        )?;
        Ok(())
    }

    /// Commits outstanding work and records queue sizes, a timestamp, and
    /// the first five frontier ids as `last_checkpoint` metadata.
    pub fn checkpoint(&self, iteration: u32, phase: &str) -> Result<()> {
        let frontier_size = self.count_table("FRONTIER_QUEUE")?;
        let processing_size = self.count_table("PROCESSING_QUEUE")?;
        let preview = self.peek_frontier(5)?;
        let record = LastCheckpoint {
            iteration: i64::from(iteration),
            phase: phase.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            frontier_size,
            processing_size,
            frontier_preview: preview.into_iter().map(|id| id.as_str().to_string()).collect(),
        };
        let conn = self.conn.lock();
        set_metadata(&conn, "last_checkpoint", &serde_json::to_value(&record)?)?;
        Ok(())
    }

    /// Only when both queues are empty, inserts `ids` into the frontier in
    /// order (skipping any already a vertex), and records them into
    /// `seed_history`. Returns the number actually inserted.
    pub fn seed_frontier_if_empty(&self, ids: &[FsId]) -> Result<usize> {
        let conn = self.conn.lock();
        let frontier_count: i64 = conn.query_row("SELECT COUNT(*) FROM FRONTIER_QUEUE", [], |r| r.get(0))?;
        let processing_count: i64 = conn.query_row("SELECT COUNT(*) FROM PROCESSING_QUEUE", [], |r| r.get(0))?;
        if frontier_count != 0 || processing_count != 0 {
            return Ok(0);
        }
        let mut inserted = Vec::new();
        for id in ids {
            if Self::is_vertex(&conn, id.as_str())? {
                continue;
            }
            conn.execute("INSERT OR IGNORE INTO FRONTIER_QUEUE (fs_id) VALUES (?1)", params![id.as_str()])?;
            inserted.push(id.as_str().to_string());
        }
        if !inserted.is_empty() {
            let mut history = get_metadata(&conn, "seed_history")?
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            history.extend(inserted.iter().cloned().map(Value::String));
            set_metadata(&conn, "seed_history", &Value::Array(history))?;
        }
        Ok(inserted.len())
    }

    /// Yields processing ids in insertion (`seq`) order.
    pub fn get_ids_to_process(&self) -> Result<Vec<FsId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT fs_id FROM PROCESSING_QUEUE ORDER BY seq")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(FsId::new(row?)?);
        }
        Ok(out)
    }

    /// The first `n` frontier ids in `seq` order.
    pub fn peek_frontier(&self, n: usize) -> Result<Vec<FsId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT fs_id FROM FRONTIER_QUEUE ORDER BY seq LIMIT ?1")?;
        let rows = stmt.query_map(params![n as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(FsId::new(row?)?);
        }
        Ok(out)
    }

    fn count_table(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        count_table_locked(&conn, table)
    }

    pub fn frontier_count(&self) -> Result<i64> {
        self.count_table("FRONTIER_QUEUE")
    }

    pub fn processing_count(&self) -> Result<i64> {
        self.count_table("PROCESSING_QUEUE")
    }

    /// String-rendered vertex/frontier/edge counts for logging.
    pub fn get_graph_stats(&self) -> Result<String> {
        let vertices = self.count_table("VERTEX")?;
        let frontier = self.count_table("FRONTIER_QUEUE")?;
        let counts = self.get_relationship_count()?;
        Ok(format!(
            "{vertices} vertices, {frontier} frontier, {} edges, {} spanning edges, {} frontier edges",
            counts.within, counts.spanning, counts.frontier
        ))
    }

    /// Computes (within, spanning, frontier) edge counts by VERTEX
    /// membership, per spec §3.
    pub fn get_relationship_count(&self) -> Result<RelationshipCounts> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT
                 SUM(CASE WHEN sv.id IS NOT NULL AND dv.id IS NOT NULL THEN 1 ELSE 0 END),
                 SUM(CASE WHEN (sv.id IS NOT NULL) <> (dv.id IS NOT NULL) THEN 1 ELSE 0 END),
                 SUM(CASE WHEN sv.id IS NULL AND dv.id IS NULL THEN 1 ELSE 0 END)
             FROM EDGE e
             LEFT JOIN VERTEX sv ON sv.id = e.source
             LEFT JOIN VERTEX dv ON dv.id = e.destination",
            [],
            |r| {
                Ok(RelationshipCounts {
                    within: r.get::<_, Option<i64>>(0)?.unwrap_or(0) as u64,
                    spanning: r.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                    frontier: r.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                })
            },
        )?;
        Ok(row)
    }

    /// Runs the resolution heuristic (grouping `UntypedParent` edges per
    /// child by destination color; see spec §4.6) to rewrite edges to
    /// `AssumedBiological` or `Resolve`, then yields distinct rel_ids with
    /// `type = Resolve`.
    pub fn get_relationships_to_resolve(&self) -> Result<Vec<FsId>> {
        self.apply_resolution_heuristic()?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT id FROM EDGE WHERE type = ?1")?;
        let rows = stmt.query_map(params![RelationshipType::Resolve.as_str()], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(FsId::new(row?)?);
        }
        Ok(out)
    }

    fn apply_resolution_heuristic(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let untyped: Vec<(String, String, Color)> = {
            let mut stmt = conn.prepare(
                "SELECT e.source, e.destination, v.color
                 FROM EDGE e JOIN VERTEX v ON v.id = e.destination
                 WHERE e.type = ?1
                 ORDER BY e.source",
            )?;
            let rows = stmt.query_map(params![RelationshipType::UntypedParent.as_str()], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, Color::from_i8(r.get::<_, i8>(2)?)))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut by_child: HashMap<String, Vec<(String, Color)>> = HashMap::new();
        for (child, parent, color) in untyped {
            by_child.entry(child).or_default().push((parent, color));
        }

        let tx = conn.transaction()?;
        for (child, edges) in by_child {
            let total = edges.len();
            let mut by_color: HashMap<i8, Vec<&str>> = HashMap::new();
            for (parent, color) in &edges {
                by_color.entry(color.as_i8()).or_default().push(parent.as_str());
            }
            for group in by_color.values() {
                let new_type = if group.len() == 1 && total < 3 {
                    RelationshipType::AssumedBiological
                } else {
                    RelationshipType::Resolve
                };
                for parent in group {
                    tx.execute(
                        "UPDATE EDGE SET type = ?1 WHERE source = ?2 AND destination = ?3 AND type = ?4",
                        params![new_type.as_str(), child, parent, RelationshipType::UntypedParent.as_str()],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Current checkpoint/resume status: active/starting/last-completed
    /// iteration, queue sizes, the last checkpoint snapshot, run
    /// configuration, seed history, and a frontier preview.
    pub fn get_checkpoint_status(&self) -> Result<CheckpointStatus> {
        let conn = self.conn.lock();
        let active_iteration = get_metadata(&conn, "active_iteration")?.and_then(|v| v.as_i64());
        let last_completed_iteration = match get_metadata(&conn, "last_completed_iteration")?.and_then(|v| v.as_i64()) {
            Some(v) => Some(v),
            None => conn
                .query_row("SELECT MAX(iteration) FROM LOG", [], |r| r.get::<_, Option<i64>>(0))
                .optional()?
                .flatten(),
        };
        let starting_iteration = last_completed_iteration.map_or(0, |i| i + 1);
        let last_checkpoint = get_metadata(&conn, "last_checkpoint")?
            .and_then(|v| serde_json::from_value(v).ok());
        let run_configuration = get_metadata(&conn, "run_configuration")?;
        let seed_history = get_metadata(&conn, "seed_history")?
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
        let frontier_size = count_table_locked(&conn, "FRONTIER_QUEUE")?;
        let processing_size = count_table_locked(&conn, "PROCESSING_QUEUE")?;
        let mut stmt = conn.prepare("SELECT fs_id FROM FRONTIER_QUEUE ORDER BY seq LIMIT 5")?;
        let frontier_preview = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CheckpointStatus {
            active_iteration,
            starting_iteration,
            frontier_size,
            processing_size,
            last_completed_iteration,
            last_checkpoint,
            run_configuration,
            seed_history,
            frontier_preview,
        })
    }

    /// Records the effective run configuration (password already redacted
    /// by the caller) as job metadata.
    pub fn record_run_configuration(&self, config: &Value) -> Result<()> {
        let conn = self.conn.lock();
        set_metadata(&conn, "run_configuration", config)?;
        Ok(())
    }

    /// Closes the connection, optionally writing a `<basename>.sql` text
    /// dump next to the database file for inspection.
    pub fn close(self, dump_sql: bool) -> Result<()> {
        if dump_sql && !self.db_path.as_os_str().is_empty() {
            self.write_sql_dump()?;
        }
        Ok(())
    }

    fn write_sql_dump(&self) -> Result<()> {
        let conn = self.conn.lock();
        let dump_path = self.db_path.with_extension("sql");
        let mut out = String::new();
        for table in ["VERTEX", "EDGE", "FRONTIER_QUEUE", "PROCESSING_QUEUE", "LOG", "JOB_METADATA"] {
            out.push_str(&format!("-- {table}\n"));
            let mut stmt = conn.prepare(&format!("SELECT * FROM {table}"))?;
            let column_count = stmt.column_count();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let values: Vec<String> = (0..column_count)
                    .map(|i| match row.get_ref(i) {
                        Ok(v) => sql_literal(&v),
                        Err(_) => "NULL".to_string(),
                    })
                    .collect();
                out.push_str(&format!("INSERT INTO {table} VALUES ({});\n", values.join(", ")));
            }
        }
        std::fs::write(&dump_path, out)?;
        Ok(())
    }
}

fn sql_literal(value: &rusqlite::types::ValueRef<'_>) -> String {
    match value {
        rusqlite::types::ValueRef::Null => "NULL".to_string(),
        rusqlite::types::ValueRef::Integer(i) => i.to_string(),
        rusqlite::types::ValueRef::Real(f) => f.to_string(),
        rusqlite::types::ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        rusqlite::types::ValueRef::Blob(_) => "NULL".to_string(),
    }
}

fn count_table_locked(conn: &Connection, table: &str) -> Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0)).map_err(Error::from)
}

fn set_metadata(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    conn.execute(
        "INSERT INTO JOB_METADATA (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn delete_metadata(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM JOB_METADATA WHERE key = ?1", params![key])?;
    Ok(())
}

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM JOB_METADATA WHERE key = ?1", params![key], |r| r.get(0))
        .optional()?;
    Ok(match raw {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fstree_types::RelationshipType as RT;

    fn id(s: &str) -> FsId {
        FsId::new(s).unwrap()
    }

    fn individual(s: &str, color: Color, iteration: u32) -> Individual {
        Individual {
            id: id(s),
            color,
            surname: None,
            given_name: None,
            iteration,
            lifespan: None,
        }
    }

    #[test]
    fn frontier_vertex_processing_are_mutually_exclusive() {
        let store = Store::open_in_memory().unwrap();
        store.add_to_frontier(&id("AAAA-111")).unwrap();
        store.add_individual(&individual("AAAA-111", Color::Unknown, 0)).unwrap();
        // Having become a vertex, re-adding to the frontier must no-op.
        store.add_to_frontier(&id("AAAA-111")).unwrap();
        let frontier = store.peek_frontier(10).unwrap();
        assert!(!frontier.contains(&id("AAAA-111")));
    }

    #[test]
    fn add_individual_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let person = individual("AAAA-111", Color::Male, 0);
        assert!(store.add_individual(&person).unwrap());
        assert!(!store.add_individual(&person).unwrap());
    }

    #[test]
    fn add_parent_child_relationship_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("PPPP-111"), &id("RRRR-111")).unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("PPPP-111"), &id("RRRR-222")).unwrap();
        let conn = store.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM EDGE", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn end_relationship_resolution_appends_a_log_row() {
        let store = Store::open_in_memory().unwrap();
        store.end_relationship_resolution(3, 1.25).unwrap();
        let conn = store.conn.lock();
        let (duration, edges): (f64, i64) =
            conn.query_row("SELECT duration, edges FROM LOG", [], |r| Ok((r.get(0)?, r.get(1)?))).unwrap();
        assert_eq!(duration, 1.25);
        assert_eq!(edges, 3);
    }

    #[test]
    fn start_iteration_moves_frontier_to_processing_in_order() {
        let store = Store::open_in_memory().unwrap();
        store.add_to_frontier(&id("AAAA-111")).unwrap();
        store.add_to_frontier(&id("BBBB-111")).unwrap();
        store.start_iteration(0).unwrap();
        let processing = store.get_ids_to_process().unwrap();
        assert_eq!(processing, vec![id("AAAA-111"), id("BBBB-111")]);
        assert!(store.peek_frontier(10).unwrap().is_empty());
    }

    #[test]
    fn end_iteration_sets_completion_metadata() {
        let store = Store::open_in_memory().unwrap();
        store.start_iteration(0).unwrap();
        store.end_iteration(0, 1.5).unwrap();
        let status = store.get_checkpoint_status().unwrap();
        assert_eq!(status.active_iteration, None);
        assert_eq!(status.last_completed_iteration, Some(0));
    }

    #[test]
    fn seed_frontier_if_empty_is_a_noop_once_populated() {
        let store = Store::open_in_memory().unwrap();
        let n = store.seed_frontier_if_empty(&[id("AAAA-111"), id("BBBB-111")]).unwrap();
        assert_eq!(n, 2);
        let n2 = store.seed_frontier_if_empty(&[id("CCCC-111")]).unwrap();
        assert_eq!(n2, 0);
    }

    #[test]
    fn resolution_heuristic_matches_s3() {
        let store = Store::open_in_memory().unwrap();
        for (p, c) in [("MMMM-111", Color::Male), ("FFFF-111", Color::Female), ("UUUU-111", Color::Unknown)] {
            store.add_individual(&individual(p, c, 0)).unwrap();
        }
        store.add_individual(&individual("CCCC-111", Color::Unknown, 0)).unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("MMMM-111"), &id("RRRR-111")).unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("FFFF-111"), &id("RRRR-222")).unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("UUUU-111"), &id("RRRR-333")).unwrap();

        let to_resolve = store.get_relationships_to_resolve().unwrap();
        assert_eq!(to_resolve.len(), 3);
    }

    #[test]
    fn resolution_heuristic_assumes_biological_below_threshold() {
        let store = Store::open_in_memory().unwrap();
        store.add_individual(&individual("MMMM-111", Color::Male, 0)).unwrap();
        store.add_individual(&individual("CCCC-111", Color::Unknown, 0)).unwrap();
        store.add_parent_child_relationship(&id("CCCC-111"), &id("MMMM-111"), &id("RRRR-111")).unwrap();

        let to_resolve = store.get_relationships_to_resolve().unwrap();
        assert!(to_resolve.is_empty());

        let conn = store.conn.lock();
        let rel_type: String = conn.query_row("SELECT type FROM EDGE", [], |r| r.get(0)).unwrap();
        assert_eq!(rel_type, RT::AssumedBiological.as_str());
    }
}
