//! Append-only JSON-lines telemetry, grounded in the observer-trait shape
//! `fsqlite-wal`'s write-ahead-log telemetry module uses: a closed event
//! enum instead of free-form `emit(event: &str, **fields)`, because Rust
//! favors a typed schema over keyword arguments.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fstree_error::Result;
use parking_lot::Mutex;
use serde::Serialize;

/// The closed set of telemetry events the crawl orchestrator emits.
///
/// Every variant carries an ISO-8601 UTC timestamp (`ts`, seconds
/// resolution, matching the original emitter's
/// `datetime.now(UTC).replace(microsecond=0)`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    PersonBatch {
        ts: String,
        iteration: u32,
        batch: u32,
        batch_duration_secs: f64,
        batch_requests: u32,
        frontier: u64,
        processing: u64,
        session_counter: u64,
    },
    IterationComplete {
        ts: String,
        iteration: u32,
        duration_secs: f64,
        requests: u64,
        frontier: u64,
        processing: u64,
    },
    RelationshipBatch {
        ts: String,
        batch: u32,
        batch_duration_secs: f64,
        batch_requests: u32,
        session_counter: u64,
    },
    RelationshipsComplete {
        ts: String,
        count: u64,
        duration_secs: f64,
        session_counter: u64,
    },
    Checkpoint {
        ts: String,
        iteration: u32,
        phase: String,
    },
    Stop {
        ts: String,
        reason: String,
    },
}

impl CrawlEvent {
    pub fn timestamp(&self) -> &str {
        match self {
            Self::PersonBatch { ts, .. }
            | Self::IterationComplete { ts, .. }
            | Self::RelationshipBatch { ts, .. }
            | Self::RelationshipsComplete { ts, .. }
            | Self::Checkpoint { ts, .. }
            | Self::Stop { ts, .. } => ts,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::PersonBatch { .. } => "person_batch",
            Self::IterationComplete { .. } => "iteration_complete",
            Self::RelationshipBatch { .. } => "relationship_batch",
            Self::RelationshipsComplete { .. } => "relationships_complete",
            Self::Checkpoint { .. } => "checkpoint",
            Self::Stop { .. } => "stop",
        }
    }
}

/// Seconds-resolution ISO-8601 UTC timestamp, matching the telemetry
/// emitter this is grounded on.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Append-only JSON-lines writer. Flushes after every record. Accepts
/// either a file path (parent directories are created) or any
/// `Write + Send` destination (stdout included). Cheap to clone.
#[derive(Clone)]
pub struct TelemetryEmitter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl TelemetryEmitter {
    pub fn to_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::to_writer(file))
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn emit(&self, event: &CrawlEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Flushes and drops the underlying writer. `TelemetryEmitter` also
    /// closes on `Drop`; this exists so callers can observe I/O errors at
    /// shutdown instead of silently ignoring them.
    pub fn close(self) -> Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn event(kind: &str) -> CrawlEvent {
        match kind {
            "person_batch" => CrawlEvent::PersonBatch {
                ts: now_iso(),
                iteration: 0,
                batch: 1,
                batch_duration_secs: 0.1,
                batch_requests: 2,
                frontier: 3,
                processing: 4,
                session_counter: 5,
            },
            "iteration_complete" => CrawlEvent::IterationComplete {
                ts: now_iso(),
                iteration: 0,
                duration_secs: 1.0,
                requests: 2,
                frontier: 3,
                processing: 0,
            },
            "relationship_batch" => CrawlEvent::RelationshipBatch {
                ts: now_iso(),
                batch: 1,
                batch_duration_secs: 0.1,
                batch_requests: 2,
                session_counter: 5,
            },
            "relationships_complete" => CrawlEvent::RelationshipsComplete {
                ts: now_iso(),
                count: 3,
                duration_secs: 0.5,
                session_counter: 9,
            },
            "checkpoint" => CrawlEvent::Checkpoint {
                ts: now_iso(),
                iteration: 0,
                phase: "start".to_string(),
            },
            "stop" => CrawlEvent::Stop {
                ts: now_iso(),
                reason: "user".to_string(),
            },
            other => panic!("unknown kind {other}"),
        }
    }

    #[test]
    fn kind_str_is_unique_and_exhaustive() {
        let kinds = [
            "person_batch",
            "iteration_complete",
            "relationship_batch",
            "relationships_complete",
            "checkpoint",
            "stop",
        ];
        for k in kinds {
            assert_eq!(event(k).kind_str(), k);
        }
    }

    #[test]
    fn emit_writes_one_json_line_and_flushes() {
        let buf = Arc::new(StdMutex::new(Vec::new()));
        let emitter = TelemetryEmitter::to_writer(SharedBuf(buf.clone()));
        emitter.emit(&event("checkpoint")).unwrap();
        emitter.emit(&event("stop")).unwrap();
        let contents = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "checkpoint");
        assert_eq!(first["phase"], "start");
    }

    #[test]
    fn to_path_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("telemetry.jsonl");
        let emitter = TelemetryEmitter::to_path(&nested).unwrap();
        emitter.emit(&event("stop")).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn cursor_backed_writer_also_works() {
        let emitter = TelemetryEmitter::to_writer(Cursor::new(Vec::new()));
        emitter.emit(&event("person_batch")).unwrap();
    }
}
