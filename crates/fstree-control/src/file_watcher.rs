//! A filesystem "control file" watcher: polls a path every second for
//! `{"pause"|"resume"|"stop"}` JSON and translates it onto the
//! [`ControlPlane`].

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::ControlPlane;

pub struct ControlFileWatcher {
    path: PathBuf,
}

impl ControlFileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Runs until the control plane reports a stop. Intended to be spawned
    /// as its own task alongside the crawl.
    pub async fn run(&self, control: ControlPlane) {
        loop {
            if control.should_stop() {
                return;
            }
            if let Some(command) = self.read_command() {
                match command.as_str() {
                    "pause" => control.request_pause("control-file"),
                    "resume" => control.clear_pause(),
                    "stop" => control.request_stop("control-file"),
                    other => warn!(command = other, "unrecognized control-file command"),
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    fn read_command(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let value: Value = serde_json::from_str(contents.trim()).ok().or_else(|| {
            // Accept a bare word (`pause`, `resume`, `stop`) as well as a
            // `{"command": "..."}` / `"pause"` JSON document.
            Some(Value::String(contents.trim().to_string()))
        })?;
        match value {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("command").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_bare_word_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "pause").unwrap();
        let watcher = ControlFileWatcher::new(file.path());
        assert_eq!(watcher.read_command().as_deref(), Some("pause"));
    }

    #[test]
    fn reads_json_string_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\"stop\"").unwrap();
        let watcher = ControlFileWatcher::new(file.path());
        assert_eq!(watcher.read_command().as_deref(), Some("stop"));
    }

    #[test]
    fn reads_json_object_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"command": "resume"}}"#).unwrap();
        let watcher = ControlFileWatcher::new(file.path());
        assert_eq!(watcher.read_command().as_deref(), Some("resume"));
    }

    #[test]
    fn missing_file_yields_no_command() {
        let watcher = ControlFileWatcher::new("/nonexistent/path/control.json");
        assert!(watcher.read_command().is_none());
    }
}
