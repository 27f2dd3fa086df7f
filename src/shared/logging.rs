use super::time::now_utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSON-lines log. Disabled when no path is configured.
#[derive(Debug, Clone, Default)]
pub struct EngineLog {
    path: Option<PathBuf>,
}

impl EngineLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, level: &str, event: &str, message: &str) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        append_engine_log_line(path, level, event, message);
    }
}

pub fn append_engine_log_line(path: &Path, level: &str, event: &str, message: &str) {
    let payload = serde_json::json!({
        "timestamp": now_utc().to_rfc3339(),
        "level": level,
        "event": event,
        "message": message,
    });

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_lines_are_json_objects() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("logs/engine.log");
        let log = EngineLog::new(Some(path.clone()));
        log.append("info", "batch.started", "3 operations");
        log.append("warn", "pipeline.default_scope", "no scope");

        let body = fs::read_to_string(&path).expect("read log");
        let lines = body.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["event"], "batch.started");
        assert_eq!(first["level"], "info");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = EngineLog::disabled();
        log.append("info", "noop", "ignored");
        assert!(log.path().is_none());
    }
}
