use crate::shared::logging::EngineLog;
use crate::shared::time::now_utc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Diagnostics for developers and logs.
    System,
    Warning,
    Error,
    /// Structured facts fed back to the agent on the next turn.
    Agent,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Agent => "agent",
        }
    }

    fn log_level(self) -> Option<&'static str> {
        match self {
            Self::System => Some("debug"),
            Self::Warning => Some("warn"),
            Self::Error => Some("error"),
            Self::Agent => None,
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub audience: Audience,
    pub text: String,
}

/// Receives every report as it is emitted.
pub trait ReportSink: Send + Sync {
    fn receive(&self, report: &Report);
}

/// `[operation] (Target: 'x', Assign: 'y'): message`
pub fn format_agent_report(
    operation: &str,
    target: Option<&str>,
    assign: Option<&str>,
    message: &str,
) -> String {
    let mut context = Vec::new();
    if let Some(target) = target.filter(|value| !value.trim().is_empty()) {
        context.push(format!("Target: '{target}'"));
    }
    if let Some(assign) = assign.filter(|value| !value.trim().is_empty()) {
        context.push(format!("Assign: '{assign}'"));
    }
    if context.is_empty() {
        format!("[{operation}]: {message}")
    } else {
        format!("[{operation}] ({}): {message}", context.join(", "))
    }
}

#[derive(Default)]
struct BusState {
    reports: Vec<Report>,
    sinks: Vec<Arc<dyn ReportSink>>,
}

/// Append-only, audience-tagged message buffer shared between the host
/// worker (which emits) and the caller (which drains after a batch).
#[derive(Clone, Default)]
pub struct ReportBus {
    state: Arc<Mutex<BusState>>,
    log: EngineLog,
}

impl std::fmt::Debug for ReportBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportBus")
            .field("pending", &self.len())
            .field("log", &self.log)
            .finish()
    }
}

impl ReportBus {
    pub fn new(log: EngineLog) -> Self {
        Self {
            state: Arc::default(),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, sink: Arc<dyn ReportSink>) {
        self.lock().sinks.push(sink);
    }

    pub fn emit(&self, audience: Audience, text: impl Into<String>) {
        let report = Report {
            timestamp: now_utc(),
            audience,
            text: text.into(),
        };
        if let Some(level) = audience.log_level() {
            self.log
                .append(level, &format!("report.{}", audience.as_str()), &report.text);
        }
        let sinks = {
            let mut state = self.lock();
            state.reports.push(report.clone());
            state.sinks.clone()
        };
        for sink in sinks {
            sink.receive(&report);
        }
    }

    pub fn system(&self, text: impl Into<String>) {
        self.emit(Audience::System, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.emit(Audience::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(Audience::Error, text);
    }

    pub fn agent(&self, text: impl Into<String>) {
        self.emit(Audience::Agent, text);
    }

    pub fn len(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Report> {
        self.lock().reports.clone()
    }

    /// Removes and returns every pending report in emission order.
    pub fn drain(&self) -> Vec<Report> {
        std::mem::take(&mut self.lock().reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Collect(Mutex<Vec<String>>);

    impl ReportSink for Collect {
        fn receive(&self, report: &Report) {
            self.0
                .lock()
                .expect("sink lock")
                .push(format!("{}:{}", report.audience, report.text));
        }
    }

    #[test]
    fn drain_returns_reports_in_order_and_empties_bus() {
        let bus = ReportBus::default();
        bus.system("mapped 2 fields");
        bus.agent("Items found: 4.");
        bus.error("step 2 failed");

        let reports = bus.drain();
        let audiences = reports.iter().map(|r| r.audience).collect::<Vec<_>>();
        assert_eq!(
            audiences,
            vec![Audience::System, Audience::Agent, Audience::Error]
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn subscribers_see_each_report() {
        let bus = ReportBus::default();
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        bus.subscribe(sink.clone());
        bus.warning("defaulted scope");
        assert_eq!(
            *sink.0.lock().expect("sink lock"),
            vec!["warning:defaulted scope".to_string()]
        );
    }

    #[test]
    fn agent_reports_are_not_logged() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.log");
        let bus = ReportBus::new(EngineLog::new(Some(path.clone())));
        bus.agent("Items found: 1.");
        bus.error("boom");

        let body = fs::read_to_string(&path).expect("read log");
        assert_eq!(body.lines().count(), 1);
        assert!(body.contains("report.error"));
    }

    #[test]
    fn reports_serialize_with_rfc3339_timestamps() {
        let bus = ReportBus::default();
        bus.warning("defaulted scope");
        let report = bus.drain().pop().expect("report");

        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["audience"], "warning");
        assert_eq!(value["text"], "defaulted scope");
        let stamp = value["timestamp"].as_str().expect("timestamp string");
        let parsed = DateTime::parse_from_rfc3339(stamp).expect("rfc3339 timestamp");
        assert_eq!(parsed.with_timezone(&Utc), report.timestamp);
    }

    #[test]
    fn agent_report_format_includes_context() {
        assert_eq!(
            format_agent_report("move_element", Some("$q1"), None, "Moved 4 elements."),
            "[move_element] (Target: '$q1'): Moved 4 elements."
        );
        assert_eq!(
            format_agent_report("by_category", Some("$q1"), Some("$q2"), "Items found: 4."),
            "[by_category] (Target: '$q1', Assign: '$q2'): Items found: 4."
        );
        assert_eq!(
            format_agent_report("get_levels", None, None, "2 levels."),
            "[get_levels]: 2 levels."
        );
    }
}
