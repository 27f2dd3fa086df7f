use cadpilot::config::{load_settings_or_default, ConfigError, DefaultScope};
use cadpilot::engine::{Engine, EngineError};
use cadpilot::host::{ElementRecord, InMemoryModel};
use cadpilot::reports::Audience;
use cadpilot::units::LengthUnit;
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

fn model() -> InMemoryModel {
    InMemoryModel::new("site")
        .with_element(ElementRecord::new(1, "OST_Walls", "Wall"))
        .with_element(ElementRecord::new(2, "OST_Walls", "Wall"))
        .with_element(ElementRecord::new(3, "OST_Doors", "FamilyInstance"))
        .with_active_view(&[1, 3])
}

#[test]
fn yaml_settings_shape_the_engine() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("logs/engine.log");
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "log_path: {}\nsession:\n  found_prefix: $r\n  created_prefix: $n\nunits:\n  default_unit: ft\npipeline:\n  default_scope: active_view\n",
            log_path.display()
        ),
    )
    .expect("write config");

    let settings = load_settings_or_default(&config_path).expect("load settings");
    assert_eq!(settings.units.default_unit, LengthUnit::Foot);
    assert_eq!(settings.pipeline.default_scope, DefaultScope::ActiveView);

    let engine = Engine::start(Box::new(model()), settings).expect("start");
    engine
        .run_plan_value(&json!({"actions": [
            {"action": "by_category", "category": "Walls"},
            {"action": "move_element", "target": "3", "dz": 2},
        ]}))
        .expect("run")
        .wait()
        .expect("batch");

    let summary = engine.session_summary().expect("summary");
    let (key, count) = summary
        .iter()
        .find(|(key, _)| key.starts_with("$r_"))
        .expect("generated query key");
    assert_eq!(*count, 1, "active view holds one wall ({key})");

    let z = engine
        .with_host(|state| {
            state
                .model
                .element(cadpilot::host::EntityHandle::new(3))
                .map(|record| record.location.z)
        })
        .expect("inspect");
    assert_eq!(z, Some(2.0));

    let warnings = engine
        .drain_reports()
        .into_iter()
        .filter(|report| report.audience == Audience::Warning)
        .count();
    assert_eq!(warnings, 1);
    engine.shutdown().expect("shutdown");

    let body = fs::read_to_string(&log_path).expect("read log");
    let events = body
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .map(|line| line["event"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert!(events.contains(&"plan.accepted".to_string()));
    assert!(events.contains(&"batch.started".to_string()));
    assert!(events.contains(&"batch.finished".to_string()));
    assert!(events.contains(&"report.warning".to_string()));
}

#[test]
fn invalid_settings_stop_the_engine_from_starting() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "sandbox:\n  max_steps: 0\n").expect("write config");

    let err = load_settings_or_default(&config_path).expect_err("invalid");
    assert!(matches!(err, ConfigError::Settings(_)));

    let settings: cadpilot::config::EngineSettings =
        serde_yaml::from_str("session:\n  found_prefix: $q\n  created_prefix: $q\n")
            .expect("parse");
    let err = Engine::start(Box::new(model()), settings).expect_err("overlapping prefixes");
    assert!(matches!(err, EngineError::Config(ConfigError::Settings(_))));
}

#[test]
fn malformed_yaml_names_the_file() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "units: [not, a, map").expect("write config");
    let err = load_settings_or_default(&config_path).expect_err("malformed");
    assert!(err.to_string().contains("config.yaml"));
}
