pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_global_settings, load_settings_or_default};
pub use paths::{default_global_config_path, GLOBAL_SETTINGS_FILE_NAME, GLOBAL_STATE_DIR};
pub use settings::{
    DefaultScope, EngineSettings, PipelineSettings, SandboxSettings, SessionSettings,
    UnitSettings,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::LengthUnit;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_document_yields_defaults() {
        let settings: EngineSettings = serde_yaml::from_str("{}").expect("parse settings");
        assert_eq!(settings.session.found_prefix, "$q");
        assert_eq!(settings.session.created_prefix, "$f");
        assert_eq!(settings.units.default_unit, LengthUnit::Millimeter);
        assert_eq!(settings.pipeline.default_scope, DefaultScope::WholeModel);
        assert!(settings.sandbox.enabled);
        assert!(settings.log_path.is_none());
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn sections_parse_with_typed_values() {
        let settings: EngineSettings = serde_yaml::from_str(
            r#"
log_path: /tmp/cadpilot/engine.log
units:
  default_unit: ft
pipeline:
  default_scope: active_view
sandbox:
  enabled: false
  extra_denylist: [delete]
  max_steps: 500
  max_list_items: 2000
"#,
        )
        .expect("parse settings");
        assert_eq!(settings.units.default_unit, LengthUnit::Foot);
        assert_eq!(settings.pipeline.default_scope, DefaultScope::ActiveView);
        assert!(!settings.sandbox.enabled);
        assert_eq!(settings.sandbox.extra_denylist, vec!["delete".to_string()]);
        assert_eq!(settings.sandbox.max_steps, 500);
        assert_eq!(settings.sandbox.max_list_items, 2000);
        assert_eq!(settings.sandbox.max_text_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn invalid_unit_is_a_parse_error() {
        let err = serde_yaml::from_str::<EngineSettings>(
            r#"
units:
  default_unit: cubits
"#,
        )
        .expect_err("unknown unit must fail");
        assert!(err.to_string().contains("length unit"));
    }

    #[test]
    fn validation_rejects_overlapping_prefixes() {
        let settings: EngineSettings = serde_yaml::from_str(
            r#"
session:
  found_prefix: $q
  created_prefix: $qc
"#,
        )
        .expect("parse settings");
        let err = settings.validate().expect_err("overlap must fail");
        match err {
            ConfigError::Settings(message) => assert!(message.contains("must not overlap")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_zero_step_budget() {
        let settings: EngineSettings = serde_yaml::from_str(
            r#"
sandbox:
  max_steps: 0
"#,
        )
        .expect("parse settings");
        let err = settings.validate().expect_err("zero budget must fail");
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn validation_rejects_zero_memory_limits() {
        let settings: EngineSettings = serde_yaml::from_str(
            r#"
sandbox:
  max_text_bytes: 0
"#,
        )
        .expect("parse settings");
        let err = settings.validate().expect_err("zero text limit must fail");
        assert!(err.to_string().contains("max_text_bytes"));
    }

    #[test]
    fn default_global_config_path_targets_home_cadpilot_config_yaml() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let temp = tempdir().expect("temp dir");
        let old_home = std::env::var_os("HOME");
        std::env::set_var("HOME", temp.path());

        let path = default_global_config_path().expect("resolve global config path");
        assert_eq!(path, temp.path().join(".cadpilot/config.yaml"));

        if let Some(value) = old_home {
            std::env::set_var("HOME", value);
        } else {
            std::env::remove_var("HOME");
        }
    }

    #[test]
    fn missing_settings_file_means_defaults() {
        let temp = tempdir().expect("temp dir");
        let settings =
            load_settings_or_default(&temp.path().join("absent.yaml")).expect("load defaults");
        assert_eq!(settings.session.found_prefix, "$q");
    }

    #[test]
    fn settings_file_is_read_and_validated() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("config.yaml");
        fs::write(&path, "session:\n  found_prefix: \"  \"\n").expect("write config");
        let err = load_settings_or_default(&path).expect_err("blank prefix must fail");
        assert!(err.to_string().contains("found_prefix"));
    }
}
