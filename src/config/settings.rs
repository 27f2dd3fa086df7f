use super::ConfigError;
use crate::units::LengthUnit;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Scope a search starts from when the plan names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultScope {
    #[default]
    WholeModel,
    ActiveView,
}

impl DefaultScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WholeModel => "whole_model",
            Self::ActiveView => "active_view",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "whole_model" => Ok(Self::WholeModel),
            "active_view" => Ok(Self::ActiveView),
            _ => Err("default_scope must be one of: whole_model, active_view".to_string()),
        }
    }
}

impl std::fmt::Display for DefaultScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub units: UnitSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    #[serde(default = "default_found_prefix")]
    pub found_prefix: String,
    #[serde(default = "default_created_prefix")]
    pub created_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            found_prefix: default_found_prefix(),
            created_prefix: default_created_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UnitSettings {
    #[serde(default)]
    pub default_unit: LengthUnit,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub default_scope: DefaultScope,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub extra_denylist: Vec<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Items a fragment may hold in one list value, nested lists included.
    #[serde(default = "default_max_list_items")]
    pub max_list_items: usize,
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_denylist: Vec::new(),
            max_steps: default_max_steps(),
            max_list_items: default_max_list_items(),
            max_text_bytes: default_max_text_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_found_prefix() -> String {
    "$q".to_string()
}

fn default_created_prefix() -> String {
    "$f".to_string()
}

fn default_max_steps() -> u64 {
    100_000
}

fn default_max_list_items() -> usize {
    1_000_000
}

fn default_max_text_bytes() -> usize {
    4 * 1024 * 1024
}

fn validate_prefix(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Settings(format!(
            "`session.{field}` must be non-empty"
        )));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::Settings(format!(
            "`session.{field}` must not contain whitespace"
        )));
    }
    Ok(())
}

impl EngineSettings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_prefix("found_prefix", &self.session.found_prefix)?;
        validate_prefix("created_prefix", &self.session.created_prefix)?;

        let found = self.session.found_prefix.to_ascii_lowercase();
        let created = self.session.created_prefix.to_ascii_lowercase();
        if found.starts_with(&created) || created.starts_with(&found) {
            return Err(ConfigError::Settings(format!(
                "session prefixes `{}` and `{}` must not overlap",
                self.session.found_prefix, self.session.created_prefix
            )));
        }

        if self.sandbox.max_steps == 0 {
            return Err(ConfigError::Settings(
                "`sandbox.max_steps` must be > 0".to_string(),
            ));
        }
        if self.sandbox.max_list_items == 0 || self.sandbox.max_text_bytes == 0 {
            return Err(ConfigError::Settings(
                "`sandbox.max_list_items` and `sandbox.max_text_bytes` must be > 0".to_string(),
            ));
        }
        for token in &self.sandbox.extra_denylist {
            if token.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`sandbox.extra_denylist` entries must be non-empty".to_string(),
                ));
            }
        }

        if let Some(path) = &self.log_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Settings(
                    "`log_path` must be non-empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
