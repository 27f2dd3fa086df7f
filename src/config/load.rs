use super::{default_global_config_path, ConfigError, EngineSettings};
use std::path::Path;

/// Reads `~/.cadpilot/config.yaml`. A missing file yields defaults.
pub fn load_global_settings() -> Result<EngineSettings, ConfigError> {
    let path = default_global_config_path()?;
    load_settings_or_default(&path)
}

pub fn load_settings_or_default(path: &Path) -> Result<EngineSettings, ConfigError> {
    let settings = if path.exists() {
        EngineSettings::from_path(path)?
    } else {
        EngineSettings::default()
    };
    settings.validate()?;
    Ok(settings)
}
