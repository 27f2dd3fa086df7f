use super::plan::PlanError;
use crate::config::ConfigError;
use crate::execution::BridgeError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
