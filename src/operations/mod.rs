//! Plan operations: queries that register result sets and actions that
//! change the model.

pub mod actions;
pub mod catalog;
pub mod dynamic_code;
pub mod queries;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::config::EngineSettings;
use crate::host::{HostError, HostModel};
use crate::mapping::ParameterMapper;
use crate::pipeline::{PipelineError, QueryCursor};
use crate::registry::{OperationKind, ParamDescriptor, ParamKind};
use crate::reports::{format_agent_report, ReportBus};
use crate::sandbox::SandboxError;
use crate::session::{ResultSet, SessionError, SessionStore};
use crate::shared::ids::SessionKey;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("missing required parameter `{0}`")]
    MissingParam(&'static str),
    #[error("{0}")]
    Invalid(String),
}

pub trait Operation: Send {
    fn name(&self) -> &'static str;

    fn kind(&self) -> OperationKind;

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError>;
}

/// Everything an operation may touch while it runs on the host context.
pub struct ExecutionContext<'a> {
    pub model: &'a mut dyn HostModel,
    pub session: &'a mut SessionStore,
    pub reports: &'a ReportBus,
    pub settings: &'a EngineSettings,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        model: &'a mut dyn HostModel,
        session: &'a mut SessionStore,
        reports: &'a ReportBus,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            model,
            session,
            reports,
            settings,
        }
    }

    pub fn mapper(&self) -> ParameterMapper {
        ParameterMapper::new(self.settings.units.default_unit)
    }

    pub fn agent(
        &self,
        operation: &str,
        target: Option<&str>,
        assign: Option<&str>,
        message: &str,
    ) {
        self.reports
            .agent(format_agent_report(operation, target, assign, message));
    }

    pub fn resolve_target(&self, raw: Option<&str>) -> Result<ResultSet, SessionError> {
        self.session.resolve_target(raw, &*self.model)
    }

    /// Materializes `cursor`, stores both the cursor and its result set
    /// under `key`, and returns the element count.
    pub fn register_query(&mut self, key: &SessionKey, cursor: QueryCursor) -> usize {
        let set = cursor.materialize(&*self.model);
        let count = set.len();
        self.session.store(key.clone(), set);
        self.session.store_cursor(key.clone(), cursor);
        count
    }
}

pub(crate) const KEY_PARAM: ParamDescriptor = ParamDescriptor {
    key: "key",
    aliases: &["search_ai_name", "assign", "assign_ai_name"],
    kind: ParamKind::Text,
    required: false,
    description: "Session key to store the result under (e.g. $q1). Generated when omitted.",
};

pub(crate) const TARGET_PARAM: ParamDescriptor = ParamDescriptor {
    key: "target",
    aliases: &["target_ai_name"],
    kind: ParamKind::Text,
    required: false,
    description: "Session key ($q1, $f1) or element id. Current selection when omitted.",
};

pub(crate) const ASSIGN_PARAM: ParamDescriptor = ParamDescriptor {
    key: "assign",
    aliases: &["assign_ai_name"],
    kind: ParamKind::Text,
    required: false,
    description: "Session key to register affected elements under (e.g. $f1).",
};

pub(crate) fn transaction_name(operation: &str) -> String {
    format!("AI: {operation}")
}
