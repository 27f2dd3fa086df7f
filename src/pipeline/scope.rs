use super::{PipelineError, QueryCursor, SearchFilter, SCOPE_PRIORITY};
use crate::config::DefaultScope;
use crate::host::HostModel;

#[derive(Debug, Default)]
pub struct WholeModelInitializer;

impl SearchFilter for WholeModelInitializer {
    fn name(&self) -> &'static str {
        "scope_project"
    }

    fn priority(&self) -> i32 {
        SCOPE_PRIORITY
    }

    fn apply(
        &self,
        _model: &dyn HostModel,
        _cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        Ok(QueryCursor::whole_model())
    }
}

#[derive(Debug, Default)]
pub struct ActiveViewInitializer;

impl SearchFilter for ActiveViewInitializer {
    fn name(&self) -> &'static str {
        "active_view"
    }

    fn priority(&self) -> i32 {
        SCOPE_PRIORITY
    }

    fn apply(
        &self,
        _model: &dyn HostModel,
        _cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        Ok(QueryCursor::active_view())
    }
}

/// Re-enters a cursor stored by an earlier step.
#[derive(Debug)]
pub struct SeedInitializer {
    cursor: QueryCursor,
}

impl SeedInitializer {
    pub fn new(cursor: QueryCursor) -> Self {
        Self { cursor }
    }
}

impl SearchFilter for SeedInitializer {
    fn name(&self) -> &'static str {
        "stored_scope"
    }

    fn priority(&self) -> i32 {
        SCOPE_PRIORITY
    }

    fn apply(
        &self,
        _model: &dyn HostModel,
        _cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        Ok(self.cursor.clone())
    }
}

pub fn default_initializer(scope: DefaultScope) -> Box<dyn SearchFilter> {
    match scope {
        DefaultScope::WholeModel => Box::new(WholeModelInitializer),
        DefaultScope::ActiveView => Box::new(ActiveViewInitializer),
    }
}
