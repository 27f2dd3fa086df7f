//! Priority-ordered search filters.
//!
//! A chain always starts with a scope initializer (priority 0), which
//! replaces the cursor outright. Narrowing filters follow in ascending
//! priority: structural, spatial, then parameter rules.

pub mod catalog;
pub mod cursor;
pub mod rules;
pub mod scope;
pub mod spatial;
pub mod structural;

pub use catalog::{build_chain, FilterDescriptor, FilterRegistry, FILTERS};
pub use cursor::{Predicate, QueryCursor, Scope};
pub use rules::{ParameterFilter, ParameterRule, RuleOperator};
pub use scope::{default_initializer, ActiveViewInitializer, SeedInitializer, WholeModelInitializer};
pub use spatial::{levels, resolve_level, LevelFilter};
pub use structural::{resolve_category, CategoryFilter, ClassFilter};

use crate::config::DefaultScope;
use crate::host::HostModel;
use crate::reports::ReportBus;

pub const SCOPE_PRIORITY: i32 = 0;
pub const CLASS_PRIORITY: i32 = 10;
pub const CATEGORY_PRIORITY: i32 = 11;
pub const LEVEL_PRIORITY: i32 = 50;
pub const RULE_PRIORITY: i32 = 100;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineError {
    #[error("filter `{0}` ran before any scope was set")]
    MissingScope(&'static str),
    #[error("category `{0}` does not match any category in the model")]
    UnknownCategory(String),
    #[error("level `{0}` does not match any level in the model")]
    UnknownLevel(String),
    #[error("unknown filter kind `{0}`")]
    UnknownFilterKind(String),
    #[error("filter `{kind}` is missing `{param}`")]
    MissingFilterParam { kind: &'static str, param: &'static str },
    #[error("invalid filter instruction: {0}")]
    InvalidInstruction(String),
    #[error("invalid parameter rule: {0}")]
    InvalidRule(String),
}

pub trait SearchFilter: Send + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32;

    fn is_initializer(&self) -> bool {
        self.priority() == SCOPE_PRIORITY
    }

    fn apply(
        &self,
        model: &dyn HostModel,
        cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError>;
}

pub(crate) fn require_cursor(
    filter: &dyn SearchFilter,
    cursor: Option<QueryCursor>,
) -> Result<QueryCursor, PipelineError> {
    cursor.ok_or(PipelineError::MissingScope(filter.name()))
}

pub fn default_scope_warning(scope: DefaultScope) -> String {
    let label = match scope {
        DefaultScope::WholeModel => "whole model",
        DefaultScope::ActiveView => "active view",
    };
    format!("No search scope provided. Defaulted to {label}.")
}

#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn SearchFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn SearchFilter>>) -> Self {
        let mut chain = Self { filters };
        chain.sort();
        chain
    }

    fn sort(&mut self) {
        self.filters.sort_by_key(|filter| filter.priority());
    }

    pub fn push(&mut self, filter: Box<dyn SearchFilter>) {
        self.filters.push(filter);
        self.sort();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    pub fn has_initializer(&self) -> bool {
        self.filters.iter().any(|filter| filter.is_initializer())
    }

    /// Puts the default initializer in front when the chain has none.
    /// Returns the warning to surface, if one was inserted.
    pub fn ensure_scope(&mut self, scope: DefaultScope) -> Option<String> {
        if self.has_initializer() {
            return None;
        }
        self.filters.insert(0, default_initializer(scope));
        Some(default_scope_warning(scope))
    }

    /// Applies every filter in order. Emits exactly one warning when the
    /// default scope had to be inserted.
    pub fn run(
        mut self,
        model: &dyn HostModel,
        default_scope: DefaultScope,
        reports: &ReportBus,
    ) -> Result<QueryCursor, PipelineError> {
        if let Some(warning) = self.ensure_scope(default_scope) {
            reports.warning(warning);
        }
        let mut cursor = None;
        for filter in &self.filters {
            cursor = Some(filter.apply(model, cursor)?);
        }
        cursor.ok_or(PipelineError::MissingScope("chain"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ElementRecord, InMemoryModel};
    use crate::reports::Audience;

    fn model() -> InMemoryModel {
        let mut model = InMemoryModel::new("doc");
        for handle in 1..=4 {
            model = model.with_element(ElementRecord::new(handle, "OST_Walls", "Wall"));
        }
        for handle in 5..=10 {
            model = model.with_element(ElementRecord::new(handle, "OST_Doors", "FamilyInstance"));
        }
        model.with_active_view(&[1, 2, 5])
    }

    #[test]
    fn filters_run_in_priority_order() {
        let chain = FilterChain::new(vec![
            Box::new(CategoryFilter::new("Walls")),
            Box::new(ClassFilter::new("Wall")),
            Box::new(WholeModelInitializer),
        ]);
        assert_eq!(chain.names(), vec!["scope_project", "class", "category"]);
    }

    #[test]
    fn default_scope_matches_explicit_whole_model() {
        let model = model();
        let implicit_reports = ReportBus::default();
        let implicit = FilterChain::new(vec![Box::new(CategoryFilter::new("wall"))])
            .run(&model, DefaultScope::WholeModel, &implicit_reports)
            .expect("implicit");

        let explicit_reports = ReportBus::default();
        let explicit = FilterChain::new(vec![
            Box::new(WholeModelInitializer),
            Box::new(CategoryFilter::new("wall")),
        ])
        .run(&model, DefaultScope::WholeModel, &explicit_reports)
        .expect("explicit");

        assert_eq!(implicit.materialize(&model), explicit.materialize(&model));
        assert_eq!(implicit.materialize(&model).len(), 4);

        let warnings = implicit_reports
            .drain()
            .into_iter()
            .filter(|report| report.audience == Audience::Warning)
            .collect::<Vec<_>>();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("Defaulted to whole model"));
        assert!(explicit_reports.is_empty());
    }

    #[test]
    fn active_view_scope_limits_candidates() {
        let model = model();
        let cursor = FilterChain::new(vec![Box::new(CategoryFilter::new("OST_Walls"))])
            .run(&model, DefaultScope::ActiveView, &ReportBus::default())
            .expect("run");
        assert_eq!(cursor.materialize(&model).len(), 2);
    }

    #[test]
    fn unknown_category_fails_the_chain() {
        let err = FilterChain::new(vec![Box::new(CategoryFilter::new("Bridges"))])
            .run(&model(), DefaultScope::WholeModel, &ReportBus::default())
            .expect_err("unknown category");
        assert_eq!(err, PipelineError::UnknownCategory("Bridges".to_string()));
    }
}
