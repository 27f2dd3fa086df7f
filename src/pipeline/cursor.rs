use super::rules::ParameterRule;
use crate::host::{ElementRecord, EntityHandle, HostModel};
use crate::session::ResultSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    WholeModel,
    ActiveView,
    /// An earlier result set, re-entered as a search scope.
    Handles(Vec<EntityHandle>),
}

impl Scope {
    pub fn describe(&self) -> String {
        match self {
            Self::WholeModel => "whole model".to_string(),
            Self::ActiveView => "active view".to_string(),
            Self::Handles(handles) => format!("{} stored elements", handles.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Class(String),
    Category(String),
    Level(EntityHandle),
    Rule(ParameterRule),
}

impl Predicate {
    pub fn matches(&self, model: &dyn HostModel, record: &ElementRecord) -> bool {
        match self {
            Self::Class(name) => record.class_name.eq_ignore_ascii_case(name),
            Self::Category(name) => record.category.eq_ignore_ascii_case(name),
            Self::Level(level) => record.level == Some(*level),
            Self::Rule(rule) => rule.matches(model, record),
        }
    }
}

/// A scope plus pending predicates. Nothing touches the model until
/// [`QueryCursor::materialize`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCursor {
    scope: Scope,
    predicates: Vec<Predicate>,
}

impl QueryCursor {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            predicates: Vec::new(),
        }
    }

    pub fn whole_model() -> Self {
        Self::new(Scope::WholeModel)
    }

    pub fn active_view() -> Self {
        Self::new(Scope::ActiveView)
    }

    pub fn from_result_set(set: &ResultSet) -> Self {
        Self::new(Scope::Handles(set.handles().to_vec()))
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn narrow(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn materialize(&self, model: &dyn HostModel) -> ResultSet {
        let candidates = match &self.scope {
            Scope::WholeModel => model.element_handles(),
            Scope::ActiveView => model.active_view_handles(),
            Scope::Handles(handles) => handles.clone(),
        };
        candidates
            .into_iter()
            .filter_map(|handle| model.element(handle))
            .filter(|record| {
                self.predicates
                    .iter()
                    .all(|predicate| predicate.matches(model, record))
            })
            .map(|record| record.handle)
            .collect()
    }
}
