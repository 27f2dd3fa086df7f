//! Per-turn symbol table.
//!
//! Lives on the host worker only. Keys map to materialized result sets and,
//! separately, to cursors that later query steps can keep narrowing.

pub mod target;

pub use target::TargetRef;

use crate::config::SessionSettings;
use crate::host::HostModel;
use crate::pipeline::QueryCursor;
use crate::shared::ids::{
    generate_session_key, EntityHandle, SessionKey, GENERATED_KEY_MAX_ATTEMPTS,
};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no result set is stored under `{0}`")]
    UnknownKey(String),
    #[error("entity {0} does not exist in the model")]
    UnknownEntity(EntityHandle),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("could not generate a free session key: {0}")]
    KeyGeneration(String),
}

/// Ordered collection of unique entity handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    handles: Vec<EntityHandle>,
}

impl ResultSet {
    pub fn new(handles: impl IntoIterator<Item = EntityHandle>) -> Self {
        let mut seen = HashSet::new();
        Self {
            handles: handles
                .into_iter()
                .filter(|handle| seen.insert(*handle))
                .collect(),
        }
    }

    pub fn handles(&self) -> &[EntityHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn except(&self, other: &ResultSet) -> ResultSet {
        let excluded = other.handles.iter().collect::<HashSet<_>>();
        ResultSet {
            handles: self
                .handles
                .iter()
                .filter(|handle| !excluded.contains(handle))
                .copied()
                .collect(),
        }
    }
}

impl FromIterator<EntityHandle> for ResultSet {
    fn from_iter<T: IntoIterator<Item = EntityHandle>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Which family of prefix a generated key uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Found,
    Created,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    found_prefix: String,
    created_prefix: String,
    results: BTreeMap<SessionKey, ResultSet>,
    cursors: BTreeMap<SessionKey, QueryCursor>,
    current: Option<SessionKey>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(&SessionSettings::default())
    }
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            found_prefix: settings.found_prefix.clone(),
            created_prefix: settings.created_prefix.clone(),
            results: BTreeMap::new(),
            cursors: BTreeMap::new(),
            current: None,
        }
    }

    pub fn found_prefix(&self) -> &str {
        &self.found_prefix
    }

    pub fn created_prefix(&self) -> &str {
        &self.created_prefix
    }

    /// Stores `set` under `key`, replacing any earlier set with that key.
    /// A cursor left under the key no longer describes it and is dropped.
    pub fn store(&mut self, key: SessionKey, set: ResultSet) {
        if self.cursors.remove(&key).is_some() && self.current.as_ref() == Some(&key) {
            self.current = None;
        }
        self.results.insert(key, set);
    }

    pub fn lookup(&self, key: &str) -> Option<&ResultSet> {
        self.results.get(key.trim())
    }

    /// Stores `cursor` under `key` and makes it the current scope.
    pub fn store_cursor(&mut self, key: SessionKey, cursor: QueryCursor) {
        self.current = Some(key.clone());
        self.cursors.insert(key, cursor);
    }

    /// Most recently stored cursor. Queries without a source narrow it.
    pub fn current_cursor(&self) -> Option<&QueryCursor> {
        self.current.as_ref().and_then(|key| self.cursors.get(key))
    }

    pub fn lookup_cursor(&self, key: &str) -> Option<&QueryCursor> {
        self.cursors.get(key.trim())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.results.contains_key(key.trim()) || self.cursors.contains_key(key.trim())
    }

    pub fn reset(&mut self) {
        self.results.clear();
        self.cursors.clear();
        self.current = None;
    }

    /// Key to element count for every stored result set.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        self.results
            .iter()
            .map(|(key, set)| (key.to_string(), set.len()))
            .collect()
    }

    /// A fresh `<prefix>_xxxx` key not yet used in this session.
    pub fn generate_key(&self, kind: KeyKind) -> Result<SessionKey, SessionError> {
        let prefix = match kind {
            KeyKind::Found => &self.found_prefix,
            KeyKind::Created => &self.created_prefix,
        };
        for _ in 0..GENERATED_KEY_MAX_ATTEMPTS {
            let key = generate_session_key(prefix).map_err(SessionError::KeyGeneration)?;
            if !self.contains(key.as_str()) {
                return Ok(key);
            }
        }
        Err(SessionError::KeyGeneration(format!(
            "{GENERATED_KEY_MAX_ATTEMPTS} attempts with prefix `{prefix}` all collided"
        )))
    }

    /// Parses `raw` or generates a key of the given kind when it is absent.
    pub fn key_or_generate(
        &self,
        raw: Option<&str>,
        kind: KeyKind,
    ) -> Result<SessionKey, SessionError> {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => SessionKey::parse(raw).map_err(SessionError::InvalidTarget),
            None => self.generate_key(kind),
        }
    }

    pub fn classify_target(&self, raw: Option<&str>) -> Result<TargetRef, SessionError> {
        TargetRef::classify(
            raw,
            &[self.found_prefix.as_str(), self.created_prefix.as_str()],
        )
            .map_err(SessionError::InvalidTarget)
    }

    pub fn resolve(
        &self,
        target: &TargetRef,
        model: &dyn HostModel,
    ) -> Result<ResultSet, SessionError> {
        match target {
            TargetRef::Key(key) => self
                .lookup(key.as_str())
                .cloned()
                .ok_or_else(|| SessionError::UnknownKey(key.to_string())),
            TargetRef::Handle(handle) => match model.element(*handle) {
                Some(_) => Ok(ResultSet::new([*handle])),
                None => Err(SessionError::UnknownEntity(*handle)),
            },
            TargetRef::Selection => Ok(ResultSet::new(model.current_selection())),
        }
    }

    /// Classifies and resolves raw target text in one step.
    pub fn resolve_target(
        &self,
        raw: Option<&str>,
        model: &dyn HostModel,
    ) -> Result<ResultSet, SessionError> {
        let target = self.classify_target(raw)?;
        self.resolve(&target, model)
    }
}
