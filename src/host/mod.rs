//! Host model access.
//!
//! The engine never owns geometry. Everything it needs from the modeling
//! application goes through [`HostModel`], which is only ever touched from
//! the host execution context (see `execution::bridge`).

pub mod memory;
pub mod transaction;

pub use crate::shared::ids::EntityHandle;
pub use memory::{InMemoryModel, ModelFile, KNOWN_CATEGORIES};
pub use transaction::Transaction;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("entity {0} does not exist in the model")]
    UnknownEntity(EntityHandle),
    #[error("entity {handle} has no writable property `{name}`")]
    ReadOnlyProperty { handle: EntityHandle, name: String },
    #[error("a transaction is already open (`{open}`), cannot start `{requested}`")]
    TransactionAlreadyOpen { open: String, requested: String },
    #[error("no transaction is open")]
    NoOpenTransaction,
    #[error("model changes require an open transaction")]
    TransactionRequired,
    #[error("transaction `{name}` failed to commit: {reason}")]
    CommitFailed { name: String, reason: String },
    #[error("failed to read model file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Value of an entity property, stored in internal units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Flag(bool),
    Integer(i64),
    /// Length in feet.
    Length(f64),
    Text(String),
}

impl PropertyValue {
    pub fn display(&self) -> String {
        match self {
            Self::Flag(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Length(value) => format!("{value}"),
            Self::Text(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, by: Vector3) -> Self {
        Self::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }
}

/// Snapshot of one entity as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub handle: EntityHandle,
    #[serde(default)]
    pub name: String,
    pub category: String,
    pub class_name: String,
    #[serde(default)]
    pub level: Option<EntityHandle>,
    #[serde(default)]
    pub type_handle: Option<EntityHandle>,
    #[serde(default)]
    pub location: Vector3,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ElementRecord {
    pub fn new(handle: i64, category: &str, class_name: &str) -> Self {
        Self {
            handle: EntityHandle::new(handle),
            name: String::new(),
            category: category.to_string(),
            class_name: class_name.to_string(),
            level: None,
            type_handle: None,
            location: Vector3::default(),
            properties: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn on_level(mut self, level: i64) -> Self {
        self.level = Some(EntityHandle::new(level));
        self
    }

    pub fn of_type(mut self, type_handle: i64) -> Self {
        self.type_handle = Some(EntityHandle::new(type_handle));
        self
    }

    pub fn at(mut self, location: Vector3) -> Self {
        self.location = location;
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

pub trait HostModel: Send {
    fn document_name(&self) -> &str;

    /// Every entity of the document, in stable handle order.
    fn element_handles(&self) -> Vec<EntityHandle>;

    /// Entities visible in the active view.
    fn active_view_handles(&self) -> Vec<EntityHandle>;

    fn element(&self, handle: EntityHandle) -> Option<ElementRecord>;

    /// Category names the host understands, whether or not any entity
    /// currently uses them.
    fn categories(&self) -> Vec<String>;

    fn current_selection(&self) -> Vec<EntityHandle>;

    fn set_selection(&mut self, handles: &[EntityHandle]);

    fn translate(&mut self, handle: EntityHandle, offset: Vector3) -> Result<(), HostError>;

    fn set_property(
        &mut self,
        handle: EntityHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), HostError>;

    fn delete(&mut self, handle: EntityHandle) -> Result<(), HostError>;

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError>;

    fn commit_transaction(&mut self) -> Result<(), HostError>;

    fn rollback_transaction(&mut self);
}
