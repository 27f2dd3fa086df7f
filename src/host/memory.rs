use super::{ElementRecord, EntityHandle, HostError, HostModel, PropertyValue, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Categories a host understands even when no entity uses them yet.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "OST_Walls",
    "OST_Floors",
    "OST_Roofs",
    "OST_Ceilings",
    "OST_Doors",
    "OST_Windows",
    "OST_Columns",
    "OST_StructuralColumns",
    "OST_StructuralFraming",
    "OST_Stairs",
    "OST_Railings",
    "OST_Furniture",
    "OST_GenericModel",
    "OST_Rooms",
    "OST_Levels",
    "OST_Grids",
];

/// On-disk shape of an in-memory model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelFile {
    pub document_name: String,
    /// Handles visible in the active view. Empty means every element.
    pub active_view: Vec<EntityHandle>,
    pub selection: Vec<EntityHandle>,
    pub elements: Vec<ElementRecord>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    name: String,
    elements: BTreeMap<EntityHandle, ElementRecord>,
    selection: Vec<EntityHandle>,
}

/// Reference host backed by plain records. Mutations are only accepted
/// inside a transaction; rollback restores the snapshot taken at `begin`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModel {
    document_name: String,
    elements: BTreeMap<EntityHandle, ElementRecord>,
    active_view: Option<BTreeSet<EntityHandle>>,
    selection: Vec<EntityHandle>,
    open: Option<Snapshot>,
    transactions_started: usize,
    committed: Vec<String>,
    fail_next_commit: Option<String>,
}

impl InMemoryModel {
    pub fn new(document_name: &str) -> Self {
        Self {
            document_name: document_name.to_string(),
            ..Self::default()
        }
    }

    pub fn from_file(file: ModelFile) -> Self {
        let mut model = Self::new(&file.document_name);
        for element in file.elements {
            model.elements.insert(element.handle, element);
        }
        if !file.active_view.is_empty() {
            model.active_view = Some(file.active_view.into_iter().collect());
        }
        model.selection = file.selection;
        model
    }

    pub fn from_path(path: &Path) -> Result<Self, HostError> {
        let raw = fs::read_to_string(path).map_err(|source| HostError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: ModelFile = serde_yaml::from_str(&raw).map_err(|source| HostError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_file(file))
    }

    pub fn with_element(mut self, element: ElementRecord) -> Self {
        self.elements.insert(element.handle, element);
        self
    }

    pub fn with_active_view(mut self, handles: &[i64]) -> Self {
        self.active_view = Some(handles.iter().copied().map(EntityHandle::new).collect());
        self
    }

    pub fn with_selection(mut self, handles: &[i64]) -> Self {
        self.selection = handles.iter().copied().map(EntityHandle::new).collect();
        self
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions_started
    }

    /// Names of committed transactions, oldest first.
    pub fn committed_transactions(&self) -> &[String] {
        &self.committed
    }

    pub fn fail_next_commit(&mut self, reason: &str) {
        self.fail_next_commit = Some(reason.to_string());
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn require_transaction(&self) -> Result<(), HostError> {
        if self.open.is_none() {
            return Err(HostError::TransactionRequired);
        }
        Ok(())
    }

    fn element_mut(&mut self, handle: EntityHandle) -> Result<&mut ElementRecord, HostError> {
        self.elements
            .get_mut(&handle)
            .ok_or(HostError::UnknownEntity(handle))
    }
}

impl HostModel for InMemoryModel {
    fn document_name(&self) -> &str {
        &self.document_name
    }

    fn element_handles(&self) -> Vec<EntityHandle> {
        self.elements.keys().copied().collect()
    }

    fn active_view_handles(&self) -> Vec<EntityHandle> {
        match &self.active_view {
            Some(visible) => self
                .elements
                .keys()
                .filter(|handle| visible.contains(handle))
                .copied()
                .collect(),
            None => self.element_handles(),
        }
    }

    fn element(&self, handle: EntityHandle) -> Option<ElementRecord> {
        self.elements.get(&handle).cloned()
    }

    fn categories(&self) -> Vec<String> {
        let mut names = KNOWN_CATEGORIES
            .iter()
            .map(|name| name.to_string())
            .collect::<BTreeSet<_>>();
        names.extend(self.elements.values().map(|record| record.category.clone()));
        names.into_iter().collect()
    }

    fn current_selection(&self) -> Vec<EntityHandle> {
        self.selection
            .iter()
            .filter(|handle| self.elements.contains_key(handle))
            .copied()
            .collect()
    }

    fn set_selection(&mut self, handles: &[EntityHandle]) {
        self.selection = handles.to_vec();
    }

    fn translate(&mut self, handle: EntityHandle, offset: Vector3) -> Result<(), HostError> {
        self.require_transaction()?;
        let record = self.element_mut(handle)?;
        record.location = record.location.offset(offset);
        Ok(())
    }

    fn set_property(
        &mut self,
        handle: EntityHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), HostError> {
        self.require_transaction()?;
        let record = self.element_mut(handle)?;
        let existing = record
            .properties
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned();
        match existing {
            Some(key) => {
                record.properties.insert(key, value);
                Ok(())
            }
            None => Err(HostError::ReadOnlyProperty {
                handle,
                name: name.to_string(),
            }),
        }
    }

    fn delete(&mut self, handle: EntityHandle) -> Result<(), HostError> {
        self.require_transaction()?;
        self.elements
            .remove(&handle)
            .map(|_| ())
            .ok_or(HostError::UnknownEntity(handle))?;
        self.selection.retain(|selected| *selected != handle);
        Ok(())
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError> {
        if let Some(open) = &self.open {
            return Err(HostError::TransactionAlreadyOpen {
                open: open.name.clone(),
                requested: name.to_string(),
            });
        }
        self.open = Some(Snapshot {
            name: name.to_string(),
            elements: self.elements.clone(),
            selection: self.selection.clone(),
        });
        self.transactions_started += 1;
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), HostError> {
        let Some(open) = &self.open else {
            return Err(HostError::NoOpenTransaction);
        };
        if let Some(reason) = self.fail_next_commit.take() {
            return Err(HostError::CommitFailed {
                name: open.name.clone(),
                reason,
            });
        }
        if let Some(snapshot) = self.open.take() {
            self.committed.push(snapshot.name);
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) {
        if let Some(snapshot) = self.open.take() {
            self.elements = snapshot.elements;
            self.selection = snapshot.selection;
        }
    }
}
