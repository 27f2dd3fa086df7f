//! Name to operation type lookup.
//!
//! Every operation type is listed once in a static catalog. The registry
//! indexes each entry under its declared name and under keys derived from
//! its type name, all normalized, so `CreateFloor`, `create-floor` and
//! `CREATE_FLOOR` land on the same descriptor.

pub mod descriptor;

pub use descriptor::{
    OperationDescriptor, OperationFactory, OperationKind, ParamDescriptor, ParamKind,
};

use crate::operations::catalog::OPERATIONS;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

const STRUCTURAL_SUFFIXES: &[&str] = &["Action", "Query", "Filter", "Initializer"];

/// Lower-cases and drops `_`, `-`, `.` and whitespace.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !matches!(ch, '_' | '-' | '.') && !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn structural_keys(type_name: &str) -> Vec<String> {
    let mut keys = vec![normalize_name(type_name)];
    for suffix in STRUCTURAL_SUFFIXES {
        if let Some(stem) = type_name.strip_suffix(suffix) {
            if !stem.is_empty() {
                keys.push(normalize_name(stem));
            }
        }
    }
    keys
}

/// Normalized-name index over a list of `(declared name, type name)` pairs.
/// Declared names always win over structural keys.
#[derive(Debug, Default)]
pub struct NameIndex {
    declared: HashMap<String, usize>,
    structural: HashMap<String, usize>,
    diagnostics: Vec<String>,
}

impl NameIndex {
    pub fn build<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut index = Self::default();
        let mut names = Vec::new();
        for (position, (declared, type_name)) in entries.into_iter().enumerate() {
            names.push(declared);
            let key = normalize_name(declared);
            if key.is_empty() {
                index
                    .diagnostics
                    .push(format!("type `{type_name}` declares an empty name"));
                continue;
            }
            match index.declared.get(&key) {
                Some(existing) => index.diagnostics.push(format!(
                    "name `{declared}` of `{type_name}` collides with `{}`; keeping the first",
                    names[*existing]
                )),
                None => {
                    index.declared.insert(key, position);
                }
            }
            for key in structural_keys(type_name) {
                index.structural.entry(key).or_insert(position);
            }
        }
        index
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        let key = normalize_name(name);
        self.declared
            .get(&key)
            .or_else(|| self.structural.get(&key))
            .copied()
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

pub struct TypeRegistry {
    descriptors: &'static [OperationDescriptor],
    index: NameIndex,
}

impl TypeRegistry {
    pub fn from_catalog(descriptors: &'static [OperationDescriptor]) -> Self {
        let index = NameIndex::build(
            descriptors
                .iter()
                .map(|descriptor| (descriptor.name, descriptor.type_name)),
        );
        Self { descriptors, index }
    }

    /// Registry over the built-in catalog, built on first use.
    pub fn global() -> &'static TypeRegistry {
        static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| TypeRegistry::from_catalog(OPERATIONS))
    }

    pub fn resolve(&self, name: &str) -> Option<&'static OperationDescriptor> {
        let descriptors = self.descriptors;
        self.index
            .lookup(name)
            .and_then(|position| descriptors.get(position))
    }

    pub fn descriptors(&self) -> &'static [OperationDescriptor] {
        self.descriptors
    }

    pub fn diagnostics(&self) -> &[String] {
        self.index.diagnostics()
    }

    /// Operation schemas for the prompting layer.
    pub fn catalog(&self) -> Value {
        Value::Array(
            self.descriptors
                .iter()
                .map(OperationDescriptor::schema)
                .collect(),
        )
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("operations", &self.descriptors.len())
            .field("diagnostics", &self.index.diagnostics())
            .finish()
    }
}

pub fn register_all() -> &'static TypeRegistry {
    TypeRegistry::global()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_and_separators() {
        assert_eq!(normalize_name("Create_Floor"), "createfloor");
        assert_eq!(normalize_name(" create-floor "), "createfloor");
        assert_eq!(normalize_name("by.category"), "bycategory");
    }

    #[test]
    fn structural_keys_strip_known_suffixes() {
        let index = NameIndex::build([
            ("move_element", "MoveElementAction"),
            ("scope_project", "ProjectFilterInitializer"),
        ]);
        assert_eq!(index.lookup("MoveElementAction"), Some(0));
        assert_eq!(index.lookup("moveelement"), Some(0));
        assert_eq!(index.lookup("ProjectFilter"), Some(1));
        assert_eq!(index.lookup("scope-project"), Some(1));
        assert_eq!(index.lookup("unknown"), None);
    }

    #[test]
    fn declared_collisions_keep_first_and_are_reported() {
        let index = NameIndex::build([("select", "SelectAction"), ("Select", "PickAction")]);
        assert_eq!(index.lookup("select"), Some(0));
        assert_eq!(index.diagnostics().len(), 1);
        assert!(index.diagnostics()[0].contains("PickAction"));
    }

    #[test]
    fn structural_keys_never_displace_declared_names() {
        let index = NameIndex::build([("mover", "CopyAction"), ("copy", "MoverAction")]);
        assert_eq!(index.lookup("mover"), Some(0));
        assert_eq!(index.lookup("copy"), Some(1));
        assert!(index.diagnostics().is_empty());
    }

    #[test]
    fn global_registry_resolves_builtin_operations() {
        let registry = TypeRegistry::global();
        assert!(registry.diagnostics().is_empty());
        let descriptor = registry.resolve("SearchElements").expect("search");
        assert_eq!(descriptor.name, "search_elements");
        assert_eq!(descriptor.kind, OperationKind::Query);
        let descriptor = registry.resolve("MoveElementAction").expect("move");
        assert_eq!(descriptor.name, "move_element");
        assert!(std::ptr::eq(
            registry.resolve("move_element").expect("again"),
            descriptor
        ));
    }

    #[test]
    fn catalog_lists_every_operation_with_params() {
        let catalog = TypeRegistry::global().catalog();
        let entries = catalog.as_array().expect("array");
        assert_eq!(entries.len(), OPERATIONS.len());
        let by_category = entries
            .iter()
            .find(|entry| entry["name"] == "by_category")
            .expect("by_category");
        assert_eq!(by_category["kind"], "query");
        assert!(by_category["params"]
            .as_array()
            .expect("params")
            .iter()
            .any(|param| param["name"] == "category"));
    }
}
