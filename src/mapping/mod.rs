//! Binds loosely typed plan payloads to declared parameters.

pub mod field_value;

pub use field_value::{coerce, parse_flag, Coerced, FieldValue};

use crate::registry::{OperationDescriptor, ParamDescriptor};
use crate::units::{Length, LengthUnit};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field name that carries the primary parameter when it is not named.
pub const PRIMARY_VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field `{}`: {}", self.field, self.message)
    }
}

/// Typed parameter values of one plan step, plus whatever went wrong
/// while binding them.
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    values: BTreeMap<&'static str, FieldValue>,
    issues: Vec<MappingIssue>,
}

impl BoundParams {
    pub fn insert(&mut self, key: &'static str, value: FieldValue) {
        self.values.insert(key, value);
    }

    pub fn with(mut self, key: &'static str, value: FieldValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(FieldValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn owned_text(&self, key: &str) -> Option<String> {
        self.text(key).map(str::to_string)
    }

    pub fn length(&self, key: &str) -> Option<Length> {
        match self.values.get(key) {
            Some(FieldValue::Length(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(FieldValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn choice(&self, key: &str) -> Option<&'static str> {
        match self.values.get(key) {
            Some(FieldValue::Choice(value)) => Some(value),
            _ => None,
        }
    }

    pub fn structure(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            Some(FieldValue::Structure(value)) => Some(value),
            _ => None,
        }
    }

    pub fn issues(&self) -> &[MappingIssue] {
        &self.issues
    }

    fn issue(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(MappingIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

fn find_field<'p>(object: &'p Map<String, Value>, name: &str) -> Option<(&'p str, &'p Value)> {
    object
        .iter()
        .find(|(field, _)| field.eq_ignore_ascii_case(name))
        .map(|(field, value)| (field.as_str(), value))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterMapper {
    default_unit: LengthUnit,
}

impl ParameterMapper {
    pub fn new(default_unit: LengthUnit) -> Self {
        Self { default_unit }
    }

    pub fn default_unit(&self) -> LengthUnit {
        self.default_unit
    }

    pub fn map_operation(&self, descriptor: &OperationDescriptor, payload: &Value) -> BoundParams {
        self.map(descriptor.params, payload)
    }

    pub fn map(&self, params: &'static [ParamDescriptor], payload: &Value) -> BoundParams {
        let mut bound = BoundParams::default();
        match payload {
            Value::Null => {}
            Value::Object(object) => self.map_object(params, object, &mut bound),
            scalar => match params.first() {
                Some(primary) => self.bind(primary, primary.key, scalar, &mut bound),
                None => bound.issue(
                    PRIMARY_VALUE_FIELD,
                    "operation takes no parameters; value ignored",
                ),
            },
        }
        bound
    }

    fn map_object(
        &self,
        params: &'static [ParamDescriptor],
        object: &Map<String, Value>,
        bound: &mut BoundParams,
    ) {
        let mut consumed = Vec::new();
        for param in params {
            let found = std::iter::once(param.key)
                .chain(param.aliases.iter().copied())
                .find_map(|name| find_field(object, name));
            if let Some((field, value)) = found {
                consumed.push(field);
                self.bind(param, field, value, bound);
            }
        }

        if let Some(primary) = params.first() {
            let primary_is_declared = params
                .iter()
                .any(|param| param.accepts(PRIMARY_VALUE_FIELD));
            if !primary_is_declared && !bound.contains(primary.key) {
                if let Some((field, value)) = find_field(object, PRIMARY_VALUE_FIELD) {
                    consumed.push(field);
                    self.bind(primary, field, value, bound);
                }
            }
        }

        for field in object.keys() {
            if !consumed.contains(&field.as_str()) {
                bound.issue(field, "unknown field ignored");
            }
        }
    }

    fn bind(&self, param: &ParamDescriptor, field: &str, value: &Value, bound: &mut BoundParams) {
        match coerce(param.kind, value, self.default_unit) {
            Coerced::Value(value) => bound.insert(param.key, value),
            Coerced::WithNote(value, note) => {
                bound.insert(param.key, value);
                bound.issue(field, note);
            }
            Coerced::Absent => {}
            Coerced::Rejected(message) => bound.issue(field, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamKind;
    use serde_json::json;

    const MOVE_PARAMS: &[ParamDescriptor] = &[
        ParamDescriptor {
            key: "dx",
            aliases: &[],
            kind: ParamKind::Length,
            required: false,
            description: "",
        },
        ParamDescriptor {
            key: "target",
            aliases: &["target_ai_name"],
            kind: ParamKind::Text,
            required: false,
            description: "",
        },
        ParamDescriptor {
            key: "copy",
            aliases: &[],
            kind: ParamKind::Boolean,
            required: false,
            description: "",
        },
    ];

    #[test]
    fn fields_bind_case_insensitively_and_through_aliases() {
        let mapper = ParameterMapper::default();
        let bound = mapper.map(
            MOVE_PARAMS,
            &json!({"DX": "2ft", "Target_AI_Name": "$q1", "copy": "no"}),
        );
        assert!((bound.length("dx").expect("dx").feet() - 2.0).abs() < 1e-9);
        assert_eq!(bound.text("target"), Some("$q1"));
        assert_eq!(bound.flag("copy"), Some(false));
        assert!(bound.issues().is_empty());
    }

    #[test]
    fn scalar_payload_binds_to_primary_parameter() {
        let mapper = ParameterMapper::default();
        let bound = mapper.map(MOVE_PARAMS, &json!("500mm"));
        assert!((bound.length("dx").expect("dx").millimeters() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn value_field_binds_to_primary_when_absent() {
        let mapper = ParameterMapper::default();
        let bound = mapper.map(MOVE_PARAMS, &json!({"value": 100, "target": "$q2"}));
        assert!((bound.length("dx").expect("dx").millimeters() - 100.0).abs() < 1e-9);

        let bound = mapper.map(MOVE_PARAMS, &json!({"dx": 1, "value": 100}));
        assert!((bound.length("dx").expect("dx").millimeters() - 1.0).abs() < 1e-9);
        assert_eq!(bound.issues().len(), 1);
        assert_eq!(bound.issues()[0].field, "value");
    }

    #[test]
    fn bad_fields_become_issues_without_aborting_others() {
        let mapper = ParameterMapper::default();
        let bound = mapper.map(
            MOVE_PARAMS,
            &json!({"dx": "far", "target": "$q1", "copy": "perhaps", "colour": "red"}),
        );
        assert_eq!(bound.text("target"), Some("$q1"));
        assert!(bound.length("dx").is_none());
        let fields = bound
            .issues()
            .iter()
            .map(|issue| issue.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["dx", "copy", "colour"]);
    }
}
