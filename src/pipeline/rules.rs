use super::{require_cursor, PipelineError, Predicate, QueryCursor, SearchFilter, RULE_PRIORITY};
use crate::host::{ElementRecord, HostModel, PropertyValue};
use crate::mapping::parse_flag;
use crate::registry::normalize_name;
use crate::units::{parse_length, LengthUnit};
use serde_json::{Map, Value};

/// Doubles closer than this (in feet) compare equal.
pub const LENGTH_TOLERANCE: f64 = 0.001;

const FIELD_KEYS: &[&str] = &["field", "param", "p"];
const OPERATOR_KEYS: &[&str] = &["op", "operator", "o"];
const VALUE_KEYS: &[&str] = &["value", "val", "v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Contains,
    BeginsWith,
    EndsWith,
    Greater,
    Less,
}

impl RuleOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::Contains => "contains",
            Self::BeginsWith => "beginsWith",
            Self::EndsWith => "endsWith",
            Self::Greater => "greater",
            Self::Less => "less",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_name(raw).as_str() {
            "equals" | "equal" | "eq" | "=" | "==" | "is" => Some(Self::Equals),
            "notequals" | "notequal" | "ne" | "neq" | "!=" | "<>" | "isnot" => {
                Some(Self::NotEquals)
            }
            "contains" | "has" | "includes" => Some(Self::Contains),
            "beginswith" | "begins" | "startswith" | "starts" => Some(Self::BeginsWith),
            "endswith" | "ends" => Some(Self::EndsWith),
            "greater" | "greaterthan" | "gt" | ">" => Some(Self::Greater),
            "less" | "lessthan" | "lt" | "<" => Some(Self::Less),
            _ => None,
        }
    }
}

/// One `(field, operator, value)` condition on entity properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRule {
    pub field: String,
    pub operator: RuleOperator,
    pub value: String,
    pub unit: LengthUnit,
}

fn pick<'v>(object: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|key| {
        object
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

impl ParameterRule {
    pub fn new(field: &str, operator: RuleOperator, value: &str, unit: LengthUnit) -> Self {
        Self {
            field: field.trim().to_string(),
            operator,
            value: value.trim().to_string(),
            unit,
        }
    }

    /// Builds a rule from loose parts; a missing operator means `equals`.
    pub fn from_parts(
        field: Option<&str>,
        operator: Option<&str>,
        value: Option<&str>,
        unit: LengthUnit,
    ) -> Result<Self, PipelineError> {
        let field = field
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .ok_or_else(|| PipelineError::InvalidRule("rule is missing `field`".to_string()))?;
        let operator = match operator.map(str::trim).filter(|op| !op.is_empty()) {
            Some(raw) => RuleOperator::parse(raw).ok_or_else(|| {
                PipelineError::InvalidRule(format!("unknown operator `{raw}` for `{field}`"))
            })?,
            None => RuleOperator::Equals,
        };
        let value = value
            .ok_or_else(|| PipelineError::InvalidRule(format!("rule on `{field}` has no value")))?;
        Ok(Self::new(field, operator, value, unit))
    }

    pub fn from_json(raw: &Value, unit: LengthUnit) -> Result<Self, PipelineError> {
        let Value::Object(object) = raw else {
            return Err(PipelineError::InvalidRule(format!(
                "rule must be an object, got `{raw}`"
            )));
        };
        let field = pick(object, FIELD_KEYS).and_then(scalar_text);
        let operator = pick(object, OPERATOR_KEYS).and_then(scalar_text);
        let value = pick(object, VALUE_KEYS).and_then(scalar_text);
        Self::from_parts(field.as_deref(), operator.as_deref(), value.as_deref(), unit)
    }

    /// Accepts a list of rule objects, a single rule object, or an object
    /// wrapping a `rules` list.
    pub fn parse_rules(raw: &Value, unit: LengthUnit) -> Result<Vec<Self>, PipelineError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .map(|item| Self::from_json(item, unit))
                .collect(),
            Value::Object(object) => match pick(object, &["rules"]) {
                Some(inner) => Self::parse_rules(inner, unit),
                None => Ok(vec![Self::from_json(raw, unit)?]),
            },
            other => Err(PipelineError::InvalidRule(format!(
                "rules must be a list of objects, got `{other}`"
            ))),
        }
    }

    pub fn matches(&self, model: &dyn HostModel, record: &ElementRecord) -> bool {
        match resolve_field(model, record, &self.field) {
            Some(actual) => self.compare(&actual),
            None => false,
        }
    }

    fn compare(&self, actual: &PropertyValue) -> bool {
        match actual {
            PropertyValue::Text(text) => compare_text(self.operator, text, &self.value),
            PropertyValue::Length(feet) => match parse_length(&self.value, self.unit) {
                Some(parsed) => compare_number(self.operator, *feet, parsed.length.feet()),
                None => false,
            },
            PropertyValue::Integer(value) => match parse_integer_operand(&self.value) {
                Some(expected) => compare_number(self.operator, *value as f64, expected),
                None => false,
            },
            PropertyValue::Flag(flag) => match parse_flag(&self.value) {
                Some(expected) => match self.operator {
                    RuleOperator::Equals => *flag == expected,
                    RuleOperator::NotEquals => *flag != expected,
                    _ => false,
                },
                None => false,
            },
        }
    }
}

fn parse_integer_operand(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<f64>() {
        return Some(value);
    }
    parse_flag(raw).map(|flag| if flag { 1.0 } else { 0.0 })
}

fn compare_text(operator: RuleOperator, actual: &str, expected: &str) -> bool {
    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    match operator {
        RuleOperator::Equals => actual == expected,
        RuleOperator::NotEquals => actual != expected,
        RuleOperator::Contains => actual.contains(&expected),
        RuleOperator::BeginsWith => actual.starts_with(&expected),
        RuleOperator::EndsWith => actual.ends_with(&expected),
        RuleOperator::Greater => actual > expected,
        RuleOperator::Less => actual < expected,
    }
}

fn compare_number(operator: RuleOperator, actual: f64, expected: f64) -> bool {
    let equal = (actual - expected).abs() < LENGTH_TOLERANCE;
    match operator {
        RuleOperator::Equals => equal,
        RuleOperator::NotEquals => !equal,
        RuleOperator::Greater => actual > expected && !equal,
        RuleOperator::Less => actual < expected && !equal,
        RuleOperator::Contains | RuleOperator::BeginsWith | RuleOperator::EndsWith => false,
    }
}

/// Looks a field up on the entity, then on its type, then by a
/// case-insensitive scan of both. `name`, `category` and `class` fall back
/// to the record's own attributes.
pub fn resolve_field(
    model: &dyn HostModel,
    record: &ElementRecord,
    field: &str,
) -> Option<PropertyValue> {
    if let Some(value) = record.properties.get(field) {
        return Some(value.clone());
    }
    let type_record = record.type_handle.and_then(|handle| model.element(handle));
    if let Some(value) = type_record
        .as_ref()
        .and_then(|type_record| type_record.properties.get(field))
    {
        return Some(value.clone());
    }
    let scan = |properties: &std::collections::BTreeMap<String, PropertyValue>| {
        properties
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.clone())
    };
    if let Some(value) = scan(&record.properties) {
        return Some(value);
    }
    if let Some(value) = type_record.as_ref().and_then(|t| scan(&t.properties)) {
        return Some(value);
    }
    match normalize_name(field).as_str() {
        "name" => Some(PropertyValue::Text(record.name.clone())),
        "category" => Some(PropertyValue::Text(record.category.clone())),
        "class" | "classname" => Some(PropertyValue::Text(record.class_name.clone())),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ParameterFilter {
    rules: Vec<ParameterRule>,
}

impl ParameterFilter {
    pub fn new(rules: Vec<ParameterRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ParameterRule] {
        &self.rules
    }
}

impl SearchFilter for ParameterFilter {
    fn name(&self) -> &'static str {
        "param"
    }

    fn priority(&self) -> i32 {
        RULE_PRIORITY
    }

    fn apply(
        &self,
        _model: &dyn HostModel,
        cursor: Option<QueryCursor>,
    ) -> Result<QueryCursor, PipelineError> {
        let cursor = require_cursor(self, cursor)?;
        Ok(self
            .rules
            .iter()
            .cloned()
            .fold(cursor, |cursor, rule| cursor.narrow(Predicate::Rule(rule))))
    }
}
