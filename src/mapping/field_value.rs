use crate::registry::{normalize_name, ParamKind};
use crate::units::{parse_length, Length, LengthUnit, UnitSource};
use serde_json::Value;

/// A payload field after coercion to its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Length(Length),
    Text(String),
    Flag(bool),
    Choice(&'static str),
    Structure(Value),
}

/// Result of coercing one field. A value may come with a note (for
/// example a length read in the fallback unit).
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(FieldValue),
    WithNote(FieldValue, String),
    Absent,
    Rejected(String),
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn coerce_length(value: &Value, default_unit: LengthUnit) -> Coerced {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(raw) => Coerced::Value(FieldValue::Length(Length::from_unit(raw, default_unit))),
            None => Coerced::Rejected(format!("number `{number}` is out of range")),
        },
        Value::String(text) if text.trim().is_empty() => Coerced::Absent,
        Value::String(text) => match parse_length(text, default_unit) {
            Some(parsed) => match &parsed.source {
                UnitSource::Unrecognized { token, used } => Coerced::WithNote(
                    FieldValue::Length(parsed.length),
                    format!("unrecognized unit `{token}` in `{text}`, read as {used}"),
                ),
                _ => Coerced::Value(FieldValue::Length(parsed.length)),
            },
            None => Coerced::Rejected(format!("`{text}` does not contain a number")),
        },
        other => Coerced::Rejected(format!("expected a length, got {}", describe(other))),
    }
}

fn coerce_text(value: &Value) -> Coerced {
    match value {
        Value::String(text) if text.trim().is_empty() => Coerced::Absent,
        Value::String(text) => Coerced::Value(FieldValue::Text(text.trim().to_string())),
        Value::Number(number) => Coerced::Value(FieldValue::Text(number.to_string())),
        Value::Bool(flag) => Coerced::Value(FieldValue::Text(flag.to_string())),
        other => Coerced::Rejected(format!("expected text, got {}", describe(other))),
    }
}

fn coerce_flag(value: &Value) -> Coerced {
    let parsed = match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(text) => parse_flag(text),
        _ => None,
    };
    match parsed {
        Some(flag) => Coerced::Value(FieldValue::Flag(flag)),
        None => Coerced::Rejected(format!("expected a boolean, got `{value}`")),
    }
}

fn coerce_choice(value: &Value, choices: &'static [&'static str]) -> Coerced {
    let raw = match value {
        Value::String(text) => text.as_str(),
        other => {
            return Coerced::Rejected(format!("expected one of {choices:?}, got {}", describe(other)))
        }
    };
    let wanted = normalize_name(raw);
    match choices
        .iter()
        .find(|choice| normalize_name(choice) == wanted)
    {
        Some(choice) => Coerced::Value(FieldValue::Choice(*choice)),
        None => Coerced::Rejected(format!("`{raw}` is not one of {choices:?}")),
    }
}

fn coerce_structure(value: &Value) -> Coerced {
    match value {
        // Agents frequently send nested JSON as an encoded string.
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(decoded @ (Value::Array(_) | Value::Object(_))) => {
                Coerced::Value(FieldValue::Structure(decoded))
            }
            _ => Coerced::Value(FieldValue::Structure(value.clone())),
        },
        other => Coerced::Value(FieldValue::Structure(other.clone())),
    }
}

/// Total coercion: every input maps to a value, an absence, or a
/// rejection message; nothing panics or aborts the remaining fields.
pub fn coerce(kind: ParamKind, value: &Value, default_unit: LengthUnit) -> Coerced {
    if value.is_null() {
        return Coerced::Absent;
    }
    match kind {
        ParamKind::Length => coerce_length(value, default_unit),
        ParamKind::Text => coerce_text(value),
        ParamKind::Boolean => coerce_flag(value),
        ParamKind::Choice(choices) => coerce_choice(value, choices),
        ParamKind::Structure => coerce_structure(value),
    }
}
