use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const ACTION_FIELDS: &[&str] = &["action", "Action", "name"];
const PARAMS_FIELDS: &[&str] = &["params", "Params"];

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plan must be a json object")]
    NotAnObject,
    #[error("plan field `actions` must be a list")]
    ActionsNotAList,
}

/// One requested operation: a loosely written name plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// Empty when the step named no operation.
    pub action: String,
    pub payload: Value,
}

impl PlanStep {
    /// Accepts `{action, params}`, inline fields next to `action`, or a
    /// bare operation name.
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(name) => Self {
                action: name.trim().to_string(),
                payload: Value::Object(Map::new()),
            },
            Value::Object(fields) => {
                let named = ACTION_FIELDS.iter().find_map(|key| {
                    fields
                        .get(*key)
                        .and_then(Value::as_str)
                        .map(|action| (*key, action.trim()))
                });
                let payload = match PARAMS_FIELDS.iter().find_map(|key| fields.get(*key)) {
                    Some(params) => params.clone(),
                    None => Value::Object(
                        fields
                            .iter()
                            .filter(|(key, _)| named.map(|(used, _)| used) != Some(key.as_str()))
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect(),
                    ),
                };
                Self {
                    action: named.map(|(_, action)| action).unwrap_or_default().to_string(),
                    payload,
                }
            }
            _ => Self {
                action: String::new(),
                payload: value.clone(),
            },
        }
    }
}

/// Parsed agent response: a message for the user and ordered steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub message: String,
    pub steps: Vec<PlanStep>,
    fingerprint: String,
}

impl Plan {
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, PlanError> {
        let fields = value.as_object().ok_or(PlanError::NotAnObject)?;
        let message = fields
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let steps = match fields.get("actions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(PlanStep::from_value).collect(),
            Some(_) => return Err(PlanError::ActionsNotAList),
        };
        Ok(Self {
            message,
            steps,
            fingerprint: fingerprint(value),
        })
    }

    /// First 8 bytes of the SHA-256 of the plan's canonical json, in hex.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let digest = hasher.finalize();
    digest[..8]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_and_inline_params_are_both_accepted() {
        let plan = Plan::from_value(&json!({
            "message": "Counting walls.",
            "actions": [
                {"action": "CreateGlobalQuery"},
                {"action": "ByCategoryQuery", "categoryName": "OST_Walls", "search_ai_name": "$q1"},
                {"action": "move_element", "params": {"dx": "500mm"}},
            ]
        }))
        .expect("plan");
        assert_eq!(plan.message, "Counting walls.");
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].payload, json!({}));
        assert_eq!(
            plan.steps[1].payload,
            json!({"categoryName": "OST_Walls", "search_ai_name": "$q1"})
        );
        assert_eq!(plan.steps[2].payload, json!({"dx": "500mm"}));
    }

    #[test]
    fn bare_names_and_nameless_steps_are_kept() {
        let plan = Plan::parse(r#"{"actions": ["GetLevelsAction", {"dx": 1}]}"#).expect("plan");
        assert_eq!(plan.steps[0].action, "GetLevelsAction");
        assert_eq!(plan.steps[1].action, "");
        assert!(plan.message.is_empty());
    }

    #[test]
    fn malformed_plans_are_rejected() {
        assert!(matches!(Plan::parse("not json"), Err(PlanError::Json(_))));
        assert!(matches!(Plan::parse("[1, 2]"), Err(PlanError::NotAnObject)));
        assert!(matches!(
            Plan::parse(r#"{"actions": {"action": "x"}}"#),
            Err(PlanError::ActionsNotAList)
        ));
    }

    #[test]
    fn missing_actions_mean_an_empty_plan() {
        let plan = Plan::parse(r#"{"message": "Hello!"}"#).expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let first = Plan::parse(r#"{"actions": ["a"]}"#).expect("plan");
        let again = Plan::parse(r#"{ "actions" : [ "a" ] }"#).expect("plan");
        let other = Plan::parse(r#"{"actions": ["b"]}"#).expect("plan");
        assert_eq!(first.fingerprint().len(), 16);
        assert_eq!(first.fingerprint(), again.fingerprint());
        assert_ne!(first.fingerprint(), other.fingerprint());
    }
}
