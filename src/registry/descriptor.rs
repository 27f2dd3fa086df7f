use crate::mapping::BoundParams;
use crate::operations::Operation;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Mutates the model, reports and registers entities.
    Action,
    /// Narrows or produces a result set and always registers it.
    Query,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Query => "query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Number with an optional unit, stored in feet.
    Length,
    Text,
    Boolean,
    Choice(&'static [&'static str]),
    /// Nested JSON (lists of filters, rule objects).
    Structure,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Choice(_) => "choice",
            Self::Structure => "structure",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamDescriptor {
    pub key: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamDescriptor {
    pub fn accepts(&self, field: &str) -> bool {
        self.key.eq_ignore_ascii_case(field)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(field))
    }

    pub fn schema(&self) -> Value {
        let mut schema = json!({
            "name": self.key,
            "kind": self.kind.as_str(),
            "required": self.required,
            "description": self.description,
        });
        if !self.aliases.is_empty() {
            schema["aliases"] = json!(self.aliases);
        }
        if let ParamKind::Choice(choices) = self.kind {
            schema["choices"] = json!(choices);
        }
        schema
    }
}

pub type OperationFactory = fn(&BoundParams) -> Box<dyn Operation>;

/// Static description of one operation type. Built once, never mutated.
#[derive(Clone, Copy)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub type_name: &'static str,
    pub description: &'static str,
    pub kind: OperationKind,
    pub params: &'static [ParamDescriptor],
    pub factory: OperationFactory,
}

impl OperationDescriptor {
    /// First declared parameter; bare scalar payloads bind to it.
    pub fn primary_param(&self) -> Option<&'static ParamDescriptor> {
        self.params.first()
    }

    pub fn instantiate(&self, params: &BoundParams) -> Box<dyn Operation> {
        (self.factory)(params)
    }

    pub fn schema(&self) -> Value {
        json!({
            "name": self.name,
            "kind": self.kind.as_str(),
            "description": self.description,
            "params": self.params.iter().map(ParamDescriptor::schema).collect::<Vec<_>>(),
        })
    }
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish()
    }
}
