use super::{
    ActiveViewInitializer, CategoryFilter, ClassFilter, FilterChain, LevelFilter,
    ParameterFilter, ParameterRule, PipelineError, SearchFilter, WholeModelInitializer,
};
use crate::mapping::{BoundParams, ParameterMapper};
use crate::registry::{NameIndex, ParamDescriptor, ParamKind};
use crate::units::LengthUnit;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const KIND_FIELDS: &[&str] = &["kind", "type", "filter"];

pub type FilterBuilder = fn(&BoundParams, LengthUnit) -> Result<Box<dyn SearchFilter>, PipelineError>;

#[derive(Clone, Copy)]
pub struct FilterDescriptor {
    pub name: &'static str,
    pub type_name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamDescriptor],
    pub build: FilterBuilder,
}

impl std::fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn required_text<'p>(
    params: &'p BoundParams,
    kind: &'static str,
    param: &'static str,
) -> Result<&'p str, PipelineError> {
    params
        .text(param)
        .ok_or(PipelineError::MissingFilterParam { kind, param })
}

fn build_whole_model(_: &BoundParams, _: LengthUnit) -> Result<Box<dyn SearchFilter>, PipelineError> {
    Ok(Box::new(WholeModelInitializer))
}

fn build_active_view(_: &BoundParams, _: LengthUnit) -> Result<Box<dyn SearchFilter>, PipelineError> {
    Ok(Box::new(ActiveViewInitializer))
}

fn build_class(params: &BoundParams, _: LengthUnit) -> Result<Box<dyn SearchFilter>, PipelineError> {
    let class_name = required_text(params, "class", "class_name")?;
    Ok(Box::new(ClassFilter::new(class_name)))
}

fn build_category(
    params: &BoundParams,
    _: LengthUnit,
) -> Result<Box<dyn SearchFilter>, PipelineError> {
    let category = required_text(params, "category", "category")?;
    Ok(Box::new(CategoryFilter::new(category)))
}

fn build_level(params: &BoundParams, _: LengthUnit) -> Result<Box<dyn SearchFilter>, PipelineError> {
    let level = required_text(params, "level", "level")?;
    Ok(Box::new(LevelFilter::new(level)))
}

fn build_param(
    params: &BoundParams,
    unit: LengthUnit,
) -> Result<Box<dyn SearchFilter>, PipelineError> {
    let rules = match params.structure("rules") {
        Some(raw) => ParameterRule::parse_rules(raw, unit)?,
        None => vec![ParameterRule::from_parts(
            params.text("field"),
            params.text("op"),
            params.text("value"),
            unit,
        )?],
    };
    if rules.is_empty() {
        return Err(PipelineError::InvalidRule(
            "parameter filter needs at least one rule".to_string(),
        ));
    }
    Ok(Box::new(ParameterFilter::new(rules)))
}

const fn text_param(
    key: &'static str,
    aliases: &'static [&'static str],
    description: &'static str,
) -> ParamDescriptor {
    ParamDescriptor {
        key,
        aliases,
        kind: ParamKind::Text,
        required: true,
        description,
    }
}

pub const FILTERS: &[FilterDescriptor] = &[
    FilterDescriptor {
        name: "scope_project",
        type_name: "ProjectFilterInitializer",
        description: "Start from every element of the project.",
        params: &[],
        build: build_whole_model,
    },
    FilterDescriptor {
        name: "active_view",
        type_name: "ActiveViewFilterInitializer",
        description: "Start from the elements visible in the active view.",
        params: &[],
        build: build_active_view,
    },
    FilterDescriptor {
        name: "class",
        type_name: "ClassFilter",
        description: "Keep elements of one implementation class (Wall, Floor, FamilyInstance).",
        params: &[text_param("class_name", &["class", "name"], "Class name.")],
        build: build_class,
    },
    FilterDescriptor {
        name: "category",
        type_name: "CategoryFilter",
        description: "Keep elements of one category (OST_Walls, Walls, wall).",
        params: &[text_param(
            "category",
            &["category_name", "categoryName", "name"],
            "Category name, loosely written.",
        )],
        build: build_category,
    },
    FilterDescriptor {
        name: "level",
        type_name: "LevelFilter",
        description: "Keep elements hosted on one level, by handle or name.",
        params: &[text_param("level", &["level_id", "levelId", "name"], "Level handle or name.")],
        build: build_level,
    },
    FilterDescriptor {
        name: "param",
        type_name: "ParameterFilter",
        description: "Keep elements whose properties satisfy every rule.",
        params: &[
            ParamDescriptor {
                key: "rules",
                aliases: &["filter_json", "filterJson", "rule"],
                kind: ParamKind::Structure,
                required: false,
                description: "List of {field, op, value} rules.",
            },
            ParamDescriptor {
                key: "field",
                aliases: &["param", "p"],
                kind: ParamKind::Text,
                required: false,
                description: "Property name for a single inline rule.",
            },
            ParamDescriptor {
                key: "op",
                aliases: &["operator", "o"],
                kind: ParamKind::Text,
                required: false,
                description: "Operator for a single inline rule.",
            },
            ParamDescriptor {
                key: "value",
                aliases: &["val", "v"],
                kind: ParamKind::Text,
                required: false,
                description: "Value for a single inline rule.",
            },
        ],
        build: build_param,
    },
];

pub struct FilterRegistry {
    index: NameIndex,
}

impl FilterRegistry {
    pub fn global() -> &'static FilterRegistry {
        static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| FilterRegistry {
            index: NameIndex::build(FILTERS.iter().map(|filter| (filter.name, filter.type_name))),
        })
    }

    pub fn resolve(&self, kind: &str) -> Option<&'static FilterDescriptor> {
        self.index.lookup(kind).and_then(|position| FILTERS.get(position))
    }

    pub fn diagnostics(&self) -> &[String] {
        self.index.diagnostics()
    }
}

fn split_kind(instruction: &Value) -> Result<(String, Value), PipelineError> {
    match instruction {
        Value::String(kind) => Ok((kind.trim().to_string(), Value::Null)),
        Value::Object(object) => {
            let kind_field = KIND_FIELDS.iter().find_map(|name| {
                object
                    .keys()
                    .find(|field| field.eq_ignore_ascii_case(name))
                    .cloned()
            });
            let Some(kind_field) = kind_field else {
                return Err(PipelineError::InvalidInstruction(format!(
                    "filter `{instruction}` has no `kind`"
                )));
            };
            let kind = object
                .get(&kind_field)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            let rest = object
                .iter()
                .filter(|(field, _)| **field != kind_field)
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect::<Map<_, _>>();
            Ok((kind, Value::Object(rest)))
        }
        other => Err(PipelineError::InvalidInstruction(format!(
            "filter must be an object, got `{other}`"
        ))),
    }
}

/// Builds a chain from `[{"kind": "...", ...}, ...]`. Mapping issues are
/// returned alongside; an unknown kind or malformed filter fails the
/// whole chain rather than silently widening the search.
pub fn build_chain(
    instructions: Option<&Value>,
    mapper: &ParameterMapper,
) -> Result<(FilterChain, Vec<String>), PipelineError> {
    let mut chain = FilterChain::default();
    let mut issues = Vec::new();
    let items = match instructions {
        None | Some(Value::Null) => return Ok((chain, issues)),
        Some(Value::Array(items)) => items.clone(),
        Some(single @ Value::Object(_)) => vec![single.clone()],
        Some(other) => {
            return Err(PipelineError::InvalidInstruction(format!(
                "filters must be a list, got `{other}`"
            )))
        }
    };

    let registry = FilterRegistry::global();
    for instruction in &items {
        let (kind, payload) = split_kind(instruction)?;
        let descriptor = registry
            .resolve(&kind)
            .ok_or_else(|| PipelineError::UnknownFilterKind(kind.clone()))?;
        let bound = mapper.map(descriptor.params, &payload);
        issues.extend(
            bound
                .issues()
                .iter()
                .map(|issue| format!("filter `{}`: {issue}", descriptor.name)),
        );
        chain.push((descriptor.build)(&bound, mapper.default_unit())?);
    }
    Ok((chain, issues))
}
