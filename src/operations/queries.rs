use super::{ExecutionContext, Operation, OperationError, KEY_PARAM, TARGET_PARAM};
use crate::mapping::BoundParams;
use crate::pipeline::{
    build_chain, CategoryFilter, ClassFilter, FilterChain, LevelFilter, ParameterFilter,
    ParameterRule, QueryCursor, SearchFilter, SeedInitializer,
};
use crate::registry::{OperationKind, ParamDescriptor, ParamKind};
use crate::session::{KeyKind, SessionError};
use crate::shared::ids::SessionKey;
use serde_json::Value;

/// Source and destination keys shared by the narrowing queries. The
/// source is `target` when given, else `key`, else the session's current
/// scope; results land in `key`, else `target`, else a generated key.
#[derive(Debug, Clone, Default)]
struct Chaining {
    key: Option<String>,
    target: Option<String>,
}

impl Chaining {
    fn from_params(params: &BoundParams) -> Self {
        Self {
            key: params.owned_text("key"),
            target: params.owned_text("target"),
        }
    }

    fn stored_scope(ctx: &ExecutionContext<'_>, key: &str) -> Option<QueryCursor> {
        ctx.session
            .lookup_cursor(key)
            .cloned()
            .or_else(|| ctx.session.lookup(key).map(QueryCursor::from_result_set))
    }

    fn seed(&self, ctx: &ExecutionContext<'_>) -> Result<Option<QueryCursor>, OperationError> {
        if let Some(target) = self.target.as_deref() {
            if let Some(cursor) = Self::stored_scope(ctx, target) {
                return Ok(Some(cursor));
            }
            let set = ctx.resolve_target(Some(target))?;
            return Ok(Some(QueryCursor::from_result_set(&set)));
        }
        Ok(self
            .key
            .as_deref()
            .and_then(|key| Self::stored_scope(ctx, key))
            .or_else(|| ctx.session.current_cursor().cloned()))
    }

    fn output_key(&self, ctx: &ExecutionContext<'_>) -> Result<SessionKey, SessionError> {
        let requested = self.key.as_deref().or(self.target.as_deref());
        ctx.session.key_or_generate(requested, KeyKind::Found)
    }

    fn run(
        &self,
        ctx: &mut ExecutionContext<'_>,
        operation: &'static str,
        filter: Box<dyn SearchFilter>,
        label: &str,
    ) -> Result<(), OperationError> {
        let mut filters: Vec<Box<dyn SearchFilter>> = Vec::new();
        if let Some(seed) = self.seed(ctx)? {
            filters.push(Box::new(SeedInitializer::new(seed)));
        }
        filters.push(filter);
        let cursor = FilterChain::new(filters).run(
            &*ctx.model,
            ctx.settings.pipeline.default_scope,
            ctx.reports,
        )?;
        let key = self.output_key(ctx)?;
        let count = ctx.register_query(&key, cursor);
        ctx.agent(
            operation,
            self.target.as_deref(),
            Some(key.as_str()),
            &format!("Items found: {count} ({label})."),
        );
        Ok(())
    }
}

fn register_scope(
    ctx: &mut ExecutionContext<'_>,
    operation: &'static str,
    key: Option<&str>,
    cursor: QueryCursor,
) -> Result<(), OperationError> {
    let key = ctx.session.key_or_generate(key, KeyKind::Found)?;
    let scope = cursor.scope().describe();
    let count = ctx.register_query(&key, cursor);
    ctx.agent(
        operation,
        None,
        Some(key.as_str()),
        &format!("Scope {key} over the {scope} was created ({count} elements)."),
    );
    Ok(())
}

pub(crate) const SCOPE_PARAMS: &[ParamDescriptor] = &[KEY_PARAM];

#[derive(Debug)]
pub struct CreateGlobalScope {
    key: Option<String>,
}

impl CreateGlobalScope {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            key: params.owned_text("key"),
        })
    }
}

impl Operation for CreateGlobalScope {
    fn name(&self) -> &'static str {
        "create_global_scope"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        register_scope(ctx, self.name(), self.key.as_deref(), QueryCursor::whole_model())
    }
}

#[derive(Debug)]
pub struct CreateActiveViewScope {
    key: Option<String>,
}

impl CreateActiveViewScope {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            key: params.owned_text("key"),
        })
    }
}

impl Operation for CreateActiveViewScope {
    fn name(&self) -> &'static str {
        "create_active_view_scope"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        register_scope(ctx, self.name(), self.key.as_deref(), QueryCursor::active_view())
    }
}

pub(crate) const BY_CATEGORY_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "category",
        aliases: &["category_name", "categoryName"],
        kind: ParamKind::Text,
        required: true,
        description: "Category, loosely written (OST_Walls, Walls, wall).",
    },
    KEY_PARAM,
    TARGET_PARAM,
];

#[derive(Debug)]
pub struct ByCategory {
    category: Option<String>,
    chaining: Chaining,
}

impl ByCategory {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            category: params.owned_text("category"),
            chaining: Chaining::from_params(params),
        })
    }
}

impl Operation for ByCategory {
    fn name(&self) -> &'static str {
        "by_category"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let category = self
            .category
            .as_deref()
            .ok_or(OperationError::MissingParam("category"))?;
        self.chaining.run(
            ctx,
            self.name(),
            Box::new(CategoryFilter::new(category)),
            category,
        )
    }
}

pub(crate) const BY_CLASS_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "class_name",
        aliases: &["class", "className", "targetClass"],
        kind: ParamKind::Text,
        required: true,
        description: "Implementation class: Wall, Floor, FamilyInstance.",
    },
    KEY_PARAM,
    TARGET_PARAM,
];

#[derive(Debug)]
pub struct ByClass {
    class_name: Option<String>,
    chaining: Chaining,
}

impl ByClass {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            class_name: params.owned_text("class_name"),
            chaining: Chaining::from_params(params),
        })
    }
}

impl Operation for ByClass {
    fn name(&self) -> &'static str {
        "by_class"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let class_name = self
            .class_name
            .as_deref()
            .ok_or(OperationError::MissingParam("class_name"))?;
        self.chaining.run(
            ctx,
            self.name(),
            Box::new(ClassFilter::new(class_name)),
            class_name,
        )
    }
}

pub(crate) const BY_LEVEL_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "level",
        aliases: &["level_id", "levelId", "levelIdString", "level_name"],
        kind: ParamKind::Text,
        required: true,
        description: "Level element id or level name.",
    },
    KEY_PARAM,
    TARGET_PARAM,
];

#[derive(Debug)]
pub struct ByLevel {
    level: Option<String>,
    chaining: Chaining,
}

impl ByLevel {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            level: params.owned_text("level"),
            chaining: Chaining::from_params(params),
        })
    }
}

impl Operation for ByLevel {
    fn name(&self) -> &'static str {
        "by_level"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let level = self
            .level
            .as_deref()
            .ok_or(OperationError::MissingParam("level"))?;
        self.chaining
            .run(ctx, self.name(), Box::new(LevelFilter::new(level)), level)
    }
}

pub(crate) const BY_PARAM_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "rules",
        aliases: &["filter_json", "filterJson", "rule"],
        kind: ParamKind::Structure,
        required: true,
        description: "Rules: [{\"field\": \"Mark\", \"op\": \"equals\", \"value\": \"A101\"}].",
    },
    KEY_PARAM,
    TARGET_PARAM,
];

#[derive(Debug)]
pub struct ByParam {
    rules: Option<Value>,
    chaining: Chaining,
}

impl ByParam {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            rules: params.structure("rules").cloned(),
            chaining: Chaining::from_params(params),
        })
    }
}

impl Operation for ByParam {
    fn name(&self) -> &'static str {
        "by_param"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let raw = self
            .rules
            .as_ref()
            .ok_or(OperationError::MissingParam("rules"))?;
        let rules = ParameterRule::parse_rules(raw, ctx.settings.units.default_unit)?;
        let label = rules
            .iter()
            .map(|rule| format!("{} {} {}", rule.field, rule.operator.as_str(), rule.value))
            .collect::<Vec<_>>()
            .join(" and ");
        self.chaining.run(
            ctx,
            self.name(),
            Box::new(ParameterFilter::new(rules)),
            &label,
        )
    }
}

pub(crate) const SEARCH_PARAMS: &[ParamDescriptor] = &[
    ParamDescriptor {
        key: "filters",
        aliases: &["filter", "pipeline"],
        kind: ParamKind::Structure,
        required: false,
        description: "List of filters: {\"kind\": scope_project|active_view|class|category|level|param, ...}.",
    },
    KEY_PARAM,
];

#[derive(Debug)]
pub struct SearchElements {
    filters: Option<Value>,
    key: Option<String>,
}

impl SearchElements {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            filters: params.structure("filters").cloned(),
            key: params.owned_text("key"),
        })
    }
}

impl Operation for SearchElements {
    fn name(&self) -> &'static str {
        "search_elements"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let (chain, issues) = build_chain(self.filters.as_ref(), &ctx.mapper())?;
        for issue in issues {
            ctx.reports.system(format!("{}: {issue}", self.name()));
        }
        let mut label = chain.names().join(", ");
        let cursor = chain.run(
            &*ctx.model,
            ctx.settings.pipeline.default_scope,
            ctx.reports,
        )?;
        if label.is_empty() {
            label = cursor.scope().describe();
        }
        let key = ctx
            .session
            .key_or_generate(self.key.as_deref(), KeyKind::Found)?;
        let count = ctx.register_query(&key, cursor);
        ctx.agent(
            self.name(),
            None,
            Some(key.as_str()),
            &format!("Items found: {count} ({label})."),
        );
        Ok(())
    }
}
