use super::actions::{
    GetLevels, MoveElement, SelectElements, SelectExcept, GET_LEVELS_PARAMS, MOVE_PARAMS,
    SELECT_EXCEPT_PARAMS, SELECT_PARAMS,
};
use super::dynamic_code::{DynamicCode, DYNAMIC_CODE_PARAMS};
use super::queries::{
    ByCategory, ByClass, ByLevel, ByParam, CreateActiveViewScope, CreateGlobalScope,
    SearchElements, BY_CATEGORY_PARAMS, BY_CLASS_PARAMS, BY_LEVEL_PARAMS, BY_PARAM_PARAMS,
    SCOPE_PARAMS, SEARCH_PARAMS,
};
use crate::registry::{OperationDescriptor, OperationKind};

/// Every operation a plan may name. Order is the catalog order shown to
/// the agent.
pub const OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        name: "create_global_scope",
        type_name: "CreateGlobalQuery",
        description: "Start a search over the entire project and store it under `key`.",
        kind: OperationKind::Query,
        params: SCOPE_PARAMS,
        factory: CreateGlobalScope::create,
    },
    OperationDescriptor {
        name: "create_active_view_scope",
        type_name: "CreateActiveViewQuery",
        description: "Start a search over the active view and store it under `key`.",
        kind: OperationKind::Query,
        params: SCOPE_PARAMS,
        factory: CreateActiveViewScope::create,
    },
    OperationDescriptor {
        name: "by_category",
        type_name: "ByCategoryQuery",
        description: "Narrow `target` (or the search stored under `key`) to one category.",
        kind: OperationKind::Query,
        params: BY_CATEGORY_PARAMS,
        factory: ByCategory::create,
    },
    OperationDescriptor {
        name: "by_class",
        type_name: "ByClassQuery",
        description: "Narrow a search to one implementation class.",
        kind: OperationKind::Query,
        params: BY_CLASS_PARAMS,
        factory: ByClass::create,
    },
    OperationDescriptor {
        name: "by_level",
        type_name: "ByLevelQuery",
        description: "Narrow a search to elements on one level.",
        kind: OperationKind::Query,
        params: BY_LEVEL_PARAMS,
        factory: ByLevel::create,
    },
    OperationDescriptor {
        name: "by_param",
        type_name: "ByParamJsonQuery",
        description: "Narrow a search with parameter rules.",
        kind: OperationKind::Query,
        params: BY_PARAM_PARAMS,
        factory: ByParam::create,
    },
    OperationDescriptor {
        name: "search_elements",
        type_name: "SearchElementsQuery",
        description: "Run a declared filter chain and store the result under `key`.",
        kind: OperationKind::Query,
        params: SEARCH_PARAMS,
        factory: SearchElements::create,
    },
    OperationDescriptor {
        name: "select_elements",
        type_name: "SelectElementsAction",
        description: "Replace, extend or reduce the current selection.",
        kind: OperationKind::Action,
        params: SELECT_PARAMS,
        factory: SelectElements::create,
    },
    OperationDescriptor {
        name: "select_except",
        type_name: "SelectExceptAction",
        description: "Select `target` minus `exclude` and register the remainder.",
        kind: OperationKind::Action,
        params: SELECT_EXCEPT_PARAMS,
        factory: SelectExcept::create,
    },
    OperationDescriptor {
        name: "move_element",
        type_name: "MoveElementAction",
        description: "Move elements by dx, dy, dz inside one transaction.",
        kind: OperationKind::Action,
        params: MOVE_PARAMS,
        factory: MoveElement::create,
    },
    OperationDescriptor {
        name: "get_levels",
        type_name: "GetLevelsAction",
        description: "List the document's levels by elevation and register them.",
        kind: OperationKind::Action,
        params: GET_LEVELS_PARAMS,
        factory: GetLevels::create,
    },
    OperationDescriptor {
        name: "dynamic_code",
        type_name: "DynamicCodeAction",
        description: "Run a sandboxed script fragment against `target`.",
        kind: OperationKind::Action,
        params: DYNAMIC_CODE_PARAMS,
        factory: DynamicCode::create,
    },
];
