use super::{
    transaction_name, ExecutionContext, Operation, OperationError, ASSIGN_PARAM, TARGET_PARAM,
};
use crate::host::{Transaction, Vector3};
use crate::mapping::BoundParams;
use crate::pipeline::{levels, spatial::level_elevation};
use crate::registry::{OperationKind, ParamDescriptor, ParamKind};
use crate::session::{KeyKind, ResultSet};
use crate::units::Length;

/// Stores `set` under `assign` when one was requested, or under a fresh
/// created-kind key when `always` is set. Returns the key used.
fn register_created(
    ctx: &mut ExecutionContext<'_>,
    assign: Option<&str>,
    set: ResultSet,
    always: bool,
) -> Result<Option<String>, OperationError> {
    if assign.is_none() && !always {
        return Ok(None);
    }
    let key = ctx.session.key_or_generate(assign, KeyKind::Created)?;
    let label = key.to_string();
    ctx.session.store(key, set);
    Ok(Some(label))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionMode {
    Replace,
    Add,
    Remove,
}

const SELECTION_MODES: &[&str] = &["replace", "add", "remove"];

impl SelectionMode {
    fn from_choice(choice: Option<&str>) -> Self {
        match choice {
            Some("add") => Self::Add,
            Some("remove") => Self::Remove,
            _ => Self::Replace,
        }
    }
}

pub(crate) const SELECT_PARAMS: &[ParamDescriptor] = &[
    TARGET_PARAM,
    ParamDescriptor {
        key: "mode",
        aliases: &["selection_mode"],
        kind: ParamKind::Choice(SELECTION_MODES),
        required: false,
        description: "replace (default), add or remove.",
    },
    ASSIGN_PARAM,
];

#[derive(Debug)]
pub struct SelectElements {
    target: Option<String>,
    mode: SelectionMode,
    assign: Option<String>,
}

impl SelectElements {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            target: params.owned_text("target"),
            mode: SelectionMode::from_choice(params.choice("mode")),
            assign: params.owned_text("assign"),
        })
    }
}

impl Operation for SelectElements {
    fn name(&self) -> &'static str {
        "select_elements"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Action
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let targets = ctx.resolve_target(self.target.as_deref())?;
        let current = ResultSet::new(ctx.model.current_selection());
        let selection = match self.mode {
            SelectionMode::Replace => targets,
            SelectionMode::Add => current
                .handles()
                .iter()
                .chain(targets.handles())
                .copied()
                .collect(),
            SelectionMode::Remove => current.except(&targets),
        };
        ctx.model.set_selection(selection.handles());
        let count = selection.len();
        let assigned = register_created(ctx, self.assign.as_deref(), selection, false)?;
        ctx.agent(
            self.name(),
            self.target.as_deref(),
            assigned.as_deref(),
            &format!("Selection now holds {count} elements."),
        );
        Ok(())
    }
}

pub(crate) const SELECT_EXCEPT_PARAMS: &[ParamDescriptor] = &[
    TARGET_PARAM,
    ParamDescriptor {
        key: "exclude",
        aliases: &["exclude_ai_name", "except"],
        kind: ParamKind::Text,
        required: true,
        description: "Session key or element id to leave out.",
    },
    ASSIGN_PARAM,
];

#[derive(Debug)]
pub struct SelectExcept {
    target: Option<String>,
    exclude: Option<String>,
    assign: Option<String>,
}

impl SelectExcept {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            target: params.owned_text("target"),
            exclude: params.owned_text("exclude"),
            assign: params.owned_text("assign"),
        })
    }
}

impl Operation for SelectExcept {
    fn name(&self) -> &'static str {
        "select_except"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Action
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let exclude = self
            .exclude
            .as_deref()
            .ok_or(OperationError::MissingParam("exclude"))?;
        let base = ctx.resolve_target(self.target.as_deref())?;
        let excluded = ctx.resolve_target(Some(exclude))?;
        let remaining = base.except(&excluded);
        let removed = base.len() - remaining.len();
        ctx.model.set_selection(remaining.handles());
        let count = remaining.len();
        let assigned = register_created(ctx, self.assign.as_deref(), remaining, true)?;
        ctx.agent(
            self.name(),
            self.target.as_deref(),
            assigned.as_deref(),
            &format!("Selected {count} elements, {removed} excluded by {exclude}."),
        );
        Ok(())
    }
}

const fn offset_param(key: &'static str, description: &'static str) -> ParamDescriptor {
    ParamDescriptor {
        key,
        aliases: &[],
        kind: ParamKind::Length,
        required: false,
        description,
    }
}

pub(crate) const MOVE_PARAMS: &[ParamDescriptor] = &[
    TARGET_PARAM,
    offset_param("dx", "Offset along X. Bare numbers use the default unit."),
    offset_param("dy", "Offset along Y."),
    offset_param("dz", "Offset along Z."),
    ASSIGN_PARAM,
];

#[derive(Debug)]
pub struct MoveElement {
    target: Option<String>,
    offset: [Option<Length>; 3],
    assign: Option<String>,
}

impl MoveElement {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            target: params.owned_text("target"),
            offset: [params.length("dx"), params.length("dy"), params.length("dz")],
            assign: params.owned_text("assign"),
        })
    }

    fn vector(&self) -> Vector3 {
        let [dx, dy, dz] = self.offset.map(|axis| axis.map(Length::feet).unwrap_or(0.0));
        Vector3::new(dx, dy, dz)
    }
}

impl Operation for MoveElement {
    fn name(&self) -> &'static str {
        "move_element"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Action
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let offset = self.vector();
        if offset == Vector3::default() {
            return Err(OperationError::Invalid(
                "move needs a non-zero dx, dy or dz".to_string(),
            ));
        }
        let targets = ctx.resolve_target(self.target.as_deref())?;
        if targets.is_empty() {
            return Err(OperationError::Invalid(format!(
                "nothing to move: {} is empty",
                self.target.as_deref().unwrap_or("the selection")
            )));
        }

        let mut tx = Transaction::start(&mut *ctx.model, &transaction_name(self.name()))?;
        for handle in targets.handles() {
            tx.translate(*handle, offset)?;
        }
        tx.commit()?;

        let count = targets.len();
        let assigned = register_created(ctx, self.assign.as_deref(), targets, false)?;
        let [dx, dy, dz] = [offset.x, offset.y, offset.z]
            .map(|feet| Length::from_feet(feet).millimeters().round());
        ctx.agent(
            self.name(),
            self.target.as_deref(),
            assigned.as_deref(),
            &format!("Moved {count} elements by ({dx}, {dy}, {dz}) mm."),
        );
        Ok(())
    }
}

pub(crate) const GET_LEVELS_PARAMS: &[ParamDescriptor] = &[ASSIGN_PARAM];

#[derive(Debug)]
pub struct GetLevels {
    assign: Option<String>,
}

impl GetLevels {
    pub fn create(params: &BoundParams) -> Box<dyn Operation> {
        Box::new(Self {
            assign: params.owned_text("assign"),
        })
    }
}

impl Operation for GetLevels {
    fn name(&self) -> &'static str {
        "get_levels"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Action
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperationError> {
        let levels = levels(&*ctx.model);
        let lines = levels
            .iter()
            .map(|level| {
                format!(
                    "Level {} id {} elevation {:.2} feet defined.",
                    level.name,
                    level.handle,
                    level_elevation(level)
                )
            })
            .collect::<Vec<_>>();
        let set = levels.iter().map(|level| level.handle).collect::<ResultSet>();
        let count = set.len();
        let assigned = register_created(ctx, self.assign.as_deref(), set, true)?;
        let message = if lines.is_empty() {
            "The document has no levels.".to_string()
        } else {
            format!("Found {count} levels. {}", lines.join(" "))
        };
        ctx.agent(self.name(), None, assigned.as_deref(), &message);
        Ok(())
    }
}
