use super::check::HARNESS_BINDINGS;
use super::parser::{BinaryOp, Expr, ExprKind, Script, Stmt, StmtKind, UnaryOp, MAX_NESTING};
use super::SandboxError;
use crate::config::SandboxSettings;
use crate::host::{ElementRecord, EntityHandle, HostModel, PropertyValue, Vector3};
use crate::pipeline::rules::resolve_field;
use crate::pipeline::{ParameterRule, RuleOperator};
use crate::session::ResultSet;
use crate::shared::ids::SessionKey;
use crate::units::{Length, LengthUnit};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const TYPE_ERROR: &str = "TypeError";
const NAME_ERROR: &str = "NameError";
const VALUE_ERROR: &str = "ValueError";
const INDEX_ERROR: &str = "IndexOutOfRange";
const ZERO_DIVISION: &str = "DivideByZero";
const UNKNOWN_ELEMENT: &str = "UnknownElement";
const HOST_ERROR: &str = "HostError";
const BUDGET_EXCEEDED: &str = "BudgetExceeded";
const LIMIT_EXCEEDED: &str = "LimitExceeded";

/// Work and memory bounds for one fragment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_list_items: usize,
    pub max_text_bytes: usize,
}

impl Limits {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            max_list_items: settings.max_list_items,
            max_text_bytes: settings.max_text_bytes,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_settings(&SandboxSettings::default())
    }
}

/// List items and text bytes held by `value`, nested values included,
/// and how deeply its lists nest.
fn footprint(value: &Value) -> (usize, usize, usize) {
    let (mut items, mut bytes, mut depth) = (0, 0, 0);
    let mut pending = vec![(value, 0_usize)];
    while let Some((value, level)) = pending.pop() {
        depth = depth.max(level);
        match value {
            Value::List(children) => {
                items += children.len();
                pending.extend(children.iter().map(|child| (child, level + 1)));
            }
            Value::Str(text) => bytes += text.len(),
            _ => {}
        }
    }
    (items, bytes, depth)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Num(f64),
    Length(Length),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Handle(EntityHandle),
}

fn format_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Num(_) => "number",
            Self::Length(_) => "length",
            Self::Str(_) => "text",
            Self::Bool(_) => "boolean",
            Self::List(_) => "list",
            Self::Handle(_) => "element",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Num(value) => *value != 0.0,
            Self::Length(length) => length.feet() != 0.0,
            Self::Str(text) => !text.is_empty(),
            Self::Bool(flag) => *flag,
            Self::List(items) => !items.is_empty(),
            Self::Handle(_) => true,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Num(value) => format_number(*value),
            Self::Length(length) => format!("{} mm", format_number(length.millimeters())),
            Self::Str(text) => text.clone(),
            Self::Bool(flag) => flag.to_string(),
            Self::List(items) => format!(
                "[{}]",
                items.iter().map(Value::display).collect::<Vec<_>>().join(", ")
            ),
            Self::Handle(handle) => handle.to_string(),
        }
    }

    fn from_property(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Flag(flag) => Self::Bool(flag),
            PropertyValue::Integer(value) => Self::Num(value as f64),
            PropertyValue::Length(feet) => Self::Length(Length::from_feet(feet)),
            PropertyValue::Text(text) => Self::Str(text),
        }
    }

    fn handles(handles: impl IntoIterator<Item = EntityHandle>) -> Self {
        Self::List(handles.into_iter().map(Self::Handle).collect())
    }
}

/// Values the host binds before a fragment runs.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub ids: Vec<EntityHandle>,
    pub target: String,
    pub assign: String,
    pub document: String,
}

impl Bindings {
    fn into_scope(self) -> BTreeMap<String, Value> {
        let values = [
            Value::handles(self.ids),
            Value::Str(self.target),
            Value::Str(self.assign),
            Value::Str(self.document),
        ];
        HARNESS_BINDINGS
            .iter()
            .map(|name| name.to_string())
            .zip(values)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Lines written with `report(...)`, in order.
    pub output: Vec<String>,
    /// Elements moved, edited or deleted.
    pub touched: ResultSet,
    /// Result sets registered with `store(key, list)`.
    pub stores: Vec<(SessionKey, ResultSet)>,
    pub steps: u64,
}

type Eval<T> = Result<T, SandboxError>;

fn runtime(kind: &'static str, line: usize, message: impl Into<String>) -> SandboxError {
    SandboxError::Runtime {
        kind,
        line,
        message: message.into(),
    }
}

struct Interpreter<'m> {
    model: &'m mut dyn HostModel,
    unit: LengthUnit,
    limits: Limits,
    steps: u64,
    scopes: Vec<BTreeMap<String, Value>>,
    output: Vec<String>,
    output_bytes: usize,
    touched: Vec<EntityHandle>,
    stores: Vec<(SessionKey, ResultSet)>,
    stored_items: usize,
}

/// Executes a checked script against `model`. The caller owns the
/// transaction; this only mutates through builtins.
pub fn run(
    script: &Script,
    bindings: Bindings,
    model: &mut dyn HostModel,
    unit: LengthUnit,
    limits: Limits,
) -> Result<Outcome, SandboxError> {
    let mut interpreter = Interpreter {
        model,
        unit,
        limits,
        steps: 0,
        scopes: vec![bindings.into_scope()],
        output: Vec::new(),
        output_bytes: 0,
        touched: Vec::new(),
        stores: Vec::new(),
        stored_items: 0,
    };
    interpreter.block(&script.statements, None)?;
    Ok(Outcome {
        output: interpreter.output,
        touched: ResultSet::new(interpreter.touched),
        stores: interpreter.stores,
        steps: interpreter.steps,
    })
}

impl Interpreter<'_> {
    fn tick(&mut self, line: usize) -> Eval<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(runtime(
                BUDGET_EXCEEDED,
                line,
                format!("step budget of {} exhausted", self.limits.max_steps),
            ));
        }
        Ok(())
    }

    /// Rejects list and text values that outgrow the configured limits.
    fn bounded(&self, value: Value, line: usize) -> Eval<Value> {
        if !matches!(value, Value::List(_) | Value::Str(_)) {
            return Ok(value);
        }
        let (items, bytes, depth) = footprint(&value);
        if items > self.limits.max_list_items {
            return Err(runtime(
                LIMIT_EXCEEDED,
                line,
                format!("list grows past {} items", self.limits.max_list_items),
            ));
        }
        if bytes > self.limits.max_text_bytes {
            return Err(runtime(
                LIMIT_EXCEEDED,
                line,
                format!("text grows past {} bytes", self.limits.max_text_bytes),
            ));
        }
        if depth > MAX_NESTING {
            return Err(runtime(
                LIMIT_EXCEEDED,
                line,
                format!("lists nest deeper than {MAX_NESTING} levels"),
            ));
        }
        Ok(value)
    }

    fn block(&mut self, statements: &[Stmt], bound: Option<(&str, Value)>) -> Eval<()> {
        let mut scope = BTreeMap::new();
        if let Some((name, value)) = bound {
            scope.insert(name.to_string(), value);
        }
        self.scopes.push(scope);
        let result = statements
            .iter()
            .try_for_each(|statement| self.statement(statement));
        self.scopes.pop();
        result
    }

    fn lookup(&self, name: &str, line: usize) -> Eval<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .ok_or_else(|| runtime(NAME_ERROR, line, format!("`{name}` is not defined")))
    }

    fn statement(&mut self, statement: &Stmt) -> Eval<()> {
        let line = statement.line;
        self.tick(line)?;
        match &statement.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
            }
            StmtKind::Assign { name, value } => {
                let value = self.eval(value)?;
                let slot = self
                    .scopes
                    .iter_mut()
                    .rev()
                    .find_map(|scope| scope.get_mut(name))
                    .ok_or_else(|| runtime(NAME_ERROR, line, format!("`{name}` is not defined")))?;
                *slot = value;
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.truthy() {
                    self.block(then, None)?;
                } else {
                    self.block(otherwise, None)?;
                }
            }
            StmtKind::For { var, iter, body } => {
                let items = match self.eval(iter)? {
                    Value::List(items) => items,
                    single @ Value::Handle(_) => vec![single],
                    other => {
                        return Err(runtime(
                            TYPE_ERROR,
                            line,
                            format!("cannot loop over {}", other.type_name()),
                        ))
                    }
                };
                for item in items {
                    self.tick(line)?;
                    self.block(body, Some((var, item)))?;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Number(value) => Ok(Value::Num(*value)),
            ExprKind::Length(length) => Ok(Value::Length(*length)),
            ExprKind::Str(text) => Ok(Value::Str(text.clone())),
            ExprKind::Bool(flag) => Ok(Value::Bool(*flag)),
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Eval<Vec<_>>>()?;
                self.bounded(Value::List(items), line)
            }
            ExprKind::Var(name) => self.lookup(name, line),
            ExprKind::Call { name, args } => {
                self.tick(line)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Eval<Vec<_>>>()?;
                self.call(name, args, line)
            }
            ExprKind::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.index(target, index, line)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy())),
                    (UnaryOp::Neg, Value::Num(value)) => Ok(Value::Num(-value)),
                    (UnaryOp::Neg, Value::Length(length)) => {
                        Ok(Value::Length(Length::from_feet(-length.feet())))
                    }
                    (UnaryOp::Neg, other) => Err(runtime(
                        TYPE_ERROR,
                        line,
                        format!("cannot negate {}", other.type_name()),
                    )),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    let lhs = self.eval(lhs)?.truthy();
                    Ok(Value::Bool(lhs && self.eval(rhs)?.truthy()))
                }
                BinaryOp::Or => {
                    let lhs = self.eval(lhs)?.truthy();
                    Ok(Value::Bool(lhs || self.eval(rhs)?.truthy()))
                }
                _ => {
                    let lhs = self.eval(lhs)?;
                    let rhs = self.eval(rhs)?;
                    let value = self.binary(*op, lhs, rhs, line)?;
                    self.bounded(value, line)
                }
            },
        }
    }

    fn index(&self, target: Value, index: Value, line: usize) -> Eval<Value> {
        let Value::List(items) = target else {
            return Err(runtime(
                TYPE_ERROR,
                line,
                format!("cannot index into {}", target.type_name()),
            ));
        };
        let position = match index {
            Value::Num(value) if value >= 0.0 && value.fract() == 0.0 => value as usize,
            other => {
                return Err(runtime(
                    TYPE_ERROR,
                    line,
                    format!("list index must be a whole number, got {}", other.display()),
                ))
            }
        };
        let len = items.len();
        items.into_iter().nth(position).ok_or_else(|| {
            runtime(
                INDEX_ERROR,
                line,
                format!("index {position} is out of range for a list of {len}"),
            )
        })
    }

    /// A number next to a length is read in the default unit.
    fn as_length(&self, value: &Value) -> Option<Length> {
        match value {
            Value::Length(length) => Some(*length),
            Value::Num(value) => Some(Length::from_unit(*value, self.unit)),
            _ => None,
        }
    }

    fn equals(&self, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::Length(_), _) | (_, Value::Length(_)) => {
                match (self.as_length(lhs), self.as_length(rhs)) {
                    (Some(a), Some(b)) => {
                        (a.feet() - b.feet()).abs() < crate::pipeline::rules::LENGTH_TOLERANCE
                    }
                    _ => false,
                }
            }
            (Value::Handle(handle), Value::Num(value)) | (Value::Num(value), Value::Handle(handle)) => {
                handle.raw() as f64 == *value
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.equals(x, y))
            }
            _ => lhs == rhs,
        }
    }

    fn compare(&self, lhs: &Value, rhs: &Value) -> Option<Ordering> {
        match (lhs, rhs) {
            (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Length(_), _) | (_, Value::Length(_)) => {
                let (a, b) = (self.as_length(lhs)?, self.as_length(rhs)?);
                a.feet().partial_cmp(&b.feet())
            }
            _ => None,
        }
    }

    fn binary(&self, op: BinaryOp, lhs: Value, rhs: Value, line: usize) -> Eval<Value> {
        let mismatch = |lhs: &Value, rhs: &Value| {
            runtime(
                TYPE_ERROR,
                line,
                format!(
                    "cannot apply `{}` to {} and {}",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )
        };
        match op {
            BinaryOp::Eq => Ok(Value::Bool(self.equals(&lhs, &rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!self.equals(&lhs, &rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = self
                    .compare(&lhs, &rhs)
                    .ok_or_else(|| mismatch(&lhs, &rhs))?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            BinaryOp::Add => match (lhs, rhs) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
                (Value::Str(a), b) => Ok(Value::Str(a + &b.display())),
                (a, Value::Str(b)) => Ok(Value::Str(a.display() + &b)),
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (a, b) => match (self.as_length(&a), self.as_length(&b)) {
                    (Some(x), Some(y)) => Ok(Value::Length(Length::from_feet(x.feet() + y.feet()))),
                    _ => Err(mismatch(&a, &b)),
                },
            },
            BinaryOp::Sub => match (lhs, rhs) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a - b)),
                (a, b) => match (self.as_length(&a), self.as_length(&b)) {
                    (Some(x), Some(y)) => Ok(Value::Length(Length::from_feet(x.feet() - y.feet()))),
                    _ => Err(mismatch(&a, &b)),
                },
            },
            BinaryOp::Mul => match (lhs, rhs) {
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a * b)),
                (Value::Length(length), Value::Num(factor))
                | (Value::Num(factor), Value::Length(length)) => {
                    Ok(Value::Length(Length::from_feet(length.feet() * factor)))
                }
                (a, b) => Err(mismatch(&a, &b)),
            },
            BinaryOp::Div => {
                let divisor = match &rhs {
                    Value::Num(value) => *value,
                    Value::Length(length) => length.feet(),
                    _ => return Err(mismatch(&lhs, &rhs)),
                };
                if divisor == 0.0 {
                    return Err(runtime(ZERO_DIVISION, line, "division by zero"));
                }
                match (lhs, rhs) {
                    (Value::Num(a), Value::Num(_)) => Ok(Value::Num(a / divisor)),
                    (Value::Length(a), Value::Num(_)) => {
                        Ok(Value::Length(Length::from_feet(a.feet() / divisor)))
                    }
                    (Value::Length(a), Value::Length(_)) => Ok(Value::Num(a.feet() / divisor)),
                    (a, b) => Err(mismatch(&a, &b)),
                }
            }
            BinaryOp::And => Ok(Value::Bool(lhs.truthy() && rhs.truthy())),
            BinaryOp::Or => Ok(Value::Bool(lhs.truthy() || rhs.truthy())),
        }
    }

    fn collect_handles(&self, value: &Value, line: usize, out: &mut Vec<EntityHandle>) -> Eval<()> {
        match value {
            Value::Handle(handle) => out.push(*handle),
            Value::Num(raw) if raw.fract() == 0.0 => out.push(EntityHandle::new(*raw as i64)),
            Value::List(items) => {
                for item in items {
                    self.collect_handles(item, line, out)?;
                }
            }
            other => {
                return Err(runtime(
                    TYPE_ERROR,
                    line,
                    format!("expected elements, got {}", other.type_name()),
                ))
            }
        }
        Ok(())
    }

    fn handles(&self, value: &Value, line: usize) -> Eval<Vec<EntityHandle>> {
        let mut out = Vec::new();
        self.collect_handles(value, line, &mut out)?;
        Ok(out)
    }

    fn single_handle(&self, value: &Value, line: usize) -> Eval<EntityHandle> {
        match self.handles(value, line)?.as_slice() {
            [handle] => Ok(*handle),
            other => Err(runtime(
                TYPE_ERROR,
                line,
                format!("expected one element, got {}", other.len()),
            )),
        }
    }

    fn record(&self, handle: EntityHandle, line: usize) -> Eval<ElementRecord> {
        self.model
            .element(handle)
            .ok_or_else(|| runtime(UNKNOWN_ELEMENT, line, format!("element {handle} does not exist")))
    }

    fn text(&self, value: &Value, line: usize, what: &str) -> Eval<String> {
        match value {
            Value::Str(text) => Ok(text.clone()),
            other => Err(runtime(
                TYPE_ERROR,
                line,
                format!("{what} must be text, got {}", other.type_name()),
            )),
        }
    }

    fn length_arg(&self, value: &Value, line: usize) -> Eval<Length> {
        self.as_length(value).ok_or_else(|| {
            runtime(
                TYPE_ERROR,
                line,
                format!("expected a length, got {}", value.type_name()),
            )
        })
    }

    fn call(&mut self, name: &str, args: Vec<Value>, line: usize) -> Eval<Value> {
        let arg = |index: usize| args.get(index).cloned().unwrap_or(Value::Nil);
        match name {
            "count" => match arg(0) {
                Value::List(items) => Ok(Value::Num(items.len() as f64)),
                other => Err(runtime(
                    TYPE_ERROR,
                    line,
                    format!("count() needs a list, got {}", other.type_name()),
                )),
            },
            "len" => match arg(0) {
                Value::List(items) => Ok(Value::Num(items.len() as f64)),
                Value::Str(text) => Ok(Value::Num(text.chars().count() as f64)),
                other => Err(runtime(
                    TYPE_ERROR,
                    line,
                    format!("len() needs a list or text, got {}", other.type_name()),
                )),
            },
            "first" => match arg(0) {
                Value::List(items) => items
                    .into_iter()
                    .next()
                    .ok_or_else(|| runtime(INDEX_ERROR, line, "first() of an empty list")),
                other => Err(runtime(
                    TYPE_ERROR,
                    line,
                    format!("first() needs a list, got {}", other.type_name()),
                )),
            },
            "list" => self.bounded(Value::List(args.clone()), line),
            "except" => {
                let base = ResultSet::new(self.handles(&arg(0), line)?);
                let removed = ResultSet::new(self.handles(&arg(1), line)?);
                Ok(Value::handles(base.except(&removed).handles().to_vec()))
            }
            "where" => self.filter_where(&args, line),
            "category" | "class" | "name" => {
                let record = self.record(self.single_handle(&arg(0), line)?, line)?;
                Ok(Value::Str(match name {
                    "category" => record.category,
                    "class" => record.class_name,
                    _ => record.name,
                }))
            }
            "param" => {
                let record = self.record(self.single_handle(&arg(0), line)?, line)?;
                let field = self.text(&arg(1), line, "parameter name")?;
                resolve_field(&*self.model, &record, &field)
                    .map(Value::from_property)
                    .ok_or_else(|| {
                        runtime(
                            VALUE_ERROR,
                            line,
                            format!("element {} has no parameter `{field}`", record.handle),
                        )
                    })
            }
            "move" => {
                let targets = self.handles(&arg(0), line)?;
                let mut axes = [0.0; 3];
                for (axis, value) in axes.iter_mut().zip(args.iter().skip(1)) {
                    *axis = self.length_arg(value, line)?.feet();
                }
                let offset = Vector3::new(axes[0], axes[1], axes[2]);
                for handle in &targets {
                    self.model
                        .translate(*handle, offset)
                        .map_err(|err| runtime(HOST_ERROR, line, err.to_string()))?;
                }
                self.touched.extend(&targets);
                Ok(Value::Num(targets.len() as f64))
            }
            "set" => {
                let targets = self.handles(&arg(0), line)?;
                let field = self.text(&arg(1), line, "parameter name")?;
                let value = self.property_value(arg(2), line)?;
                for handle in &targets {
                    self.model
                        .set_property(*handle, &field, value.clone())
                        .map_err(|err| runtime(HOST_ERROR, line, err.to_string()))?;
                }
                self.touched.extend(&targets);
                Ok(Value::Num(targets.len() as f64))
            }
            "delete" => {
                let targets = self.handles(&arg(0), line)?;
                for handle in &targets {
                    self.model
                        .delete(*handle)
                        .map_err(|err| runtime(HOST_ERROR, line, err.to_string()))?;
                }
                self.touched.extend(&targets);
                Ok(Value::Num(targets.len() as f64))
            }
            "select" => {
                let targets = ResultSet::new(self.handles(&arg(0), line)?);
                self.model.set_selection(targets.handles());
                Ok(Value::Num(targets.len() as f64))
            }
            "store" => {
                let raw = self.text(&arg(0), line, "session key")?;
                let key = SessionKey::parse(&raw).map_err(|err| runtime(VALUE_ERROR, line, err))?;
                let set = ResultSet::new(self.handles(&arg(1), line)?);
                self.stored_items += set.len();
                if self.stored_items > self.limits.max_list_items {
                    return Err(runtime(
                        LIMIT_EXCEEDED,
                        line,
                        format!("stores hold more than {} items", self.limits.max_list_items),
                    ));
                }
                self.stores.push((key, set));
                Ok(Value::Nil)
            }
            "report" => {
                let line_text = args.iter().map(Value::display).collect::<Vec<_>>().join(" ");
                self.output_bytes += line_text.len();
                if self.output_bytes > self.limits.max_text_bytes {
                    return Err(runtime(
                        LIMIT_EXCEEDED,
                        line,
                        format!("report output grows past {} bytes", self.limits.max_text_bytes),
                    ));
                }
                self.output.push(line_text);
                Ok(Value::Nil)
            }
            other => Err(runtime(NAME_ERROR, line, format!("unknown function `{other}`"))),
        }
    }

    fn property_value(&self, value: Value, line: usize) -> Eval<PropertyValue> {
        match value {
            Value::Bool(flag) => Ok(PropertyValue::Flag(flag)),
            Value::Str(text) => Ok(PropertyValue::Text(text)),
            Value::Length(length) => Ok(PropertyValue::Length(length.feet())),
            Value::Handle(handle) => Ok(PropertyValue::Integer(handle.raw())),
            Value::Num(value) if value.fract() == 0.0 => Ok(PropertyValue::Integer(value as i64)),
            Value::Num(value) => Err(runtime(
                TYPE_ERROR,
                line,
                format!("{value} is fractional; write a length such as {value}mm"),
            )),
            other => Err(runtime(
                TYPE_ERROR,
                line,
                format!("cannot store {} in a parameter", other.type_name()),
            )),
        }
    }

    fn rule_operand(&self, value: &Value) -> String {
        match value {
            Value::Length(length) => format!("{}ft", length.feet()),
            other => other.display(),
        }
    }

    /// `where(list, field, value)` or `where(list, field, op, value)`.
    fn filter_where(&self, args: &[Value], line: usize) -> Eval<Value> {
        let Some(source) = args.first() else {
            return Err(runtime(TYPE_ERROR, line, "where() needs a list"));
        };
        let candidates = self.handles(source, line)?;
        let field = self.text(&args.get(1).cloned().unwrap_or(Value::Nil), line, "field")?;
        let (operator, expected) = match args {
            [_, _, expected] => (RuleOperator::Equals, expected),
            [_, _, operator, expected] => {
                let raw = self.text(operator, line, "operator")?;
                let operator = RuleOperator::parse(&raw).ok_or_else(|| {
                    runtime(VALUE_ERROR, line, format!("unknown operator `{raw}`"))
                })?;
                (operator, expected)
            }
            _ => return Err(runtime(TYPE_ERROR, line, "where() takes 3 or 4 arguments")),
        };
        let rule = ParameterRule::new(&field, operator, &self.rule_operand(expected), self.unit);
        let matched = candidates
            .into_iter()
            .filter(|handle| {
                self.model
                    .element(*handle)
                    .is_some_and(|record| rule.matches(&*self.model, &record))
            })
            .collect::<Vec<_>>();
        Ok(Value::handles(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InMemoryModel, Transaction};
    use crate::operations::fixtures::sample_model;
    use crate::sandbox::{check_script, parse_script};

    fn script(source: &str) -> Script {
        let script = parse_script(source).expect("parse");
        assert!(check_script(&script).is_empty(), "{:?}", check_script(&script));
        script
    }

    fn bindings(ids: &[i64]) -> Bindings {
        Bindings {
            ids: ids.iter().copied().map(EntityHandle::new).collect(),
            target: "$q1".to_string(),
            assign: "$f1".to_string(),
            document: "sample".to_string(),
        }
    }

    fn run_on(model: &mut InMemoryModel, source: &str, ids: &[i64]) -> Result<Outcome, SandboxError> {
        let script = script(source);
        let mut tx = Transaction::start(model, "test").expect("start");
        let limits = Limits {
            max_steps: 10_000,
            ..Limits::default()
        };
        let outcome = run(&script, bindings(ids), &mut *tx, LengthUnit::Millimeter, limits)?;
        tx.commit().expect("commit");
        Ok(outcome)
    }

    #[test]
    fn loops_filters_and_reports_work_together() {
        let mut model = sample_model();
        let outcome = run_on(
            &mut model,
            "let walls = list();\nfor h in ids {\n  if class(h) == \"Wall\" { walls = walls + list(h); }\n}\nreport(\"walls:\", count(walls), doc);",
            &[1, 2, 5, 7],
        )
        .expect("run");
        assert_eq!(outcome.output, vec!["walls: 2 sample".to_string()]);
    }

    #[test]
    fn moves_mix_lengths_and_default_unit_numbers() {
        let mut model = sample_model();
        let outcome = run_on(&mut model, "move(ids, 1ft, 304.8);", &[1]).expect("run");
        let record = model.element(EntityHandle::new(1)).expect("wall");
        assert!((record.location.x - 1.0).abs() < 1e-9);
        assert!((record.location.y - 1.0).abs() < 1e-9);
        assert_eq!(outcome.touched.len(), 1);
    }

    #[test]
    fn where_uses_parameter_rules() {
        let mut model = sample_model();
        let outcome = run_on(
            &mut model,
            "let marked = where(ids, \"Mark\", \"beginsWith\", \"W\");\nstore(\"$q_marked\", except(marked, list(1)));\nreport(count(marked));",
            &[1, 2, 3, 7],
        )
        .expect("run");
        assert_eq!(outcome.output, vec!["3".to_string()]);
        assert_eq!(outcome.stores.len(), 1);
        assert_eq!(outcome.stores[0].1.len(), 2);
    }

    #[test]
    fn parameters_round_trip_through_set_and_param() {
        let mut model = sample_model();
        let outcome = run_on(
            &mut model,
            "set(first(ids), \"Mark\", \"checked\");\nreport(param(ids[0], \"mark\"));",
            &[4],
        )
        .expect("run");
        assert_eq!(outcome.output, vec!["checked".to_string()]);
    }

    #[test]
    fn runtime_errors_carry_kind_and_line() {
        let mut model = sample_model();
        let err = run_on(&mut model, "let a = 1;\nlet b = a / 0;", &[]).expect_err("zero");
        assert!(matches!(
            err,
            SandboxError::Runtime { kind: "DivideByZero", line: 2, .. }
        ));

        let err = run_on(&mut model, "report(ids[3]);", &[1]).expect_err("index");
        assert!(err.to_string().starts_with("[Dynamic Error] IndexOutOfRange at line 1"));
    }

    #[test]
    fn step_budget_stops_runaway_loops() {
        let mut model = sample_model();
        let script = script("let n = 0;\nfor a in list(1,2,3,4,5,6,7,8,9,10) { for b in list(1,2,3,4,5,6,7,8,9,10) { n = n + 1; } }");
        let mut tx = Transaction::start(&mut model, "budget").expect("start");
        let limits = Limits {
            max_steps: 50,
            ..Limits::default()
        };
        let err = run(&script, bindings(&[]), &mut *tx, LengthUnit::Millimeter, limits)
            .expect_err("budget");
        assert!(matches!(err, SandboxError::Runtime { kind: "BudgetExceeded", .. }));
    }

    fn run_limited(source: &str, limits: Limits) -> Result<Outcome, SandboxError> {
        let mut model = sample_model();
        let script = script(source);
        let mut tx = Transaction::start(&mut model, "limits").expect("start");
        run(&script, bindings(&[]), &mut *tx, LengthUnit::Millimeter, limits)
    }

    #[test]
    fn doubling_lists_hits_the_item_limit() {
        let limits = Limits {
            max_list_items: 1000,
            ..Limits::default()
        };
        let source = "let a = [1];\nfor i in [1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22] {\n  a = a + a;\n}\nreport(count(a));";
        let err = run_limited(source, limits).expect_err("item limit");
        assert!(
            matches!(err, SandboxError::Runtime { kind: "LimitExceeded", line: 3, .. }),
            "{err}"
        );

        let err = run_limited(source, Limits::default()).expect_err("default item limit");
        assert!(err.to_string().contains("list grows past 1000000 items"), "{err}");
    }

    #[test]
    fn doubling_text_and_nesting_lists_hit_their_limits() {
        let limits = Limits {
            max_text_bytes: 4096,
            ..Limits::default()
        };
        let err = run_limited(
            "let s = \"ab\";\nfor i in [1,2,3,4,5,6,7,8,9,10,11,12] { s = s + s; }",
            limits,
        )
        .expect_err("text limit");
        assert!(err.to_string().contains("text grows past 4096 bytes"), "{err}");

        let mut nesting = String::from("let a = [];\n");
        nesting.push_str("for x in [1,2,3,4,5,6,7,8,9,10] { for y in [1,2,3,4,5,6,7,8,9,10] { for z in [1,2,3] { a = [a]; } } }");
        let err = run_limited(&nesting, Limits::default()).expect_err("depth limit");
        assert!(err.to_string().contains("nest deeper than 256"), "{err}");
    }

    #[test]
    fn unknown_elements_are_runtime_errors() {
        let mut model = sample_model();
        let err = run_on(&mut model, "report(name(999));", &[]).expect_err("unknown");
        assert!(matches!(err, SandboxError::Runtime { kind: "UnknownElement", .. }));
    }
}
