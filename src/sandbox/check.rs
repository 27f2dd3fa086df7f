use super::parser::{Expr, ExprKind, Script, Stmt, StmtKind};
use super::Diagnostic;
use std::collections::BTreeSet;

/// Names bound by the host before a fragment runs. Read-only.
pub const HARNESS_BINDINGS: &[&str] = &["ids", "target", "assign", "doc"];

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic builtins.
    pub max_args: Option<usize>,
}

const fn builtin(name: &'static str, min_args: usize, max_args: Option<usize>) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
    }
}

pub const BUILTINS: &[Builtin] = &[
    builtin("count", 1, Some(1)),
    builtin("len", 1, Some(1)),
    builtin("first", 1, Some(1)),
    builtin("list", 0, None),
    builtin("except", 2, Some(2)),
    builtin("where", 3, Some(4)),
    builtin("category", 1, Some(1)),
    builtin("class", 1, Some(1)),
    builtin("name", 1, Some(1)),
    builtin("param", 2, Some(2)),
    builtin("move", 2, Some(4)),
    builtin("set", 3, Some(3)),
    builtin("delete", 1, Some(1)),
    builtin("select", 1, Some(1)),
    builtin("store", 2, Some(2)),
    builtin("report", 1, None),
];

pub fn find_builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn arity_text(builtin: &Builtin) -> String {
    match builtin.max_args {
        Some(max) if max == builtin.min_args => format!("{max}"),
        Some(max) => format!("{} to {max}", builtin.min_args),
        None => format!("at least {}", builtin.min_args),
    }
}

struct Checker {
    scopes: Vec<BTreeSet<String>>,
    diagnostics: Vec<Diagnostic>,
}

impl Checker {
    fn report(&mut self, line: usize, column: usize, message: String) {
        self.diagnostics.push(Diagnostic::new(line, column, message));
    }

    fn is_declared(&self, name: &str) -> bool {
        HARNESS_BINDINGS.contains(&name) || self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn block(&mut self, statements: &[Stmt], bound: Option<&str>) {
        self.scopes.push(BTreeSet::new());
        if let Some(name) = bound {
            self.declare(name);
        }
        for statement in statements {
            self.statement(statement);
        }
        self.scopes.pop();
    }

    fn statement(&mut self, statement: &Stmt) {
        let line = statement.line;
        match &statement.kind {
            StmtKind::Let { name, value } => {
                self.expr(value);
                if HARNESS_BINDINGS.contains(&name.as_str()) {
                    self.report(line, 1, format!("cannot redeclare harness binding `{name}`"));
                } else {
                    self.declare(name);
                }
            }
            StmtKind::Assign { name, value } => {
                self.expr(value);
                if HARNESS_BINDINGS.contains(&name.as_str()) {
                    self.report(line, 1, format!("cannot assign to harness binding `{name}`"));
                } else if !self.is_declared(name) {
                    self.report(
                        line,
                        1,
                        format!("assignment to undeclared variable `{name}`; declare it with `let`"),
                    );
                }
            }
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition);
                self.block(then, None);
                self.block(otherwise, None);
            }
            StmtKind::For { var, iter, body } => {
                self.expr(iter);
                if HARNESS_BINDINGS.contains(&var.as_str()) {
                    self.report(line, 1, format!("cannot rebind harness binding `{var}`"));
                }
                self.block(body, Some(var));
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Number(_) | ExprKind::Length(_) | ExprKind::Str(_) | ExprKind::Bool(_) => {}
            ExprKind::List(items) => items.iter().for_each(|item| self.expr(item)),
            ExprKind::Var(name) => {
                if !self.is_declared(name) {
                    self.report(expr.line, expr.column, format!("undeclared variable `{name}`"));
                }
            }
            ExprKind::Call { name, args } => {
                match find_builtin(name) {
                    None => self.report(expr.line, expr.column, format!("unknown function `{name}`")),
                    Some(builtin) => {
                        let too_few = args.len() < builtin.min_args;
                        let too_many = builtin.max_args.is_some_and(|max| args.len() > max);
                        if too_few || too_many {
                            self.report(
                                expr.line,
                                expr.column,
                                format!(
                                    "`{name}` takes {} arguments, got {}",
                                    arity_text(builtin),
                                    args.len()
                                ),
                            );
                        }
                    }
                }
                args.iter().for_each(|arg| self.expr(arg));
            }
            ExprKind::Index { target, index } => {
                self.expr(target);
                self.expr(index);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
        }
    }
}

/// Every problem found before execution, in source order.
pub fn check_script(script: &Script) -> Vec<Diagnostic> {
    let mut checker = Checker {
        scopes: Vec::new(),
        diagnostics: Vec::new(),
    };
    checker.block(&script.statements, None);
    checker.diagnostics
}
