use super::Diagnostic;
use crate::units::{Length, LengthUnit};
use pest::iterators::Pair;
use pest::Parser;

/// Deepest statement and expression nesting a fragment may build.
pub const MAX_NESTING: usize = 256;

#[derive(pest_derive::Parser)]
#[grammar = "sandbox/script.pest"]
pub struct ScriptParser;

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr },
    Expr(Expr),
    If {
        condition: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub line: usize,
    pub column: usize,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "||" | "or" => Self::Or,
            "&&" | "and" => Self::And,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Length(Length),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Var(String),
    Call { name: String, args: Vec<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

fn position(pair: &Pair<Rule>) -> (usize, usize) {
    pair.as_span().start_pos().line_col()
}

fn malformed(pair: &Pair<Rule>, what: &str) -> Diagnostic {
    let (line, column) = position(pair);
    Diagnostic::new(line, column, format!("malformed {what}"))
}

fn check_depth(pair: &Pair<Rule>, depth: usize) -> Result<(), Diagnostic> {
    if depth <= MAX_NESTING {
        return Ok(());
    }
    let (line, column) = position(pair);
    Err(Diagnostic::new(
        line,
        column,
        format!("fragment nests deeper than {MAX_NESTING} levels"),
    ))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::let_kw | Rule::if_kw | Rule::else_kw | Rule::for_kw | Rule::in_kw
    )
}

/// Children of `pair` without the keyword tokens.
fn children(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|child| !is_keyword(child.as_rule()))
}

/// Parses a fragment into statements. Syntax errors come back as a single
/// positioned diagnostic.
pub fn parse_script(source: &str) -> Result<Script, Diagnostic> {
    let mut pairs = ScriptParser::parse(Rule::program, source).map_err(|err| {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        Diagnostic::new(line, column, err.variant.message().to_string())
    })?;
    let program = pairs
        .next()
        .ok_or_else(|| Diagnostic::new(1, 1, "empty program".to_string()))?;
    let statements = program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(|pair| build_statement(pair, 0))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Script { statements })
}

fn build_block(pair: Pair<Rule>, depth: usize) -> Result<Vec<Stmt>, Diagnostic> {
    pair.into_inner()
        .map(|statement| build_statement(statement, depth))
        .collect()
}

fn take<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    parent: &Pair<'i, Rule>,
    what: &str,
) -> Result<Pair<'i, Rule>, Diagnostic> {
    inner.next().ok_or_else(|| malformed(parent, what))
}

fn build_statement(pair: Pair<Rule>, depth: usize) -> Result<Stmt, Diagnostic> {
    check_depth(&pair, depth)?;
    let (line, _) = position(&pair);
    let nested = depth + 1;
    let rule = pair.as_rule();
    let parent = pair.clone();
    let mut inner = children(pair);

    let kind = match rule {
        Rule::let_stmt | Rule::assign_stmt => {
            let name = take(&mut inner, &parent, "binding name")?.as_str().to_string();
            let value = build_expr(take(&mut inner, &parent, "binding value")?, nested)?;
            if rule == Rule::let_stmt {
                StmtKind::Let { name, value }
            } else {
                StmtKind::Assign { name, value }
            }
        }
        Rule::expr_stmt => {
            StmtKind::Expr(build_expr(take(&mut inner, &parent, "expression")?, nested)?)
        }
        Rule::if_stmt => {
            let condition = build_expr(take(&mut inner, &parent, "condition")?, nested)?;
            let then = build_block(take(&mut inner, &parent, "block")?, nested)?;
            let otherwise = match inner.next() {
                None => Vec::new(),
                Some(branch) if branch.as_rule() == Rule::if_stmt => {
                    vec![build_statement(branch, nested)?]
                }
                Some(branch) => build_block(branch, nested)?,
            };
            StmtKind::If {
                condition,
                then,
                otherwise,
            }
        }
        Rule::for_stmt => {
            let var = take(&mut inner, &parent, "loop variable")?.as_str().to_string();
            let iter = build_expr(take(&mut inner, &parent, "loop source")?, nested)?;
            let body = build_block(take(&mut inner, &parent, "loop body")?, nested)?;
            StmtKind::For { var, iter, body }
        }
        _ => return Err(malformed(&parent, "statement")),
    };
    Ok(Stmt { line, kind })
}

fn expr_at(pair: &Pair<Rule>, kind: ExprKind) -> Expr {
    let (line, column) = position(pair);
    Expr { line, column, kind }
}

/// Folds `operand (op operand)*` left to right. Each operator adds one
/// level above the leftmost operand.
fn build_infix(pair: Pair<Rule>, depth: usize) -> Result<Expr, Diagnostic> {
    let span_pair = pair.clone();
    let parts = pair.into_inner().collect::<Vec<_>>();
    let depth = depth + parts.len() / 2;
    check_depth(&span_pair, depth)?;
    let mut inner = parts.into_iter();
    let first = inner
        .next()
        .ok_or_else(|| malformed(&span_pair, "expression"))?;
    let mut lhs = build_expr(first, depth)?;
    while let Some(op_pair) = inner.next() {
        let op = BinaryOp::from_token(op_pair.as_str().trim())
            .ok_or_else(|| malformed(&op_pair, "operator"))?;
        let rhs_pair = inner
            .next()
            .ok_or_else(|| malformed(&op_pair, "right-hand operand"))?;
        let rhs = build_expr(rhs_pair, depth)?;
        lhs = expr_at(
            &op_pair,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        );
    }
    Ok(lhs)
}

/// Applies prefix operators (`not`, `!`, `-`) right to left.
fn build_prefix(pair: Pair<Rule>, op: UnaryOp, depth: usize) -> Result<Expr, Diagnostic> {
    let span_pair = pair.clone();
    let (operators, rest): (Vec<_>, Vec<_>) = pair
        .into_inner()
        .partition(|child| matches!(child.as_rule(), Rule::not_op | Rule::neg_op));
    let depth = depth + operators.len();
    check_depth(&span_pair, depth)?;
    let mut operand = None;
    for child in rest {
        operand = Some(build_expr(child, depth)?);
    }
    let mut expr = operand.ok_or_else(|| malformed(&span_pair, "operand"))?;
    for operator in operators.iter().rev() {
        expr = expr_at(
            operator,
            ExprKind::Unary {
                op,
                operand: Box::new(expr),
            },
        );
    }
    Ok(expr)
}

fn build_list(pair: Pair<Rule>, depth: usize) -> Result<Vec<Expr>, Diagnostic> {
    pair.into_inner()
        .map(|item| build_expr(item, depth))
        .collect()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_number(pair: &Pair<Rule>) -> Result<f64, Diagnostic> {
    pair.as_str()
        .parse::<f64>()
        .map_err(|_| malformed(pair, "number"))
}

fn build_expr(pair: Pair<Rule>, depth: usize) -> Result<Expr, Diagnostic> {
    let span_pair = pair.clone();
    check_depth(&span_pair, depth)?;
    match pair.as_rule() {
        Rule::expr => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| malformed(&span_pair, "expression"))?;
            build_expr(inner, depth + 1)
        }
        Rule::or_expr | Rule::and_expr | Rule::comparison | Rule::sum | Rule::product => {
            build_infix(pair, depth)
        }
        Rule::not_expr => build_prefix(pair, UnaryOp::Not, depth),
        Rule::unary => build_prefix(pair, UnaryOp::Neg, depth),
        Rule::postfix => {
            let parts = pair.into_inner().collect::<Vec<_>>();
            let depth = depth + parts.len().saturating_sub(1);
            check_depth(&span_pair, depth)?;
            let mut inner = parts.into_iter();
            let head = inner
                .next()
                .ok_or_else(|| malformed(&span_pair, "expression"))?;
            let mut expr = build_expr(head, depth)?;
            for index in inner {
                let index_pair = index.clone();
                let position = index
                    .into_inner()
                    .next()
                    .ok_or_else(|| malformed(&index_pair, "index"))?;
                expr = expr_at(
                    &index_pair,
                    ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(build_expr(position, depth)?),
                    },
                );
            }
            Ok(expr)
        }
        Rule::length_lit => {
            let mut inner = pair.into_inner();
            let number = inner
                .next()
                .ok_or_else(|| malformed(&span_pair, "length"))?;
            let suffix = inner
                .next()
                .ok_or_else(|| malformed(&span_pair, "length unit"))?;
            let unit = LengthUnit::from_token(suffix.as_str())
                .ok_or_else(|| malformed(&suffix, "length unit"))?;
            let value = parse_number(&number)?;
            Ok(expr_at(
                &span_pair,
                ExprKind::Length(Length::from_unit(value, unit)),
            ))
        }
        Rule::number => Ok(expr_at(&span_pair, ExprKind::Number(parse_number(&pair)?))),
        Rule::boolean => Ok(expr_at(&span_pair, ExprKind::Bool(pair.as_str() == "true"))),
        Rule::string => {
            let raw = pair
                .into_inner()
                .next()
                .map(|inner| inner.as_str())
                .unwrap_or_default();
            Ok(expr_at(&span_pair, ExprKind::Str(unescape(raw))))
        }
        Rule::list => Ok(expr_at(
            &span_pair,
            ExprKind::List(build_list(pair, depth + 1)?),
        )),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .ok_or_else(|| malformed(&span_pair, "call"))?
                .as_str()
                .to_string();
            let args = inner
                .map(|arg| build_expr(arg, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(expr_at(&span_pair, ExprKind::Call { name, args }))
        }
        Rule::ident => Ok(expr_at(
            &span_pair,
            ExprKind::Var(pair.as_str().to_string()),
        )),
        _ => Err(malformed(&span_pair, "expression")),
    }
}
