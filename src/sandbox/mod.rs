//! Agent-authored script fragments.
//!
//! A fragment is repaired, screened against the denylist, parsed with the
//! pest grammar in `script.pest`, checked, and only then run by a
//! step-budgeted interpreter inside one model transaction. Nothing a
//! fragment does reaches the host except through the builtins in
//! [`interpreter`].

pub mod check;
pub mod denylist;
pub mod interpreter;
pub mod parser;
pub mod repair;

pub use check::check_script;
pub use denylist::{screen, DEFAULT_DENYLIST};
pub use interpreter::{Bindings, Limits, Outcome, Value};
pub use parser::{parse_script, Script};
pub use repair::repair_fragment;

use crate::config::SandboxSettings;
use crate::host::{HostError, HostModel, Transaction};
use crate::units::LengthUnit;

/// Transaction every fragment runs in.
pub const DYNAMIC_TRANSACTION: &str = "AI Dynamic Action";

/// Marker used in diagnostics in place of a file name.
pub const SOURCE_MARKER: &str = "agent_fragment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, message: String) -> Self {
        Self {
            line,
            column,
            message,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{SOURCE_MARKER}:{}:{}] {}",
            self.line, self.column, self.message
        )
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("dynamic code is disabled by configuration")]
    Disabled,
    #[error("Security Error: `{token}` is not allowed (line {line})")]
    Denied { token: String, line: usize },
    #[error("no code to run")]
    Empty,
    #[error("Compilation Failed:\n{}", render_diagnostics(.0))]
    Compile(Vec<Diagnostic>),
    #[error("[Dynamic Error] {kind} at line {line}: {message}")]
    Runtime {
        kind: &'static str,
        line: usize,
        message: String,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Repairs, screens, parses and checks a fragment. Nothing here touches
/// the model, so a rejected fragment never opens a transaction.
pub fn prepare(
    code: &str,
    target_key: Option<&str>,
    settings: &SandboxSettings,
) -> Result<Script, SandboxError> {
    if !settings.enabled {
        return Err(SandboxError::Disabled);
    }
    let source = repair_fragment(code, target_key);
    if source.trim().is_empty() {
        return Err(SandboxError::Empty);
    }
    screen(&source, &settings.extra_denylist)?;
    let script = parse_script(&source).map_err(|diagnostic| SandboxError::Compile(vec![diagnostic]))?;
    let diagnostics = check_script(&script);
    if !diagnostics.is_empty() {
        return Err(SandboxError::Compile(diagnostics));
    }
    Ok(script)
}

/// Runs a prepared script inside [`DYNAMIC_TRANSACTION`]. Any runtime
/// error rolls the transaction back before it is returned.
pub fn run_in_transaction(
    script: &Script,
    bindings: Bindings,
    model: &mut dyn HostModel,
    default_unit: LengthUnit,
    limits: Limits,
) -> Result<Outcome, SandboxError> {
    let mut tx = Transaction::start(model, DYNAMIC_TRANSACTION)?;
    let outcome = interpreter::run(script, bindings, &mut *tx, default_unit, limits)?;
    tx.commit()?;
    Ok(outcome)
}
