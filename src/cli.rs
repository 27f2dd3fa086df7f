use crate::config::{load_global_settings, load_settings_or_default, ConfigError, EngineSettings};
use crate::engine::Engine;
use crate::host::InMemoryModel;
use crate::registry::TypeRegistry;
use crate::reports::Audience;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Catalog,
    Operations,
    Run,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "catalog" => CliVerb::Catalog,
        "operations" => CliVerb::Operations,
        "run" => CliVerb::Run,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  catalog                              Print operation schemas as JSON".to_string(),
        "  operations                           List operations with descriptions".to_string(),
        "  run --model <file> --plan <file>     Run one plan against a model file".to_string(),
        "      [--config <file>]                Settings file (default ~/.cadpilot/config.yaml)"
            .to_string(),
        "      [--request <text>]               Also print the agent feedback prompt".to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub fn operation_help_lines() -> Vec<String> {
    let mut descriptors = TypeRegistry::global().descriptors().iter().collect::<Vec<_>>();
    descriptors.sort_by(|a, b| a.name.cmp(b.name));
    descriptors
        .into_iter()
        .map(|descriptor| {
            format!(
                "  {0:28} {1:7} {2}",
                descriptor.name,
                descriptor.kind.as_str(),
                descriptor.description
            )
        })
        .collect()
}

fn help_text() -> String {
    cli_help_lines().join("\n")
}

fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunArgs {
    model: Option<PathBuf>,
    plan: Option<PathBuf>,
    config: Option<PathBuf>,
    request: Option<String>,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let mut parsed = RunArgs::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| format!("missing value for `{flag}`"))?;
        match flag.as_str() {
            "--model" => parsed.model = Some(PathBuf::from(value)),
            "--plan" => parsed.plan = Some(PathBuf::from(value)),
            "--config" => parsed.config = Some(PathBuf::from(value)),
            "--request" => parsed.request = Some(value.clone()),
            other => return Err(format!("unknown flag `{other}` for `run`")),
        }
    }
    Ok(parsed)
}

fn load_settings(config: Option<&Path>) -> Result<EngineSettings, String> {
    match config {
        Some(path) => load_settings_or_default(path).map_err(map_config_err),
        None => load_global_settings().map_err(map_config_err),
    }
}

fn cmd_run(args: &[String]) -> Result<String, String> {
    let args = parse_run_args(args)?;
    let model_path = args.model.ok_or("usage: run --model <file> --plan <file>")?;
    let plan_path = args.plan.ok_or("usage: run --model <file> --plan <file>")?;
    let settings = load_settings(args.config.as_deref())?;
    let model = InMemoryModel::from_path(&model_path).map_err(|err| err.to_string())?;
    let plan = fs::read_to_string(&plan_path)
        .map_err(|err| format!("failed to read plan {}: {err}", plan_path.display()))?;

    let engine = Engine::start(Box::new(model), settings).map_err(|err| err.to_string())?;
    let outcome = engine
        .run_plan(&plan)
        .and_then(|handle| Ok(handle.wait()?))
        .map_err(|err| err.to_string())?;
    let prompt = args
        .request
        .as_deref()
        .map(|request| engine.next_turn_context(request));
    let summary = engine.session_summary().map_err(|err| err.to_string())?;
    let reports = engine.drain_reports();
    engine.shutdown().map_err(|err| err.to_string())?;

    let mut lines = vec![format!(
        "batch: {} succeeded, {} failed",
        outcome.succeeded,
        outcome.failures.len()
    )];
    for report in reports.iter().filter(|report| report.audience != Audience::System) {
        lines.push(format!("[{}] {}", report.audience, report.text));
    }
    lines.push("session:".to_string());
    if summary.is_empty() {
        lines.push("  (empty)".to_string());
    }
    for (key, count) in summary {
        lines.push(format!("  {key} = {count}"));
    }
    if let Some(prompt) = prompt {
        lines.push(prompt);
    }
    Ok(lines.join("\n"))
}

fn cmd_catalog() -> Result<String, String> {
    serde_json::to_string_pretty(&TypeRegistry::global().catalog()).map_err(|err| err.to_string())
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let Some(verb) = args.first() else {
        return Ok(help_text());
    };
    match parse_cli_verb(verb) {
        CliVerb::Catalog => cmd_catalog(),
        CliVerb::Operations => Ok(operation_help_lines().join("\n")),
        CliVerb::Run => cmd_run(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{verb}`\n{}", help_text())),
    }
}
