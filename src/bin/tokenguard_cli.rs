//! TokenGuard CLI
//!
//! Commands: validate, commit, graph, eval, emit
//! Outputs JSON (or the requested text format) to stdout, logs to stderr.
//! Exit codes: 0 ok, 1 failure, 2 constraint errors.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use tokenguard_core::{
    apply_overrides, emit, flatten, load_tree,
    sources::load_overrides,
    ConfigError, Expr, PipelineError, RuleSet, SourceError, TokenValue, ValidationPipeline,
    ValidationReport,
};

#[derive(Parser)]
#[command(name = "tokenguard-cli")]
#[command(about = "TokenGuard CLI - Design Token Validator", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Rule-set file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Token files, merged left to right
    #[arg(short, long, global = true, default_value = "tokens.json")]
    tokens: Vec<PathBuf>,

    /// Flat `{ id: value }` overrides applied after merging
    #[arg(short, long, global = true)]
    overrides: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full validation pass
    Validate {
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
    },

    /// Change one value and re-check what it affects
    Commit {
        #[arg(long)]
        id: String,

        /// New value; numbers stay numbers, anything else is text
        #[arg(long)]
        value: String,

        /// Merge the patch into the overrides file
        #[arg(long)]
        write_overrides: bool,
    },

    /// Render the Hasse diagram of an order axis
    Graph {
        #[arg(long)]
        axis: String,

        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,

        /// Keep only ids under these prefixes
        #[arg(long)]
        only: Vec<String>,

        /// Drop ids under these prefixes
        #[arg(long)]
        exclude: Vec<String>,

        /// Seed ids (exact or `prefix*`) for a neighborhood view
        #[arg(long)]
        around: Vec<String>,

        #[arg(long, default_value_t = 1)]
        hops: usize,

        #[arg(long)]
        title: Option<String>,
    },

    /// Evaluate an expression against resolved token sizes
    Eval {
        /// Expression AST as JSON
        #[arg(long)]
        expr: String,

        #[arg(long)]
        trace: bool,
    },

    /// Print resolved values
    Emit {
        #[arg(long, value_enum)]
        format: EmitFormat,

        #[arg(long, default_value = ":root")]
        selector: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Dot,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmitFormat {
    Css,
    Json,
    Js,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Invalid --{flag}: {source}")]
    Argument {
        flag: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("--write-overrides needs --overrides PATH")]
    NoOverridesPath,

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_rules(config: Option<&Path>) -> Result<RuleSet, CliError> {
    match config {
        Some(path) => Ok(RuleSet::load(path)?),
        None => Ok(RuleSet::default()),
    }
}

fn load_overrides_if_present(path: Option<&Path>) -> Result<BTreeMap<String, TokenValue>, CliError> {
    match path {
        Some(p) if p.exists() => Ok(load_overrides(p)?),
        _ => Ok(BTreeMap::new()),
    }
}

fn load_input(cli: &Cli) -> Result<Value, CliError> {
    let mut tree = load_tree(&cli.tokens)?;
    let overrides = load_overrides_if_present(cli.overrides.as_deref())?;
    if !overrides.is_empty() {
        tracing::debug!(count = overrides.len(), "applying overrides");
        apply_overrides(&mut tree, &overrides)?;
    }
    Ok(tree)
}

/// `16` is a number, `16px` and `{a.b}` are text.
fn parse_value(raw: &str) -> TokenValue {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => TokenValue::Number(n),
        _ => TokenValue::from(raw),
    }
}

fn print_text_report(report: &ValidationReport) {
    for issue in &report.issues {
        let level = if issue.is_error() { "error" } else { "warn" };
        match &issue.location {
            Some(w) => println!("{:<5} {:<12} [{}] {}: {}", level, issue.rule, w, issue.id, issue.message),
            None => println!("{:<5} {:<12} {}: {}", level, issue.rule, issue.id, issue.message),
        }
    }
    for (axis, cycles) in &report.cycles {
        for cycle in cycles {
            println!("cycle {:<12} {}", axis, cycle.join(" -> "));
        }
    }
    let errors = report.issues.iter().filter(|i| i.is_error()).count();
    println!(
        "{}: {} tokens, {} errors, {} warnings",
        if report.valid { "valid" } else { "invalid" },
        report.token_count,
        errors,
        report.issues.len() - errors
    );
}

fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    let pipeline = ValidationPipeline::new(load_rules(cli.config.as_deref())?);
    let tree = load_input(cli)?;

    match &cli.command {
        Commands::Validate { format } => {
            let report = pipeline.validate(&tree)?;
            match format {
                ReportFormat::Json => print_json(&report)?,
                ReportFormat::Text => print_text_report(&report),
            }
            Ok(if report.valid { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        Commands::Commit { id, value, write_overrides } => {
            let report = pipeline.commit(&tree, id, parse_value(value))?;
            if *write_overrides {
                let path = cli.overrides.as_deref().ok_or(CliError::NoOverridesPath)?;
                let mut merged = load_overrides_if_present(Some(path))?;
                merged.extend(report.patch.clone());
                fs::write(path, serde_json::to_string_pretty(&merged)? + "\n").map_err(|source| {
                    CliError::Write {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                tracing::debug!(path = %path.display(), "overrides written");
            }
            print_json(&report)?;
            let clean = !report.issues.iter().any(|i| i.is_error());
            Ok(if clean { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        Commands::Graph { axis, format, only, exclude, around, hops, title } => {
            let view = pipeline.hasse(&tree, axis)?;
            let mut graph = view.graph.clone();
            if !only.is_empty() {
                graph = graph.filter_by_prefix(only);
            }
            if !exclude.is_empty() {
                graph = graph.filter_exclude_prefix(exclude);
            }
            if !around.is_empty() {
                let seeds = graph.select_seeds(around);
                graph = graph.neighborhood(&seeds, *hops);
            }
            let opts = view.render_options(title.clone());
            let text = match format {
                GraphFormat::Mermaid => graph.to_mermaid(&opts),
                GraphFormat::Dot => graph.to_dot(&opts),
            };
            print!("{}", text);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Eval { expr, trace } => {
            let expr: Expr = serde_json::from_str(expr)
                .map_err(|source| CliError::Argument { flag: "expr", source })?;
            match pipeline.eval(&tree, &expr, *trace) {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(PipelineError::Eval(e)) => {
                    println!("{}", serde_json::json!({ "error": e.to_string(), "code": e.code() }));
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Emit { format, selector } => {
            let values = flatten(&tree).map_err(PipelineError::from)?.values();
            let text = match format {
                EmitFormat::Css => emit::to_css(&values, selector),
                EmitFormat::Json => emit::to_json(&values)? + "\n",
                EmitFormat::Js => emit::to_js_module(&values)?,
            };
            print!("{}", text);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}
