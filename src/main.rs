//! Stackshift CLI entrypoint.
//!
//! This is the main entrypoint for the stackshift command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stackshift::backend::{CloudFormationBackend, DryRunBackend, ParameterMappings, ParameterSource};
use stackshift::changeset::{ChangeSet, GitDiff};
use stackshift::cli::{ChangeArgs, Cli, Commands, LogFormat, OutputFormatter, RunArgs};
use stackshift::config::{BackendKind, ConfigParser, ConfigValidator, DeployConfig, find_config_file};
use stackshift::error::Result;
use stackshift::executor::{Backend, Executor};
use stackshift::graph::StagedPlan;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.format);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Changes { changes } => cmd_changes(config_path, &changes, &formatter),
        Commands::Plan { changes } => cmd_plan(config_path, &changes, &formatter),
        Commands::Deploy { changes, run } => cmd_deploy(config_path, &changes, &run, &formatter).await,
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
    }
}

/// Show the detected change set.
fn cmd_changes(config_path: Option<&PathBuf>, args: &ChangeArgs, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (parser, mut config) = load_config(config_path)?;
    args.apply(&mut config);
    ConfigValidator::new().validate_with_graph(&config, parser.base_path())?;

    let changes = detect_changes(&parser, &config)?;
    println!("{}", formatter.format_change_set(&changes));
    Ok(ExitCode::SUCCESS)
}

/// Show the dependency layers and the staged order of the changes.
fn cmd_plan(config_path: Option<&PathBuf>, args: &ChangeArgs, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (parser, mut config) = load_config(config_path)?;
    args.apply(&mut config);
    let (_, graph) = ConfigValidator::new().validate_with_graph(&config, parser.base_path())?;

    let changes = detect_changes(&parser, &config)?;
    let plan = StagedPlan::build(&graph, &changes)?;

    println!("{}", formatter.format_plan(&plan));
    Ok(ExitCode::SUCCESS)
}

/// Detect changes and apply them.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    changes_args: &ChangeArgs,
    run_args: &RunArgs,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (parser, mut config) = load_config(config_path)?;
    changes_args.apply(&mut config);
    run_args.apply(&mut config);

    let (validation, graph) = ConfigValidator::new().validate_with_graph(&config, parser.base_path())?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let changes = detect_changes(&parser, &config)?;
    if changes.is_empty() {
        info!("No changes to deploy");
        println!("{}", formatter.format_change_set(&changes));
        return Ok(ExitCode::SUCCESS);
    }

    let backend = create_backend(&parser, &config).await?;
    let executor = Executor::new(config.executor.options());

    let outcome = if config.executor.staged {
        executor.run_staged(&changes, backend, &graph).await
    } else {
        executor.run(&changes, backend).await
    };

    match outcome {
        Ok(result) => {
            println!("{}", formatter.format_result(&result));
            Ok(if result.has_errors {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(e) => {
            if let Some(partial) = e.partial_result() {
                println!("{}", formatter.format_result(partial));
            }
            Err(e)
        }
    }
}

/// Validate the configuration and the dependency graph.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (parser, config) = load_config(config_path)?;

    let (result, graph) = ConfigValidator::new().check_with_graph(&config, parser.base_path());
    println!("{}", formatter.format_validation(&result, show_warnings));
    let Some(graph) = graph.filter(|_| result.is_valid()) else {
        return Ok(ExitCode::FAILURE);
    };

    eprintln!("\nConfiguration summary:");
    eprintln!("  Backend: {}", config.backend.kind);
    eprintln!("  Mode: {}", config.executor.options().mode());
    eprintln!("  Staged: {}", config.executor.staged);
    eprintln!("  Dependencies: {} resources, {} edges", graph.len(), graph.edge_count());

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path, if one exists.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Option<PathBuf> {
    config_path.cloned().or_else(|| find_config_file(".").ok())
}

/// Loads configuration, `.env` and environment overrides.
///
/// Without a configuration file every section takes its default.
fn load_config(config_path: Option<&PathBuf>) -> Result<(ConfigParser, DeployConfig)> {
    let Some(config_file) = resolve_config_path(config_path) else {
        debug!("No configuration file found, using defaults");
        let parser = ConfigParser::new();
        parser.load_dotenv()?;
        let mut config = DeployConfig::default();
        ConfigParser::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        return Ok((parser, config));
    };

    debug!("Loading configuration from: {}", config_file.display());
    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((parser, config))
}

/// Detects the changes configured in `config.changes`.
fn detect_changes(parser: &ConfigParser, config: &DeployConfig) -> Result<ChangeSet> {
    let mut detector = GitDiff::new(parser.resolve(&config.changes.repo));
    if let Some(filter) = &config.changes.filter {
        detector = detector.with_filter(filter)?;
    }
    detector.diff(config.changes.base.as_deref())
}

/// Creates the configured backend.
async fn create_backend(parser: &ConfigParser, config: &DeployConfig) -> Result<Arc<dyn Backend>> {
    let settings = &config.backend.cloudformation;

    let mut parameters = ParameterSource::new(parser.resolve(&settings.parameter_dir), settings.environment.clone())
        .with_defaults(settings.parameters.clone());
    if let Some(mappings) = &settings.parameter_mappings {
        parameters = parameters.with_mappings(ParameterMappings::load_file(parser.resolve(mappings))?);
    }

    let backend: Arc<dyn Backend> = match config.backend.kind {
        BackendKind::DryRun => Arc::new(DryRunBackend::new().with_parameters(parameters)),
        BackendKind::Cloudformation => Arc::new(
            CloudFormationBackend::connect(settings.clone(), parameters, parser.resolve(&config.changes.repo)).await?,
        ),
    };

    info!("Using backend: {}", backend.name());
    Ok(backend)
}
