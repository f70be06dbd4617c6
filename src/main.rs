use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use pipeflow::config::{AppConfig, StateBackend};
use pipeflow::demo::{self, DemoOptions, PIPELINE_ID, RAW_INPUT};
use pipeflow::exit_code;
use pipeflow::logging::init_logging;
use pipeflow_core::{ArtifactStore, CachePolicy, Engine, FailurePolicy, FingerprintCache, Invalidate, NoCache,
                    RunOptions, RunStateStore};
use pipeflow_persistence::{FileArtifactStore, FileRunStateStore};
use serde_json::Value;

/// Ejecutor incremental de pipelines
#[derive(Parser, Debug)]
#[command(name = "pipeflow")]
#[command(about = "Incremental pipeline runner with resumable state")]
#[command(version)]
struct Cli {
    /// Directorio del run state (sobrescribe PIPEFLOW_STATE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Directorio de artifacts (sobrescribe PIPEFLOW_ARTIFACT_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    artifact_dir: Option<PathBuf>,

    /// Logging en nivel debug cuando RUST_LOG no está definido
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ejecuta (o retoma) el pipeline de dataset incluido
    Run(RunArgs),
    /// Imprime el run record persistido como JSON
    Status,
    /// Descarta el run record; el próximo run empieza de cero
    Reset,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Steps concurrentes como máximo
    #[arg(short = 'j', long, value_name = "N")]
    jobs: Option<usize>,

    /// fail-fast o best-effort
    #[arg(long, value_name = "POLICY")]
    failure_policy: Option<FailurePolicy>,

    /// Fuerza la re-ejecución de un step (y de lo que depende de él)
    #[arg(long = "invalidate", value_name = "STEP")]
    invalidate: Vec<String>,

    /// Ignora la cache: re-ejecuta todo
    #[arg(long)]
    no_cache: bool,

    /// JSON con los registros crudos; sin él se usa el dataset de ejemplo
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Monto mínimo para conservar una fila
    #[arg(long, value_name = "AMOUNT")]
    min_amount: Option<f64>,

    /// Nombre del dataset en el manifest
    #[arg(long, value_name = "NAME")]
    dataset: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8> {
    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }
    if let Some(dir) = cli.artifact_dir {
        config.artifact_dir = dir;
    }
    let artifacts = FileArtifactStore::open(&config.artifact_dir).with_context(|| {
                                                                      format!("opening artifact dir {}",
                                                                              config.artifact_dir.display())
                                                                  })?;
    match config.state_backend {
        StateBackend::File => {
            let state = FileRunStateStore::open(&config.state_dir).with_context(|| {
                                                                      format!("opening state dir {}",
                                                                              config.state_dir.display())
                                                                  })?;
            execute(Engine::new(artifacts, state), &config, cli.command)
        }
        StateBackend::Postgres => execute_postgres(artifacts, &config, cli.command),
    }
}

#[cfg(feature = "postgres")]
fn execute_postgres(artifacts: FileArtifactStore, config: &AppConfig, command: Command) -> Result<u8> {
    let state = pipeflow_persistence::PgRunStateStore::from_env().context("connecting postgres run state")?;
    execute(Engine::new(artifacts, state), config, command)
}

#[cfg(not(feature = "postgres"))]
fn execute_postgres(_artifacts: FileArtifactStore, _config: &AppConfig, _command: Command) -> Result<u8> {
    bail!("the postgres state backend requires building pipeflow with `--features postgres`")
}

fn execute<S: RunStateStore>(mut engine: Engine<FileArtifactStore, S>, config: &AppConfig, command: Command) -> Result<u8> {
    match command {
        Command::Run(args) => run(&mut engine, config, args),
        Command::Status => {
            let record = engine.record(PIPELINE_ID)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        Command::Reset => {
            engine.state_mut().discard(PIPELINE_ID)?;
            println!("run record for '{PIPELINE_ID}' discarded");
            Ok(0)
        }
    }
}

fn run<S: RunStateStore>(engine: &mut Engine<FileArtifactStore, S>, config: &AppConfig, args: RunArgs) -> Result<u8> {
    match &args.input {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let value: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
            engine.artifacts().put(RAW_INPUT, value)?;
        }
        None => {
            if demo::seed_sample(engine.artifacts())? {
                info!("sample dataset seeded as '{RAW_INPUT}'");
            }
        }
    }

    let defaults = DemoOptions::default();
    let options = DemoOptions { dataset: args.dataset.unwrap_or(defaults.dataset),
                                min_amount: args.min_amount.unwrap_or(defaults.min_amount) };
    let pipeline = demo::build_pipeline(&options)?;
    for step in &args.invalidate {
        if !pipeline.steps().iter().any(|s| s.name() == step) {
            bail!("unknown step '{step}' in --invalidate");
        }
    }

    let invalidate = Invalidate::new(args.invalidate.iter().cloned(), FingerprintCache);
    let cache: &dyn CachePolicy = if args.no_cache {
        &NoCache
    } else if args.invalidate.is_empty() {
        &FingerprintCache
    } else {
        &invalidate
    };
    let run_options = RunOptions::new(args.failure_policy.unwrap_or(config.failure_policy))
        .max_parallel(args.jobs.unwrap_or(config.max_parallel));

    let outcome = pipeline.run_with(engine, cache, &run_options)?;
    for report in &outcome.steps {
        let note = match (&report.failure, report.executed) {
            (Some(f), _) => format!("{:?}: {}", f.kind, f.message),
            (None, true) => "executed".to_string(),
            (None, false) => String::new(),
        };
        println!("{:<12} {:<26} {}", report.step, report.status.label(), note);
    }
    println!("run {} finished: {:?}", outcome.run_id, outcome.status);
    Ok(exit_code(outcome.status))
}
