//! Command-line shell for the batch transformation engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use vmx_core::catalog::{Catalog, ParamMap, ParamValue};
use vmx_core::config::ConfigManager;
use vmx_core::engine::{EngineConfig, ExecutionEngine, ExecutionState, JobEvent};
use vmx_core::executor::FfmpegRunner;
use vmx_core::jobs::{discovery, JobRequest, PlanOrdering, Planner, TaskStatus};

#[derive(Parser)]
#[command(name = "vmx", version, about = "Batch video transformation engine")]
struct Cli {
    /// Settings file (created with defaults if missing).
    #[arg(long, global = true, default_value = "vmx.toml")]
    config: PathBuf,

    /// Verbose diagnostics (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the operation catalog.
    List,
    /// Plan and run a job over the given inputs.
    Run {
        /// Input video files or directories to scan.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Operation ids to apply, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        ops: Vec<String>,

        /// Output directory (defaults to the configured one).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Parameter override as `<op>.<name>=<value>`. Repeatable.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Run operations in the order given instead of catalog order.
        #[arg(long)]
        as_selected: bool,

        /// Worker pool size override (0 = machine parallelism).
        #[arg(long)]
        pool: Option<usize>,

        /// Per-task timeout override in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Emit events as JSON lines instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::List => list_catalog(),
        Command::Run {
            inputs,
            ops,
            output,
            params,
            as_selected,
            pool,
            timeout_secs,
            json,
        } => {
            let opts = RunOptions {
                inputs,
                ops,
                output,
                params,
                as_selected,
                pool,
                timeout_secs,
                json,
            };
            run_job(&cli.config, opts)
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn list_catalog() -> Result<()> {
    let catalog = Catalog::builtin();
    for category in vmx_core::catalog::Category::ALL {
        let ops = catalog.list_category(category);
        if ops.is_empty() {
            continue;
        }
        println!("{}:", category.as_str());
        for op in ops {
            if op.params.is_empty() {
                println!("  {:<22}{}", op.id, op.name);
            } else {
                let names: Vec<&str> = op.params.iter().map(|p| p.name).collect();
                println!("  {:<22}{} [{}]", op.id, op.name, names.join(", "));
            }
        }
        println!();
    }
    Ok(())
}

struct RunOptions {
    inputs: Vec<PathBuf>,
    ops: Vec<String>,
    output: Option<PathBuf>,
    params: Vec<String>,
    as_selected: bool,
    pool: Option<usize>,
    timeout_secs: Option<u64>,
    json: bool,
}

fn run_job(config_path: &PathBuf, opts: RunOptions) -> Result<()> {
    let json = opts.json;

    let mut config = ConfigManager::new(config_path);
    config.load_or_create().context("loading settings")?;
    config.ensure_dirs_exist().context("creating directories")?;

    let inputs = discovery::expand_inputs(&opts.inputs).context("expanding inputs")?;
    if inputs.is_empty() {
        bail!("no video files found in the given inputs");
    }

    let request = JobRequest {
        operation_ids: opts.ops,
        overrides: parse_overrides(&opts.params)?,
        inputs,
        output_dir: opts.output.unwrap_or_else(|| config.output_folder()),
        ordering: if opts.as_selected {
            PlanOrdering::AsSelected
        } else {
            PlanOrdering::Catalog
        },
    };

    let planner = Planner::new(Catalog::builtin());
    let job = planner.plan(&request).context("planning job")?;
    tracing::debug!(
        job_id = %job.id,
        files = job.inputs.len(),
        operations = job.operations.len(),
        "job planned"
    );

    if !json {
        println!(
            "Job {}: {} files x {} operations",
            job.id,
            job.inputs.len(),
            job.operations.len()
        );
    }

    let runner = Arc::new(FfmpegRunner::new(config.settings().materials.clone()));
    let mut engine_config = EngineConfig::from_settings(config.settings());
    if let Some(pool) = opts.pool {
        engine_config.pool_size = pool;
    }
    if let Some(secs) = opts.timeout_secs {
        engine_config.task_timeout = std::time::Duration::from_secs(secs);
    }
    let engine = Arc::new(ExecutionEngine::new(engine_config, runner));

    // Ctrl-C requests a cooperative stop; in-flight invocations
    // finish, nothing new is dispatched.
    {
        let engine = Arc::clone(&engine);
        ctrlc::set_handler(move || engine.stop()).context("installing interrupt handler")?;
    }

    let handle = engine.start(job).context("starting job")?;
    let events = handle.subscribe();

    let terminal = loop {
        let event = events.recv().context("event stream closed")?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
            if let JobEvent::JobStateChanged { new, reason, .. } = event {
                if new.is_terminal() {
                    break (new, reason);
                }
            }
            continue;
        }
        match event {
            JobEvent::TaskStarted { file, operation } => {
                println!(
                    "> {} :: {}",
                    file.file_name().unwrap_or_default().to_string_lossy(),
                    operation
                );
            }
            JobEvent::TaskFinished {
                file,
                operation,
                status,
                error,
            } => {
                let name = file.file_name().unwrap_or_default().to_string_lossy().to_string();
                match status {
                    TaskStatus::Failed => {
                        eprintln!(
                            "! {} :: {} failed: {}",
                            name,
                            operation,
                            error.unwrap_or_default()
                        );
                    }
                    TaskStatus::Skipped => {
                        println!("- {} :: {} skipped", name, operation);
                    }
                    _ => {}
                }
            }
            JobEvent::JobProgress { completed, total } => {
                println!("[{}/{}]", completed, total);
            }
            JobEvent::JobStateChanged { new, reason, .. } => {
                if new.is_terminal() {
                    break (new, reason);
                }
            }
        }
    };

    match terminal {
        (ExecutionState::Completed, _) => {
            if !json {
                println!("Done.");
            }
            Ok(())
        }
        (ExecutionState::Cancelled, _) => {
            if !json {
                println!("Stopped.");
            }
            Ok(())
        }
        (state, reason) => bail!(
            "job ended in state {}: {}",
            state.as_str(),
            reason.unwrap_or_default()
        ),
    }
}

/// Parse `<op>.<name>=<value>` override flags into per-operation maps.
fn parse_overrides(flags: &[String]) -> Result<BTreeMap<String, ParamMap>> {
    let mut overrides: BTreeMap<String, ParamMap> = BTreeMap::new();
    for flag in flags {
        let (key, value) = flag
            .split_once('=')
            .with_context(|| format!("invalid --param '{}', expected op.name=value", flag))?;
        let (op, name) = key
            .split_once('.')
            .with_context(|| format!("invalid --param '{}', expected op.name=value", flag))?;

        let parsed = if let Ok(int) = value.parse::<i64>() {
            ParamValue::Int(int)
        } else if let Ok(float) = value.parse::<f64>() {
            ParamValue::Float(float)
        } else {
            ParamValue::Text(value.to_string())
        };

        overrides
            .entry(op.to_string())
            .or_default()
            .insert(name.to_string(), parsed);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_overrides() {
        let flags = vec![
            "encode.crf=20".to_string(),
            "rotate.max_degrees=2.5".to_string(),
            "mirror.direction=vertical".to_string(),
        ];
        let overrides = parse_overrides(&flags).unwrap();
        assert_eq!(overrides["encode"]["crf"], ParamValue::Int(20));
        assert_eq!(overrides["rotate"]["max_degrees"], ParamValue::Float(2.5));
        assert_eq!(
            overrides["mirror"]["direction"],
            ParamValue::Text("vertical".into())
        );
    }

    #[test]
    fn rejects_malformed_override() {
        assert!(parse_overrides(&["encode-crf-20".to_string()]).is_err());
        assert!(parse_overrides(&["crf=20".to_string()]).is_err());
    }
}
