//! selfpatch - autonomous patch-and-evaluate loop
//!
//! ## Commands
//!
//! - `improve`: run one baseline → diagnose → patch → re-evaluate cycle
//! - `evaluate`: evaluate a patch file against a task subset
//! - `validate`: check that a file is a well-formed unified diff

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use selfpatch_core::telemetry::level_for;
use selfpatch_core::{
    build_backend, AuditTrail, BackendKind, ContainerSandboxManager, EvaluationClient,
    EvaluationMode, ImproveDriver, InvalidPatchPolicy, LogContext, Patch, SandboxManager,
    SelfPatchConfig, SimulatedEvaluationClient, SubsetCatalog, CYCLE_LABEL,
};
use selfpatch_harness::HarnessEvaluationClient;

#[derive(Parser)]
#[command(name = "selfpatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose, patch and re-evaluate a codebase with a language model", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one improvement cycle for a task entry
    Improve {
        /// Task entry to diagnose (e.g. django__django-10973)
        #[arg(long, env = "SELFPATCH_ENTRY")]
        entry: String,

        /// Model name passed to the backend
        #[arg(long)]
        model: Option<String>,

        /// Language-model backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        #[command(flatten)]
        eval: EvalArgs,

        /// Evaluation client
        #[arg(long, value_enum)]
        eval_mode: Option<EvalModeArg>,

        /// Fail the cycle when the generated patch is malformed
        #[arg(long)]
        fail_fast_invalid_patch: bool,

        /// TOML configuration file
        #[arg(long, env = "SELFPATCH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Evaluate a patch file and print the report JSON
    Evaluate {
        /// Patch file; an empty file evaluates the unpatched tree
        #[arg(long)]
        patch_path: PathBuf,

        /// Label naming the report directory
        #[arg(long)]
        run_label: String,

        #[command(flatten)]
        eval: EvalArgs,

        /// Evaluation client
        #[arg(long, value_enum)]
        eval_mode: Option<EvalModeArg>,

        /// TOML configuration file
        #[arg(long, env = "SELFPATCH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Check that a file is a well-formed unified diff
    Validate {
        /// Patch file to check
        patch_file: PathBuf,
    },
}

#[derive(clap::Args)]
struct EvalArgs {
    /// Task subset name
    #[arg(long, value_parser = ["small", "medium", "big"])]
    subset: Option<String>,

    /// Number of instances to evaluate
    #[arg(long)]
    num_instances: Option<usize>,

    /// Parallel workers inside the harness
    #[arg(long)]
    max_workers: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Anthropic,
    Openai,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Anthropic => BackendKind::Anthropic,
            BackendArg::Openai => BackendKind::OpenAi,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EvalModeArg {
    Simulated,
    Harness,
}

impl From<EvalModeArg> for EvaluationMode {
    fn from(arg: EvalModeArg) -> Self {
        match arg {
            EvalModeArg::Simulated => EvaluationMode::Simulated,
            EvalModeArg::Harness => EvaluationMode::Harness,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    selfpatch_core::init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Improve {
            entry,
            model,
            backend,
            eval,
            eval_mode,
            fail_fast_invalid_patch,
            config,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(model) = model {
                cfg.backend.model = model;
            }
            if let Some(backend) = backend {
                cfg.backend.kind = backend.into();
            }
            if fail_fast_invalid_patch {
                cfg.invalid_patch_policy = InvalidPatchPolicy::FailFast;
            }
            apply_eval_args(&mut cfg, &eval, eval_mode);
            cfg.validate().context("invalid configuration")?;
            cmd_improve(cfg, &entry).await
        }
        Commands::Evaluate {
            patch_path,
            run_label,
            eval,
            eval_mode,
            config,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            apply_eval_args(&mut cfg, &eval, eval_mode);
            cfg.validate().context("invalid configuration")?;
            cmd_evaluate(cfg, &patch_path, &run_label).await
        }
        Commands::Validate { patch_file } => cmd_validate(&patch_file),
    }
}

fn load_config(path: Option<&Path>) -> Result<SelfPatchConfig> {
    SelfPatchConfig::load(path).context("Failed to load configuration")
}

fn apply_eval_args(cfg: &mut SelfPatchConfig, args: &EvalArgs, mode: Option<EvalModeArg>) {
    if let Some(subset) = &args.subset {
        cfg.evaluation.subset = subset.clone();
    }
    if let Some(n) = args.num_instances {
        cfg.evaluation.num_instances = n;
    }
    if let Some(w) = args.max_workers {
        cfg.evaluation.max_workers = w;
    }
    if let Some(mode) = mode {
        cfg.evaluation.mode = mode.into();
    }
}

fn build_sandbox(cfg: &SelfPatchConfig, log: &LogContext) -> Result<Arc<dyn SandboxManager>> {
    let manager = ContainerSandboxManager::new(cfg.sandbox.clone(), log.clone())
        .context("Failed to configure sandbox manager")?;
    Ok(Arc::new(manager))
}

fn build_evaluator(
    cfg: &SelfPatchConfig,
    sandbox: Arc<dyn SandboxManager>,
    audit: &AuditTrail,
    log: &LogContext,
) -> Arc<dyn EvaluationClient> {
    let catalog = SubsetCatalog::new(cfg.evaluation.subsets_dir.clone());
    match cfg.evaluation.mode {
        EvaluationMode::Simulated => Arc::new(SimulatedEvaluationClient::new(
            catalog,
            sandbox,
            audit.clone(),
            log.clone(),
        )),
        EvaluationMode::Harness => Arc::new(
            HarnessEvaluationClient::new(
                catalog,
                cfg.evaluation.harness.clone(),
                audit.clone(),
                log.clone(),
            )
            .with_workdir(cfg.workdir.clone()),
        ),
    }
}

async fn cmd_improve(cfg: SelfPatchConfig, entry: &str) -> Result<()> {
    let log = LogContext::cycle(CYCLE_LABEL, entry);
    let audit = AuditTrail::new(cfg.audit_dir.clone());

    let backend = build_backend(&cfg.backend).context("Failed to build language-model backend")?;
    let sandbox = build_sandbox(&cfg, &log)?;
    let evaluator = build_evaluator(&cfg, sandbox.clone(), &audit, &log);

    info!(
        backend = %cfg.backend.kind,
        model = %cfg.backend.model,
        eval_mode = %cfg.evaluation.mode,
        "Starting improvement cycle"
    );

    let driver = ImproveDriver::new(backend, sandbox, evaluator, audit, log)
        .with_policy(cfg.invalid_patch_policy)
        .with_evaluation(cfg.evaluation.clone());
    let outcome = driver.run(entry).await?;

    let delta = &outcome.delta;
    println!("Entry: {}", outcome.entry);
    println!(
        "Patch: {} ({})",
        if outcome.validation.well_formed { "well-formed" } else { "malformed" },
        if outcome.apply.ok { "applied" } else { "not applied" }
    );
    println!(
        "Resolved: {} -> {} (net {:+})",
        delta.baseline_resolved,
        delta.post_resolved,
        delta.net()
    );
    for id in &delta.newly_resolved {
        println!("  + {}", id);
    }
    for id in &delta.regressed {
        println!("  - {}", id);
    }
    if let Some(path) = &outcome.summary_path {
        println!("Summary: {}", path.display());
    }
    Ok(())
}

async fn cmd_evaluate(cfg: SelfPatchConfig, patch_path: &Path, run_label: &str) -> Result<()> {
    let log = LogContext::standalone(run_label);
    let audit = AuditTrail::new(cfg.audit_dir.clone());
    let sandbox = build_sandbox(&cfg, &log)?;
    let evaluator = build_evaluator(&cfg, sandbox, &audit, &log);

    let request = cfg.evaluation.request(patch_path, run_label);
    let report = evaluator
        .evaluate(&request)
        .await
        .with_context(|| format!("Evaluation '{}' failed", run_label))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_validate(patch_file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(patch_file)
        .with_context(|| format!("Failed to read {}", patch_file.display()))?;
    let patch = Patch::from_model_output(text);

    if patch.is_well_formed() {
        println!("✓ {} is a well-formed unified diff", patch_file.display());
        for file in patch.touched_files() {
            println!("  {}", file);
        }
        Ok(())
    } else {
        let missing = patch.flags().missing();
        anyhow::bail!(
            "{} is not a well-formed unified diff (missing: {})",
            patch_file.display(),
            if missing.is_empty() {
                "content".to_string()
            } else {
                missing.join(", ")
            }
        )
    }
}
