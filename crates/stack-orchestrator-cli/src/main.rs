// stack-orchestrator-cli/src/main.rs
// ============================================================================
// Crate: stack-orchestrator-cli
// Description: Command-line driver for the stack orchestrator: discovery,
//              compile, (optional) inference, select, hash, lock, run, and
//              seal/bundle commands over the backend-agnostic core.
// Purpose: Wires stack-orchestrator-config, -core, -executor, -scheduler,
//          and -store-sqlite into the single `stack-orchestrator` binary
//          described by spec §6.
// Dependencies: clap, serde_json, stack-orchestrator-config,
//               stack-orchestrator-core, stack-orchestrator-executor,
//               stack-orchestrator-scheduler, stack-orchestrator-store-sqlite,
//               thiserror, time
// ============================================================================

mod content_sources;
mod error;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use stack_orchestrator_config::DiscoveryConfig;
use stack_orchestrator_config::discover;
use stack_orchestrator_config::git_identity;
use stack_orchestrator_core::core::BinaryIdentity;
use stack_orchestrator_core::core::ClusterName;
use stack_orchestrator_core::core::Command as OrchestratorCommand;
use stack_orchestrator_core::core::DEFAULT_HASH_ALGORITHM;
use stack_orchestrator_core::core::DEFAULT_LOCK_TTL_SECONDS;
use stack_orchestrator_core::core::FailMode;
use stack_orchestrator_core::core::LockOwner;
use stack_orchestrator_core::core::NodeId;
use stack_orchestrator_core::core::Plan;
use stack_orchestrator_core::core::ProfileName;
use stack_orchestrator_core::core::ReleaseName;
use stack_orchestrator_core::core::Run;
use stack_orchestrator_core::core::RunId;
use stack_orchestrator_core::core::RunStatus;
use stack_orchestrator_core::core::RunSummary;
use stack_orchestrator_core::core::RunnerConfig;
use stack_orchestrator_core::core::SealedBundle;
use stack_orchestrator_core::core::SelectorSnapshot;
use stack_orchestrator_core::core::SystemClock;
use stack_orchestrator_core::core::Timestamp;
use stack_orchestrator_core::core::hashing;
use stack_orchestrator_core::interfaces::LockManager;
use stack_orchestrator_core::interfaces::NullChartRenderer;
use stack_orchestrator_core::interfaces::RunStore;
use stack_orchestrator_core::runtime::CancellationToken;
use stack_orchestrator_core::runtime::HashContext;
use stack_orchestrator_core::runtime::InferenceOptions;
use stack_orchestrator_core::runtime::SelectorExpression;
use stack_orchestrator_core::runtime::compile;
use stack_orchestrator_core::runtime::dag;
use stack_orchestrator_core::runtime::hasher;
use stack_orchestrator_core::runtime::infer;
use stack_orchestrator_core::runtime::resume as resume_prior;
use stack_orchestrator_core::runtime::seal as seal_plan;
use stack_orchestrator_core::runtime::select;
use stack_orchestrator_core::runtime::unpack_plan;
use stack_orchestrator_core::runtime::verify_bundle;
use stack_orchestrator_executor::HelmExecutorAdapter;
use stack_orchestrator_scheduler::SchedulerConfig;
use stack_orchestrator_scheduler::Supervisor;
use stack_orchestrator_store_sqlite::SqliteStore;
use stack_orchestrator_store_sqlite::SqliteStoreConfig;

use content_sources::FilesystemChartDigestSource;
use content_sources::FilesystemValuesContentSource;
use error::OrchestratorError;

// ============================================================================
// SECTION: CLI surface
// ============================================================================

/// Declarative, dependency-aware Helm release orchestrator.
#[derive(Parser, Debug)]
#[command(name = "stack-orchestrator", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print the orchestrator's version and exit.
    #[arg(long = "version", action = ArgAction::SetTrue)]
    show_version: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile, select, and apply (upgrade-install) the matching releases.
    Apply(ApplyArgs),
    /// Compile, select, and delete (uninstall) the matching releases in
    /// reverse dependency order.
    Delete(DeleteArgs),
    /// Resume the most recent run for a stack, re-running only the releases
    /// that had not yet succeeded.
    Resume(ResumeArgs),
    /// Compile, select, and hash a plan without executing it.
    Plan(PlanArgs),
    /// Sealed, attestable bundle operations (spec §4.11).
    Seal {
        #[command(subcommand)]
        command: SealCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SealCommand {
    /// Compile, select, hash, and seal a plan into a bundle file.
    Export(SealExportArgs),
    /// Verify a previously exported sealed bundle.
    Verify(SealVerifyArgs),
}

/// Selection, inference, and execution options shared by `apply` and
/// `delete`.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Root of the stack to discover.
    #[arg(default_value = ".")]
    stack: PathBuf,
    /// Profile to resolve defaults against.
    #[arg(long)]
    profile: Option<String>,
    /// Restrict to these clusters. May be repeated.
    #[arg(long = "cluster")]
    clusters: Vec<String>,
    /// Restrict to releases carrying any of these tags. May be repeated.
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Restrict to these release names. May be repeated.
    #[arg(long = "release")]
    releases: Vec<String>,
    /// Restrict to releases whose source path starts with this prefix. May
    /// be repeated.
    #[arg(long = "from-path")]
    from_paths: Vec<String>,
    /// Also select every transitive predecessor of the matched releases.
    #[arg(long, action = ArgAction::SetTrue)]
    include_deps: bool,
    /// Also select every transitive successor of the matched releases.
    #[arg(long, action = ArgAction::SetTrue)]
    include_dependents: bool,
    /// Permit a selected release to depend on one that was not selected,
    /// instead of failing.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_missing_deps: bool,
    /// Worker pool size.
    #[arg(long, default_value_t = 1)]
    concurrency: u32,
    /// Enable adaptive concurrency ramp-up.
    #[arg(long, action = ArgAction::SetTrue)]
    progressive: bool,
    /// Retry/failure policy.
    #[arg(long, value_enum, default_value = "fail-fast")]
    fail_mode: FailModeArg,
    /// Maximum attempts per node.
    #[arg(long, default_value_t = 1)]
    max_attempts: u32,
    /// Render charts and propose inferred dependency edges (spec §4.3).
    #[arg(long, action = ArgAction::SetTrue)]
    infer: bool,
    /// When inferring, also propose edges from `ConfigMap`/`Secret`
    /// references.
    #[arg(long, action = ArgAction::SetTrue)]
    infer_config_refs: bool,
    /// Kube context recorded in the effective input hash and passed to Helm.
    #[arg(long)]
    kube_context: Option<String>,
    /// Path to the Helm binary (defaults to `helm` on `PATH`).
    #[arg(long)]
    helm_binary: Option<PathBuf>,
    /// Lock time-to-live, in seconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TTL_SECONDS)]
    lock_ttl_seconds: u64,
    /// Take over a stale lock instead of failing.
    #[arg(long, action = ArgAction::SetTrue)]
    lock_takeover: bool,
    /// Lock owner label (defaults to `host:pid`).
    #[arg(long)]
    lock_owner: Option<String>,
    /// Override the `SQLite` state database path (defaults to
    /// `<stack>/.stack-orchestrator/state.sqlite3`).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

/// Retry/failure policy, mirroring [`FailMode`].
#[derive(ValueEnum, Debug, Clone, Copy)]
enum FailModeArg {
    /// Stop dispatching new nodes on the first failure.
    FailFast,
    /// Keep scheduling unaffected branches.
    Continue,
}

impl From<FailModeArg> for FailMode {
    fn from(value: FailModeArg) -> Self {
        match value {
            FailModeArg::FailFast => Self::FailFast,
            FailModeArg::Continue => Self::Continue,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ApplyArgs {
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug, Clone)]
struct DeleteArgs {
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug, Clone)]
struct SealExportArgs {
    #[command(flatten)]
    run: RunArgs,
    /// Path the sealed bundle is written to.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct ResumeArgs {
    /// Root of the stack whose most recent run should be resumed.
    #[arg(default_value = ".")]
    stack: PathBuf,
    /// Proceed even if effective inputs drifted since the prior run.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_drift: bool,
    /// Kube context recorded in the effective input hash and passed to Helm.
    #[arg(long)]
    kube_context: Option<String>,
    /// Path to the Helm binary (defaults to `helm` on `PATH`).
    #[arg(long)]
    helm_binary: Option<PathBuf>,
    /// Lock owner label (defaults to `host:pid`).
    #[arg(long)]
    lock_owner: Option<String>,
    /// Lock time-to-live, in seconds.
    #[arg(long, default_value_t = DEFAULT_LOCK_TTL_SECONDS)]
    lock_ttl_seconds: u64,
    /// Take over a stale lock instead of failing.
    #[arg(long, action = ArgAction::SetTrue)]
    lock_takeover: bool,
    /// Override the `SQLite` state database path.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct SealVerifyArgs {
    /// Path to a previously exported sealed bundle.
    bundle: PathBuf,
}

// ============================================================================
// SECTION: Entry point and dispatch
// ============================================================================

/// Process entry point: parses arguments, dispatches, and turns the final
/// result into a process exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.0.to_string()),
    }
}

/// Wraps [`OrchestratorError`] as the CLI's top-level error, so every
/// fallible command handler can return a single `?`-friendly type.
#[derive(Debug)]
struct CliError(
    /// The wrapped orchestrator error.
    OrchestratorError,
);

impl From<OrchestratorError> for CliError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

type CliResult<T> = Result<T, CliError>;

/// Parses arguments and dispatches to the selected subcommand.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        write_stdout_line(env!("CARGO_PKG_VERSION")).map_err(io_err)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let exit = match command {
        Commands::Apply(args) => command_apply(args)?,
        Commands::Delete(args) => command_delete(args)?,
        Commands::Resume(args) => command_resume(args)?,
        Commands::Plan(args) => command_plan(args)?,
        Commands::Seal { command } => match command {
            SealCommand::Export(args) => command_seal_export(args)?,
            SealCommand::Verify(args) => command_seal_verify(args)?,
        },
    };
    Ok(exit)
}

/// Lifts a raw I/O failure from an output helper into a [`CliError`].
fn io_err(err: std::io::Error) -> CliError {
    CliError::from(OrchestratorError::BundleIo(err.to_string()))
}

/// Writes a line to standard output.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to standard error.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Writes a one-line failure message and returns the process failure code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

/// Prints the generated `--help` text, the same as `clap` would on a parse
/// error, for the bare no-subcommand invocation.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(io_err)?;
    write_stdout_line("").map_err(io_err)?;
    Ok(())
}

// ============================================================================
// SECTION: Shared plan-building pipeline
// ============================================================================

/// Canonicalizes `path`, falling back to it unchanged if canonicalization
/// fails (e.g. the path does not exist yet).
fn canonicalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Builds the resolved runner configuration for a selected plan.
fn build_runner_config(args: &RunArgs) -> RunnerConfig {
    RunnerConfig {
        concurrency: args.concurrency,
        progressive: args.progressive,
        max_parallel_per_namespace: None,
        max_parallel_kind: BTreeMap::new(),
        parallelism_group_limit: None,
        max_attempts: args.max_attempts,
        fail_mode: args.fail_mode.into(),
    }
}

/// Translates the flat CLI selection flags into a [`SelectorExpression`].
fn build_selector_expr(args: &RunArgs) -> SelectorExpression {
    SelectorExpression {
        clusters: args.clusters.iter().map(|c| ClusterName::new(c.as_str())).collect(),
        tags: args.tags.clone(),
        from_paths: args.from_paths.clone(),
        release_names: args.releases.iter().map(|r| ReleaseName::new(r.as_str())).collect(),
        git_range_paths: None,
        include_deps: args.include_deps,
        include_dependents: args.include_dependents,
        git_include_deps: false,
        git_include_dependents: false,
        allow_missing_deps: args.allow_missing_deps,
    }
}

fn selector_snapshot_of(expr: &SelectorExpression) -> SelectorSnapshot {
    SelectorSnapshot {
        clusters: expr.clusters.clone(),
        tags: expr.tags.clone(),
        from_paths: expr.from_paths.clone(),
        release_names: expr.release_names.clone(),
        git_range: None,
        include_deps: expr.include_deps,
        include_dependents: expr.include_dependents,
    }
}

fn binary_identity() -> BinaryIdentity {
    BinaryIdentity {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("STACK_ORCHESTRATOR_COMMIT").unwrap_or("unknown").to_string(),
    }
}

fn default_lock_owner() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "stack-orchestrator".to_string());
    format!("{host}:{}", std::process::id())
}

fn resolve_db_path(stack_root: &Path, override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| stack_root.join(".stack-orchestrator").join("state.sqlite3"))
}

/// Discovers, compiles, (optionally) infers, selects, and hashes a plan. The
/// result still carries its fully selected `runner` config and per-node
/// effective input hashes, but no run has been created or locked yet.
fn build_plan(args: &RunArgs, stack_root: &Path) -> Result<Plan, OrchestratorError> {
    let universe = discover(stack_root, &DiscoveryConfig::default())?;
    let profile_name = args.profile.as_deref().map(ProfileName::new);
    let mut plan = compile(&universe, profile_name.as_ref())?;
    plan.runner = build_runner_config(args);

    if args.infer {
        let renderer = NullChartRenderer;
        plan = infer(
            &plan,
            &renderer,
            InferenceOptions { enabled: true, include_config_refs: args.infer_config_refs },
        )?;
    }

    let expr = build_selector_expr(args);
    plan = select(&plan, &expr)?;

    let hash_ctx = HashContext {
        stack_git: git_identity(stack_root),
        binary: binary_identity(),
        kube_context: args.kube_context.clone().unwrap_or_default(),
        include_values_contents: true,
        algorithm: DEFAULT_HASH_ALGORITHM,
    };
    let chart_source = FilesystemChartDigestSource::new(stack_root.to_path_buf(), DEFAULT_HASH_ALGORITHM);
    let values_source = FilesystemValuesContentSource;

    let mut nodes = plan.nodes.clone();
    for node in &mut nodes {
        node.effective_input = Some(hasher::compute(node, &hash_ctx, &chart_source, &values_source)?);
    }
    plan.nodes = nodes;

    Ok(plan)
}

// ============================================================================
// SECTION: Lock-guarded run execution
// ============================================================================

/// Everything a run needs once a plan is already selected and hashed.
struct RunContext {
    stack_root: PathBuf,
    store: SqliteStore,
    owner: LockOwner,
    lock_ttl_seconds: u64,
    lock_takeover: bool,
    helm_binary: Option<PathBuf>,
    kube_context: Option<String>,
}

fn run_context(
    stack_root: &Path,
    lock_owner: Option<&str>,
    lock_ttl_seconds: u64,
    lock_takeover: bool,
    helm_binary: Option<&Path>,
    kube_context: Option<&str>,
    db_path: Option<&Path>,
) -> Result<RunContext, OrchestratorError> {
    let db_path = resolve_db_path(stack_root, db_path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).map_err(|err| OrchestratorError::BundleIo(format!("{}: {err}", parent.display())))?;
    }
    let store = SqliteStore::open(&SqliteStoreConfig::new(db_path))?;
    let owner = LockOwner::new(lock_owner.map_or_else(default_lock_owner, ToString::to_string));
    Ok(RunContext {
        stack_root: stack_root.to_path_buf(),
        store,
        owner,
        lock_ttl_seconds,
        lock_takeover,
        helm_binary: helm_binary.map(Path::to_path_buf),
        kube_context: kube_context.map(ToString::to_string),
    })
}

/// Acquires the stack lock, runs a heartbeat thread for its duration, drives
/// the plan through the scheduler, then releases the lock regardless of
/// outcome (spec §4.9).
fn execute_plan_run(
    ctx: &RunContext,
    plan: Plan,
    command_kind: OrchestratorCommand,
    profile: Option<ProfileName>,
    selector: SelectorSnapshot,
    resumes: Option<RunId>,
    seed_attempts: &BTreeMap<NodeId, u32>,
) -> Result<RunSummary, OrchestratorError> {
    let now = Timestamp::from_offset(time::OffsetDateTime::now_utc());
    let lock = ctx
        .store
        .acquire(&ctx.stack_root, &ctx.owner, ctx.lock_ttl_seconds, ctx.lock_takeover, now)?;

    let stop_heartbeat = Arc::new(AtomicBool::new(false));
    let heartbeat_handle = spawn_heartbeat(
        ctx.store.clone(),
        ctx.stack_root.clone(),
        ctx.owner.clone(),
        lock.heartbeat_interval_seconds(),
        Arc::clone(&stop_heartbeat),
    );

    let outcome = run_once(ctx, plan, command_kind, profile, selector, resumes, now, seed_attempts);

    stop_heartbeat.store(true, Ordering::SeqCst);
    let _ = heartbeat_handle.join();
    ctx.store.release(&ctx.stack_root, &ctx.owner)?;

    outcome
}

fn run_once(
    ctx: &RunContext,
    plan: Plan,
    command_kind: OrchestratorCommand,
    profile: Option<ProfileName>,
    selector: SelectorSnapshot,
    resumes: Option<RunId>,
    now: Timestamp,
    seed_attempts: &BTreeMap<NodeId, u32>,
) -> Result<RunSummary, OrchestratorError> {
    let algorithm = DEFAULT_HASH_ALGORITHM;
    let run_id = RunId::new(now.as_run_id_format());
    let plan_hash = hashing::hash_canonical_json(algorithm, &plan)?;
    let sealed_plan_json =
        String::from_utf8(hashing::canonical_json_bytes(&plan)?).map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;

    let run = Run {
        run_id: run_id.clone(),
        command: command_kind,
        profile,
        selector,
        concurrency: plan.runner.concurrency,
        fail_mode: plan.runner.fail_mode,
        sealed_plan_json,
        plan_hash,
        resumes,
    };
    ctx.store.create_run(&run)?;

    let mut executor = HelmExecutorAdapter::new();
    if let Some(binary) = &ctx.helm_binary {
        executor = executor.with_binary(binary.clone());
    }
    if let Some(context) = &ctx.kube_context {
        executor = executor.with_kube_context(context.clone());
    }

    let clock = SystemClock;
    let edges = match command_kind {
        OrchestratorCommand::Apply => plan.edges.clone(),
        OrchestratorCommand::Delete => dag::reversed(&plan.edges),
    };

    let supervisor = Supervisor::new(
        &plan,
        &edges,
        run_id,
        &ctx.store,
        &executor,
        &clock,
        None,
        SchedulerConfig::default(),
        CancellationToken::new(),
        algorithm,
        seed_attempts,
    );
    Ok(supervisor.run(&plan, &run)?)
}

fn spawn_heartbeat(
    store: SqliteStore,
    stack_root: PathBuf,
    owner: LockOwner,
    interval_seconds: u64,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let interval = Duration::from_secs(interval_seconds.max(1));
        while !stop.load(Ordering::SeqCst) {
            thread::sleep(interval);
            if stop.load(Ordering::SeqCst) {
                break;
            }
            let now = Timestamp::from_offset(time::OffsetDateTime::now_utc());
            let _ = store.heartbeat(&stack_root, &owner, now);
        }
    })
}

fn summary_exit_code(summary: &RunSummary) -> ExitCode {
    match summary.status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        RunStatus::Running | RunStatus::Failed | RunStatus::Cancelled => {
            let _ = write_stderr_line(&format!("run {} finished with status {:?}", summary.run_id, summary.status));
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// SECTION: Command handlers
// ============================================================================

fn command_apply(args: ApplyArgs) -> Result<ExitCode, OrchestratorError> {
    run_apply_or_delete(args.run, OrchestratorCommand::Apply)
}

fn command_delete(args: DeleteArgs) -> Result<ExitCode, OrchestratorError> {
    run_apply_or_delete(args.run, OrchestratorCommand::Delete)
}

fn run_apply_or_delete(args: RunArgs, command_kind: OrchestratorCommand) -> Result<ExitCode, OrchestratorError> {
    let stack_root = canonicalize(&args.stack);
    let plan = build_plan(&args, &stack_root)?;
    let profile_name = args.profile.as_deref().map(ProfileName::new);
    let selector = selector_snapshot_of(&build_selector_expr(&args));
    let ctx = run_context(
        &stack_root,
        args.lock_owner.as_deref(),
        args.lock_ttl_seconds,
        args.lock_takeover,
        args.helm_binary.as_deref(),
        args.kube_context.as_deref(),
        args.db_path.as_deref(),
    )?;
    let summary = execute_plan_run(&ctx, plan, command_kind, profile_name, selector, None, &BTreeMap::new())?;
    Ok(summary_exit_code(&summary))
}

fn command_plan(args: PlanArgs) -> Result<ExitCode, OrchestratorError> {
    let stack_root = canonicalize(&args.run.stack);
    let plan = build_plan(&args.run, &stack_root)?;
    let json = serde_json::to_string_pretty(&plan).map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
    write_stdout_line(&json).map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

fn command_seal_export(args: SealExportArgs) -> Result<ExitCode, OrchestratorError> {
    let stack_root = canonicalize(&args.run.stack);
    let plan = build_plan(&args.run, &stack_root)?;
    let stack_git = git_identity(&stack_root);
    let binary = binary_identity();
    let values_source = FilesystemValuesContentSource;

    let bundle = seal_plan(&plan, &stack_git, &binary, &values_source, DEFAULT_HASH_ALGORITHM)?;
    let json = serde_json::to_vec_pretty(&bundle).map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
    fs::write(&args.output, json)
        .map_err(|err| OrchestratorError::BundleIo(format!("{}: {err}", args.output.display())))?;

    write_stdout_line(&format!(
        "sealed bundle written to {} (plan hash {})",
        args.output.display(),
        bundle.attestation.plan_hash
    ))
    .map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

fn command_seal_verify(args: SealVerifyArgs) -> Result<ExitCode, OrchestratorError> {
    let bytes = fs::read(&args.bundle).map_err(|err| OrchestratorError::BundleIo(format!("{}: {err}", args.bundle.display())))?;
    let bundle: SealedBundle = serde_json::from_slice(&bytes).map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;

    verify_bundle(&bundle, DEFAULT_HASH_ALGORITHM, None)?;
    let plan = unpack_plan(&bundle)?;

    write_stdout_line(&format!(
        "bundle verifies: {} node(s), plan hash {}",
        plan.nodes.len(),
        bundle.attestation.plan_hash
    ))
    .map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

fn command_resume(args: ResumeArgs) -> Result<ExitCode, OrchestratorError> {
    let stack_root = canonicalize(&args.stack);
    let db_path = resolve_db_path(&stack_root, args.db_path.as_deref());
    let store = SqliteStore::open(&SqliteStoreConfig::new(db_path))?;

    let prior_run = store.latest_run(&stack_root)?.ok_or(OrchestratorError::NoPriorRun)?;
    let events = store.load_events(&prior_run.run_id)?;

    let universe = discover(&stack_root, &DiscoveryConfig::default())?;
    let mut plan = compile(&universe, prior_run.profile.as_ref())?;
    plan.runner = RunnerConfig { concurrency: prior_run.concurrency, fail_mode: prior_run.fail_mode, ..RunnerConfig::default() };

    let hash_ctx = HashContext {
        stack_git: git_identity(&stack_root),
        binary: binary_identity(),
        kube_context: args.kube_context.clone().unwrap_or_default(),
        include_values_contents: true,
        algorithm: DEFAULT_HASH_ALGORITHM,
    };
    let chart_source = FilesystemChartDigestSource::new(stack_root.clone(), DEFAULT_HASH_ALGORITHM);
    let values_source = FilesystemValuesContentSource;

    let mut nodes = plan.nodes.clone();
    for node in &mut nodes {
        node.effective_input = Some(hasher::compute(node, &hash_ctx, &chart_source, &values_source)?);
    }
    plan.nodes = nodes;

    let decision = resume_prior(&prior_run, &events, &plan, &hash_ctx, &chart_source, &values_source, args.allow_drift)?;
    for entry in &decision.drift {
        let _ = write_stderr_line(&format!("drift: {} {}", entry.node_id, entry.detail));
    }

    let remaining: Vec<ReleaseName> = plan
        .nodes
        .iter()
        .filter(|node| !decision.already_succeeded.contains(&node.id))
        .map(|node| node.name.clone())
        .collect();

    if remaining.is_empty() {
        write_stdout_line(&format!("run {} resumed with nothing left to do", prior_run.run_id))
            .map_err(|err| OrchestratorError::BundleIo(err.to_string()))?;
        return Ok(ExitCode::SUCCESS);
    }

    let expr = SelectorExpression { release_names: remaining, allow_missing_deps: true, ..SelectorExpression::default() };
    let sub_plan = select(&plan, &expr)?;
    let selector = selector_snapshot_of(&expr);

    let ctx = run_context(
        &stack_root,
        args.lock_owner.as_deref(),
        args.lock_ttl_seconds,
        args.lock_takeover,
        args.helm_binary.as_deref(),
        args.kube_context.as_deref(),
        args.db_path.as_deref(),
    )?;
    let summary = execute_plan_run(
        &ctx,
        sub_plan,
        prior_run.command,
        prior_run.profile.clone(),
        selector,
        Some(prior_run.run_id),
        &decision.seed_attempts,
    )?;
    Ok(summary_exit_code(&summary))
}
