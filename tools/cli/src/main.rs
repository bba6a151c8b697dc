//! docsync CLI - keep a folder of local documents mirrored into a
//! cloud-synced folder in another format.
//!
//! `init` registers a pair of roots, `update` runs one sync pass, `status`
//! shows what the next pass would do.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use docsync_common::{DocFormat, DocName};
use docsync_convert::{Converter, PandocConverter, PassthroughConverter};
use docsync_storage::RootLock;
use docsync_sync::{
    ConflictStrategy, InitOptions, PassReport, Registry, SyncEngine, SyncOptions, LOCK_FILE_NAME,
};

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "docsync - Mirror local documents into a cloud-synced folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a local root against a remote root.
    Init {
        /// Directory holding the local documents (and the registry).
        local_root: PathBuf,

        /// Directory kept in sync with the cloud by an external client.
        remote_root: PathBuf,

        /// Format of local documents.
        #[arg(long, default_value = "md")]
        local_format: DocFormat,

        /// Format of remote documents.
        #[arg(long, default_value = "docx")]
        remote_format: DocFormat,

        /// Replace an existing registry.
        #[arg(short, long)]
        force: bool,

        /// Run `git init` in the local root if it is not a repository yet.
        #[arg(long)]
        init_git: bool,
    },

    /// Run one sync pass.
    Update {
        #[command(flatten)]
        pass: PassArgs,

        /// Emit the pass report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show what the next pass would do without changing anything.
    Status {
        #[command(flatten)]
        pass: PassArgs,

        /// Emit the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Stop tracking a document. Neither file is deleted.
    Untrack {
        /// Local or remote file name of the pair.
        name: String,

        /// Local root containing the registry (default: current directory).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct PassArgs {
    /// Local root containing the registry (default: current directory).
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Restrict the pass to one document, by local or remote file name.
    #[arg(long)]
    only: Option<String>,

    /// How to settle documents edited on both sides.
    #[arg(long, value_enum, default_value_t = Strategy::Newest)]
    strategy: Strategy,

    /// Remote files modified this recently are flagged as possibly incomplete.
    #[arg(long, default_value_t = 2)]
    settle_secs: u64,

    /// Copy bytes instead of converting with pandoc.
    #[arg(long)]
    passthrough: bool,

    /// Also pick up remote documents with no local counterpart.
    #[arg(long)]
    import_remote: bool,
}

impl PassArgs {
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            settle_window_secs: self.settle_secs,
            conflict_strategy: self.strategy.into(),
            import_remote: self.import_remote,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// The more recently modified side wins; ties go to local.
    Newest,
    /// Local always wins.
    Local,
    /// Remote always wins.
    Remote,
}

impl From<Strategy> for ConflictStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Newest => ConflictStrategy::LastWriteWins,
            Strategy::Local => ConflictStrategy::PreferLocal,
            Strategy::Remote => ConflictStrategy::PreferRemote,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init {
            local_root,
            remote_root,
            local_format,
            remote_format,
            force,
            init_git,
        } => {
            cmd_init(
                &local_root,
                &remote_root,
                local_format,
                remote_format,
                force,
                init_git,
            )
            .await
        }

        Commands::Update { pass, json } => cmd_update(&pass, json).await,

        Commands::Status { pass, json } => cmd_status(&pass, json).await,

        Commands::Untrack { name, path } => cmd_untrack(&name, path.as_deref()).await,

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "docsync", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Local root named by `--path`, or the current directory.
fn local_root(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

fn parse_scope(only: Option<&str>) -> Result<Option<DocName>> {
    only.map(|name| DocName::parse(name).context("Invalid document name"))
        .transpose()
}

/// Build an engine for the pass, checking that pandoc is usable first.
async fn build_engine(args: &PassArgs) -> Result<SyncEngine<dyn Converter>> {
    let converter: Arc<dyn Converter> = if args.passthrough {
        Arc::new(PassthroughConverter)
    } else {
        let pandoc = PandocConverter::new();
        if !pandoc.is_available().await {
            anyhow::bail!("pandoc was not found on PATH; install it or use --passthrough");
        }
        Arc::new(pandoc)
    };

    Ok(SyncEngine::from_arc(converter, args.sync_options()))
}

async fn load_registry(registry_path: &Path) -> Result<Registry> {
    Registry::load(registry_path)
        .await
        .with_context(|| format!("Failed to read registry {}", registry_path.display()))?
        .with_context(|| {
            format!(
                "No registry at {}; run `docsync init` first",
                registry_path.display()
            )
        })
}

/// Register a local root and a remote root.
async fn cmd_init(
    local_root: &Path,
    remote_root: &Path,
    local_format: DocFormat,
    remote_format: DocFormat,
    force: bool,
    init_git: bool,
) -> Result<()> {
    if local_format == remote_format {
        anyhow::bail!("Local and remote formats must differ");
    }

    let local_root = tokio::fs::canonicalize(local_root)
        .await
        .with_context(|| format!("Local root {} does not exist", local_root.display()))?;
    let remote_root = tokio::fs::canonicalize(remote_root)
        .await
        .with_context(|| format!("Remote root {} does not exist", remote_root.display()))?;

    let registry_path = Registry::default_path(&local_root);
    let engine = SyncEngine::new(PassthroughConverter, SyncOptions::default());
    let init = InitOptions {
        local_root: local_root.clone(),
        remote_root: remote_root.clone(),
        local_format,
        remote_format,
        force,
    };
    engine
        .initialize(&registry_path, &init)
        .await
        .context("Failed to initialize")?;

    if init_git {
        init_git_repository(&local_root).await?;
    }

    println!("Tracking initialized!");
    println!("  Local: {} (.{})", local_root.display(), local_format.extension());
    println!("  Remote: {} (.{})", remote_root.display(), remote_format.extension());
    println!("  Registry: {}", registry_path.display());

    Ok(())
}

async fn init_git_repository(root: &Path) -> Result<()> {
    if root.join(".git").exists() {
        info!("{} is already a git repository", root.display());
        return Ok(());
    }

    let status = tokio::process::Command::new("git")
        .arg("init")
        .current_dir(root)
        .status()
        .await
        .context("Failed to run git")?;
    if !status.success() {
        anyhow::bail!("git init failed in {} ({})", root.display(), status);
    }
    println!("Initialized git repository in {}", root.display());
    Ok(())
}

/// Run one sync pass.
async fn cmd_update(args: &PassArgs, json: bool) -> Result<()> {
    let root = local_root(args.path.as_deref())?;
    let registry_path = Registry::default_path(&root);
    let scope = parse_scope(args.only.as_deref())?;

    let _lock = RootLock::acquire(root.join(LOCK_FILE_NAME)).context("Failed to lock registry")?;
    let engine = build_engine(args).await?;

    let abort = engine.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing the current document");
            abort.abort();
        }
    });

    let report = engine
        .sync(&registry_path, scope.as_ref())
        .await
        .context("Sync failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.aborted {
        anyhow::bail!("Sync interrupted; remaining documents were skipped");
    }
    if report.has_failures() {
        anyhow::bail!("{} document(s) failed to sync", report.failed());
    }
    Ok(())
}

fn print_report(report: &PassReport) {
    if report.pairs.is_empty() {
        println!("Nothing to sync.");
    }
    for entry in &report.pairs {
        let note = if entry.possibly_incomplete {
            " [remote may still be uploading]"
        } else {
            ""
        };
        println!(
            "  {} <-> {}: {}{}",
            entry.local_path, entry.remote_path, entry.outcome, note
        );
    }

    println!(
        "{} synced, {} unchanged, {} conflicts, {} failed",
        report.synced(),
        report.unchanged(),
        report.conflicts(),
        report.failed()
    );
    println!(
        "Sync completed at {}",
        report
            .completed_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
}

/// Show the classification of every document in scope.
async fn cmd_status(args: &PassArgs, json: bool) -> Result<()> {
    let root = local_root(args.path.as_deref())?;
    let registry = load_registry(&Registry::default_path(&root)).await?;
    let scope = parse_scope(args.only.as_deref())?;

    let engine = SyncEngine::new(PassthroughConverter, args.sync_options());
    let plan = engine
        .plan(&registry, scope.as_ref())
        .await
        .context("Failed to inspect roots")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Local: {}", registry.local_root.display());
    println!("Remote: {}", registry.remote_root.display());
    if let Some(at) = registry.last_synced_at {
        println!(
            "Last changed by a sync at {}",
            at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if plan.is_empty() {
        println!("No documents tracked.");
    }
    for detection in &plan {
        let label = if detection.stale {
            "both-missing".to_string()
        } else {
            detection.classification.to_string()
        };
        println!(
            "  {} <-> {}: {}",
            detection.local_path, detection.remote_path, label
        );
    }
    Ok(())
}

/// Remove a pair from the registry.
async fn cmd_untrack(name: &str, path: Option<&Path>) -> Result<()> {
    let root = local_root(path)?;
    let registry_path = Registry::default_path(&root);
    let name = DocName::parse(name).context("Invalid document name")?;

    let _lock = RootLock::acquire(root.join(LOCK_FILE_NAME)).context("Failed to lock registry")?;
    let mut registry = load_registry(&registry_path).await?;

    let local = registry
        .find(&name)
        .map(|pair| pair.local_path.clone())
        .with_context(|| format!("{} is not tracked", name))?;
    registry.remove_pair(&local);
    registry
        .save(&registry_path)
        .await
        .context("Failed to save registry")?;

    println!("Stopped tracking {}", local);
    Ok(())
}
