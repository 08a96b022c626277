//! livelink - Live Photo link repair tool
//!
//! Finds image/video pairs that belong to the same Live Photo but lost their
//! link, links them through the photo server API, and can reverse a previous
//! run from its ledger.
//!
//! Back up the photo server database before a full run, and start with
//! `--dry-run` and `--test-run`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use livelink::confirm;
use livelink::ledger::{outstanding_links, unapplied_proposals};
use livelink::matcher::{MatchReport, UnmatchedReason};
use livelink::{
    ImmichClient, Ledger, LinkExecutor, MatchPolicy, PairMatcher, PgAssetStore, RunMode,
    UnlinkExecutor,
};
use livelink_common::config::{resolve_config_path, TomlConfig};
use livelink_common::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status for fatal errors (connectivity, validation, ledger I/O)
const FATAL_EXIT: u8 = 2;

/// Command-line arguments for livelink
#[derive(Parser, Debug)]
#[command(name = "livelink")]
#[command(about = "Find and repair unlinked Live Photo image/video pairs")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify unlinked pairs and link them
    Link {
        /// Link the unapplied proposals of an earlier ledger instead of
        /// identifying pairs (no database access)
        #[arg(long, value_name = "LEDGER")]
        from_ledger: Option<PathBuf>,

        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Reverse the links recorded in a previous ledger
    Unlink {
        /// Ledger file written by a previous link run
        #[arg(long)]
        ledger: PathBuf,

        #[command(flatten)]
        mode: ModeArgs,
    },
    /// Check server, credentials and database connectivity
    Check,
}

#[derive(Args, Debug, Clone, Copy)]
struct ModeArgs {
    /// Identify and record proposals without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Process only the first item
    #[arg(long, conflicts_with = "dry_run")]
    test_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl ModeArgs {
    fn run_mode(&self) -> RunMode {
        RunMode::from_flags(self.dry_run, self.test_run)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config_path(cli.config.as_deref()).and_then(|p| TomlConfig::load(&p)) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("{}", e);
            return ExitCode::from(FATAL_EXIT);
        }
    };
    init_tracing(&config.logging.level);
    info!("livelink {}", env!("CARGO_PKG_VERSION"));

    match run(cli.command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(FATAL_EXIT)
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level for this tool's crates
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("livelink={0},livelink_common={0}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(command: Command, config: &TomlConfig) -> Result<u8> {
    match command {
        Command::Link { from_ledger, mode } => run_link(config, from_ledger.as_deref(), mode).await,
        Command::Unlink { ledger, mode } => run_unlink(config, &ledger, mode).await,
        Command::Check => run_check(config).await,
    }
}

async fn run_link(config: &TomlConfig, from_ledger: Option<&Path>, args: ModeArgs) -> Result<u8> {
    let client = ImmichClient::new(&config.api)?;
    client.ping().await?;
    client.validate_credentials().await?;

    if let Some(ledger_path) = from_ledger {
        return relink_from_ledger(config, &client, ledger_path, args).await;
    }

    let store = PgAssetStore::connect(config.database()?).await?;
    let result = link_with_store(config, &store, &client, args).await;
    store.close().await;
    result
}

async fn link_with_store(
    config: &TomlConfig,
    store: &PgAssetStore,
    client: &ImmichClient,
    args: ModeArgs,
) -> Result<u8> {
    let mode = args.run_mode();

    println!("1/2: Identifying unlinked Live Photo assets...");
    let report = PairMatcher::new(store, MatchPolicy::from(&config.matching))
        .find_unlinked_pairs()
        .await
        .context("Identification failed")?;
    print_report(&report);

    if report.is_empty() {
        println!("No unlinked Live Photos identified.");
        return Ok(0);
    }

    print_test_run_banner(mode);
    if !confirm_run("Link", report.pairs.len(), args).await? {
        println!("Live Photo linking cancelled.");
        return Ok(0);
    }

    println!("\n2/2: Linking Live Photo and Live Video assets ({})...", mode);
    let mut ledger = Ledger::create_for_run(&config.ledger.output_dir, "link", mode, time::now())?;
    let summary = LinkExecutor::new(client)
        .with_verification(config.ledger.verify_links)
        .with_cancellation(interrupt_token())
        .execute(&report.pairs, mode, &mut ledger)
        .await?;

    println!("\nLink Summary:\n{}", summary);
    Ok(mode.exit_code(summary.failed))
}

async fn relink_from_ledger(
    config: &TomlConfig,
    client: &ImmichClient,
    ledger_path: &Path,
    args: ModeArgs,
) -> Result<u8> {
    let mode = args.run_mode();

    let entries = Ledger::load_all(ledger_path)
        .with_context(|| format!("Could not load ledger {}", ledger_path.display()))?;
    let proposals = unapplied_proposals(&entries);
    println!(
        "Found {} proposed pairs not yet linked in {}.",
        proposals.len(),
        ledger_path.display()
    );
    if proposals.is_empty() {
        return Ok(0);
    }

    print_test_run_banner(mode);
    if !confirm_run("Link", proposals.len(), args).await? {
        println!("Live Photo linking cancelled.");
        return Ok(0);
    }

    let mut ledger = Ledger::create_for_run(&config.ledger.output_dir, "link", mode, time::now())?;
    let summary = LinkExecutor::new(client)
        .with_verification(config.ledger.verify_links)
        .with_cancellation(interrupt_token())
        .replay(&proposals, mode, &mut ledger)
        .await?;

    println!("\nLink Summary:\n{}", summary);
    Ok(mode.exit_code(summary.failed))
}

async fn run_unlink(config: &TomlConfig, ledger_path: &Path, args: ModeArgs) -> Result<u8> {
    let mode = args.run_mode();

    let entries = Ledger::load_all(ledger_path)
        .with_context(|| format!("Could not load ledger {}", ledger_path.display()))?;
    let outstanding = outstanding_links(&entries);
    println!("Found {} linked Live Photos to unlink.", outstanding.len());
    if outstanding.is_empty() {
        return Ok(0);
    }

    let client = ImmichClient::new(&config.api)?;
    if mode.permits_mutation() {
        client.ping().await?;
        client.validate_credentials().await?;

        if !confirm_run("Unlink", outstanding.len(), args).await? {
            println!("Unlinking cancelled.");
            return Ok(0);
        }
    }

    let summary = UnlinkExecutor::new(&client)
        .with_cancellation(interrupt_token())
        .execute(ledger_path, mode)
        .await?;

    if mode == RunMode::DryRun {
        println!("Dry run complete - no pairs were unlinked.");
    }
    println!("\nUnlink Summary:\n{}", summary);
    Ok(mode.exit_code(summary.failed))
}

async fn run_check(config: &TomlConfig) -> Result<u8> {
    let client = ImmichClient::new(&config.api)?;
    client.ping().await?;
    println!("Server reachable: {}", config.api.base_url());
    client.validate_credentials().await?;
    println!("API key accepted");

    let database = config.database()?;
    let store = PgAssetStore::connect(database).await?;
    store.close().await;
    println!(
        "Database reachable: {}:{}/{}",
        database.host, database.port, database.dbname
    );
    Ok(0)
}

fn print_report(report: &MatchReport) {
    println!(
        "Identified {} unlinked Live Photos ({} ambiguous, {} unmatched videos).",
        report.pairs.len(),
        report.ambiguous.len(),
        report.unmatched.len()
    );

    if let Some(example) = report.pairs.first() {
        println!("Example Unlinked Live Photo/Video File Information:");
        println!("    - Live Photo Original Filename: {}", example.photo_filename);
        println!("    - Live Photo Creation Date: {}", example.photo_created_at);
        println!("    - Live Video Original Filename: {}", example.video_filename);
        println!("    - Live Video Creation Date: {}", example.video_created_at);
    }

    for ambiguous in &report.ambiguous {
        println!("Ambiguous (not linked): {}", ambiguous.to_error());
    }

    let already_linked = report
        .unmatched
        .iter()
        .filter(|u| matches!(u.reason, UnmatchedReason::PhotoAlreadyLinked { .. }))
        .count();
    if already_linked > 0 {
        warn!(
            count = already_linked,
            "Videos skipped because their photo is already linked to another video"
        );
    }
}

fn print_test_run_banner(mode: RunMode) {
    if mode == RunMode::TestRun {
        println!("\n============= TEST RUN ACTIVE ============");
        println!("Processing only the first pair as a test.");
        println!("==========================================\n");
    }
}

/// Ask before mutating; dry runs and `--yes` never prompt
async fn confirm_run(verb: &str, available: usize, args: ModeArgs) -> Result<bool> {
    let mode = args.run_mode();
    if !mode.permits_mutation() || args.yes {
        return Ok(true);
    }
    let count = mode.item_limit().map_or(available, |limit| limit.min(available));
    let prompt = format!("{} {} pair{}?", verb, count, if count == 1 { "" } else { "s" });
    confirm_async(prompt).await
}

async fn confirm_async(prompt: String) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || confirm::ask_stdin(&prompt))
        .await
        .context("Confirmation prompt failed")??;
    Ok(answer)
}

/// Cancelled on Ctrl+C; executors stop at the next pair boundary
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current pair");
            trigger.cancel();
        }
    });
    token
}
