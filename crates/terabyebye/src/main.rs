//! `TeraByeBye` - bulk delete old mail from a POP3 mailbox.
//!
//! Finds the cutoff with a binary search over message dates, then deletes
//! in small batches that are committed one `QUIT` at a time.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod confirm;
mod settings;

use std::io;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use clap::Parser;
use terabyebye_core::{
    DeletionPlan, MailSession, MailStore, MboxArchive, Orchestrator, Pop3Store, RunConfig, RunMode,
    RunSummary,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use settings::{PASSWORD_ENV, Settings};

const RULE: &str = "============================================================";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terabyebye=info,terabyebye_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("\nError: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = settings::locate(cli.config.as_deref()).context(
        "no settings file found (tried ./terabyebye.json and the user config directory)",
    )?;
    let settings = Settings::load(&path).await?;
    info!(path = %path.display(), "Loaded settings");

    let store = Pop3Store::new(settings.pop3_settings(std::env::var(PASSWORD_ENV).ok())?);

    if cli.status {
        return status(&settings, &store).await;
    }

    let config = settings.run_config(&cli)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("  {}: {}", e.field(), e.message());
        }
        bail!("invalid configuration ({} problems)", errors.len());
    }

    print_banner(&config);

    let mut orch = Orchestrator::new(store, config.clone());
    println!("\nConnecting to {}...", orch.store().describe());
    let plan = orch.plan().await?;
    println!("\n{RULE}\n{plan}\n{RULE}");

    if plan.is_empty() {
        println!("\nNothing to delete. No messages match: {}", plan.cutoff);
        return Ok(());
    }
    if config.mode == RunMode::Preview {
        println!(
            "\n[PREVIEW] Would delete {} messages ({}).\nRun with --delete to delete them.",
            plan.len(),
            plan.cutoff
        );
        return Ok(());
    }

    if let Some(warning) = confirm::backup_warning(&plan).filter(|_| config.mode.backs_up()) {
        println!("\nWARNING: {warning}");
    }
    if !config.skip_confirmation
        && !confirm::confirm(config.mode, &plan, &mut io::stdin().lock(), &mut io::stdout())?
    {
        println!("Aborted.");
        return Ok(());
    }

    let cancel = orch.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current batch");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let summary = execute(&mut orch, &plan, &config).await?;
    print_summary(&summary);
    Ok(())
}

async fn execute(
    orch: &mut Orchestrator<Pop3Store>,
    plan: &DeletionPlan,
    config: &RunConfig,
) -> Result<RunSummary> {
    let summary = match &config.backup_dir {
        Some(dir) => {
            let mut archive = MboxArchive::create(dir)
                .await
                .with_context(|| format!("cannot create backup directory {}", dir.display()))?;
            println!("\nBacking up to {}", archive.dir().display());
            orch.execute(plan, Some(&mut archive)).await?
        }
        None => orch.execute::<MboxArchive>(plan, None).await?,
    };
    Ok(summary)
}

async fn status(settings: &Settings, store: &Pop3Store) -> Result<()> {
    let profile = settings.profile();
    println!("{RULE}\nTeraByeBye status\n{RULE}");
    println!("  Account:    {}", settings.email);
    println!("  Provider:   {:?} ({})", profile.provider, store.describe());
    println!("  Batch size: up to {}", profile.batch_ceiling);
    match settings.cutoff() {
        Ok(cutoff) => println!("  Cutoff:     {cutoff}"),
        Err(e) => println!("  Cutoff:     invalid ({e})"),
    }

    let mut session = store
        .open()
        .await
        .with_context(|| format!("cannot log in to {}", store.describe()))?;
    let stat = session.stat().await?;
    session.commit().await?;

    #[allow(clippy::cast_precision_loss)]
    let mb = stat.size as f64 / (1024.0 * 1024.0);
    println!("  Mailbox:    {} messages, {mb:.1} MB", stat.count);
    Ok(())
}

fn print_banner(config: &RunConfig) {
    println!("{RULE}\nTeraByeBye - POP3 mail cleanup\n{RULE}");
    match config.mode {
        RunMode::Preview => {
            println!("PREVIEW MODE - nothing will be deleted");
            println!("Run with --delete to delete messages");
        }
        RunMode::Delete | RunMode::BackupAndDelete if config.skip_confirmation => {
            println!("UNHINGED MODE - no prompts, deleting everything in the window");
        }
        mode => println!("Mode: {}", mode.name()),
    }
    if !config.exclusions.is_empty() {
        println!("Excluding: {}", config.exclusions.describe());
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n{RULE}");
    println!("{}", if summary.cancelled { "STOPPED" } else { "COMPLETE" });
    println!("{summary}");
    for (file, count) in &summary.archives {
        println!("  {file}: {count} messages");
    }
    if summary.mode.backs_up() && summary.backed_up < summary.planned && !summary.cancelled {
        println!(
            "\nWARNING: only {} of {} messages were backed up.",
            summary.backed_up, summary.planned
        );
    }
    println!("{RULE}");
}
