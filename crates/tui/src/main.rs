mod app;
mod block_font;

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use gameslist_core::{
    config::{self, AppConfig},
    import::import_workbook,
    presence::{NoopPresence, Presence},
    stats::LibraryStats,
    timefmt::{format_hms, format_short},
    updates::UpdateCheck,
    Store, StoreError, StoreManager, Tracker,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "gameslist", version, about = "Track a game backlog and play sessions")]
struct Args {
    /// Library document to use instead of the configured one.
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Merge the games of an .xlsx spreadsheet into the library and exit.
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Print library statistics and exit.
    #[arg(long)]
    stats: bool,

    /// Move an unreadable library aside and start with an empty one.
    #[arg(long)]
    backup_corrupt: bool,

    /// Skip the release check for this run.
    #[arg(long)]
    no_update_check: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load()?;
    let headless = args.import.is_some() || args.stats;
    init_logging(&config.log_dir, headless)?;
    config::ensure_default_config()?;

    let store_path = args
        .store
        .clone()
        .unwrap_or_else(|| config.resolved_store_path());
    let manager = StoreManager::new(store_path);
    let mut store = load_store(&manager, args.backup_corrupt)?;

    if let Some(path) = &args.import {
        run_import(&manager, &mut store, path)?;
    }
    if args.stats {
        print_stats(&store);
    }
    if headless {
        return Ok(());
    }

    let presence = build_presence(&config, store.preferences.discord_enabled);
    let mut app = app::GamesListApp::new(
        store,
        manager,
        Tracker::new(),
        presence,
        Duration::from_millis(config.tick_rate_ms),
    );

    if config.check_updates && !args.no_update_check {
        if let Some(repo) = config.update_repo.clone() {
            let (update_tx, update_rx) = mpsc::channel(1);
            let check = UpdateCheck::new(repo, env!("CARGO_PKG_VERSION"));
            tokio::spawn(async move {
                if let Err(err) = check.run(update_tx).await {
                    error!("Update check task error: {err}");
                }
            });
            app.attach_updates(update_rx);
        }
    }

    app.run().await
}

fn load_store(manager: &StoreManager, backup_corrupt: bool) -> Result<Store> {
    match manager.load() {
        Ok(store) => Ok(store),
        Err(StoreError::Corrupt { path, reason }) if backup_corrupt => {
            let backup = manager.backup_corrupt()?;
            warn!(path = %path.display(), %reason, backup = %backup.display(), "Moved unreadable library aside");
            Ok(manager.load()?)
        }
        Err(err @ StoreError::Corrupt { .. }) => {
            bail!("{err}\nrerun with --backup-corrupt to move it aside and start over")
        }
        Err(err) => Err(err.into()),
    }
}

fn run_import(manager: &StoreManager, store: &mut Store, path: &Path) -> Result<()> {
    let games = import_workbook(path)
        .with_context(|| format!("failed to import {}", path.display()))?;
    let report = store.merge_imported(games);
    manager.save(store)?;
    info!(
        file = %path.display(),
        added = report.added,
        skipped = report.skipped.len(),
        "Imported spreadsheet"
    );
    println!("Imported {} games from {}", report.added, path.display());
    for name in &report.skipped {
        println!("  skipped {name}: already in the library");
    }
    Ok(())
}

fn print_stats(store: &Store) {
    let stats = LibraryStats::compute(store);
    println!("Games            {}", stats.total_games);
    println!(
        "  pending {}  in progress {}  completed {} ({:.1}%)",
        stats.status.pending, stats.status.in_progress, stats.status.completed, stats.completion_pct
    );
    println!("Owned            {}", stats.owned);
    println!("Total playtime   {}", format_hms(stats.total_playtime));
    println!("Avg per game     {}", format_short(stats.average_playtime));
    println!(
        "Sessions         {} ({} avg)",
        stats.session_count,
        format_short(stats.average_session)
    );
    if let Some(day) = &stats.most_active_day {
        println!(
            "Most active day  {} ({} sessions, {})",
            day.date,
            day.sessions,
            format_short(day.playtime)
        );
    }
    if !stats.playtime_by_game.is_empty() {
        println!("Most played");
        for (name, playtime) in stats.playtime_by_game.iter().take(5) {
            println!("  {:>8}  {name}", format_short(*playtime));
        }
    }
    if !stats.session_rating_summaries.is_empty() {
        println!("Session ratings");
        for summary in &stats.session_rating_summaries {
            println!(
                "  {:.1}★ over {} sessions  {}",
                summary.weighted_average, summary.rated_sessions, summary.game
            );
        }
    }
    if !stats.release_years.is_empty() {
        println!("Release years");
        for year in &stats.release_years {
            println!(
                "  {:<8} {} completed, {} open",
                year.label(),
                year.completed,
                year.open
            );
        }
    }
}

fn build_presence(config: &AppConfig, enabled: bool) -> Presence {
    match config.discord_client_id.as_deref() {
        #[cfg(feature = "discord")]
        Some(client_id) => Presence::new(
            Box::new(gameslist_core::presence::DiscordPresence::spawn(client_id)),
            enabled,
        ),
        _ => Presence::new(Box::new(NoopPresence), enabled),
    }
}

fn init_logging(log_dir: &Path, stdout: bool) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("gameslist.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the UI unless running headless.
    let stdout_layer = stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
