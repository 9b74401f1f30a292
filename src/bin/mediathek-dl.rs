//! Command-line frontend for the mediathek-dl library.

use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mediathek_dl::{
    Catalog, Database, Error, FetchOutcome, HistoryEntry, MediaFetcher, QualityPreference,
    RemoteSource, Result, Settings, ShowRecord, durations, read_filter_sets,
};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "mediathek-dl", version, about, long_about = None)]
struct Cli {
    /// More log output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Working directory (downloads, catalog store, history ledger)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Configuration file (JSON, same keys as the defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Re-ingest the catalog if the local one is older than this many hours
    #[arg(long, global = true, value_name = "HOURS")]
    refresh_after: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List shows matching the filters
    List {
        /// Filter expressions, e.g. "channel=ARD" "duration+20m"
        filter: Vec<String>,

        /// File with one filter set per line; CLI filters are appended to
        /// every line
        #[arg(long, value_name = "FILE")]
        sets: Option<PathBuf>,

        /// Include shows whose start time lies in the future
        #[arg(long)]
        include_future: bool,

        /// Maximum number of shows to list
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Dump shows matching the filters as JSON
    Dump {
        /// Filter expressions
        filter: Vec<String>,

        /// File with one filter set per line
        #[arg(long, value_name = "FILE")]
        sets: Option<PathBuf>,

        /// Include shows whose start time lies in the future
        #[arg(long)]
        include_future: bool,

        /// Maximum number of shows to dump
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Download shows matching the filters
    Download {
        /// Filter expressions
        filter: Vec<String>,

        /// File with one filter set per line
        #[arg(long, value_name = "FILE")]
        sets: Option<PathBuf>,

        /// Include shows whose start time lies in the future
        #[arg(long)]
        include_future: bool,

        /// Maximum number of shows to download
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Prefer the best available quality
        #[arg(long, conflicts_with = "low")]
        high: bool,

        /// Prefer the smallest available quality
        #[arg(long)]
        low: bool,

        /// Destination path template
        #[arg(short, long)]
        target: Option<String>,

        /// Ignore and do not update the history ledger
        #[arg(long)]
        oblivious: bool,

        /// Mark matching shows as downloaded without downloading
        #[arg(long)]
        mark_only: bool,

        /// Skip subtitles even when a show publishes them
        #[arg(long)]
        no_subtitles: bool,
    },

    /// Show or edit the download history
    History {
        /// Forget everything ever downloaded
        #[arg(long, conflicts_with = "remove")]
        reset: bool,

        /// Forget a single download by its hash
        #[arg(long, value_name = "HASH")]
        remove: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug,sqlx=warn,hyper=warn,reqwest=warn")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)
                .map_err(|e| Error::config(format!("invalid config file: {e}"), path.display().to_string()))?
        }
        None => Settings::default(),
    };
    if let Some(dir) = &cli.dir {
        settings.dir = dir.clone();
    }
    if let Some(hours) = cli.refresh_after {
        settings.refresh_after_hours = hours;
    }
    settings.validate()?;
    Ok(settings)
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    std::fs::create_dir_all(&settings.dir)?;

    let client = reqwest::Client::new();
    let db = Database::open(&settings.database_path(), settings.lock_timeout).await?;

    if let Command::History { reset, remove } = &cli.command {
        return history_command(&db, *reset, remove.as_deref()).await;
    }

    let source = RemoteSource::new(
        client.clone(),
        settings.mirrors.clone(),
        settings.retry_delay,
    );
    let catalog = Catalog::new(db, source, settings.dir.clone(), settings.refresh_after_hours);
    let now = Utc::now();
    catalog.ensure_fresh(now).await?;

    match cli.command {
        Command::List {
            filter,
            sets,
            include_future,
            count,
        } => {
            let sets = read_filter_sets(sets.as_deref(), &filter)?;
            let include_future = include_future || settings.include_future;
            let limit = count.unwrap_or(settings.count);
            let shows = catalog
                .query(&sets, include_future, now, Some(limit))
                .await?;
            print_show_table(catalog.database(), &shows).await?;
        }

        Command::Dump {
            filter,
            sets,
            include_future,
            count,
        } => {
            let sets = read_filter_sets(sets.as_deref(), &filter)?;
            let include_future = include_future || settings.include_future;
            let shows = catalog.query(&sets, include_future, now, count).await?;
            println!("{}", serde_json::to_string_pretty(&shows)?);
        }

        Command::Download {
            filter,
            sets,
            include_future,
            count,
            high,
            low,
            target,
            oblivious,
            mark_only,
            no_subtitles,
        } => {
            let sets = read_filter_sets(sets.as_deref(), &filter)?;
            let include_future = include_future || settings.include_future;
            let shows = catalog.query(&sets, include_future, now, count).await?;

            let preference = if high {
                QualityPreference::high()
            } else if low {
                QualityPreference::low()
            } else {
                QualityPreference::standard()
            };
            let fetcher = MediaFetcher::new(
                client,
                settings.dir.clone(),
                target.unwrap_or_else(|| settings.target.clone()),
                !(no_subtitles || settings.no_subtitles),
            );
            download_command(
                &catalog,
                &fetcher,
                &shows,
                preference,
                oblivious || settings.oblivious,
                mark_only || settings.mark_only,
            )
            .await?;
        }

        Command::History { .. } => unreachable!("handled before the catalog refresh"),
    }

    Ok(())
}

async fn download_command(
    catalog: &Catalog,
    fetcher: &MediaFetcher,
    shows: &[ShowRecord],
    preference: QualityPreference,
    oblivious: bool,
    mark_only: bool,
) -> Result<()> {
    let db = catalog.database();
    let bar = ProgressBar::new(shows.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {wide_msg}") {
        bar.set_style(style);
    }

    let mut saved = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for show in shows {
        bar.set_message(show.title.clone());

        if !oblivious {
            if let Some(when) = db.downloaded_at(&show.hash).await? {
                tracing::debug!(show = %show.label(), %when, "already downloaded");
                skipped += 1;
                bar.inc(1);
                continue;
            }
        }

        if mark_only {
            db.mark_downloaded(&ledger_entry(show)).await?;
            tracing::info!(show = %show.label(), "marked as downloaded");
            saved += 1;
            bar.inc(1);
            continue;
        }

        match fetcher.fetch(show, preference).await {
            Ok(FetchOutcome::Saved(_)) => {
                if !oblivious {
                    db.mark_downloaded(&ledger_entry(show)).await?;
                }
                saved += 1;
            }
            Ok(FetchOutcome::Skipped(reason)) => {
                tracing::warn!(show = %show.label(), reason, "skipped");
                skipped += 1;
            }
            Err(e) => {
                tracing::error!(show = %show.label(), error = %e, "download failed");
                failed += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    tracing::info!(saved, skipped, failed, "download run finished");
    Ok(())
}

fn ledger_entry(show: &ShowRecord) -> HistoryEntry {
    HistoryEntry {
        hash: show.hash.clone(),
        channel: show.channel.clone(),
        topic: show.topic.clone(),
        title: show.title.clone(),
        size: show.size,
        start: show.start,
        duration: show.duration,
        downloaded_at: Utc::now(),
    }
}

async fn history_command(db: &Database, reset: bool, remove: Option<&str>) -> Result<()> {
    if reset {
        let removed = db.purge_history().await?;
        println!("Removed {removed} history entries.");
        return Ok(());
    }
    if let Some(hash) = remove {
        if db.remove_history(hash).await? {
            println!("Removed {hash} from history.");
        } else {
            println!("{hash} not found in history.");
        }
        return Ok(());
    }

    let entries = db.history().await?;
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.hash.clone(),
                e.channel.clone(),
                e.title.clone(),
                e.topic.clone(),
                e.size.to_string(),
                e.start.format("%Y-%m-%d %H:%M").to_string(),
                durations::format(e.duration),
                e.downloaded_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(
        &[
            "hash",
            "channel",
            "title",
            "topic",
            "size",
            "start",
            "duration",
            "downloaded",
        ],
        &rows,
    );
    Ok(())
}

async fn print_show_table(db: &Database, shows: &[ShowRecord]) -> Result<()> {
    let mut rows = Vec::with_capacity(shows.len());
    for show in shows {
        let downloaded = match db.downloaded_at(&show.hash).await? {
            Some(when) => when.format("%Y-%m-%d %H:%M").to_string(),
            None => String::new(),
        };
        rows.push(vec![
            show.hash.clone(),
            show.channel.clone(),
            show.title.clone(),
            show.topic.clone(),
            show.size.to_string(),
            show.start.format("%Y-%m-%d %H:%M").to_string(),
            durations::format(show.duration),
            durations::format(show.age),
            show.region.clone(),
            downloaded,
        ]);
    }
    print_table(
        &[
            "hash",
            "channel",
            "title",
            "topic",
            "size",
            "start",
            "duration",
            "age",
            "region",
            "downloaded",
        ],
        &rows,
    );
    println!("{} shows.", shows.len());
    Ok(())
}

/// Render an aligned text table with a header separator line.
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<String>| {
        let rendered: Vec<String> = cells
            .iter()
            .zip(widths.iter().copied())
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        println!("{}", rendered.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|w| "-".repeat(*w)).collect());
    for row in rows {
        line(row.clone());
    }
}
