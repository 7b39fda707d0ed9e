//! # DiscoverDaily
//!
//! Learns which tracks you like from your saved library and a "disliked"
//! playlist, then walks related artists to find new tracks and publishes the
//! ones a decision tree expects you to like as a daily playlist.
//!
//! ## Usage
//!
//! ```bash
//! export SPOTIFY_ACCESS_TOKEN=...
//! export DISCOVER_DISLIKED_PLAYLIST=37i9dQZF1DX0XUsuxWHRQd
//!
//! # Pull the library into the local store
//! discoverdaily sync
//!
//! # See how well the classifier does on what is stored
//! discoverdaily train
//!
//! # Create today's playlist, or run every day
//! discoverdaily run
//! discoverdaily daemon
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use discoverdaily::cli::{self, Command};
use discoverdaily::config::{self, Settings};
use discoverdaily::db::{RecordStore, SqliteStore};
use discoverdaily::library::sync_library;
use discoverdaily::pipeline::{self, Pipeline, RunReport};
use discoverdaily::scheduler::Scheduler;
use discoverdaily::spotify::SpotifyClient;
use discoverdaily::{completion, FEATURE_NAMES};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=info discoverdaily run` - per-stage progress
/// - `RUST_LOG=discoverdaily::spotify=trace discoverdaily run` - every request
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        Command::Run {
            service,
            settings: overrides,
            dry_run,
        } => {
            let mut settings = load_settings(args.config)?;
            overrides.apply(&mut settings);
            settings.validate()?;

            let store = open_store(args.db)?;
            let client = SpotifyClient::new(&service.token, &settings.market)?;
            let mut rng = make_rng(settings.seed);

            info!("Starting discovery run");
            let report = Pipeline::new(&client, &store, &settings)
                .dry_run(dry_run)
                .run(&mut rng)
                .context("Discovery run failed")?;
            print_report(&report);
        }
        Command::Daemon {
            service,
            settings: overrides,
            interval_minutes,
            cycles,
        } => {
            let mut settings = load_settings(args.config)?;
            overrides.apply(&mut settings);
            if let Some(minutes) = interval_minutes {
                settings.interval_minutes = minutes;
            }
            settings.validate()?;

            let store = open_store(args.db)?;
            let client = SpotifyClient::new(&service.token, &settings.market)?;
            let mut rng = make_rng(settings.seed);
            let pipeline = Pipeline::new(&client, &store, &settings);

            let summary = Scheduler::new(settings.interval())
                .max_cycles(cycles)
                .pid_file(config::get_data_dir()?.join("discoverdaily-daemon.pid"))
                .run(|n| {
                    debug!("Starting cycle {n}");
                    pipeline.run(&mut rng)
                })
                .context("Discovery loop stopped")?;
            println!(
                "{} cycles: {} completed, {} skipped, {} failed ({} retryable)",
                summary.cycles, summary.completed, summary.skipped, summary.failed, summary.retryable
            );
        }
        Command::Sync {
            service,
            disliked_playlist,
        } => {
            let settings = load_settings(args.config)?;
            let store = open_store(args.db)?;
            let client = SpotifyClient::new(&service.token, &settings.market)?;
            let playlist = disliked_playlist.or(settings.disliked_playlist);

            let report = sync_library(&client, &store, playlist.as_deref()).context("Library sync failed")?;
            println!(
                "Added {} liked and {} disliked tracks ({} already stored, {} without audio features)",
                report.liked_added, report.disliked_added, report.already_stored, report.missing_features
            );
        }
        Command::Train { settings: overrides } => {
            let mut settings = load_settings(args.config)?;
            overrides.apply(&mut settings);
            settings.validate()?;

            let store = open_store(args.db)?;
            let mut rng = make_rng(settings.seed);
            let (dataset, tree, report) = pipeline::train(&store, &settings, &mut rng)?;

            println!("Labeled tracks: {} liked, {} disliked", dataset.liked().count(), dataset.disliked().count());
            println!("Split:          {} train / {} eval", report.train_rows, report.eval_rows);
            if let Some(label) = report.constant_fallback {
                println!("Model:          constant ({label}), training split held one class");
            } else {
                println!(
                    "Model:          depth {}, {} leaves, root split on {}",
                    report.depth,
                    report.leaves,
                    tree.root_feature().unwrap_or("nothing")
                );
            }
            match report.accuracy {
                Some(accuracy) => println!("Accuracy:       {:.2}%", accuracy * 100.0),
                None => println!("Accuracy:       n/a (no held-out tracks)"),
            }
            debug!("Features: {}", FEATURE_NAMES.join(", "));
        }
        Command::Stats => {
            let store = open_store(args.db)?;
            let (liked, disliked, unlabeled) = store.label_counts()?;
            println!("Liked:     {liked}");
            println!("Disliked:  {disliked}");
            if unlabeled > 0 {
                println!("Unlabeled: {unlabeled}");
            }
            println!("Total:     {}", liked + disliked + unlabeled);
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
    }

    Ok(())
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => config::get_settings_path()?,
    };
    Settings::load(&path).with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn open_store(path: Option<PathBuf>) -> Result<SqliteStore> {
    let path = match path {
        Some(path) => path,
        None => config::get_db_path()?,
    };
    SqliteStore::open(&path).with_context(|| format!("Failed to open track database at {}", path.display()))
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn print_report(report: &RunReport) {
    if let Some(sync) = &report.sync {
        println!("Synced:     {} new liked, {} new disliked", sync.liked_added, sync.disliked_added);
    }
    println!("Dataset:    {} liked, {} disliked", report.liked, report.disliked);
    match report.training.accuracy {
        Some(accuracy) => println!("Accuracy:   {:.2}%", accuracy * 100.0),
        None => println!("Accuracy:   n/a (no held-out tracks)"),
    }
    println!("Candidates: {} discovered, {} accepted", report.candidates, report.accepted);

    match &report.playlist {
        Some(playlist) => println!("Playlist:   {} ({}) with {} tracks", playlist.title, playlist.id, report.track_ids.len()),
        None => {
            println!("Selected {} tracks (no playlist created):", report.track_ids.len());
            for id in &report.track_ids {
                println!("  spotify:track:{id}");
            }
        }
    }
}
