//! # Command-Line Interface Module
//!
//! Clap definitions for the `discoverdaily` binary.
//!
//! ## Commands
//!
//! - `run`: one discovery run, creating today's playlist
//! - `daemon`: repeat `run` every `interval_minutes`
//! - `sync`: pull saved tracks and the disliked playlist into the store
//! - `train`: fit and evaluate the classifier on stored tracks only
//! - `stats`: count stored tracks per label
//! - `completion`: print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! export SPOTIFY_ACCESS_TOKEN=...
//! discoverdaily run --dry-run
//! discoverdaily daemon --interval-minutes 720
//! discoverdaily train --min-samples-split 100
//! ```

use crate::config::Settings;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser, Debug)]
#[command(name = "discoverdaily")]
#[command(about = "DiscoverDaily: learns what you like and builds a fresh playlist of it every day")]
#[command(version)]
pub struct Args {
    /// Track database (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Settings file (defaults to config.json in the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Spotify credentials. Acquiring the token is up to the caller.
#[derive(ClapArgs, Debug, Clone)]
pub struct ServiceArgs {
    /// OAuth bearer token with library and playlist scopes
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,
}

/// Overrides for the settings file. Unset flags keep the file's value.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Tracks per playlist (at most 100 are ever added)
    #[arg(long)]
    pub playlist_length: Option<usize>,

    /// Liked tracks sampled as discovery seeds
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Related artists followed per seed artist
    #[arg(long)]
    pub related_artist_limit: Option<usize>,

    /// Top tracks taken per related artist
    #[arg(long)]
    pub top_track_limit: Option<usize>,

    /// Minimum rows a tree node needs before it is split
    #[arg(long)]
    pub min_samples_split: Option<usize>,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Fraction of labeled tracks held out for evaluation
    #[arg(long)]
    pub test_ratio: Option<f64>,

    /// Playlist whose tracks are stored as disliked
    #[arg(long, env = "DISCOVER_DISLIKED_PLAYLIST")]
    pub disliked_playlist: Option<String>,

    /// Market for top-track lookups
    #[arg(long)]
    pub market: Option<String>,

    /// Seed for every random choice, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip pulling saved tracks and the disliked playlist
    #[arg(long)]
    pub no_sync: bool,
}

impl SettingsArgs {
    /// Applies every flag that was given on top of `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.playlist_length {
            settings.playlist_length = n;
        }
        if let Some(n) = self.sample_size {
            settings.sample_size = n;
        }
        if let Some(n) = self.related_artist_limit {
            settings.related_artist_limit = n;
        }
        if let Some(n) = self.top_track_limit {
            settings.top_track_limit = n;
        }
        if let Some(n) = self.min_samples_split {
            settings.min_samples_split = n;
        }
        if self.max_depth.is_some() {
            settings.max_depth = self.max_depth;
        }
        if let Some(ratio) = self.test_ratio {
            settings.test_ratio = ratio;
        }
        if let Some(playlist) = &self.disliked_playlist {
            settings.disliked_playlist = Some(playlist.clone());
        }
        if let Some(market) = &self.market {
            settings.market.clone_from(market);
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
        if self.no_sync {
            settings.sync_library = false;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run discovery once and create today's playlist
    ///
    /// Syncs the library, trains the classifier, expands candidates through
    /// related artists and publishes the accepted ones as a new playlist.
    Run {
        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Do everything except create the playlist; print the chosen tracks
        #[arg(long)]
        dry_run: bool,
    },

    /// Run discovery repeatedly on a timer
    ///
    /// Cycles that cannot produce a playlist (too few liked tracks, nothing
    /// accepted) are logged and skipped. An invalid token stops the loop.
    Daemon {
        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Minutes between runs
        #[arg(long)]
        interval_minutes: Option<u64>,

        /// Stop after this many runs
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// Pull saved tracks (liked) and the disliked playlist into the store
    Sync {
        #[command(flatten)]
        service: ServiceArgs,

        /// Playlist whose tracks are stored as disliked
        #[arg(long, env = "DISCOVER_DISLIKED_PLAYLIST")]
        disliked_playlist: Option<String>,
    },

    /// Fit and evaluate the classifier on stored tracks without going online
    Train {
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Show how many tracks are stored per label
    Stats,

    /// Generate shell completions
    ///
    /// Usage: discoverdaily completion bash > ~/.local/share/bash-completion/completions/discoverdaily
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
