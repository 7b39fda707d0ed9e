//! # Configuration Module
//!
//! Data directory layout and run settings for DiscoverDaily.
//!
//! ## Data Storage
//!
//! Everything lives in the platform-standard data directory:
//! - Linux: `~/.local/share/discoverdaily/`
//! - macOS: `~/Library/Application Support/discoverdaily/`
//! - Windows: `%APPDATA%\discoverdaily\`
//!
//! The directory holds the track database (`tracks.db`) and an optional
//! `config.json` with [`Settings`]. Every setting has a default, so the file
//! only needs the fields being changed:
//!
//! ```json
//! { "playlist_length": 30, "disliked_playlist": "37i9dQZF1DX0XUsuxWHRQd" }
//! ```
//!
//! Command-line flags and environment variables override the file.

use crate::classifier::TreeConfig;
use crate::dataset::DEFAULT_TEST_RATIO;
use crate::error::{DiscoverError, Result};
use crate::expander::{ExpansionConfig, DEFAULT_RELATED_ARTIST_LIMIT, DEFAULT_SAMPLE_SIZE, DEFAULT_TOP_TRACK_LIMIT};
use crate::selector::DEFAULT_PLAYLIST_LENGTH;
use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "discoverdaily";
const DB_FILE: &str = "tracks.db";
const SETTINGS_FILE: &str = "config.json";

/// Returns the DiscoverDaily data directory, creating it if needed.
///
/// # Errors
///
/// Fails when the platform has no data directory or it cannot be created.
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create DiscoverDaily data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Path of the track database inside [`get_data_dir`].
pub fn get_db_path() -> anyhow::Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Path of the optional settings file inside [`get_data_dir`].
pub fn get_settings_path() -> anyhow::Result<PathBuf> {
    Ok(get_data_dir()?.join(SETTINGS_FILE))
}

/// Tunables for a discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracks requested per playlist.
    pub playlist_length: usize,
    /// Minutes between cycles in daemon mode.
    pub interval_minutes: u64,
    /// Liked tracks sampled as discovery seeds.
    pub sample_size: usize,
    pub related_artist_limit: usize,
    pub top_track_limit: usize,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    /// Fraction of labeled tracks held out for evaluation.
    pub test_ratio: f64,
    /// Playlist whose tracks are stored as disliked.
    pub disliked_playlist: Option<String>,
    /// Market for top-track lookups (ISO 3166-1 alpha-2).
    pub market: String,
    pub playlist_title_prefix: String,
    /// Fixed RNG seed, for reproducible runs.
    pub seed: Option<u64>,
    /// Pull saved tracks and the disliked playlist before each run.
    pub sync_library: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            playlist_length: DEFAULT_PLAYLIST_LENGTH,
            interval_minutes: 24 * 60,
            sample_size: DEFAULT_SAMPLE_SIZE,
            related_artist_limit: DEFAULT_RELATED_ARTIST_LIMIT,
            top_track_limit: DEFAULT_TOP_TRACK_LIMIT,
            min_samples_split: TreeConfig::default().min_samples_split,
            max_depth: None,
            test_ratio: DEFAULT_TEST_RATIO,
            disliked_playlist: None,
            market: "US".to_string(),
            playlist_title_prefix: "DiscoverDaily".to_string(),
            seed: None,
            sync_library: true,
        }
    }
}

impl Settings {
    /// Reads settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// I/O failures other than a missing file, malformed JSON, and values
    /// rejected by [`Settings::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let settings = match fs::read_to_string(path) {
            Ok(contents) => {
                debug!("Loading settings from {}", path.display());
                serde_json::from_str(&contents)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects values no run could work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(DiscoverError::InvalidConfig(msg)) };

        if !(0.0..1.0).contains(&self.test_ratio) {
            return invalid(format!("test_ratio must be in [0, 1), got {}", self.test_ratio));
        }
        if self.playlist_length == 0 {
            return invalid("playlist_length must be at least 1".into());
        }
        if self.sample_size == 0 {
            return invalid("sample_size must be at least 1".into());
        }
        if self.related_artist_limit == 0 || self.top_track_limit == 0 {
            return invalid("related_artist_limit and top_track_limit must be at least 1".into());
        }
        if self.min_samples_split < 2 {
            return invalid(format!("min_samples_split must be at least 2, got {}", self.min_samples_split));
        }
        if self.market.len() != 2 {
            return invalid(format!("market must be a two-letter country code, got {:?}", self.market));
        }
        Ok(())
    }

    #[must_use]
    pub fn expansion(&self) -> ExpansionConfig {
        ExpansionConfig {
            sample_size: self.sample_size,
            related_artist_limit: self.related_artist_limit,
            top_track_limit: self.top_track_limit,
        }
    }

    #[must_use]
    pub fn tree(&self) -> TreeConfig {
        TreeConfig {
            min_samples_split: self.min_samples_split,
            max_depth: self.max_depth,
            ..TreeConfig::default()
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}
