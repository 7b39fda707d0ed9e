//! One full discovery run.
//!
//! sync library → load labeled dataset → split → fit and evaluate →
//! expand candidates → select → create playlist → add tracks.
//!
//! Every collaborator is passed in, so the same run works against Spotify
//! and SQLite in production and against in-memory fixtures in tests. The
//! playlist is only created once a selection exists; a run that fails
//! earlier leaves no trace on the account.

use crate::classifier::{train_and_evaluate, DecisionTree, TrainingReport};
use crate::config::Settings;
use crate::dataset::{self, LabeledDataset};
use crate::db::RecordStore;
use crate::error::Result;
use crate::expander::{CandidateExpander, ExpansionStats};
use crate::library::{sync_library, SyncReport};
use crate::selector::select;
use crate::service::StreamingService;
use chrono::{Local, NaiveDate};
use log::{info, warn};
use rand::Rng;

/// The playlist a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
}

/// Everything observable about a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `None` when library sync is disabled.
    pub sync: Option<SyncReport>,
    pub liked: usize,
    pub disliked: usize,
    pub training: TrainingReport,
    pub candidates: usize,
    pub expansion: ExpansionStats,
    pub accepted: usize,
    pub track_ids: Vec<String>,
    /// `None` on a dry run or when nothing was selected.
    pub playlist: Option<PlaylistInfo>,
}

/// `"{prefix} MM_DD"`.
#[must_use]
pub fn playlist_title(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix} {}", date.format("%m_%d"))
}

#[must_use]
pub fn playlist_description(date: NaiveDate) -> String {
    format!("Generated {} by DiscoverDaily.", date.format("%Y-%m-%d"))
}

/// Loads the labeled dataset, splits it, and fits the run's classifier.
///
/// # Errors
///
/// Store errors and [`crate::error::DiscoverError::EmptyTrainingSet`].
pub fn train<R: Rng + ?Sized>(
    store: &dyn RecordStore,
    settings: &Settings,
    rng: &mut R,
) -> Result<(LabeledDataset, DecisionTree, TrainingReport)> {
    let dataset = dataset::load(store)?;
    let split = dataset.split(settings.test_ratio, rng);
    info!("Split {} labeled tracks into {} train / {} eval", dataset.len(), split.train.len(), split.eval.len());

    let (tree, report) = train_and_evaluate(&split, &settings.tree())?;
    Ok((dataset, tree, report))
}

/// Drives discovery runs against one service and one store.
pub struct Pipeline<'a> {
    service: &'a dyn StreamingService,
    store: &'a dyn RecordStore,
    settings: &'a Settings,
    dry_run: bool,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(service: &'a dyn StreamingService, store: &'a dyn RecordStore, settings: &'a Settings) -> Self {
        Self {
            service,
            store,
            settings,
            dry_run: false,
        }
    }

    /// Select tracks but never touch the account's playlists.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs one cycle dated today (local time).
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<RunReport> {
        self.run_on(Local::now().date_naive(), rng)
    }

    /// Runs one cycle, naming the playlist after `date`.
    ///
    /// # Errors
    ///
    /// Any stage's error ends the run; see [`crate::error::DiscoverError::skips_cycle`]
    /// for the ones a scheduler should shrug off.
    pub fn run_on<R: Rng + ?Sized>(&self, date: NaiveDate, rng: &mut R) -> Result<RunReport> {
        let sync = if self.settings.sync_library {
            Some(sync_library(
                self.service,
                self.store,
                self.settings.disliked_playlist.as_deref(),
            )?)
        } else {
            None
        };

        let (dataset, tree, training) = train(self.store, self.settings, rng)?;

        let pool = CandidateExpander::new(self.service, self.settings.expansion()).expand(&dataset, rng)?;
        let selection = select(pool.records(), &tree, self.settings.playlist_length, rng)?;

        let playlist = if self.dry_run {
            info!("Dry run: not creating a playlist for {} tracks", selection.track_ids.len());
            None
        } else if selection.track_ids.is_empty() {
            warn!("Only {} candidate accepted, nothing to put in a playlist", selection.accepted);
            None
        } else {
            Some(self.publish(date, &selection.track_ids)?)
        };

        Ok(RunReport {
            sync,
            liked: dataset.liked().count(),
            disliked: dataset.disliked().count(),
            training,
            candidates: pool.len(),
            expansion: pool.stats.clone(),
            accepted: selection.accepted,
            track_ids: selection.track_ids,
            playlist,
        })
    }

    fn publish(&self, date: NaiveDate, track_ids: &[String]) -> Result<PlaylistInfo> {
        let title = playlist_title(&self.settings.playlist_title_prefix, date);
        let id = self.service.create_playlist(&title, &playlist_description(date))?;
        self.service.add_tracks_to_playlist(&id, track_ids)?;
        info!("Created playlist {title} ({id}) with {} tracks", track_ids.len());
        Ok(PlaylistInfo { id, title })
    }
}
