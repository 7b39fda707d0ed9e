//! Candidate discovery through the artist-similarity graph.
//!
//! Starting from a random sample of liked tracks, walk one hop to each seed
//! artist's related artists and take their top tracks. Anything already
//! labeled, or already found this run, is dropped before its audio features
//! are fetched, so the pool is a set keyed by track id in discovery order.

use crate::dataset::LabeledDataset;
use crate::error::{DiscoverError, Result};
use crate::service::StreamingService;
use crate::track::{Label, TrackRecord, MAX_ARTISTS};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

pub const DEFAULT_SAMPLE_SIZE: usize = 10;
pub const DEFAULT_RELATED_ARTIST_LIMIT: usize = 5;
pub const DEFAULT_TOP_TRACK_LIMIT: usize = 5;

/// How wide the walk fans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionConfig {
    /// Liked tracks drawn as seeds.
    pub sample_size: usize,
    /// Related artists followed per seed artist.
    pub related_artist_limit: usize,
    /// Top tracks taken per related artist.
    pub top_track_limit: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            related_artist_limit: DEFAULT_RELATED_ARTIST_LIMIT,
            top_track_limit: DEFAULT_TOP_TRACK_LIMIT,
        }
    }
}

/// Counters describing one expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    pub seeds: usize,
    pub related_lookups: usize,
    pub top_track_lookups: usize,
    /// Top tracks returned before any dedup.
    pub tracks_seen: usize,
    /// Dropped because the track is already liked or disliked.
    pub already_labeled: usize,
    /// Dropped because an earlier path already reached the track.
    pub duplicates: usize,
    /// Dropped because the service had no audio features.
    pub missing_features: usize,
}

/// Unlabeled candidates found in one run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    records: Vec<TrackRecord>,
    ids: HashSet<String>,
    pub stats: ExpansionStats,
}

impl CandidatePool {
    #[must_use]
    pub fn records(&self) -> &[TrackRecord] {
        &self.records
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Adds `record` unless its id is already pooled.
    fn insert(&mut self, record: TrackRecord) -> bool {
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }
}

/// Walks related artists to build a [`CandidatePool`].
pub struct CandidateExpander<'a> {
    service: &'a dyn StreamingService,
    config: ExpansionConfig,
}

impl<'a> CandidateExpander<'a> {
    #[must_use]
    pub fn new(service: &'a dyn StreamingService, config: ExpansionConfig) -> Self {
        Self { service, config }
    }

    /// Discovers unlabeled candidates from a random sample of liked tracks.
    ///
    /// # Errors
    ///
    /// [`DiscoverError::InsufficientData`] when fewer liked tracks exist than
    /// the configured sample size; service errors propagate, except refusals
    /// for a single artist, which are logged and skipped.
    pub fn expand<R: Rng + ?Sized>(&self, dataset: &LabeledDataset, rng: &mut R) -> Result<CandidatePool> {
        let liked: Vec<&TrackRecord> = dataset.liked().collect();
        let wanted = self.config.sample_size;
        if liked.len() < wanted {
            return Err(DiscoverError::InsufficientData {
                wanted,
                found: liked.len(),
            });
        }

        let seeds: Vec<&TrackRecord> = liked.choose_multiple(rng, wanted).copied().collect();
        let known = dataset.known_ids();
        let mut walk = Walk {
            known: &known,
            pool: CandidatePool::default(),
            seed_artists: HashSet::new(),
            related_artists: HashSet::new(),
            no_features: HashSet::new(),
        };
        walk.pool.stats.seeds = seeds.len();

        for seed in seeds {
            debug!("Expanding from seed track {}", seed.display_name());
            for artist_id in seed.artist_ids.iter().take(MAX_ARTISTS) {
                self.expand_artist(&mut walk, artist_id)?;
            }
        }

        let pool = walk.pool;
        info!(
            "Discovered {} candidates ({} tracks seen, {} already labeled, {} duplicates, {} without features)",
            pool.len(),
            pool.stats.tracks_seen,
            pool.stats.already_labeled,
            pool.stats.duplicates,
            pool.stats.missing_features
        );
        Ok(pool)
    }

    fn expand_artist(&self, walk: &mut Walk<'_>, artist_id: &str) -> Result<()> {
        // A repeated artist would only yield duplicates.
        if !walk.seed_artists.insert(artist_id.to_string()) {
            return Ok(());
        }

        walk.pool.stats.related_lookups += 1;
        let related = match self.service.related_artists(artist_id, self.config.related_artist_limit) {
            Ok(related) => related,
            Err(e @ DiscoverError::Service { .. }) => {
                warn!("Skipping artist {artist_id}: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for related_id in related.into_iter().take(self.config.related_artist_limit) {
            if !walk.related_artists.insert(related_id.clone()) {
                continue;
            }
            self.collect_top_tracks(walk, &related_id)?;
        }
        Ok(())
    }

    fn collect_top_tracks(&self, walk: &mut Walk<'_>, artist_id: &str) -> Result<()> {
        walk.pool.stats.top_track_lookups += 1;
        let tracks = match self.service.artist_top_tracks(artist_id, self.config.top_track_limit) {
            Ok(tracks) => tracks,
            Err(e @ DiscoverError::Service { .. }) => {
                warn!("Skipping top tracks of {artist_id}: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for track in tracks.into_iter().take(self.config.top_track_limit) {
            walk.pool.stats.tracks_seen += 1;

            if walk.known.contains(&track.id) {
                walk.pool.stats.already_labeled += 1;
                continue;
            }
            if walk.pool.contains(&track.id) || walk.no_features.contains(&track.id) {
                walk.pool.stats.duplicates += 1;
                continue;
            }

            match self.service.audio_features(&track.id) {
                Ok(Some(features)) => {
                    walk.pool.insert(track.into_record(features, Label::Unlabeled));
                }
                Ok(None) => {
                    debug!("No audio features for {}, skipping", track.id);
                    walk.pool.stats.missing_features += 1;
                    walk.no_features.insert(track.id);
                }
                Err(e @ DiscoverError::Service { .. }) => {
                    warn!("Skipping track {}: {e}", track.id);
                    walk.pool.stats.missing_features += 1;
                    walk.no_features.insert(track.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Mutable state of one expansion.
struct Walk<'k> {
    known: &'k HashSet<String>,
    pool: CandidatePool,
    seed_artists: HashSet<String>,
    related_artists: HashSet<String>,
    no_features: HashSet<String>,
}
