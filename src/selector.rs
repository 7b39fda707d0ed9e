//! Picks the playlist from classified candidates.

use crate::classifier::Classifier;
use crate::error::{DiscoverError, Result};
use crate::track::{FeatureVector, TrackRecord};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;

/// Hard cap on a generated playlist.
pub const MAX_PLAYLIST_LENGTH: usize = 100;

/// Default number of tracks requested per playlist.
pub const DEFAULT_PLAYLIST_LENGTH: usize = 25;

/// Outcome of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen ids, in draw order.
    pub track_ids: Vec<String>,
    /// Candidates the classifier accepted.
    pub accepted: usize,
    /// Candidates scored.
    pub pool: usize,
}

/// How many ids to draw from `accepted` positives.
///
/// One accepted candidate is always held back, and the result never
/// exceeds [`MAX_PLAYLIST_LENGTH`].
#[must_use]
pub fn selection_size(requested: usize, accepted: usize) -> usize {
    requested
        .min(accepted.saturating_sub(1))
        .min(MAX_PLAYLIST_LENGTH)
}

/// Scores `pool` with `model` and draws a uniform random subset of the
/// accepted candidates.
///
/// # Errors
///
/// [`DiscoverError::NoAcceptedCandidates`] when the model accepts nothing.
pub fn select<R: Rng + ?Sized>(
    pool: &[TrackRecord],
    model: &dyn Classifier,
    requested: usize,
    rng: &mut R,
) -> Result<Selection> {
    let vectors: Vec<FeatureVector> = pool.iter().map(TrackRecord::feature_vector).collect();
    let predictions = model.predict_batch(&vectors);

    let accepted: Vec<&TrackRecord> = pool
        .iter()
        .zip(&predictions)
        .filter_map(|(record, &class)| (class == 1).then_some(record))
        .collect();

    if accepted.is_empty() {
        return Err(DiscoverError::NoAcceptedCandidates { pool: pool.len() });
    }

    let n = selection_size(requested, accepted.len());
    debug!(
        "{} of {} candidates accepted, drawing {n} (requested {requested})",
        accepted.len(),
        pool.len()
    );

    let track_ids: Vec<String> = accepted
        .choose_multiple(rng, n)
        .map(|record| record.id.clone())
        .collect();

    info!("Selected {} tracks from {} accepted candidates", track_ids.len(), accepted.len());
    Ok(Selection {
        track_ids,
        accepted: accepted.len(),
        pool: pool.len(),
    })
}
