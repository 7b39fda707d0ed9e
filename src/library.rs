//! Library sync: grows the labeled dataset from the user's account.
//!
//! Saved tracks are stored as Liked and the tracks of the designated
//! "disliked" playlist as Disliked. Sync is insert-if-absent: a track already
//! in the store is never refetched or relabeled, so saved tracks go first and
//! a track found in both places stays Liked.

use crate::db::RecordStore;
use crate::error::Result;
use crate::service::{RawTrack, StreamingService};
use crate::track::Label;
use log::{debug, info};

/// What one sync added to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub liked_added: usize,
    pub disliked_added: usize,
    /// Already stored; no features fetched.
    pub already_stored: usize,
    /// Skipped because the service had no audio features.
    pub missing_features: usize,
}

impl SyncReport {
    #[must_use]
    pub fn added(&self) -> usize {
        self.liked_added + self.disliked_added
    }
}

/// Pulls saved tracks and, if configured, the disliked playlist into `store`.
///
/// # Errors
///
/// Service and store errors propagate. Records written before the error stay
/// written.
pub fn sync_library(
    service: &dyn StreamingService,
    store: &dyn RecordStore,
    disliked_playlist: Option<&str>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    let saved = service.saved_tracks()?;
    debug!("Fetched {} saved tracks", saved.len());
    ingest(service, store, saved, Label::Liked, &mut report)?;

    if let Some(playlist) = disliked_playlist {
        let disliked = service.playlist_tracks(playlist)?;
        debug!("Fetched {} tracks from disliked playlist {playlist}", disliked.len());
        ingest(service, store, disliked, Label::Disliked, &mut report)?;
    }

    info!(
        "Library sync added {} liked and {} disliked tracks ({} already stored, {} without features)",
        report.liked_added, report.disliked_added, report.already_stored, report.missing_features
    );
    Ok(report)
}

fn ingest(
    service: &dyn StreamingService,
    store: &dyn RecordStore,
    tracks: Vec<RawTrack>,
    label: Label,
    report: &mut SyncReport,
) -> Result<()> {
    for track in tracks {
        if store.has_record(&track.id)? {
            report.already_stored += 1;
            continue;
        }

        let Some(features) = service.audio_features(&track.id)? else {
            debug!("No audio features for {}, not storing it", track.id);
            report.missing_features += 1;
            continue;
        };

        if !store.insert_record(&track.into_record(features, label))? {
            report.already_stored += 1;
        } else if label == Label::Liked {
            report.liked_added += 1;
        } else {
            report.disliked_added += 1;
        }
    }
    Ok(())
}
