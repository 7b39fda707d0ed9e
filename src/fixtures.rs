//! In-memory streaming service for unit tests.

use crate::error::{DiscoverError, Result};
use crate::service::{ArtistRef, RawTrack, StreamingService};
use crate::track::{AudioFeatures, Label, TrackRecord};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct CallLog {
    pub feature_fetches: Vec<String>,
    pub related_lookups: usize,
    pub top_track_lookups: usize,
    pub created: Vec<(String, String)>,
    pub added: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Default)]
pub struct FixtureService {
    pub saved: Vec<RawTrack>,
    pub playlists: HashMap<String, Vec<RawTrack>>,
    pub related: HashMap<String, Vec<String>>,
    pub top_tracks: HashMap<String, Vec<RawTrack>>,
    pub features: HashMap<String, AudioFeatures>,
    /// Artists the service answers 404 for.
    pub missing_artists: HashSet<String>,
    /// Tracks whose audio features the service refuses with a 403.
    pub refused_tracks: HashSet<String>,
    pub reject_token: bool,
    pub calls: Mutex<CallLog>,
}

impl FixtureService {
    pub fn log(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_token(&self) -> Result<()> {
        if self.reject_token {
            return Err(DiscoverError::Unauthorized("token expired".into()));
        }
        Ok(())
    }
}

/// A raw track by a single artist.
pub fn raw(id: &str, artist_id: &str) -> RawTrack {
    RawTrack {
        id: id.to_string(),
        name: format!("Track {id}"),
        artists: vec![ArtistRef {
            id: artist_id.to_string(),
            name: format!("Artist {artist_id}"),
        }],
        popularity: 50,
    }
}

/// Features derived from a number so fixtures differ from one another.
pub fn features(seed: u32) -> AudioFeatures {
    let unit = f64::from(seed % 100) / 100.0;
    AudioFeatures {
        danceability: unit,
        energy: 1.0 - unit,
        key: i32::try_from(seed % 12).unwrap_or(0),
        loudness: -10.0 * unit,
        mode: i32::try_from(seed % 2).unwrap_or(0),
        speechiness: 0.05,
        acousticness: unit / 2.0,
        instrumentalness: 0.0,
        liveness: 0.1,
        valence: unit,
        tempo: 80.0 + 100.0 * unit,
        duration_ms: 180_000 + i64::from(seed),
        time_signature: 4,
    }
}

/// A labeled record with the given artists.
pub fn labeled(id: &str, artist_ids: &[&str], label: Label, seed: u32) -> TrackRecord {
    let artists: Vec<(String, String)> = artist_ids
        .iter()
        .map(|a| (format!("Artist {a}"), (*a).to_string()))
        .collect();
    TrackRecord::new(id, format!("Track {id}"), &artists, 50, label, features(seed))
}

impl StreamingService for FixtureService {
    fn saved_tracks(&self) -> Result<Vec<RawTrack>> {
        self.check_token()?;
        Ok(self.saved.clone())
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<RawTrack>> {
        self.check_token()?;
        self.playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| DiscoverError::Service {
                status: 404,
                message: format!("no playlist {playlist_id}"),
            })
    }

    fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>> {
        self.check_token()?;
        self.log().feature_fetches.push(track_id.to_string());
        if self.refused_tracks.contains(track_id) {
            return Err(DiscoverError::Service {
                status: 403,
                message: format!("no access to {track_id}"),
            });
        }
        Ok(self.features.get(track_id).copied())
    }

    fn related_artists(&self, artist_id: &str, limit: usize) -> Result<Vec<String>> {
        self.check_token()?;
        self.log().related_lookups += 1;
        if self.missing_artists.contains(artist_id) {
            return Err(DiscoverError::Service {
                status: 404,
                message: format!("no artist {artist_id}"),
            });
        }
        Ok(self
            .related
            .get(artist_id)
            .map(|ids| ids.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn artist_top_tracks(&self, artist_id: &str, limit: usize) -> Result<Vec<RawTrack>> {
        self.check_token()?;
        self.log().top_track_lookups += 1;
        Ok(self
            .top_tracks
            .get(artist_id)
            .map(|tracks| tracks.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn create_playlist(&self, title: &str, description: &str) -> Result<String> {
        self.check_token()?;
        let mut log = self.log();
        log.created.push((title.to_string(), description.to_string()));
        Ok(format!("playlist-{}", log.created.len()))
    }

    fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.check_token()?;
        self.log().added.push((playlist_id.to_string(), track_ids.to_vec()));
        Ok(())
    }
}
