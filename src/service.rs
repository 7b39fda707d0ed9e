//! The streaming-service fetch interface.
//!
//! Everything the discovery pipeline needs from the outside world goes
//! through [`StreamingService`]. The production implementation lives in
//! [`crate::spotify`]; tests supply in-memory fixtures. Implementations are
//! expected to absorb rate limits and transient failures themselves and only
//! surface errors once their retry budget is spent.

use crate::error::Result;
use crate::track::{AudioFeatures, Label, TrackRecord};
use serde::{Deserialize, Serialize};

/// An artist as referenced from a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// Track metadata as returned by listing endpoints, before audio features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub popularity: u32,
}

impl RawTrack {
    /// Joins metadata with its audio features into a storable record.
    #[must_use]
    pub fn into_record(self, features: AudioFeatures, label: Label) -> TrackRecord {
        let artists: Vec<(String, String)> = self
            .artists
            .into_iter()
            .map(|artist| (artist.name, artist.id))
            .collect();
        TrackRecord::new(self.id, self.name, &artists, self.popularity, label, features)
    }
}

/// Remote catalogue and library operations.
pub trait StreamingService {
    /// Every track in the user's saved library.
    fn saved_tracks(&self) -> Result<Vec<RawTrack>>;

    /// Every track of a playlist, skipping entries without a track id.
    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<RawTrack>>;

    /// Audio features for one track, `None` when the service has none.
    fn audio_features(&self, track_id: &str) -> Result<Option<AudioFeatures>>;

    /// Up to `limit` artist ids the service considers similar to `artist_id`.
    fn related_artists(&self, artist_id: &str, limit: usize) -> Result<Vec<String>>;

    /// Up to `limit` of the artist's most popular tracks.
    fn artist_top_tracks(&self, artist_id: &str, limit: usize) -> Result<Vec<RawTrack>>;

    /// Creates an empty playlist and returns its id.
    fn create_playlist(&self, title: &str, description: &str) -> Result<String>;

    fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;
}
