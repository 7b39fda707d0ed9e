//! Track records and the feature projection used for learning.
//!
//! A [`TrackRecord`] is one row of the track table: metadata, the audio
//! features reported by the streaming service, and a tri-state [`Label`].
//! [`TrackRecord::feature_vector`] is the only way a record is turned into
//! numbers; training, evaluation and candidate scoring all go through it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of columns in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 14;

/// Column names of a [`FeatureVector`], in projection order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "popularity",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "duration_ms",
    "time_signature",
];

/// Artist slots retained per track.
pub const MAX_ARTISTS: usize = 2;

/// Fixed-shape numeric projection of a track.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Whether the user likes a track.
///
/// Set once when the record is created and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Liked,
    Disliked,
    Unlabeled,
}

impl Label {
    /// Binary class used by the classifier, `None` for unlabeled tracks.
    #[must_use]
    pub const fn class(self) -> Option<u8> {
        match self {
            Self::Liked => Some(1),
            Self::Disliked => Some(0),
            Self::Unlabeled => None,
        }
    }

    /// Inverse of [`Label::class`].
    #[must_use]
    pub const fn from_class(class: u8) -> Self {
        match class {
            0 => Self::Disliked,
            _ => Self::Liked,
        }
    }

    /// Column value in the track table (`NULL` for unlabeled).
    #[must_use]
    pub const fn to_sql(self) -> Option<i64> {
        match self {
            Self::Liked => Some(1),
            Self::Disliked => Some(0),
            Self::Unlabeled => None,
        }
    }

    #[must_use]
    pub const fn from_sql(value: Option<i64>) -> Self {
        match value {
            Some(0) => Self::Disliked,
            Some(_) => Self::Liked,
            None => Self::Unlabeled,
        }
    }

    #[must_use]
    pub const fn is_labeled(self) -> bool {
        !matches!(self, Self::Unlabeled)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Liked => "liked",
            Self::Disliked => "disliked",
            Self::Unlabeled => "unlabeled",
        };
        f.write_str(name)
    }
}

/// Audio descriptors reported by the streaming service for one track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub key: i32,
    pub loudness: f64,
    pub mode: i32,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub duration_ms: i64,
    pub time_signature: i32,
}

/// One row of the track table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Streaming-service track id, unique in the store.
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    /// Parallel to `artists`.
    pub artist_ids: Vec<String>,
    /// 0..=100
    pub popularity: u32,
    pub label: Label,
    pub features: AudioFeatures,
}

impl TrackRecord {
    /// Builds a record, keeping at most [`MAX_ARTISTS`] artist slots.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        artists: &[(String, String)],
        popularity: u32,
        label: Label,
        features: AudioFeatures,
    ) -> Self {
        let (names, ids) = artists.iter().take(MAX_ARTISTS).cloned().unzip();
        Self {
            id: id.into(),
            name: name.into(),
            artists: names,
            artist_ids: ids,
            popularity: popularity.min(100),
            label,
            features,
        }
    }

    /// Projects the record onto the learning features, in [`FEATURE_NAMES`] order.
    #[must_use]
    pub fn feature_vector(&self) -> FeatureVector {
        let f = &self.features;
        // Durations fit in f64's mantissa.
        #[allow(clippy::cast_precision_loss)]
        let duration = f.duration_ms as f64;
        [
            f64::from(self.popularity),
            f.danceability,
            f.energy,
            f64::from(f.key),
            f.loudness,
            f64::from(f.mode),
            f.speechiness,
            f.acousticness,
            f.instrumentalness,
            f.liveness,
            f.valence,
            f.tempo,
            duration,
            f64::from(f.time_signature),
        ]
    }

    /// "Artist A, Artist B - Title" for console output.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artists.join(", "), self.name)
    }
}
