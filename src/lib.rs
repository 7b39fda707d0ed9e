//! Daily playlist discovery driven by a classifier trained on your library.
//!
//! Core modules:
//! - [`dataset`] - Labeled dataset loading and train/eval splits
//! - [`classifier`] - Decision tree fitting, evaluation and batch prediction
//! - [`expander`] - Candidate discovery through related artists
//! - [`selector`] - Bounded random selection of accepted candidates
//! - [`pipeline`] - One full run, from library sync to published playlist
//!
//! ### Supporting Modules
//!
//! - [`track`] - Track records, labels and the feature projection
//! - [`db`] - Record store trait with SQLite and in-memory backends
//! - [`service`] - Streaming service fetch interface
//! - [`spotify`] - Spotify Web API client
//! - [`library`] - Library sync into the record store
//! - [`scheduler`] - Repeating runs on a timer
//! - [`config`] - Data directory and settings
//! - [`cli`] / [`completion`] - Command-line interface and shell completions
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use discoverdaily::config::{get_db_path, Settings};
//! use discoverdaily::db::SqliteStore;
//! use discoverdaily::pipeline::Pipeline;
//! use discoverdaily::spotify::SpotifyClient;
//! use rand::SeedableRng;
//!
//! let store = SqliteStore::open(&get_db_path()?)?;
//! let settings = Settings::default();
//! let client = SpotifyClient::new("access-token", &settings.market)?;
//!
//! let mut rng = rand::rngs::StdRng::from_entropy();
//! let report = Pipeline::new(&client, &store, &settings).run(&mut rng)?;
//! println!("Published {} tracks", report.track_ids.len());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How a run works
//!
//! ### Dataset
//! Saved tracks are stored as Liked and the tracks of a designated playlist
//! as Disliked. Records are insert-only, so labels never change and audio
//! features are fetched once per track. Every run projects each record onto
//! the same 14 features ([`FEATURE_NAMES`]) for training, evaluation and
//! scoring.
//!
//! ### Classifier
//! A CART tree refit from scratch every run on a random 85% of the labeled
//! tracks. Accuracy on the held-out 15% is logged but never gates the run.
//!
//! ### Discovery
//! Ten random liked tracks seed a one-hop walk: each seed artist's related
//! artists, then each related artist's top tracks. Tracks already labeled or
//! already found are dropped before their features are fetched.
//!
//! ### Selection
//! Candidates the tree accepts are sampled without replacement, at most
//! `min(requested, accepted - 1, 100)` of them.

pub mod classifier;
pub mod cli;
pub mod completion;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod expander;
pub mod library;
pub mod pipeline;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod spotify;
pub mod track;

#[cfg(test)]
mod fixtures;

pub use error::{DiscoverError, Result};
pub use track::{FeatureVector, Label, TrackRecord, FEATURE_COUNT, FEATURE_NAMES};
