//! Track record storage.
//!
//! [`RecordStore`] is the contract the rest of the crate sees: insert-if-absent
//! writes plus a handful of selects. Two backends implement it:
//!
//! - [`SqliteStore`] - the durable `track` table in the data directory.
//! - [`MemoryStore`] - an in-process store for dry runs and tests.
//!
//! Records are never updated or deleted, so a label written once stays.

use crate::error::Result;
use crate::track::{AudioFeatures, Label, TrackRecord};
use log::{debug, trace};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Storage for labeled tracks, keyed by track id.
pub trait RecordStore {
    /// Whether a record with this id exists.
    fn has_record(&self, id: &str) -> Result<bool>;

    /// Inserts `record` unless its id is already present.
    ///
    /// Returns `true` if a row was written. Inserting an existing id is a
    /// no-op and leaves the stored record (and its label) untouched.
    fn insert_record(&self, record: &TrackRecord) -> Result<bool>;

    /// All records carrying `label`, in insertion order.
    fn select_by_label(&self, label: Label) -> Result<Vec<TrackRecord>>;

    /// Every record, in insertion order.
    fn select_all(&self) -> Result<Vec<TrackRecord>>;

    /// Inserts each record that is not already present; returns how many were written.
    fn insert_records(&self, records: &[TrackRecord]) -> Result<usize> {
        let mut written = 0;
        for record in records {
            if self.insert_record(record)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Number of records per label: (liked, disliked, unlabeled).
    fn label_counts(&self) -> Result<(usize, usize, usize)> {
        let records = self.select_all()?;
        let count = |label| records.iter().filter(|r| r.label == label).count();
        Ok((count(Label::Liked), count(Label::Disliked), count(Label::Unlabeled)))
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS track (
        id               TEXT    PRIMARY KEY,
        name             TEXT    NOT NULL,
        artists          TEXT    NOT NULL,
        artist_ids       TEXT    NOT NULL,
        popularity       INTEGER NOT NULL,
        liked            INTEGER,
        danceability     REAL    NOT NULL,
        energy           REAL    NOT NULL,
        key              INTEGER NOT NULL,
        loudness         REAL    NOT NULL,
        mode             INTEGER NOT NULL,
        speechiness      REAL    NOT NULL,
        acousticness     REAL    NOT NULL,
        instrumentalness REAL    NOT NULL,
        liveness         REAL    NOT NULL,
        valence          REAL    NOT NULL,
        tempo            REAL    NOT NULL,
        duration_ms      INTEGER NOT NULL,
        time_signature   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_track_liked ON track(liked);";

const COLUMNS: &str = "id, name, artists, artist_ids, popularity, liked, danceability, energy, key, \
     loudness, mode, speechiness, acousticness, instrumentalness, liveness, valence, tempo, \
     duration_ms, time_signature";

/// `SQLite`-backed record store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening track database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn query(&self, sql: &str, label: Option<i64>) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = match label {
            Some(value) => stmt.query_map([value], row_to_record)?,
            None => stmt.query_map([], row_to_record)?,
        };

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

impl RecordStore for SqliteStore {
    fn has_record(&self, id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM track WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_record(&self, record: &TrackRecord) -> Result<bool> {
        let f = &record.features;
        let changed = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO track ({COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                record.id,
                record.name,
                serde_json::to_string(&record.artists)?,
                serde_json::to_string(&record.artist_ids)?,
                record.popularity,
                record.label.to_sql(),
                f.danceability,
                f.energy,
                f.key,
                f.loudness,
                f.mode,
                f.speechiness,
                f.acousticness,
                f.instrumentalness,
                f.liveness,
                f.valence,
                f.tempo,
                f.duration_ms,
                f.time_signature,
            ],
        )?;

        if changed == 0 {
            trace!("Track {} already stored, skipping insert", record.id);
        }
        Ok(changed > 0)
    }

    fn select_by_label(&self, label: Label) -> Result<Vec<TrackRecord>> {
        match label.to_sql() {
            Some(value) => self.query(
                &format!("SELECT {COLUMNS} FROM track WHERE liked = ?1 ORDER BY rowid"),
                Some(value),
            ),
            None => self.query(
                &format!("SELECT {COLUMNS} FROM track WHERE liked IS NULL ORDER BY rowid"),
                None,
            ),
        }
    }

    fn select_all(&self) -> Result<Vec<TrackRecord>> {
        self.query(&format!("SELECT {COLUMNS} FROM track ORDER BY rowid"), None)
    }

    /// Same semantics as the default, inside one transaction.
    fn insert_records(&self, records: &[TrackRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;
        for record in records {
            if self.insert_record(record)? {
                written += 1;
            }
        }
        tx.commit()?;
        debug!("Inserted {written} of {} records", records.len());
        Ok(written)
    }

    fn label_counts(&self) -> Result<(usize, usize, usize)> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };
        Ok((
            count("SELECT COUNT(*) FROM track WHERE liked = 1")?,
            count("SELECT COUNT(*) FROM track WHERE liked = 0")?,
            count("SELECT COUNT(*) FROM track WHERE liked IS NULL")?,
        ))
    }
}

/// Maps a `track` row; artist columns hold JSON arrays.
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        artists: json_column(row, 2)?,
        artist_ids: json_column(row, 3)?,
        popularity: row.get(4)?,
        label: Label::from_sql(row.get(5)?),
        features: AudioFeatures {
            danceability: row.get(6)?,
            energy: row.get(7)?,
            key: row.get(8)?,
            loudness: row.get(9)?,
            mode: row.get(10)?,
            speechiness: row.get(11)?,
            acousticness: row.get(12)?,
            instrumentalness: row.get(13)?,
            liveness: row.get(14)?,
            valence: row.get(15)?,
            tempo: row.get(16)?,
            duration_ms: row.get(17)?,
            time_signature: row.get(18)?,
        },
    })
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: Vec<TrackRecord>,
    ids: HashSet<String>,
}

/// In-process record store with the same insert-if-absent semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records` (duplicates collapse to the first).
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = TrackRecord>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                if inner.ids.insert(record.id.clone()) {
                    inner.records.push(record);
                }
            }
        }
        store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn has_record(&self, id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .contains(id))
    }

    fn insert_record(&self, record: &TrackRecord) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.ids.insert(record.id.clone()) {
            return Ok(false);
        }
        inner.records.push(record.clone());
        Ok(true)
    }

    fn select_by_label(&self, label: Label) -> Result<Vec<TrackRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .filter(|r| r.label == label)
            .cloned()
            .collect())
    }

    fn select_all(&self) -> Result<Vec<TrackRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone())
    }
}
