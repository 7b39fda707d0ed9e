//! Labeled dataset loading and train/eval splitting.

use crate::db::RecordStore;
use crate::error::Result;
use crate::track::{FeatureVector, Label, TrackRecord, FEATURE_COUNT};
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Default fraction of rows held out for evaluation.
pub const DEFAULT_TEST_RATIO: f64 = 0.15;

/// Every Liked or Disliked record in the store.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    records: Vec<TrackRecord>,
}

/// Disjoint partition of a [`LabeledDataset`].
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<TrackRecord>,
    pub eval: Vec<TrackRecord>,
}

/// Reads the labeled part of the store.
pub fn load(store: &dyn RecordStore) -> Result<LabeledDataset> {
    let mut records = store.select_by_label(Label::Liked)?;
    records.extend(store.select_by_label(Label::Disliked)?);

    let dataset = LabeledDataset { records };
    debug!(
        "Loaded {} labeled tracks ({} liked, {} disliked)",
        dataset.len(),
        dataset.liked().count(),
        dataset.disliked().count()
    );

    if dataset.len() < 10 * FEATURE_COUNT {
        warn!(
            "Only {} labeled tracks; the classifier will be unreliable below {}",
            dataset.len(),
            10 * FEATURE_COUNT
        );
    }
    Ok(dataset)
}

impl LabeledDataset {
    /// Builds a dataset from arbitrary records, dropping unlabeled ones.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = TrackRecord>) -> Self {
        Self {
            records: records.into_iter().filter(|r| r.label.is_labeled()).collect(),
        }
    }

    #[must_use]
    pub fn records(&self) -> &[TrackRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn liked(&self) -> impl Iterator<Item = &TrackRecord> {
        self.records.iter().filter(|r| r.label == Label::Liked)
    }

    pub fn disliked(&self) -> impl Iterator<Item = &TrackRecord> {
        self.records.iter().filter(|r| r.label == Label::Disliked)
    }

    /// Ids of every labeled record, for excluding known tracks from discovery.
    #[must_use]
    pub fn known_ids(&self) -> HashSet<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Randomly partitions rows; `ratio` of them (rounded up) go to eval.
    ///
    /// Never fails: an empty or single-class dataset splits like any other.
    pub fn split<R: Rng + ?Sized>(&self, ratio: f64, rng: &mut R) -> DatasetSplit {
        let ratio = ratio.clamp(0.0, 1.0);
        let mut shuffled = self.records.clone();
        shuffled.shuffle(rng);

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let eval_len = ((shuffled.len() as f64) * ratio).ceil() as usize;
        let eval_len = eval_len.min(shuffled.len());

        let eval = shuffled.split_off(shuffled.len() - eval_len);
        DatasetSplit { train: shuffled, eval }
    }
}

/// Feature matrix and class labels for a set of labeled records.
#[must_use]
pub fn to_samples(records: &[TrackRecord]) -> (Vec<FeatureVector>, Vec<u8>) {
    records
        .iter()
        .filter_map(|r| r.label.class().map(|class| (r.feature_vector(), class)))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::track::AudioFeatures;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(id: usize, label: Label) -> TrackRecord {
        TrackRecord::new(
            format!("t{id}"),
            format!("Song {id}"),
            &[],
            30,
            label,
            AudioFeatures::default(),
        )
    }

    fn balanced(n_each: usize) -> LabeledDataset {
        LabeledDataset::from_records(
            (0..n_each)
                .map(|i| record(i, Label::Liked))
                .chain((n_each..2 * n_each).map(|i| record(i, Label::Disliked))),
        )
    }

    #[test]
    fn test_load_keeps_only_labeled_records() -> Result<()> {
        let store = MemoryStore::with_records(vec![
            record(1, Label::Liked),
            record(2, Label::Unlabeled),
            record(3, Label::Disliked),
            record(4, Label::Liked),
        ]);

        let dataset = load(&store)?;
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.liked().count(), 2);
        assert_eq!(dataset.disliked().count(), 1);
        assert!(!dataset.known_ids().contains("t2"));
        Ok(())
    }

    #[test]
    fn test_split_sizes_for_400_rows() {
        let dataset = balanced(200);
        let mut rng = StdRng::seed_from_u64(7);

        let split = dataset.split(0.15, &mut rng);
        assert_eq!(split.eval.len(), 60);
        assert_eq!(split.train.len(), 340);
    }

    #[test]
    fn test_split_is_a_partition() {
        let dataset = balanced(37);
        let mut rng = StdRng::seed_from_u64(99);

        let split = dataset.split(0.3, &mut rng);
        assert_eq!(split.train.len() + split.eval.len(), dataset.len());

        let train_ids: HashSet<_> = split.train.iter().map(|r| r.id.clone()).collect();
        let eval_ids: HashSet<_> = split.eval.iter().map(|r| r.id.clone()).collect();
        assert!(train_ids.is_disjoint(&eval_ids));
        assert_eq!(train_ids.len() + eval_ids.len(), dataset.len());
    }

    #[test]
    fn test_split_degenerate_inputs() {
        let mut rng = StdRng::seed_from_u64(1);

        let empty = LabeledDataset::default().split(0.15, &mut rng);
        assert!(empty.train.is_empty() && empty.eval.is_empty());

        let one_class = LabeledDataset::from_records((0..5).map(|i| record(i, Label::Liked)));
        let split = one_class.split(0.15, &mut rng);
        assert_eq!(split.eval.len(), 1);
        assert_eq!(split.train.len(), 4);

        let all_eval = one_class.split(1.0, &mut rng);
        assert_eq!(all_eval.eval.len(), 5);
        assert!(all_eval.train.is_empty());
    }

    #[test]
    fn test_to_samples_uses_binary_classes() {
        let records = vec![record(1, Label::Liked), record(2, Label::Disliked), record(3, Label::Unlabeled)];
        let (features, classes) = to_samples(&records);
        assert_eq!(features.len(), 2);
        assert_eq!(classes, vec![1, 0]);
    }
}
