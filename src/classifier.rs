//! Binary "would the user like this?" classification.
//!
//! A CART decision tree from `linfa-trees` (Gini impurity, axis-aligned
//! thresholds) fit on the training split every run and thrown away
//! afterwards. `min_samples_split` is the main guard against overfitting a
//! small personal library: nodes holding fewer rows than that become leaves.
//!
//! ```
//! use discoverdaily::classifier::{fit, Classifier, TreeConfig};
//!
//! let mut features = Vec::new();
//! let mut classes = Vec::new();
//! for i in 0..20 {
//!     let mut row = [0.0; 14];
//!     row[1] = f64::from(i) / 20.0; // danceability
//!     features.push(row);
//!     classes.push(u8::from(i >= 10));
//! }
//!
//! let config = TreeConfig { min_samples_split: 2, ..TreeConfig::default() };
//! let tree = fit(&features, &classes, &config)?;
//! assert_eq!(tree.predict(&features[15]), 1);
//! assert_eq!(tree.predict(&features[3]), 0);
//! # Ok::<(), discoverdaily::error::DiscoverError>(())
//! ```

use crate::dataset::{to_samples, DatasetSplit};
use crate::error::{DiscoverError, Result};
use crate::track::{FeatureVector, Label, TrackRecord, FEATURE_COUNT, FEATURE_NAMES};
use linfa::prelude::{Dataset, Fit};
use linfa_trees::{DecisionTree as Cart, SplitQuality};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Rows per matrix handed to a rayon worker when predicting a batch.
const PREDICT_CHUNK: usize = 1024;

/// Anything that maps a feature vector to 0 (disliked) or 1 (liked).
pub trait Classifier: Sync {
    fn predict(&self, features: &FeatureVector) -> u8;

    /// Predictions parallel to `batch`.
    fn predict_batch(&self, batch: &[FeatureVector]) -> Vec<u8> {
        batch.par_iter().map(|x| self.predict(x)).collect()
    }
}

/// Tree hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Nodes with fewer rows than this are not split.
    pub min_samples_split: usize,
    /// Each side of a split keeps at least this many rows.
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            min_samples_split: 150,
            min_samples_leaf: 1,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Model {
    Constant(u8),
    Fitted(Cart<f64, usize>),
}

/// A fitted tree. Immutable once built.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    model: Model,
    samples: usize,
}

fn to_matrix(rows: &[FeatureVector]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| rows[i][j])
}

impl DecisionTree {
    /// A tree that answers `class` for everything.
    #[must_use]
    pub const fn constant(class: u8) -> Self {
        Self {
            model: Model::Constant(class),
            samples: 0,
        }
    }

    /// Number of split levels below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        match &self.model {
            Model::Constant(_) => 0,
            Model::Fitted(cart) => cart.max_depth(),
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match &self.model {
            Model::Constant(_) => 1,
            Model::Fitted(cart) => cart.num_leaves(),
        }
    }

    /// Rows the tree was fit on.
    #[must_use]
    pub const fn training_samples(&self) -> usize {
        self.samples
    }

    /// Name of the feature tested at the root, if the root splits.
    #[must_use]
    pub fn root_feature(&self) -> Option<&'static str> {
        match &self.model {
            Model::Fitted(cart) if !cart.root_node().is_leaf() => {
                let (feature, _, _) = cart.root_node().split();
                FEATURE_NAMES.get(feature).copied()
            }
            _ => None,
        }
    }

    fn predict_rows(cart: &Cart<f64, usize>, rows: &[FeatureVector]) -> Vec<u8> {
        let classes: Array1<usize> = linfa::prelude::Predict::predict(cart, &to_matrix(rows));
        classes
            .iter()
            .map(|&class| u8::from(class == 1))
            .collect()
    }
}

impl Classifier for DecisionTree {
    fn predict(&self, features: &FeatureVector) -> u8 {
        match &self.model {
            Model::Constant(class) => *class,
            Model::Fitted(cart) => Self::predict_rows(cart, std::slice::from_ref(features))
                .first()
                .copied()
                .unwrap_or(0),
        }
    }

    fn predict_batch(&self, batch: &[FeatureVector]) -> Vec<u8> {
        match &self.model {
            Model::Constant(class) => vec![*class; batch.len()],
            Model::Fitted(cart) => batch
                .par_chunks(PREDICT_CHUNK)
                .flat_map_iter(|rows| Self::predict_rows(cart, rows))
                .collect(),
        }
    }
}

/// Fits a tree on `features`/`classes` (same length, classes in {0, 1}).
///
/// # Errors
///
/// [`DiscoverError::EmptyTrainingSet`] without rows and
/// [`DiscoverError::DegenerateTrainingSet`] when every row has the same class.
pub fn fit(features: &[FeatureVector], classes: &[u8], config: &TreeConfig) -> Result<DecisionTree> {
    let n = features.len().min(classes.len());
    if n == 0 {
        return Err(DiscoverError::EmptyTrainingSet);
    }

    let liked = classes[..n].iter().filter(|&&c| c == 1).count();
    if liked == 0 || liked == n {
        return Err(DiscoverError::DegenerateTrainingSet {
            label: Label::from_class(u8::from(liked == n)),
        });
    }

    let records = to_matrix(&features[..n]);
    let targets: Array1<usize> = classes[..n].iter().map(|&c| usize::from(c)).collect();
    let dataset = Dataset::new(records, targets);

    #[allow(clippy::cast_precision_loss)]
    let params = Cart::<f64, usize>::params()
        .split_quality(SplitQuality::Gini)
        .min_weight_split(config.min_samples_split.max(2) as f32)
        .min_weight_leaf(config.min_samples_leaf.max(1) as f32)
        .max_depth(config.max_depth);
    let cart = params
        .fit(&dataset)
        .map_err(|e| DiscoverError::Model(e.to_string()))?;

    Ok(DecisionTree {
        model: Model::Fitted(cart),
        samples: n,
    })
}

/// [`fit`] on labeled records, projected with [`TrackRecord::feature_vector`].
pub fn fit_records(records: &[TrackRecord], config: &TreeConfig) -> Result<DecisionTree> {
    let (features, classes) = to_samples(records);
    fit(&features, &classes, config)
}

/// Fraction of `records` whose predicted class matches their label.
///
/// `None` when there is nothing labeled to evaluate on.
pub fn evaluate(model: &dyn Classifier, records: &[TrackRecord]) -> Option<f64> {
    let (features, classes) = to_samples(records);
    if classes.is_empty() {
        return None;
    }

    let predictions = model.predict_batch(&features);
    let correct = predictions
        .iter()
        .zip(&classes)
        .filter(|(predicted, actual)| predicted == actual)
        .count();

    #[allow(clippy::cast_precision_loss)]
    let accuracy = correct as f64 / classes.len() as f64;
    Some(accuracy)
}

/// Outcome of fitting and evaluating one run's classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub eval_rows: usize,
    pub depth: usize,
    pub leaves: usize,
    /// Held-out accuracy in [0, 1]; `None` with an empty eval split.
    pub accuracy: Option<f64>,
    /// Set when the training split held a single class and a constant
    /// classifier stands in for the tree.
    pub constant_fallback: Option<Label>,
}

/// Fits on `split.train`, evaluates on `split.eval`, and logs the result.
///
/// A single-class training split is reported and replaced by a constant
/// classifier for that class; accuracy is still measured on the eval rows.
///
/// # Errors
///
/// [`DiscoverError::EmptyTrainingSet`] when the training split is empty.
pub fn train_and_evaluate(split: &DatasetSplit, config: &TreeConfig) -> Result<(DecisionTree, TrainingReport)> {
    debug!(
        "Training decision tree on {} rows (min_samples_split = {})",
        split.train.len(),
        config.min_samples_split
    );

    let (tree, constant_fallback) = match fit_records(&split.train, config) {
        Ok(tree) => (tree, None),
        Err(DiscoverError::DegenerateTrainingSet { label }) => {
            warn!("Training split only holds {label} tracks; predicting {label} for every candidate");
            let class = label.class().unwrap_or(0);
            (DecisionTree::constant(class), Some(label))
        }
        Err(e) => return Err(e),
    };

    let accuracy = evaluate(&tree, &split.eval);
    match accuracy {
        Some(accuracy) => info!(
            "Decision tree accuracy: {:.2}% on {} held-out tracks",
            accuracy * 100.0,
            split.eval.len()
        ),
        None => info!("Decision tree accuracy: n/a (no held-out tracks)"),
    }

    let report = TrainingReport {
        train_rows: split.train.len(),
        eval_rows: split.eval.len(),
        depth: tree.depth(),
        leaves: tree.leaf_count(),
        accuracy,
        constant_fallback,
    };
    debug!(
        "Tree depth {}, {} leaves, root split on {}",
        report.depth,
        report.leaves,
        tree.root_feature().unwrap_or("nothing")
    );
    Ok((tree, report))
}
