//! Nearest-centroid activity model.
//!
//! The estimator behind `classify`: inputs are standard-scored per feature,
//! then classified by Euclidean distance to per-class centroids, with the
//! distances softmaxed into a class probability distribution. Fitted offline
//! from a collected dataset and persisted as a single JSON file next to a
//! metrics report.

use crate::core::smoothing::{Estimate, PointEstimator, FEATURE_DIM, FEATURE_NAMES};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::path::Path;

/// Identifier written into every model file.
pub const MODEL_TYPE: &str = "nearest-centroid";

/// Errors from model fitting, persistence, and validation.
#[derive(Debug)]
pub enum ModelError {
    Io(String),
    Parse(String),
    Serialize(String),
    EmptyTrainingSet,
    /// The file's feature ordering differs from this build's projection
    FeatureOrderMismatch,
    Invalid(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Io(e) => write!(f, "IO error: {e}"),
            ModelError::Parse(e) => write!(f, "Parse error: {e}"),
            ModelError::Serialize(e) => write!(f, "Serialize error: {e}"),
            ModelError::EmptyTrainingSet => write!(f, "Training set is empty"),
            ModelError::FeatureOrderMismatch => {
                write!(f, "Model feature order does not match this build")
            }
            ModelError::Invalid(e) => write!(f, "Invalid model: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Per-feature standard-score parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Scaler {
    /// Fit mean and population standard deviation per feature column.
    pub fn fit(rows: &[[f64; FEATURE_DIM]]) -> Self {
        let mut mean = Vec::with_capacity(FEATURE_DIM);
        let mut std = Vec::with_capacity(FEATURE_DIM);
        for k in 0..FEATURE_DIM {
            let column: Vec<f64> = rows.iter().map(|row| row[k]).collect();
            mean.push(column.iter().mean());
            std.push(column.iter().population_std_dev());
        }
        Self { mean, std }
    }

    /// Standard-score one vector. A constant feature (std 0) is only
    /// centered.
    pub fn transform(&self, features: &[f64; FEATURE_DIM]) -> [f64; FEATURE_DIM] {
        let mut out = [0.0; FEATURE_DIM];
        for k in 0..FEATURE_DIM {
            let std = if self.std[k] > 0.0 { self.std[k] } else { 1.0 };
            out[k] = (features[k] - self.mean[k]) / std;
        }
        out
    }
}

/// Training metrics embedded in the model file and mirrored to the metrics
/// report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub training_samples: usize,
    pub samples_per_class: BTreeMap<String, usize>,
    pub training_accuracy: f64,
}

/// A fitted nearest-centroid classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    pub model_type: String,
    pub trained_at: String,
    /// Sorted label set; probability distributions follow this order
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
    pub scaler: Scaler,
    /// Per-class mean of scaled training vectors
    pub centroids: BTreeMap<String, Vec<f64>>,
    pub metrics: ModelMetrics,
}

impl CentroidModel {
    /// Fit a model from projected feature rows and their labels.
    pub fn fit(rows: &[[f64; FEATURE_DIM]], labels: &[String]) -> Result<Self, ModelError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let scaler = Scaler::fit(rows);
        let scaled: Vec<[f64; FEATURE_DIM]> = rows.iter().map(|row| scaler.transform(row)).collect();

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();

        let mut centroids = BTreeMap::new();
        let mut samples_per_class = BTreeMap::new();
        for class in &classes {
            let mut centroid = vec![0.0; FEATURE_DIM];
            let mut count = 0usize;
            for (row, label) in scaled.iter().zip(labels) {
                if label == class {
                    for k in 0..FEATURE_DIM {
                        centroid[k] += row[k];
                    }
                    count += 1;
                }
            }
            for value in &mut centroid {
                *value /= count as f64;
            }
            samples_per_class.insert(class.clone(), count);
            centroids.insert(class.clone(), centroid);
        }

        let mut model = Self {
            model_type: MODEL_TYPE.to_string(),
            trained_at: Utc::now().to_rfc3339(),
            classes,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            scaler,
            centroids,
            metrics: ModelMetrics::default(),
        };

        let correct = rows
            .iter()
            .zip(labels)
            .filter(|(row, label)| model.estimate(row).label == **label)
            .count();
        model.metrics = ModelMetrics {
            training_samples: rows.len(),
            samples_per_class,
            training_accuracy: correct as f64 / rows.len() as f64,
        };

        Ok(model)
    }

    /// Load and validate a model file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Io(e.to_string()))?;
        let model: Self =
            serde_json::from_str(&content).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Save the model as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelError::Io(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ModelError::Serialize(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::Io(e.to_string()))
    }

    /// Save the training metrics alone as a separate report.
    pub fn save_metrics(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ModelError::Io(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.metrics)
            .map_err(|e| ModelError::Serialize(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::Io(e.to_string()))
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.feature_names != FEATURE_NAMES {
            return Err(ModelError::FeatureOrderMismatch);
        }
        if self.classes.is_empty() {
            return Err(ModelError::Invalid("no classes".to_string()));
        }
        if self.scaler.mean.len() != FEATURE_DIM || self.scaler.std.len() != FEATURE_DIM {
            return Err(ModelError::Invalid("scaler dimension mismatch".to_string()));
        }
        for class in &self.classes {
            match self.centroids.get(class) {
                Some(centroid) if centroid.len() == FEATURE_DIM => {}
                Some(_) => {
                    return Err(ModelError::Invalid(format!(
                        "centroid dimension mismatch for class {class}"
                    )))
                }
                None => {
                    return Err(ModelError::Invalid(format!(
                        "missing centroid for class {class}"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl PointEstimator for CentroidModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn estimate(&self, features: &[f64; FEATURE_DIM]) -> Estimate {
        let scaled = self.scaler.transform(features);
        let distances: Vec<f64> = self
            .classes
            .iter()
            .map(|class| euclidean(&scaled, &self.centroids[class]))
            .collect();

        // Softmax over negated distances, shifted by the closest so the
        // exponents stay bounded.
        let closest = distances.iter().copied().fold(f64::INFINITY, f64::min);
        let weights: Vec<f64> = distances.iter().map(|d| (-(d - closest)).exp()).collect();
        let total: f64 = weights.iter().sum();
        let probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();

        // Argmax; ties resolve to the first class in sorted order
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }

        Estimate {
            label: self.classes[best].clone(),
            probabilities,
        }
    }
}

/// Euclidean distance, accumulated left to right.
fn euclidean(a: &[f64; FEATURE_DIM], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for k in 0..FEATURE_DIM {
        let delta = a[k] - b[k];
        sum += delta * delta;
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated clusters along the amplitude features.
    fn training_data() -> (Vec<[f64; FEATURE_DIM]>, Vec<String>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            let jitter = i as f64 * 0.01;
            rows.push([
                -40.0, -40.0, 5.0 + jitter, 0.5, 6.0, 4.0, 2.0, 0.1, 5.0,
            ]);
            labels.push("empty".to_string());
            rows.push([
                -40.0,
                -40.0,
                20.0 + jitter,
                3.0,
                30.0,
                10.0,
                20.0,
                12.0,
                20.0,
            ]);
            labels.push("walking".to_string());
        }
        (rows, labels)
    }

    #[test]
    fn test_fit_classifies_training_points() {
        let (rows, labels) = training_data();
        let model = CentroidModel::fit(&rows, &labels).unwrap();

        assert_eq!(model.classes, vec!["empty", "walking"]);
        assert_eq!(model.metrics.training_samples, rows.len());
        assert_eq!(model.metrics.samples_per_class["empty"], 10);
        assert_eq!(model.metrics.training_accuracy, 1.0);

        for (row, label) in rows.iter().zip(&labels) {
            assert_eq!(&model.estimate(row).label, label);
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (rows, labels) = training_data();
        let model = CentroidModel::fit(&rows, &labels).unwrap();

        let estimate = model.estimate(&rows[0]);
        let total: f64 = estimate.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(estimate.probabilities.len(), model.classes.len());

        let confidence = estimate
            .probabilities
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);
        assert!(confidence > 0.5);
    }

    #[test]
    fn test_constant_feature_does_not_divide_by_zero() {
        let (rows, labels) = training_data();
        // rssi column is constant in the fixture
        let model = CentroidModel::fit(&rows, &labels).unwrap();
        let scaled = model.scaler.transform(&rows[0]);
        assert!(scaled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_equidistant_tie_takes_first_sorted_class() {
        let rows: Vec<[f64; FEATURE_DIM]> = vec![
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let labels = vec!["b".to_string(), "a".to_string()];
        let model = CentroidModel::fit(&rows, &labels).unwrap();

        // The midpoint is equidistant from both centroids
        let midpoint = [0.0; FEATURE_DIM];
        assert_eq!(model.estimate(&midpoint).label, "a");
    }

    #[test]
    fn test_empty_training_set_rejected() {
        assert!(matches!(
            CentroidModel::fit(&[], &[]),
            Err(ModelError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let (rows, labels) = training_data();
        let model = CentroidModel::fit(&rows, &labels).unwrap();

        let dir = std::env::temp_dir().join(format!("csi-sense-model-{}", std::process::id()));
        let path = dir.join("centroid.json");
        model.save(&path).unwrap();

        let loaded = CentroidModel::load(&path).unwrap();
        assert_eq!(loaded.classes, model.classes);
        assert_eq!(loaded.estimate(&rows[0]).label, "empty");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_foreign_feature_order() {
        let (rows, labels) = training_data();
        let mut model = CentroidModel::fit(&rows, &labels).unwrap();
        model.feature_names.swap(0, 1);

        let dir = std::env::temp_dir().join(format!("csi-sense-model-bad-{}", std::process::id()));
        let path = dir.join("centroid.json");
        model.save(&path).unwrap();

        assert!(matches!(
            CentroidModel::load(&path),
            Err(ModelError::FeatureOrderMismatch)
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
