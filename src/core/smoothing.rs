//! Prediction smoothing over an external point estimator.
//!
//! A `SmoothedPredictor` wraps a `PointEstimator`, projects feature vectors
//! into the estimator's expected ordering, and stabilizes noisy per-packet
//! labels with a majority vote over a bounded history.

use crate::core::analyzer::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Number of features the estimator consumes.
pub const FEATURE_DIM: usize = 9;

/// Feature names in projection order.
///
/// This order is a contract with the fitted model: changing it without
/// re-fitting silently misassigns every feature.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "rssi",
    "rssi_mean",
    "amp_mean",
    "amp_std",
    "amp_max",
    "amp_min",
    "amp_range",
    "temporal_variance",
    "amp_mean_filtered",
];

/// A point estimate: label plus per-class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub label: String,
    /// Aligned with the estimator's `classes()` order
    pub probabilities: Vec<f64>,
}

/// Stateless mapping from a projected feature vector to a labeled estimate.
pub trait PointEstimator {
    /// The finite label set, in probability order.
    fn classes(&self) -> &[String];

    /// Estimate a label and class distribution for one projected vector.
    fn estimate(&self, features: &[f64; FEATURE_DIM]) -> Estimate;
}

/// Project a feature vector into the estimator's input ordering.
pub fn project(features: &FeatureVector) -> [f64; FEATURE_DIM] {
    [
        f64::from(features.rssi),
        features.rssi_mean,
        features.amp_mean,
        features.amp_std,
        features.amp_max,
        features.amp_min,
        features.amp_range,
        features.temporal_variance,
        features.amp_mean_filtered,
    ]
}

/// One smoothed prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smoothed {
    /// The estimator's label for this packet alone
    pub raw_label: String,
    /// Highest class probability of this call's distribution
    pub confidence: f64,
    /// Majority-vote label over the prediction history
    pub smoothed_label: String,
}

/// Cumulative prediction statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorStats {
    pub total_predictions: u64,
    /// Lifetime smoothed-label counts, seeded at zero for every known class
    pub class_distribution: BTreeMap<String, u64>,
}

/// Majority-vote smoothing over a bounded history of raw predictions.
pub struct SmoothedPredictor<E: PointEstimator> {
    estimator: E,
    window_size: usize,
    /// Last `window_size` raw labels, oldest first
    history: VecDeque<String>,
    total_predictions: u64,
    class_counts: BTreeMap<String, u64>,
}

impl<E: PointEstimator> SmoothedPredictor<E> {
    /// Create a predictor bound to one estimator.
    ///
    /// The per-class counters are seeded from the estimator's class list so
    /// classes never observed still report a zero count.
    pub fn new(estimator: E, window_size: usize) -> Self {
        let class_counts = estimator
            .classes()
            .iter()
            .map(|class| (class.clone(), 0))
            .collect();
        Self {
            estimator,
            window_size: window_size.max(1),
            history: VecDeque::new(),
            total_predictions: 0,
            class_counts,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Classify one feature vector and smooth the label.
    ///
    /// Until the history holds `window_size` entries the raw label passes
    /// through unsmoothed.
    pub fn smooth(&mut self, features: &FeatureVector) -> Smoothed {
        let estimate = self.estimator.estimate(&project(features));
        let confidence = estimate
            .probabilities
            .iter()
            .copied()
            .fold(0.0_f64, f64::max);

        if self.history.len() == self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(estimate.label.clone());

        let smoothed_label = if self.history.len() >= self.window_size {
            self.majority_label()
        } else {
            estimate.label.clone()
        };

        self.total_predictions += 1;
        *self.class_counts.entry(smoothed_label.clone()).or_insert(0) += 1;

        Smoothed {
            raw_label: estimate.label,
            confidence,
            smoothed_label,
        }
    }

    /// Most frequent label in the history. Among tied labels the most
    /// recently observed one wins, so the result never depends on map
    /// iteration order.
    fn majority_label(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for label in &self.history {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        let max = counts.values().copied().max().unwrap_or(0);
        self.history
            .iter()
            .rev()
            .find(|label| counts[label.as_str()] == max)
            .cloned()
            .unwrap_or_default()
    }

    /// Cumulative statistics for the session so far.
    pub fn stats(&self) -> PredictorStats {
        PredictorStats {
            total_predictions: self.total_predictions,
            class_distribution: self.class_counts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Emits a scripted label sequence with a fixed distribution shape.
    struct ScriptedEstimator {
        classes: Vec<String>,
        script: RefCell<VecDeque<&'static str>>,
    }

    impl ScriptedEstimator {
        fn new(classes: &[&str], script: &[&'static str]) -> Self {
            Self {
                classes: classes.iter().map(|c| c.to_string()).collect(),
                script: RefCell::new(script.iter().copied().collect()),
            }
        }
    }

    impl PointEstimator for ScriptedEstimator {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn estimate(&self, _features: &[f64; FEATURE_DIM]) -> Estimate {
            let label = self
                .script
                .borrow_mut()
                .pop_front()
                .expect("script exhausted");
            let probabilities = self
                .classes
                .iter()
                .map(|c| if c == label { 0.8 } else { 0.1 })
                .collect();
            Estimate {
                label: label.to_string(),
                probabilities,
            }
        }
    }

    fn features() -> FeatureVector {
        FeatureVector {
            timestamp: 0,
            packet_num: 1,
            rssi: -50,
            rssi_mean: -50.0,
            amp_mean: 10.0,
            amp_std: 1.0,
            amp_max: 12.0,
            amp_min: 8.0,
            amp_range: 4.0,
            temporal_variance: 0.5,
            movement_detected: false,
            amp_mean_filtered: 10.0,
        }
    }

    #[test]
    fn test_projection_order() {
        let projected = project(&features());
        assert_eq!(
            projected,
            [-50.0, -50.0, 10.0, 1.0, 12.0, 8.0, 4.0, 0.5, 10.0]
        );
        assert_eq!(FEATURE_NAMES.len(), projected.len());
    }

    #[test]
    fn test_passthrough_before_window_full() {
        let estimator = ScriptedEstimator::new(&["a", "b"], &["a", "b", "a"]);
        let mut predictor = SmoothedPredictor::new(estimator, 4);

        for expected in ["a", "b", "a"] {
            let smoothed = predictor.smooth(&features());
            assert_eq!(smoothed.raw_label, expected);
            assert_eq!(smoothed.smoothed_label, expected);
        }
    }

    #[test]
    fn test_majority_vote_once_full() {
        let estimator = ScriptedEstimator::new(&["a", "b"], &["a", "a", "b", "a"]);
        let mut predictor = SmoothedPredictor::new(estimator, 4);

        predictor.smooth(&features());
        predictor.smooth(&features());
        predictor.smooth(&features());
        let fourth = predictor.smooth(&features());

        assert_eq!(fourth.raw_label, "a");
        // 3-of-4 majority
        assert_eq!(fourth.smoothed_label, "a");
        // Confidence is the max of this call's distribution
        assert_eq!(fourth.confidence, 0.8);
    }

    #[test]
    fn test_tie_breaks_to_most_recent() {
        let estimator = ScriptedEstimator::new(&["a", "b"], &["a", "a", "b", "b"]);
        let mut predictor = SmoothedPredictor::new(estimator, 4);
        for _ in 0..3 {
            predictor.smooth(&features());
        }
        let fourth = predictor.smooth(&features());
        // 2-2 tie: "b" was seen more recently
        assert_eq!(fourth.smoothed_label, "b");

        let estimator = ScriptedEstimator::new(&["a", "b"], &["b", "b", "a", "a"]);
        let mut predictor = SmoothedPredictor::new(estimator, 4);
        for _ in 0..3 {
            predictor.smooth(&features());
        }
        assert_eq!(predictor.smooth(&features()).smoothed_label, "a");
    }

    #[test]
    fn test_history_is_bounded() {
        let estimator = ScriptedEstimator::new(&["a", "b"], &["a", "b", "b"]);
        let mut predictor = SmoothedPredictor::new(estimator, 2);
        predictor.smooth(&features());
        predictor.smooth(&features());
        // Window [b, b]: the initial "a" has been evicted
        let third = predictor.smooth(&features());
        assert_eq!(third.smoothed_label, "b");
    }

    #[test]
    fn test_class_counts_seeded_from_known_set() {
        let estimator = ScriptedEstimator::new(&["a", "b", "c"], &["a", "a"]);
        let mut predictor = SmoothedPredictor::new(estimator, 5);
        predictor.smooth(&features());
        predictor.smooth(&features());

        let stats = predictor.stats();
        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.class_distribution["a"], 2);
        assert_eq!(stats.class_distribution["b"], 0);
        // Never observed, still reported
        assert_eq!(stats.class_distribution["c"], 0);
    }
}
