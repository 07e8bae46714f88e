//! Core streaming engine.
//!
//! This module contains:
//! - Windowed feature extraction from the packet stream
//! - Prediction smoothing over a point estimator
//! - The nearest-centroid estimator and its persistence

pub mod analyzer;
pub mod model;
pub mod smoothing;

// Re-export commonly used types
pub use analyzer::{
    AnalyzerStats, CsiAnalyzer, FeatureVector, DEFAULT_MOVEMENT_THRESHOLD, DEFAULT_WINDOW_SIZE,
};
pub use model::{CentroidModel, ModelError, ModelMetrics, Scaler, MODEL_TYPE};
pub use smoothing::{
    project, Estimate, PointEstimator, PredictorStats, Smoothed, SmoothedPredictor, FEATURE_DIM,
    FEATURE_NAMES,
};
