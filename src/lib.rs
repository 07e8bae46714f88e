//! CSI Sense Agent - device-free activity sensing over Wi-Fi channel state.
//!
//! This library turns the channel-state telemetry an embedded radio emits
//! (per-subcarrier amplitude/phase plus signal strength, one JSON line per
//! packet) into activity labels, without wearable sensors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CSI Sense Agent                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│  Analyzer   │──▶│  Predictor  │       │
//! │  │ (serial /   │   │ (windowed   │   │ (estimator  │       │
//! │  │  replay)    │   │  features)  │   │  + voting)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                  ▲              │
//! │                           ▼                  │              │
//! │                    ┌─────────────┐    ┌─────────────┐      │
//! │                    │   Dataset   │───▶│  Centroid   │      │
//! │                    │   (jsonl)   │fit │   Model     │      │
//! │                    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each session owns its own analyzer and predictor: state never leaks
//! between streams, and memory stays bounded by the window size regardless
//! of stream length.
//!
//! # Example
//!
//! ```no_run
//! use csi_sense_agent::{CsiAnalyzer, SerialSource, DEFAULT_BAUD};
//!
//! let source = SerialSource::open("/dev/ttyUSB0", DEFAULT_BAUD).expect("open port");
//! let mut analyzer = CsiAnalyzer::default();
//!
//! while let Ok(packet) = source.receiver().recv() {
//!     if let Some(features) = analyzer.process(&packet) {
//!         println!("amp mean {:.1}", features.amp_mean);
//!     }
//! }
//! ```

pub mod config;
pub mod core;
pub mod dataset;
pub mod source;

// Re-export key types at crate root for convenience
pub use crate::config::{Config, ConfigError};
pub use crate::core::{
    project, AnalyzerStats, CentroidModel, CsiAnalyzer, Estimate, FeatureVector, ModelError,
    PointEstimator, PredictorStats, Smoothed, SmoothedPredictor, DEFAULT_MOVEMENT_THRESHOLD,
    DEFAULT_WINDOW_SIZE, FEATURE_DIM, FEATURE_NAMES,
};
pub use crate::dataset::{DatasetError, DatasetStore, LabeledFeature, SampleWriter, ACTIVITIES};
pub use crate::source::{RawPacket, ReplaySource, SerialSource, SourceError, DEFAULT_BAUD};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
