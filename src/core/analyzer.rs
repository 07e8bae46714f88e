//! Streaming feature extraction from the CSI packet stream.
//!
//! One analyzer owns one session's window state: bounded histories of recent
//! amplitude vectors and RSSI values, a packet counter, and a movement
//! counter. Feeding the same packet sequence to two analyzer instances
//! produces identical feature sequences.

use crate::source::types::RawPacket;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of packets in the analysis window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default temporal-variance threshold for movement detection.
pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 5.0;

/// Smoothing factor for the amplitude lag filter.
const FILTER_ALPHA: f64 = 0.3;

/// Features derived from one packet plus the current window state.
///
/// Field names are a persistence contract: `fit` and downstream tooling read
/// `features.jsonl` records by these exact names. Every field defaults when
/// absent so partially recorded rows still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Device-clock timestamp of the packet
    #[serde(default)]
    pub timestamp: u64,
    /// 1-based position of the packet within the session
    #[serde(default)]
    pub packet_num: u64,
    /// Signal strength of this packet in dBm
    #[serde(default)]
    pub rssi: i32,
    /// Mean RSSI over the current window, including this packet
    #[serde(default)]
    pub rssi_mean: f64,
    /// Mean amplitude across subcarriers
    #[serde(default)]
    pub amp_mean: f64,
    /// Population standard deviation of amplitude across subcarriers
    #[serde(default)]
    pub amp_std: f64,
    /// Largest subcarrier amplitude
    #[serde(default)]
    pub amp_max: f64,
    /// Smallest subcarrier amplitude
    #[serde(default)]
    pub amp_min: f64,
    /// `amp_max - amp_min`
    #[serde(default)]
    pub amp_range: f64,
    /// Per-subcarrier variance across the window, averaged over subcarriers;
    /// 0 until the window is full
    #[serde(default)]
    pub temporal_variance: f64,
    /// Whether `temporal_variance` exceeded the movement threshold
    #[serde(default)]
    pub movement_detected: bool,
    /// Lag-filtered amplitude mean (see `CsiAnalyzer::process`)
    #[serde(default)]
    pub amp_mean_filtered: f64,
}

/// Cumulative per-session statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub total_packets: u64,
    pub movement_detected_count: u64,
    pub movement_ratio: f64,
}

/// Windowed feature extractor for one packet stream.
pub struct CsiAnalyzer {
    window_size: usize,
    movement_threshold: f64,
    /// Last `window_size` amplitude vectors, oldest first
    amp_history: VecDeque<Vec<f64>>,
    /// Last `window_size` RSSI values, oldest first
    rssi_history: VecDeque<i32>,
    packet_count: u64,
    movement_detected_count: u64,
}

impl CsiAnalyzer {
    /// Create an analyzer with the given window size and movement threshold.
    pub fn new(window_size: usize, movement_threshold: f64) -> Self {
        Self {
            // A zero-length window is meaningless
            window_size: window_size.max(1),
            movement_threshold,
            amp_history: VecDeque::new(),
            rssi_history: VecDeque::new(),
            packet_count: 0,
            movement_detected_count: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn movement_threshold(&self) -> f64 {
        self.movement_threshold
    }

    /// Process one packet, returning its feature vector.
    ///
    /// Returns `None` for a packet with an empty amplitude vector - the
    /// aggregate stats are undefined for it, so it is skipped without
    /// touching any state.
    pub fn process(&mut self, packet: &RawPacket) -> Option<FeatureVector> {
        if packet.amp.is_empty() {
            return None;
        }

        // A subcarrier-count change misaligns the buffered vectors. Restart
        // the warm-up instead of computing variance over mismatched lengths.
        if self
            .amp_history
            .back()
            .is_some_and(|prev| prev.len() != packet.amp.len())
        {
            self.amp_history.clear();
            self.rssi_history.clear();
        }

        self.packet_count += 1;

        let amp_mean = mean(&packet.amp);
        let amp_std = population_std_dev(&packet.amp);
        let amp_max = packet.amp.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let amp_min = packet.amp.iter().copied().fold(f64::INFINITY, f64::min);

        // The lag filter reads the previous raw vector, so take its mean
        // before the current packet is pushed.
        let prev_amp_mean = self.amp_history.back().map(|prev| mean(prev));

        if self.amp_history.len() == self.window_size {
            self.amp_history.pop_front();
        }
        self.amp_history.push_back(packet.amp.clone());
        if self.rssi_history.len() == self.window_size {
            self.rssi_history.pop_front();
        }
        self.rssi_history.push_back(packet.rssi);

        let rssi_mean = self.rssi_history.iter().map(|&r| f64::from(r)).sum::<f64>()
            / self.rssi_history.len() as f64;

        let (temporal_variance, movement_detected) = if self.amp_history.len() >= self.window_size {
            let variance = self.mean_temporal_variance();
            (variance, variance > self.movement_threshold)
        } else {
            (0.0, false)
        };
        if movement_detected {
            self.movement_detected_count += 1;
        }

        // Depth-2 lag filter: blends the current mean with the mean of the
        // previous RAW vector, not with its own prior output. The first
        // packet of a (re)started window passes through unfiltered.
        let amp_mean_filtered = match prev_amp_mean {
            Some(prev) => FILTER_ALPHA * amp_mean + (1.0 - FILTER_ALPHA) * prev,
            None => amp_mean,
        };

        Some(FeatureVector {
            timestamp: packet.ts,
            packet_num: self.packet_count,
            rssi: packet.rssi,
            rssi_mean,
            amp_mean,
            amp_std,
            amp_max,
            amp_min,
            amp_range: amp_max - amp_min,
            temporal_variance,
            movement_detected,
            amp_mean_filtered,
        })
    }

    /// Variance across time for each subcarrier index, averaged into one
    /// scalar. Callers guarantee a full window of equal-length vectors.
    /// Summation is left-to-right throughout so results are reproducible
    /// for identical input sequences.
    fn mean_temporal_variance(&self) -> f64 {
        let subcarriers = match self.amp_history.back() {
            Some(vector) => vector.len(),
            None => return 0.0,
        };
        let n = self.amp_history.len() as f64;

        let mut variance_sum = 0.0;
        for k in 0..subcarriers {
            let mut sum = 0.0;
            for vector in &self.amp_history {
                sum += vector[k];
            }
            let mean = sum / n;

            let mut squared = 0.0;
            for vector in &self.amp_history {
                let delta = vector[k] - mean;
                squared += delta * delta;
            }
            variance_sum += squared / n;
        }
        variance_sum / subcarriers as f64
    }

    /// Cumulative statistics for the session so far.
    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            total_packets: self.packet_count,
            movement_detected_count: self.movement_detected_count,
            movement_ratio: self.movement_detected_count as f64
                / self.packet_count.max(1) as f64,
        }
    }
}

impl Default for CsiAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_MOVEMENT_THRESHOLD)
    }
}

/// Arithmetic mean, accumulated left to right.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (not sample), accumulated left to right.
fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
