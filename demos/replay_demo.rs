//! Demonstration of the full sensing pipeline without hardware.
//!
//! This example shows how to:
//! 1. Feed synthesized packets through a replay source
//! 2. Extract windowed features with the analyzer
//! 3. Fit a nearest-centroid model from labeled features
//! 4. Smooth live predictions with majority voting
//!
//! Run with: cargo run --example replay_demo

use csi_sense_agent::{
    core::{project, CentroidModel, CsiAnalyzer, SmoothedPredictor},
    source::{RawPacket, ReplaySource},
};

/// Synthesize a session: a still baseline followed by channel churn.
fn synth_packets() -> Vec<RawPacket> {
    let mut packets = Vec::new();
    for i in 0..40u64 {
        // Static scene: amplitudes barely move
        let wobble = (i % 3) as f64 * 0.05;
        packets.push(RawPacket {
            ts: i,
            rssi: -44,
            amp: vec![10.0 + wobble, 11.0 - wobble, 10.5],
            phase: vec![0.1, 0.2, 0.3],
        });
    }
    for i in 40..80u64 {
        // Someone walks through: amplitudes swing hard
        let swing = ((i % 5) as f64 - 2.0) * 6.0;
        packets.push(RawPacket {
            ts: i,
            rssi: -48,
            amp: vec![30.0 + swing, 31.0 - swing, 30.5 + swing / 2.0],
            phase: vec![0.1, 0.2, 0.3],
        });
    }
    packets
}

fn main() {
    println!("CSI Sense Agent - Replay Demo");
    println!("=============================");
    println!();

    let packets = synth_packets();

    // Pass 1: extract features and label them by construction
    let mut analyzer = CsiAnalyzer::new(5, 5.0);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for packet in &packets {
        if let Some(features) = analyzer.process(packet) {
            rows.push(project(&features));
            labels.push(if packet.ts < 40 { "empty" } else { "walking" }.to_string());
        }
    }

    let stats = analyzer.stats();
    println!(
        "Extracted {} feature vectors ({} flagged as movement, {:.0}%)",
        stats.total_packets,
        stats.movement_detected_count,
        stats.movement_ratio * 100.0
    );

    // Fit the estimator
    let model = CentroidModel::fit(&rows, &labels).expect("fit model");
    println!(
        "Fitted model: classes [{}], training accuracy {:.1}%",
        model.classes.join(", "),
        model.metrics.training_accuracy * 100.0
    );
    println!();

    // Pass 2: classify the same session live, as `classify` would
    let source = ReplaySource::from_packets(packets);
    let mut analyzer = CsiAnalyzer::new(5, 5.0);
    let mut predictor = SmoothedPredictor::new(model, 7);

    println!("Replaying session:");
    while let Ok(packet) = source.receiver().recv() {
        let Some(features) = analyzer.process(&packet) else {
            continue;
        };
        let smoothed = predictor.smooth(&features);

        if features.packet_num % 10 == 0 {
            println!(
                "  packet {:3} | var {:7.2} | raw {:8} | smoothed {:8} ({:4.1}%)",
                features.packet_num,
                features.temporal_variance,
                smoothed.raw_label,
                smoothed.smoothed_label,
                smoothed.confidence * 100.0
            );
        }
    }

    println!();
    let stats = predictor.stats();
    println!("Total predictions: {}", stats.total_predictions);
    for (class, count) in &stats.class_distribution {
        println!("  {class:8}: {count}");
    }
    println!();
    println!("Demo complete!");
}
