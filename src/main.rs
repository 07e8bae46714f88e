//! CSI Sense Agent CLI
//!
//! Device-free activity sensing over Wi-Fi channel state.

use chrono::Local;
use clap::{Parser, Subcommand};
use csi_sense_agent::{
    config::Config,
    core::{CentroidModel, CsiAnalyzer, PointEstimator, SmoothedPredictor},
    dataset::{activity_description, DatasetStore, LabeledFeature, SampleSession, ACTIVITIES},
    source::SerialSource,
    VERSION,
};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "csi-sense")]
#[command(version = VERSION)]
#[command(about = "Device-free activity sensing over Wi-Fi channel state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream packets from the radio and print extracted features
    Analyze {
        /// Serial port (e.g. /dev/ttyUSB0 or COM3)
        port: String,

        /// Baud rate (default from config)
        #[arg(long, short)]
        baud: Option<u32>,

        /// Analysis window size in packets
        #[arg(long, short)]
        window: Option<usize>,

        /// Movement detection threshold
        #[arg(long, short)]
        threshold: Option<f64>,

        /// Append extracted features to a JSONL file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Append raw packets to a JSONL file
        #[arg(long)]
        raw_output: Option<PathBuf>,

        /// Show movement detection status per packet
        #[arg(long, short)]
        detect_movement: bool,

        /// Show detailed output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Collect a labeled dataset sample (interactive without --activity)
    Collect {
        /// Serial port (e.g. /dev/ttyUSB0 or COM3)
        port: String,

        /// Baud rate (default from config)
        #[arg(long, short)]
        baud: Option<u32>,

        /// Dataset directory (default from config)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Activity to collect (non-interactive mode)
        #[arg(long, short)]
        activity: Option<String>,

        /// Collection duration in seconds
        #[arg(long, short, default_value = "30")]
        duration: u64,

        /// Custom activity description
        #[arg(long)]
        description: Option<String>,
    },

    /// Classify activity in real time using a fitted model
    Classify {
        /// Serial port (e.g. /dev/ttyUSB0 or COM3)
        port: String,

        /// Path to the model file (default from config)
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Baud rate (default from config)
        #[arg(long, short)]
        baud: Option<u32>,

        /// Smoothing window size in predictions
        #[arg(long, short, default_value = "10")]
        window: usize,

        /// Show raw (unsmoothed) predictions too
        #[arg(long, short)]
        verbose: bool,
    },

    /// Fit a nearest-centroid model from a collected dataset
    Fit {
        /// Dataset directory (default from config)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Output model path (default from config)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show dataset summary
    Summary {
        /// Dataset directory (default from config)
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// List available serial ports
    Ports,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            port,
            baud,
            window,
            threshold,
            output,
            raw_output,
            detect_movement,
            verbose,
        } => cmd_analyze(
            &port,
            baud,
            window,
            threshold,
            output,
            raw_output,
            detect_movement,
            verbose,
        ),
        Commands::Collect {
            port,
            baud,
            output_dir,
            activity,
            duration,
            description,
        } => cmd_collect(&port, baud, output_dir, activity, duration, description),
        Commands::Classify {
            port,
            model,
            baud,
            window,
            verbose,
        } => cmd_classify(&port, model, baud, window, verbose),
        Commands::Fit { dataset, output } => cmd_fit(dataset, output),
        Commands::Summary { dataset } => cmd_summary(dataset),
        Commands::Ports => cmd_ports(),
        Commands::Config => cmd_config(),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_analyze(
    port: &str,
    baud: Option<u32>,
    window: Option<usize>,
    threshold: Option<f64>,
    output: Option<PathBuf>,
    raw_output: Option<PathBuf>,
    detect_movement: bool,
    verbose: bool,
) {
    let config = Config::load().unwrap_or_default();
    let baud = baud.unwrap_or(config.baud_rate);
    let window = window.unwrap_or(config.window_size);
    let threshold = threshold.unwrap_or(config.movement_threshold);

    let mut source = open_source(port, baud);
    println!("Connected to {port} at {baud} baud");
    println!("Analysis window: {window} packets");
    println!("Movement threshold: {threshold}");
    if detect_movement {
        println!("Movement detection: ENABLED");
    }
    println!();

    let mut features_out = output.as_deref().map(|path| {
        println!("Saving processed features to {}", path.display());
        open_append(path)
    });
    let mut raw_out = raw_output.as_deref().map(|path| {
        println!("Saving raw packets to {}", path.display());
        open_append(path)
    });

    println!("Waiting for packets... (Ctrl+C to exit)");
    println!();

    let mut analyzer = CsiAnalyzer::new(window, threshold);
    let running = ctrlc_flag();
    let receiver = source.receiver().clone();

    while running.load(Ordering::SeqCst) {
        let packet = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(packet) => packet,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Packet source disconnected unexpectedly");
                break;
            }
        };

        let Some(features) = analyzer.process(&packet) else {
            continue;
        };

        let now = Local::now().format("%H:%M:%S%.3f");
        if detect_movement {
            let status = if features.movement_detected {
                "MOVEMENT"
            } else {
                "static"
            };
            println!(
                "[{now}] Packet #{:4} | RSSI={:3}dBm | Amp: mean={:5.1} std={:5.1} | Var={:5.2} | {status}",
                features.packet_num,
                features.rssi,
                features.amp_mean,
                features.amp_std,
                features.temporal_variance,
            );
        } else {
            println!(
                "[{now}] Packet #{:4} | RSSI={:3}dBm (avg={:5.1}) | Amp: mean={:5.1} std={:5.1} | Filtered={:5.1}",
                features.packet_num,
                features.rssi,
                features.rssi_mean,
                features.amp_mean,
                features.amp_std,
                features.amp_mean_filtered,
            );
        }
        if verbose {
            println!(
                "  Range: [{:.1}, {:.1}] span={:.1}",
                features.amp_min, features.amp_max, features.amp_range
            );
            println!("  Temporal variance: {:.2}", features.temporal_variance);
            println!();
        }

        if let Some(writer) = features_out.as_mut() {
            append_json(writer, &features);
        }
        if let Some(writer) = raw_out.as_mut() {
            append_json(writer, &packet);
        }
    }

    source.stop();

    println!();
    println!("{}", "=".repeat(60));
    let stats = analyzer.stats();
    println!("Session Statistics:");
    println!("  Total packets: {}", stats.total_packets);
    println!(
        "  Movement detected: {} ({:.1}%)",
        stats.movement_detected_count,
        stats.movement_ratio * 100.0
    );
    if source.skipped_lines() > 0 {
        println!("  Non-packet lines skipped: {}", source.skipped_lines());
    }
    println!("{}", "=".repeat(60));
    println!("Exiting...");
}

fn cmd_collect(
    port: &str,
    baud: Option<u32>,
    output_dir: Option<PathBuf>,
    activity: Option<String>,
    duration: u64,
    description: Option<String>,
) {
    let config = Config::load().unwrap_or_default();
    let baud = baud.unwrap_or(config.baud_rate);
    let output_dir = output_dir.unwrap_or_else(|| config.dataset_path.clone());

    let mut store = match DatasetStore::open_or_create(&output_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening dataset: {e}");
            std::process::exit(1);
        }
    };

    if let Some(activity) = activity {
        // Non-interactive mode
        if activity_description(&activity).is_none() {
            eprintln!("Error: Unknown activity '{activity}'");
            eprintln!(
                "Valid activities: {}",
                ACTIVITIES
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            std::process::exit(1);
        }

        let trial_num = store.next_trial_num(&activity);
        let session = match store.create_sample(
            &activity,
            description.as_deref().unwrap_or(""),
            trial_num,
        ) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Error creating sample: {e}");
                std::process::exit(1);
            }
        };
        let running = ctrlc_flag();
        collect_sample(port, baud, &config, &session, duration, &running);
        println!("{}", store.summary());
    } else {
        interactive_collect(port, baud, &config, &mut store);
    }
}

/// Interactive collection loop: summary, activity menu, duration prompt,
/// confirm, collect, repeat.
fn interactive_collect(port: &str, baud: u32, config: &Config, store: &mut DatasetStore) {
    // One handler for the whole loop: the flag is rearmed per collection
    let running = ctrlc_flag();

    println!();
    println!("{}", "=".repeat(60));
    println!("CSI DATASET COLLECTION");
    println!("{}", "=".repeat(60));

    loop {
        println!("{}", store.summary());
        println!();
        println!("Available activities:");
        for (i, (name, desc)) in ACTIVITIES.iter().enumerate() {
            println!("  {}. {:12} - {desc}", i + 1, name);
        }
        println!("  q. Quit");
        println!();

        let choice = prompt("Select activity (1-8 or 'q'): ").to_lowercase();
        if choice == "q" {
            println!();
            println!("Exiting dataset collection.");
            break;
        }

        let activity = match choice.parse::<usize>() {
            Ok(index) if (1..=ACTIVITIES.len()).contains(&index) => ACTIVITIES[index - 1].0,
            _ => {
                println!("Invalid choice!");
                continue;
            }
        };

        let description = if activity == "custom" {
            prompt("Enter activity description: ")
        } else {
            String::new()
        };

        let duration = prompt("Collection duration (seconds, default 30): ")
            .parse::<u64>()
            .unwrap_or(30);

        let trial_num = store.next_trial_num(activity);
        println!();
        println!("This will be trial #{trial_num} for '{activity}'");

        if prompt("Start collection? (y/n): ").to_lowercase() != "y" {
            println!("Collection cancelled.");
            println!();
            continue;
        }

        let session = match store.create_sample(activity, &description, trial_num) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Error creating sample: {e}");
                continue;
            }
        };
        collect_sample(port, baud, config, &session, duration, &running);

        if prompt("\nCollect another sample? (y/n): ").to_lowercase() != "y" {
            break;
        }
    }

    println!("{}", store.summary());
}

/// Run one timed collection into a sample directory.
fn collect_sample(
    port: &str,
    baud: u32,
    config: &Config,
    session: &SampleSession,
    duration: u64,
    running: &Arc<AtomicBool>,
) {
    running.store(true, Ordering::SeqCst);
    let mut source = open_source(port, baud);
    let mut writer = match session.writer() {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Error opening sample writers: {e}");
            std::process::exit(1);
        }
    };

    let mut analyzer = CsiAnalyzer::new(config.window_size, config.movement_threshold);

    println!();
    println!("{}", "=".repeat(60));
    println!("COLLECTING DATA");
    println!("{}", "=".repeat(60));
    println!("Activity: {}", session.activity);
    println!("Trial: {}", session.trial_num);
    println!("Duration: {duration} seconds");
    println!("Output: {}", session.dir.display());
    println!();
    println!("Data collection will start in:");
    for i in (1..=3).rev() {
        println!("  {i}...");
        thread::sleep(Duration::from_secs(1));
    }
    println!("  START!");
    println!();

    let receiver = source.receiver().clone();
    let start = Instant::now();
    let mut packet_count: u64 = 0;

    while running.load(Ordering::SeqCst) && start.elapsed().as_secs() < duration {
        let packet = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(packet) => packet,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Packet source disconnected unexpectedly");
                break;
            }
        };

        let Some(features) = analyzer.process(&packet) else {
            continue;
        };
        packet_count += 1;

        let record = LabeledFeature {
            features,
            label: session.activity.clone(),
            trial_num: session.trial_num,
        };
        if let Err(e) = writer.write_features(&record) {
            eprintln!("Error writing features: {e}");
            break;
        }
        if let Err(e) = writer.write_raw(&packet) {
            eprintln!("Error writing raw packet: {e}");
            break;
        }

        let elapsed = start.elapsed().as_secs_f64();
        let remaining = (duration as f64 - elapsed).max(0.0);
        let now = Local::now().format("%H:%M:%S");
        print!(
            "[{now}] {packet_count:4} packets | Elapsed: {elapsed:5.1}s | Remaining: {remaining:5.1}s | RSSI: {:3}dBm\r",
            record.features.rssi
        );
        let _ = std::io::stdout().flush();
    }

    source.stop();

    let elapsed = start.elapsed().as_secs_f64();
    println!();
    println!();
    println!("{}", "=".repeat(60));
    println!("COLLECTION COMPLETE");
    println!("{}", "=".repeat(60));
    println!("Duration: {elapsed:.1} seconds");
    println!("Packets collected: {packet_count}");
    println!(
        "Avg rate: {:.1} packets/sec",
        packet_count as f64 / elapsed.max(1.0)
    );
    println!("Features saved: {}", session.dir.join("features.jsonl").display());
    println!("Raw packets saved: {}", session.dir.join("raw_csi.jsonl").display());

    let stats = analyzer.stats();
    println!();
    println!("Movement Statistics:");
    println!(
        "  Movement detected: {} packets ({:.1}%)",
        stats.movement_detected_count,
        stats.movement_ratio * 100.0
    );
    println!("{}", "=".repeat(60));
    println!();
}

fn cmd_classify(
    port: &str,
    model_path: Option<PathBuf>,
    baud: Option<u32>,
    window: usize,
    verbose: bool,
) {
    let config = Config::load().unwrap_or_default();
    let baud = baud.unwrap_or(config.baud_rate);
    let model_path = model_path.unwrap_or_else(|| config.model_path.clone());

    println!("Loading model...");
    let model = match CentroidModel::load(&model_path) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Error loading model {}: {e}", model_path.display());
            eprintln!("Run 'csi-sense fit' to train one from a collected dataset.");
            std::process::exit(1);
        }
    };
    println!("Model loaded: {}", model_path.display());
    println!("Classes: {}", model.classes().join(", "));
    println!("Smoothing window: {window} predictions");
    println!();

    let mut source = open_source(port, baud);
    println!("Connected to {port} at {baud} baud");
    println!();
    println!("{}", "=".repeat(60));
    println!("REAL-TIME ACTIVITY CLASSIFICATION");
    println!("{}", "=".repeat(60));
    println!("Waiting for packets... (Ctrl+C to exit)");
    println!();

    let mut analyzer = CsiAnalyzer::new(config.window_size, config.movement_threshold);
    let mut predictor = SmoothedPredictor::new(model, window);

    let running = ctrlc_flag();
    let receiver = source.receiver().clone();

    while running.load(Ordering::SeqCst) {
        let packet = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(packet) => packet,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Packet source disconnected unexpectedly");
                break;
            }
        };

        let Some(features) = analyzer.process(&packet) else {
            continue;
        };
        let smoothed = predictor.smooth(&features);

        let now = Local::now().format("%H:%M:%S%.3f");
        let filled = ((smoothed.confidence * 20.0) as usize).min(20);
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(20 - filled));

        print!(
            "[{now}] Activity: {:12} | Confidence: {bar} {:5.1}% | RSSI: {:3}dBm",
            smoothed.smoothed_label,
            smoothed.confidence * 100.0,
            features.rssi,
        );
        if verbose {
            println!(" | Raw: {}", smoothed.raw_label);
        } else {
            println!();
        }
    }

    source.stop();

    println!();
    println!("{}", "=".repeat(60));
    println!("SESSION STATISTICS");
    println!("{}", "=".repeat(60));
    let stats = predictor.stats();
    println!("Total predictions: {}", stats.total_predictions);
    println!();
    println!("Activity distribution:");
    for (activity, count) in &stats.class_distribution {
        let pct = *count as f64 / stats.total_predictions.max(1) as f64 * 100.0;
        println!("  {activity:15}: {count:5} ({pct:5.1}%)");
    }
    println!("{}", "=".repeat(60));
    println!("Exiting...");
}

fn cmd_fit(dataset: Option<PathBuf>, output: Option<PathBuf>) {
    let config = Config::load().unwrap_or_default();
    let dataset = dataset.unwrap_or_else(|| config.dataset_path.clone());
    let output = output.unwrap_or_else(|| config.model_path.clone());

    let store = match DatasetStore::open_or_create(&dataset) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening dataset {}: {e}", dataset.display());
            std::process::exit(1);
        }
    };

    println!("Loading dataset from {}...", dataset.display());
    let (rows, labels) = match store.load_training_data() {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error loading dataset: {e}");
            std::process::exit(1);
        }
    };

    if rows.is_empty() {
        eprintln!("Error: No data loaded!");
        eprintln!("Run 'csi-sense collect' to record labeled samples first.");
        std::process::exit(1);
    }
    if rows.len() < 50 {
        println!(
            "Warning: Only {} samples. Consider collecting more data (recommended: 500+)",
            rows.len()
        );
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("FITTING NEAREST-CENTROID MODEL");
    println!("{}", "=".repeat(60));

    let model = match CentroidModel::fit(&rows, &labels) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Error fitting model: {e}");
            std::process::exit(1);
        }
    };

    println!("Training samples: {}", model.metrics.training_samples);
    println!("Samples per class:");
    for (class, count) in &model.metrics.samples_per_class {
        println!("  {class:15}: {count:5}");
    }
    println!(
        "Training accuracy: {:.1}%",
        model.metrics.training_accuracy * 100.0
    );

    if let Err(e) = model.save(&output) {
        eprintln!("Error saving model: {e}");
        std::process::exit(1);
    }
    let metrics_path = output.with_extension("metrics.json");
    if let Err(e) = model.save_metrics(&metrics_path) {
        eprintln!("Error saving metrics: {e}");
        std::process::exit(1);
    }

    println!();
    println!("Model saved to: {}", output.display());
    println!("Metrics saved to: {}", metrics_path.display());
    println!("{}", "=".repeat(60));
}

fn cmd_summary(dataset: Option<PathBuf>) {
    let config = Config::load().unwrap_or_default();
    let dataset = dataset.unwrap_or_else(|| config.dataset_path.clone());

    match DatasetStore::open_or_create(&dataset) {
        Ok(store) => println!("{}", store.summary()),
        Err(e) => {
            eprintln!("Error opening dataset {}: {e}", dataset.display());
            std::process::exit(1);
        }
    }
}

fn cmd_ports() {
    let ports = SerialSource::list_ports();
    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {port}");
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Open the serial source or exit with an error and a port listing.
fn open_source(port: &str, baud: u32) -> SerialSource {
    match SerialSource::open(port, baud) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error opening serial port: {e}");
            let ports = SerialSource::list_ports();
            if !ports.is_empty() {
                eprintln!("Available ports: {}", ports.join(", "));
            }
            std::process::exit(1);
        }
    }
}

/// Open a JSONL file for appending, exiting on failure.
fn open_append(path: &std::path::Path) -> BufWriter<std::fs::File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => BufWriter::new(file),
        Err(e) => {
            eprintln!("Error opening {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

/// Append one record as a JSON line, flushed immediately.
fn append_json<T: serde::Serialize>(writer: &mut BufWriter<std::fs::File>, record: &T) {
    match serde_json::to_string(record) {
        Ok(json) => {
            if writeln!(writer, "{json}").and_then(|_| writer.flush()).is_err() {
                eprintln!("Warning: Could not write output record");
            }
        }
        Err(e) => eprintln!("Warning: Could not serialize record: {e}"),
    }
}

/// Set up a Ctrl+C handler backed by an atomic flag.
fn ctrlc_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
    running
}

/// Read one trimmed line from stdin after showing a prompt.
fn prompt(message: &str) -> String {
    print!("{message}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    line.trim().to_string()
}
