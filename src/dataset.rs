//! Labeled dataset bookkeeping for collection sessions.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/metadata.json
//! <root>/<activity>/<activity>_trialNN_<timestamp>/sample_info.json
//! <root>/<activity>/<activity>_trialNN_<timestamp>/features.jsonl
//! <root>/<activity>/<activity>_trialNN_<timestamp>/raw_csi.jsonl
//! ```
//!
//! Both JSONL files are append-only logs: one record per line, in arrival
//! order, flushed per record. The feature field names are part of the
//! training contract (see `core::analyzer::FeatureVector`).

use crate::core::analyzer::FeatureVector;
use crate::core::smoothing::{project, FEATURE_DIM};
use crate::source::types::RawPacket;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Predefined activity labels and their descriptions.
pub const ACTIVITIES: [(&str, &str); 8] = [
    ("empty", "No person in room (baseline)"),
    ("standing", "Person standing still"),
    ("sitting", "Person sitting still"),
    ("walking", "Person walking around"),
    ("waving", "Person waving arms"),
    ("jumping", "Person jumping"),
    ("lying", "Person lying down"),
    ("custom", "Custom activity (specify description)"),
];

/// Look up the stock description for a predefined activity.
pub fn activity_description(activity: &str) -> Option<&'static str> {
    ACTIVITIES
        .iter()
        .find(|(name, _)| *name == activity)
        .map(|(_, description)| *description)
}

/// Dataset errors.
#[derive(Debug)]
pub enum DatasetError {
    Io(String),
    Parse(String),
    Serialize(String),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::Io(e) => write!(f, "IO error: {e}"),
            DatasetError::Parse(e) => write!(f, "Parse error: {e}"),
            DatasetError::Serialize(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for DatasetError {}

/// A labeled feature record, one line of `features.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledFeature {
    #[serde(flatten)]
    pub features: FeatureVector,
    /// Activity label; empty means "use the activity directory name"
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub trial_num: u32,
}

/// One recorded sample as listed in the dataset metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_name: String,
    pub trial_num: u32,
    pub timestamp: String,
}

/// Per-activity entry in the dataset metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub description: String,
    pub samples: Vec<SampleRecord>,
}

/// Provenance of the collection setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub device: String,
    pub firmware: String,
    pub sampling_rate: String,
    pub host: String,
}

impl Default for CollectionInfo {
    fn default() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            device: "ESP32".to_string(),
            firmware: "csi-sense".to_string(),
            sampling_rate: "variable (wifi traffic dependent)".to_string(),
            host,
        }
    }
}

/// Top-level dataset metadata (`metadata.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub created: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub activities: BTreeMap<String, ActivityEntry>,
    pub total_samples: u64,
    pub collection_info: CollectionInfo,
}

impl DatasetMetadata {
    fn new() -> Self {
        Self {
            created: Utc::now().to_rfc3339(),
            updated: None,
            activities: BTreeMap::new(),
            total_samples: 0,
            collection_info: CollectionInfo::default(),
        }
    }
}

/// Metadata written alongside each sample (`sample_info.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleInfo {
    pub activity: String,
    pub description: String,
    pub trial_num: u32,
    pub timestamp: String,
    pub created: String,
    pub sample_id: Uuid,
}

/// A created sample directory, ready to receive records.
#[derive(Debug, Clone)]
pub struct SampleSession {
    pub dir: PathBuf,
    pub activity: String,
    pub trial_num: u32,
    pub sample_id: Uuid,
}

impl SampleSession {
    /// Open the append-only writers for this sample.
    pub fn writer(&self) -> Result<SampleWriter, DatasetError> {
        SampleWriter::create(&self.dir)
    }
}

/// Manages one labeled dataset directory.
pub struct DatasetStore {
    root: PathBuf,
    metadata: DatasetMetadata,
}

impl DatasetStore {
    /// Load an existing dataset or seed a fresh one at `root`.
    pub fn open_or_create(root: &Path) -> Result<Self, DatasetError> {
        std::fs::create_dir_all(root).map_err(|e| DatasetError::Io(e.to_string()))?;

        let metadata_path = root.join("metadata.json");
        let metadata = if metadata_path.exists() {
            let content = std::fs::read_to_string(&metadata_path)
                .map_err(|e| DatasetError::Io(e.to_string()))?;
            serde_json::from_str(&content).map_err(|e| DatasetError::Parse(e.to_string()))?
        } else {
            let metadata = DatasetMetadata::new();
            let json = serde_json::to_string_pretty(&metadata)
                .map_err(|e| DatasetError::Serialize(e.to_string()))?;
            std::fs::write(&metadata_path, json).map_err(|e| DatasetError::Io(e.to_string()))?;
            metadata
        };

        Ok(Self {
            root: root.to_path_buf(),
            metadata,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Next trial number for an activity (1-based).
    pub fn next_trial_num(&self, activity: &str) -> u32 {
        self.metadata
            .activities
            .get(activity)
            .map(|entry| entry.samples.len() as u32 + 1)
            .unwrap_or(1)
    }

    /// Create a sample directory, register it in the metadata, and save.
    pub fn create_sample(
        &mut self,
        activity: &str,
        description: &str,
        trial_num: u32,
    ) -> Result<SampleSession, DatasetError> {
        let description = if description.is_empty() {
            activity_description(activity).unwrap_or("").to_string()
        } else {
            description.to_string()
        };

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let sample_name = format!("{activity}_trial{trial_num:02}_{timestamp}");
        let dir = self.root.join(activity).join(&sample_name);
        std::fs::create_dir_all(&dir).map_err(|e| DatasetError::Io(e.to_string()))?;

        let sample_id = Uuid::new_v4();
        let info = SampleInfo {
            activity: activity.to_string(),
            description: description.clone(),
            trial_num,
            timestamp: timestamp.clone(),
            created: Utc::now().to_rfc3339(),
            sample_id,
        };
        let json = serde_json::to_string_pretty(&info)
            .map_err(|e| DatasetError::Serialize(e.to_string()))?;
        std::fs::write(dir.join("sample_info.json"), json)
            .map_err(|e| DatasetError::Io(e.to_string()))?;

        let entry = self
            .metadata
            .activities
            .entry(activity.to_string())
            .or_insert_with(|| ActivityEntry {
                description,
                samples: Vec::new(),
            });
        entry.samples.push(SampleRecord {
            sample_name,
            trial_num,
            timestamp,
        });
        self.metadata.total_samples += 1;
        self.save_metadata()?;

        Ok(SampleSession {
            dir,
            activity: activity.to_string(),
            trial_num,
            sample_id,
        })
    }

    fn save_metadata(&mut self) -> Result<(), DatasetError> {
        self.metadata.updated = Some(Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| DatasetError::Serialize(e.to_string()))?;
        std::fs::write(self.root.join("metadata.json"), json)
            .map_err(|e| DatasetError::Io(e.to_string()))
    }

    /// Render the dataset summary block.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&"=".repeat(60));
        out.push_str("\nDATASET SUMMARY\n");
        out.push_str(&"=".repeat(60));
        out.push_str(&format!("\nDataset location: {}\n", self.root.display()));
        out.push_str(&format!("Total samples: {}\n", self.metadata.total_samples));
        out.push_str(&format!(
            "Activities collected: {}\n\n",
            self.metadata.activities.len()
        ));

        if self.metadata.activities.is_empty() {
            out.push_str("No samples collected yet.\n");
        } else {
            out.push_str("Samples per activity:\n");
            for (activity, entry) in &self.metadata.activities {
                out.push_str(&format!(
                    "  {:15}: {:3} samples\n",
                    activity,
                    entry.samples.len()
                ));
            }
        }
        out.push_str(&"=".repeat(60));
        out
    }

    /// Load every recorded feature row for model fitting.
    ///
    /// Rows are projected into the estimator ordering; a record without a
    /// label falls back to its activity directory name. Missing feature
    /// files are skipped with a note, matching the append-only,
    /// best-effort nature of collection.
    pub fn load_training_data(
        &self,
    ) -> Result<(Vec<[f64; FEATURE_DIM]>, Vec<String>), DatasetError> {
        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (activity, entry) in &self.metadata.activities {
            for sample in &entry.samples {
                let path = self
                    .root
                    .join(activity)
                    .join(&sample.sample_name)
                    .join("features.jsonl");
                if !path.exists() {
                    eprintln!("Note: {} not found, skipping", path.display());
                    continue;
                }

                let file = File::open(&path).map_err(|e| DatasetError::Io(e.to_string()))?;
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|e| DatasetError::Io(e.to_string()))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record: LabeledFeature = serde_json::from_str(&line)
                        .map_err(|e| DatasetError::Parse(e.to_string()))?;
                    rows.push(project(&record.features));
                    labels.push(if record.label.is_empty() {
                        activity.clone()
                    } else {
                        record.label
                    });
                }
            }
        }

        Ok((rows, labels))
    }
}

/// Append-only writers for one sample's feature and raw logs.
pub struct SampleWriter {
    features: BufWriter<File>,
    raw: BufWriter<File>,
}

impl SampleWriter {
    /// Open (or create) the two JSONL logs in a sample directory.
    pub fn create(dir: &Path) -> Result<Self, DatasetError> {
        let open = |name: &str| -> Result<BufWriter<File>, DatasetError> {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(name))
                .map(BufWriter::new)
                .map_err(|e| DatasetError::Io(e.to_string()))
        };
        Ok(Self {
            features: open("features.jsonl")?,
            raw: open("raw_csi.jsonl")?,
        })
    }

    /// Append one labeled feature record, flushed immediately.
    pub fn write_features(&mut self, record: &LabeledFeature) -> Result<(), DatasetError> {
        let json =
            serde_json::to_string(record).map_err(|e| DatasetError::Serialize(e.to_string()))?;
        writeln!(self.features, "{json}").map_err(|e| DatasetError::Io(e.to_string()))?;
        self.features
            .flush()
            .map_err(|e| DatasetError::Io(e.to_string()))
    }

    /// Append one raw packet, flushed immediately.
    pub fn write_raw(&mut self, packet: &RawPacket) -> Result<(), DatasetError> {
        let json =
            serde_json::to_string(packet).map_err(|e| DatasetError::Serialize(e.to_string()))?;
        writeln!(self.raw, "{json}").map_err(|e| DatasetError::Io(e.to_string()))?;
        self.raw
            .flush()
            .map_err(|e| DatasetError::Io(e.to_string()))
    }
}
