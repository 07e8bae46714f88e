//! Replay packet source.
//!
//! Serves packets from a recorded `raw_csi.jsonl` (or an in-memory sequence)
//! through the same channel interface as the serial source, so sessions can
//! be re-analyzed and the pipeline exercised without hardware.

use crate::source::serial::SourceError;
use crate::source::types::RawPacket;
use crossbeam_channel::{unbounded, Receiver};
use std::path::Path;

/// A packet source backed by a recorded session.
pub struct ReplaySource {
    receiver: Receiver<RawPacket>,
    skipped_lines: u64,
}

impl ReplaySource {
    /// Load a recorded `raw_csi.jsonl` and queue every packet in file order.
    ///
    /// The receiver disconnects once the last packet has been consumed.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Open(format!("{}: {e}", path.display())))?;

        let mut skipped_lines = 0;
        let (sender, receiver) = unbounded();
        for line in content.lines() {
            match RawPacket::parse_line(line) {
                Some(packet) => {
                    // Receiver is held by self, send cannot fail here
                    let _ = sender.send(packet);
                }
                None => {
                    if !line.trim().is_empty() {
                        skipped_lines += 1;
                    }
                }
            }
        }

        Ok(Self {
            receiver,
            skipped_lines,
        })
    }

    /// Queue an in-memory packet sequence.
    pub fn from_packets(packets: Vec<RawPacket>) -> Self {
        let (sender, receiver) = unbounded();
        for packet in packets {
            let _ = sender.send(packet);
        }
        Self {
            receiver,
            skipped_lines: 0,
        }
    }

    /// Get the receiver for queued packets.
    pub fn receiver(&self) -> &Receiver<RawPacket> {
        &self.receiver
    }

    /// Number of non-packet lines skipped while loading.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}
