//! Wire types for the radio's packet stream.
//!
//! The firmware emits one JSON object per line on the serial link,
//! interleaved with its own boot and status logging. Anything that does not
//! parse as a packet is filtered by the sources, never surfaced as an error.

use serde::{Deserialize, Serialize};

/// One CSI packet as emitted by the radio.
///
/// `ts` is the device clock: monotonic within a session, never wall-clock,
/// and free to wrap across reboots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPacket {
    /// Device-clock timestamp
    pub ts: u64,
    /// Received signal strength in dBm
    pub rssi: i32,
    /// Per-subcarrier amplitude
    pub amp: Vec<f64>,
    /// Per-subcarrier phase, carried through but unused by current features
    #[serde(default)]
    pub phase: Vec<f64>,
}

impl RawPacket {
    /// Parse one serial line into a packet.
    ///
    /// Returns `None` for anything that is not a packet: empty lines,
    /// firmware log lines, and JSON missing any of the required
    /// `ts`/`rssi`/`amp` fields. `phase` is optional and defaults to empty.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Number of subcarriers in this packet.
    pub fn subcarriers(&self) -> usize {
        self.amp.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packet_line() {
        let packet =
            RawPacket::parse_line(r#"{"ts": 1024, "rssi": -52, "amp": [1.5, 2, 3.25]}"#).unwrap();
        assert_eq!(packet.ts, 1024);
        assert_eq!(packet.rssi, -52);
        assert_eq!(packet.amp, vec![1.5, 2.0, 3.25]);
        assert!(packet.phase.is_empty());
        assert_eq!(packet.subcarriers(), 3);
    }

    #[test]
    fn test_parse_packet_with_phase() {
        let packet = RawPacket::parse_line(
            r#"{"ts": 7, "rssi": -40, "amp": [1.0], "phase": [0.5]}"#,
        )
        .unwrap();
        assert_eq!(packet.phase, vec![0.5]);
    }

    #[test]
    fn test_firmware_log_lines_rejected() {
        assert!(RawPacket::parse_line("").is_none());
        assert!(RawPacket::parse_line("I (1234) wifi: connected").is_none());
        assert!(RawPacket::parse_line("csi_init: ok").is_none());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        assert!(RawPacket::parse_line(r#"{"ts": 1, "rssi": -40}"#).is_none());
        assert!(RawPacket::parse_line(r#"{"rssi": -40, "amp": [1.0]}"#).is_none());
        assert!(RawPacket::parse_line(r#"{"ts": 1, "amp": [1.0]}"#).is_none());
    }

    #[test]
    fn test_truncated_json_rejected() {
        assert!(RawPacket::parse_line(r#"{"ts": 1, "rssi": -40, "amp": [1.0"#).is_none());
    }

    #[test]
    fn test_trailing_carriage_return_tolerated() {
        assert!(RawPacket::parse_line("{\"ts\": 1, \"rssi\": -40, \"amp\": [1.0]}\r").is_some());
    }
}
