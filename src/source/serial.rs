//! Serial packet source.
//!
//! Reads line-framed packets from the radio in a background thread and hands
//! them to the session loop over a bounded channel. Firmware log lines and
//! truncated output are dropped and counted, never surfaced as errors.

use crate::source::types::RawPacket;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default baud rate for the radio link.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Channel capacity between the reader thread and the session loop.
const CHANNEL_CAPACITY: usize = 10_000;

/// Guard against an endless line if the link degenerates to garbage.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Errors that can occur while opening a packet source.
#[derive(Debug)]
pub enum SourceError {
    Open(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open(e) => write!(f, "Failed to open source: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A serial-port packet source with one background reader thread.
pub struct SerialSource {
    receiver: Receiver<RawPacket>,
    running: Arc<AtomicBool>,
    skipped_lines: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    port_name: String,
}

impl SerialSource {
    /// Open the port and start reading.
    pub fn open(port_name: &str, baud: u32) -> Result<Self, SourceError> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| SourceError::Open(format!("{port_name}: {e}")))?;

        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let skipped_lines = Arc::new(AtomicU64::new(0));

        let thread_running = running.clone();
        let thread_skipped = skipped_lines.clone();
        let handle = std::thread::spawn(move || {
            read_loop(port, sender, thread_running, thread_skipped);
        });

        Ok(Self {
            receiver,
            running,
            skipped_lines,
            handle: Some(handle),
            port_name: port_name.to_string(),
        })
    }

    /// Get the receiver for parsed packets.
    pub fn receiver(&self) -> &Receiver<RawPacket> {
        &self.receiver
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Number of non-packet lines dropped so far.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines.load(Ordering::Relaxed)
    }

    /// Stop the reader thread. The thread notices on its next read timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// List available serial ports.
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    sender: Sender<RawPacket>,
    running: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
) {
    let mut pending: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 1024];

    while running.load(Ordering::SeqCst) {
        match port.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                for line in drain_lines(&mut pending) {
                    match RawPacket::parse_line(&line) {
                        Some(packet) => match sender.try_send(packet) {
                            Ok(()) => {}
                            // Consumer fell behind: drop this packet
                            Err(TrySendError::Full(_)) => {}
                            Err(TrySendError::Disconnected(_)) => return,
                        },
                        None => {
                            if !line.trim().is_empty() {
                                skipped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
                if pending.len() > MAX_PENDING_BYTES {
                    pending.clear();
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }
}

/// Split completed lines out of the byte accumulator, leaving any partial
/// trailing line in place.
fn drain_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut pending = b"{\"a\":1}\nI (99) boot\n{\"ts\":".to_vec();
        let lines = drain_lines(&mut pending);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].trim(), "{\"a\":1}");
        assert_eq!(lines[1].trim(), "I (99) boot");
        assert_eq!(pending, b"{\"ts\":".to_vec());
    }

    #[test]
    fn test_drain_lines_handles_crlf() {
        let mut pending = b"{\"ts\":1,\"rssi\":-40,\"amp\":[1.0]}\r\n".to_vec();
        let lines = drain_lines(&mut pending);
        assert_eq!(lines.len(), 1);
        assert!(RawPacket::parse_line(&lines[0]).is_some());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_list_ports_does_not_panic() {
        let _ = SerialSource::list_ports();
    }
}
