//! MAVLink v1/v2 framing parser (spec.md §4.3.2).
//!
//! The STX-search / peek-header / CRC-check / resync-by-one-byte
//! algorithm is the direct descendant of
//! `mavlink_core::{read_v1_raw_message, read_v2_raw_message_inner}`,
//! adapted from a blocking-reader loop to a single-attempt-per-call shape
//! so the orchestrator can apply its own exhaustive-drain budget
//! (spec.md §4.9) around repeated `parse()` calls instead of this parser
//! looping internally.

use super::Parser;
use crate::buffer::CircularBuffer;
use crate::interfaces::PhysicalInterface;
use crate::packet::{PacketFormat, ParseResult, ParsedPacket};
use crate::stats::ProtocolStats;
use crc_any::CRCu16;
use std::sync::Arc;

pub const MAV_STX: u8 = 0xFE;
pub const MAV_STX_V2: u8 = 0xFD;

const V1_HEADER_SIZE: usize = 5;
const V2_HEADER_SIZE: usize = 9;
const V2_SIGNATURE_SIZE: usize = 13;
const V2_INCOMPAT_SIGNED: u8 = 0x01;

fn calculate_crc(data: &[u8], extra_crc: u8) -> u16 {
    let mut crc = CRCu16::crc16mcrf4cc();
    crc.digest(data);
    crc.digest(&[extra_crc]);
    crc.get_crc()
}

/// Per-message knowledge the parser needs but does not ship itself
/// (spec.md §4.3.2: "extra_crc requires a message table; when unknown,
/// CRC is skipped but packet is still framed"). An embedder that links a
/// generated MAVLink message dialect can supply one; by default no table
/// is known, CRC validation is skipped, and packets always route as
/// broadcast (no target extraction without knowing payload layout) — the
/// same "unknown table" fallback applied consistently to both CRC and
/// target-system extraction so the parser never guesses at payload
/// structure (see DESIGN.md for the reasoning).
pub trait MessageTable: Send + Sync {
    fn extra_crc(&self, msgid: u32) -> Option<u8>;
    /// Returns `(target_system, target_component)` if this message id
    /// carries targeting fields at a known payload offset.
    fn target_ids(&self, msgid: u32, payload: &[u8]) -> Option<(u8, u8)>;
}

/// Table used when the embedder supplies none: CRC is always skipped,
/// every packet is broadcast.
struct NullMessageTable;

impl MessageTable for NullMessageTable {
    fn extra_crc(&self, _msgid: u32) -> Option<u8> {
        None
    }

    fn target_ids(&self, _msgid: u32, _payload: &[u8]) -> Option<(u8, u8)> {
        None
    }
}

/// One detected frame, still carrying the fields the router needs before
/// it becomes a [`ParsedPacket`].
pub(crate) struct DetectedFrame {
    pub bytes: Vec<u8>,
    pub sysid: u8,
    pub compid: u8,
    pub target: Option<(u8, u8)>,
}

/// Channel-scoped MAVLink parser; one instance per flow with a stable
/// channel id (spec.md §4.3.2: "0..4 reserved for Telemetry, USB-in,
/// UDP-in, UART2-in, UART3-in").
pub struct MavlinkParser {
    channel: u8,
    physical_interface: PhysicalInterface,
    routing_enabled: bool,
    table: Arc<dyn MessageTable>,
    stats: Option<Arc<ProtocolStats>>,
}

impl MavlinkParser {
    pub fn new(channel: u8, physical_interface: PhysicalInterface, routing_enabled: bool) -> Self {
        Self {
            channel,
            physical_interface,
            routing_enabled,
            table: Arc::new(NullMessageTable),
            stats: None,
        }
    }

    pub fn with_message_table(mut self, table: Arc<dyn MessageTable>) -> Self {
        self.table = table;
        self
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn attempt(&self, data: &[u8]) -> AttemptOutcome {
        let mut idx = 0;
        while idx < data.len() && data[idx] != MAV_STX && data[idx] != MAV_STX_V2 {
            idx += 1;
        }
        if idx >= data.len() {
            return AttemptOutcome::NeedMoreData { garbage: idx };
        }
        let is_v2 = data[idx] == MAV_STX_V2;
        let remaining = data.len() - idx;
        let fixed_header = if is_v2 { V2_HEADER_SIZE } else { V1_HEADER_SIZE };
        if remaining < 1 + fixed_header {
            return AttemptOutcome::NeedMoreData { garbage: idx };
        }

        let len = data[idx + 1] as usize;
        let (sysid, compid, msgid, sig_size) = if is_v2 {
            let incompat = data[idx + 2];
            let sysid = data[idx + 5];
            let compid = data[idx + 6];
            let msgid = u32::from_le_bytes([data[idx + 7], data[idx + 8], data[idx + 9], 0]);
            let sig_size = if incompat & V2_INCOMPAT_SIGNED != 0 {
                V2_SIGNATURE_SIZE
            } else {
                0
            };
            (sysid, compid, msgid, sig_size)
        } else {
            let sysid = data[idx + 3];
            let compid = data[idx + 4];
            let msgid = data[idx + 5] as u32;
            (sysid, compid, msgid, 0)
        };

        let payload_start = idx + 1 + fixed_header;
        let crc_start = payload_start + len;
        let total_end = crc_start + 2 + sig_size;
        if data.len() < total_end {
            return AttemptOutcome::NeedMoreData { garbage: idx };
        }

        let payload = &data[payload_start..crc_start];
        let crc_ok = match self.table.extra_crc(msgid) {
            Some(extra) => {
                let calc = calculate_crc(&data[idx + 1..crc_start], extra);
                let actual = u16::from_le_bytes([data[crc_start], data[crc_start + 1]]);
                calc == actual
            }
            None => true,
        };

        if !crc_ok {
            // Resync: never drop more than one byte at a time (spec.md
            // §4.3.2).
            return AttemptOutcome::CrcFailed { garbage: idx };
        }

        let target = self.table.target_ids(msgid, payload);
        AttemptOutcome::Found {
            garbage: idx,
            frame: DetectedFrame {
                bytes: data[idx..total_end].to_vec(),
                sysid,
                compid,
                target,
            },
        }
    }
}

enum AttemptOutcome {
    Found { garbage: usize, frame: DetectedFrame },
    NeedMoreData { garbage: usize },
    CrcFailed { garbage: usize },
}

impl Parser for MavlinkParser {
    fn parse(&mut self, buffer: &mut CircularBuffer, now_us: u64) -> ParseResult {
        let available = buffer.available();
        if available == 0 {
            return ParseResult::empty();
        }
        let (first, second) = buffer.get_read_segments();
        let scratch;
        let data: &[u8] = if second.is_empty() {
            first
        } else {
            scratch = [first, second].concat();
            &scratch
        };

        match self.attempt(data) {
            AttemptOutcome::Found { garbage, frame } => {
                let total_end = garbage + frame.bytes.len();
                buffer.consume(total_end);
                if let Some(stats) = &self.stats {
                    stats.record_packet(frame.bytes.len(), now_us / 1000);
                }

                let mut packet = ParsedPacket::new(
                    frame.bytes,
                    PacketFormat::Mavlink,
                    self.physical_interface,
                );
                if self.routing_enabled {
                    packet.hints.mavlink_sysid = Some(frame.sysid);
                    if let Some((target_sysid, _target_compid)) = frame.target {
                        if target_sysid != 0 {
                            packet.hints.mavlink_target_sysid = Some(target_sysid);
                        }
                    }
                }
                let _ = frame.compid;
                ParseResult {
                    packets: vec![packet],
                    bytes_consumed: total_end,
                }
            }
            AttemptOutcome::NeedMoreData { garbage } => {
                // Wait for more data; only the leading non-STX garbage is
                // safe to drop now.
                buffer.consume(garbage);
                ParseResult {
                    packets: Vec::new(),
                    bytes_consumed: garbage,
                }
            }
            AttemptOutcome::CrcFailed { garbage } => {
                let consumed = garbage + 1;
                if let Some(stats) = &self.stats {
                    stats.record_error();
                }
                buffer.consume(consumed);
                ParseResult {
                    packets: Vec::new(),
                    bytes_consumed: consumed,
                }
            }
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "MAVLink"
    }

    fn minimum_bytes(&self) -> usize {
        1 + V1_HEADER_SIZE + 2
    }

    fn set_stats(&mut self, stats: Arc<ProtocolStats>) {
        self.stats = Some(stats);
    }
}

/// Returns the sysid this packet's originating physical interface claims,
/// for [`crate::router::mavlink_router::MavlinkRouter::learn`]. Kept
/// separate from [`MavlinkParser`] since the router, not the parser,
/// owns the learning step (spec.md §4.4: the router is shared, the
/// parser is per-flow).
pub fn sysid_of(raw: &[u8]) -> Option<u8> {
    if raw.is_empty() {
        return None;
    }
    match raw[0] {
        MAV_STX if raw.len() > 3 => Some(raw[3]),
        MAV_STX_V2 if raw.len() > 5 => Some(raw[5]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_v2() -> Vec<u8> {
        // FD len=9 incompat=0 compat=0 seq=0 sysid=1 compid=1 msgid=0(3B)
        // payload[9] crc[2]
        let mut frame = vec![0xFD, 9, 0, 0, 0, 1, 1, 0, 0, 0];
        frame.extend_from_slice(&[0u8; 9]);
        frame.extend_from_slice(&[0x00, 0x00]);
        frame
    }

    #[test]
    fn detects_v2_frame_without_table() {
        let mut parser = MavlinkParser::new(0, PhysicalInterface::Uart1, true);
        let mut buf = CircularBuffer::with_capacity(64);
        let frame = heartbeat_v2();
        buf.write(&frame);
        let result = parser.parse(&mut buf, 0);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.bytes_consumed, frame.len());
        assert_eq!(result.packets[0].payload, frame);
    }

    #[test]
    fn waits_for_more_data_on_partial_frame() {
        let mut parser = MavlinkParser::new(0, PhysicalInterface::Uart1, false);
        let mut buf = CircularBuffer::with_capacity(64);
        buf.write(&[0xFD, 9, 0, 0]);
        let result = parser.parse(&mut buf, 0);
        assert!(result.packets.is_empty());
        assert_eq!(result.bytes_consumed, 0);
        assert_eq!(buf.available(), 4);
    }

    #[test]
    fn resyncs_one_byte_on_garbage_prefix() {
        let mut parser = MavlinkParser::new(0, PhysicalInterface::Uart1, false);
        let mut buf = CircularBuffer::with_capacity(64);
        let mut data = vec![0xAA, 0xBB];
        data.extend_from_slice(&heartbeat_v2());
        buf.write(&data);
        let result = parser.parse(&mut buf, 0);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.bytes_consumed, data.len());
    }

    #[test]
    fn sysid_extraction_v1_and_v2() {
        assert_eq!(sysid_of(&[0xFE, 0, 0, 7, 0, 0, 0, 0]), Some(7));
        assert_eq!(sysid_of(&heartbeat_v2()), Some(1));
    }
}
