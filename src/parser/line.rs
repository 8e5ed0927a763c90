//! Newline-delimited log parser (spec.md §4.9 flow table: `D4=LOG_NETWORK`
//! → `Logger` flow, parser `LineBased`).
//!
//! Not grounded on a retained original file — the logging ring buffer
//! itself is an out-of-scope collaborator (spec.md §1) — so this follows
//! the RAW parser's staging-buffer shape but flushes on a structural
//! delimiter instead of timing heuristics, since log lines have no
//! inter-arrival timing contract worth modeling.

use super::Parser;
use crate::buffer::CircularBuffer;
use crate::interfaces::PhysicalInterface;
use crate::packet::{PacketFormat, PacketSource, ParseResult, ParsedPacket};
use crate::stats::ProtocolStats;
use std::sync::Arc;

const MAX_LINE_LEN: usize = 512;

pub struct LineParser {
    staging: Vec<u8>,
    stats: Option<Arc<ProtocolStats>>,
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            staging: Vec::with_capacity(MAX_LINE_LEN),
            stats: None,
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for LineParser {
    fn parse(&mut self, buffer: &mut CircularBuffer, now_us: u64) -> ParseResult {
        let available = buffer.available();
        if available == 0 {
            return ParseResult::empty();
        }
        let chunk = buffer.get_contiguous_for_parser(available);
        let mut consumed = 0usize;
        let mut packets = Vec::new();

        for &byte in chunk {
            self.staging.push(byte);
            consumed += 1;
            if byte == b'\n' || self.staging.len() >= MAX_LINE_LEN {
                let line = std::mem::replace(&mut self.staging, Vec::with_capacity(MAX_LINE_LEN));
                if let Some(stats) = &self.stats {
                    stats.record_packet(line.len(), now_us / 1000);
                }
                let mut packet = ParsedPacket::new(line, PacketFormat::Raw, PhysicalInterface::None);
                packet.source = PacketSource::Logs;
                packets.push(packet);
            }
        }
        buffer.consume(consumed);

        ParseResult {
            packets,
            bytes_consumed: consumed,
        }
    }

    fn reset(&mut self) {
        self.staging.clear();
    }

    fn name(&self) -> &'static str {
        "LineBased"
    }

    fn minimum_bytes(&self) -> usize {
        1
    }

    fn set_stats(&mut self, stats: Arc<ProtocolStats>) {
        self.stats = Some(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline() {
        let mut parser = LineParser::new();
        let mut buf = CircularBuffer::with_capacity(64);
        buf.write(b"hello\nworld");
        let result = parser.parse(&mut buf, 0);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.packets[0].payload, b"hello\n");
        assert_eq!(result.packets[0].source, PacketSource::Logs);
        assert_eq!(result.bytes_consumed, 11);
    }

    #[test]
    fn forces_flush_past_max_line_len() {
        let mut parser = LineParser::new();
        let mut buf = CircularBuffer::with_capacity(2048);
        buf.write(&vec![b'x'; MAX_LINE_LEN + 10]);
        let result = parser.parse(&mut buf, 0);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.packets[0].payload.len(), MAX_LINE_LEN);
    }

    #[test]
    fn incomplete_line_waits() {
        let mut parser = LineParser::new();
        let mut buf = CircularBuffer::with_capacity(64);
        buf.write(b"partial");
        let result = parser.parse(&mut buf, 0);
        assert!(result.packets.is_empty());
        assert_eq!(result.bytes_consumed, 7);
    }
}
