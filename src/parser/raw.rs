//! RAW pass-through parser with adaptive chunking (spec.md §4.3.1).

use super::Parser;
use crate::buffer::CircularBuffer;
use crate::packet::{PacketFormat, ParseResult, ParsedPacket};
use crate::stats::ProtocolStats;
use std::sync::Arc;

const IDLE_200US_MAX_SIZE: usize = 12;
const IDLE_1MS_MAX_SIZE: usize = 64;
const IDLE_5MS_US: u64 = 5_000;
const IDLE_1MS_US: u64 = 1_000;
const IDLE_200US_US: u64 = 200;
const TIME_IN_BUFFER_MAX_US: u64 = 15_000;
const BURST_GAP_THRESHOLD_US: u64 = 1_000;
const BURST_MIN_CONSECUTIVE_FLUSHES: u32 = 4;

/// Adaptive throughput-oriented bridge parser: accumulates bytes until one
/// of six flush conditions fires, then emits the whole staging buffer as
/// a single `RAW` packet (spec.md §4.3.1).
pub struct RawParser {
    physical_interface: crate::interfaces::PhysicalInterface,
    staging: Vec<u8>,
    capacity: usize,
    first_byte_time_us: Option<u64>,
    last_byte_time_us: Option<u64>,
    consecutive_fast_flushes: u32,
    burst_active: bool,
    stats: Option<Arc<ProtocolStats>>,
}

impl RawParser {
    pub fn new(capacity: usize, physical_interface: crate::interfaces::PhysicalInterface) -> Self {
        Self {
            physical_interface,
            staging: Vec::with_capacity(capacity),
            capacity,
            first_byte_time_us: None,
            last_byte_time_us: None,
            consecutive_fast_flushes: 0,
            burst_active: false,
            stats: None,
        }
    }

    fn should_flush(&self, now_us: u64, force_timeout: bool) -> bool {
        if self.staging.is_empty() {
            return false;
        }
        if self.staging.len() >= self.capacity {
            return true;
        }
        if force_timeout {
            return true;
        }
        let idle = self
            .last_byte_time_us
            .map(|t| now_us.saturating_sub(t))
            .unwrap_or(0);
        if idle >= IDLE_200US_US && self.staging.len() <= IDLE_200US_MAX_SIZE {
            return true;
        }
        if idle >= IDLE_1MS_US && self.staging.len() <= IDLE_1MS_MAX_SIZE {
            return true;
        }
        if idle >= IDLE_5MS_US {
            return true;
        }
        if let Some(start) = self.first_byte_time_us {
            if now_us.saturating_sub(start) >= TIME_IN_BUFFER_MAX_US {
                return true;
            }
        }
        false
    }

    fn flush(&mut self, now_us: u64) -> ParsedPacket {
        let gap = self
            .last_byte_time_us
            .map(|t| now_us.saturating_sub(t))
            .unwrap_or(u64::MAX);
        if gap < BURST_GAP_THRESHOLD_US {
            self.consecutive_fast_flushes += 1;
        } else {
            self.consecutive_fast_flushes = 0;
        }
        self.burst_active = self.consecutive_fast_flushes >= BURST_MIN_CONSECUTIVE_FLUSHES;

        let payload = std::mem::take(&mut self.staging);
        self.staging = Vec::with_capacity(self.capacity);
        self.first_byte_time_us = None;
        self.last_byte_time_us = Some(now_us);

        if let Some(stats) = &self.stats {
            stats.record_packet(payload.len(), now_us / 1000);
        }
        ParsedPacket::new(payload, PacketFormat::Raw, self.physical_interface)
    }
}

impl Parser for RawParser {
    fn parse(&mut self, buffer: &mut CircularBuffer, now_us: u64) -> ParseResult {
        let available = buffer.available();
        let room = self.capacity - self.staging.len();
        let to_take = available.min(room);
        if to_take > 0 {
            let chunk = buffer.get_contiguous_for_parser(to_take);
            let taken = chunk.len();
            if self.first_byte_time_us.is_none() {
                self.first_byte_time_us = Some(now_us);
            }
            self.staging.extend_from_slice(chunk);
            self.last_byte_time_us = Some(now_us);
            buffer.consume(taken);
        }

        if self.should_flush(now_us, false) {
            let packet = self.flush(now_us);
            ParseResult {
                packets: vec![packet],
                bytes_consumed: to_take,
            }
        } else {
            ParseResult {
                packets: Vec::new(),
                bytes_consumed: to_take,
            }
        }
    }

    fn reset(&mut self) {
        self.staging.clear();
        self.first_byte_time_us = None;
        self.last_byte_time_us = None;
        self.consecutive_fast_flushes = 0;
        self.burst_active = false;
    }

    fn name(&self) -> &'static str {
        "RAW"
    }

    fn minimum_bytes(&self) -> usize {
        1
    }

    fn is_burst_active(&self) -> bool {
        self.burst_active
    }

    fn set_stats(&mut self, stats: Arc<ProtocolStats>) {
        self.stats = Some(stats);
    }

    fn notify_adapter_timeout(&mut self, now_us: u64) -> Option<ParsedPacket> {
        self.flush_on_adapter_timeout(now_us)
    }
}

impl RawParser {
    /// Called by the orchestrator when the ingress adapter reports
    /// `hasPacketTimeout()`; flushes whatever is staged even if no
    /// wall-clock threshold has fired yet (spec.md §4.3.1: "adapter
    /// reports `hasPacketTimeout()`").
    pub fn flush_on_adapter_timeout(&mut self, now_us: u64) -> Option<ParsedPacket> {
        if self.staging.is_empty() {
            return None;
        }
        Some(self.flush(now_us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::PhysicalInterface;

    fn buf_with(bytes: &[u8]) -> CircularBuffer {
        let mut b = CircularBuffer::with_capacity(2048);
        b.write(bytes);
        b
    }

    #[test]
    fn flushes_at_capacity() {
        let mut parser = RawParser::new(4, PhysicalInterface::Uart1);
        let mut buf = buf_with(b"abcdef");
        let result = parser.parse(&mut buf, 0);
        assert_eq!(result.bytes_consumed, 4);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.packets[0].payload, b"abcd");
    }

    #[test]
    fn idle_5ms_flushes_regardless_of_size() {
        let mut parser = RawParser::new(1024, PhysicalInterface::Uart1);
        let mut buf = buf_with(b"x");
        parser.parse(&mut buf, 0);
        let mut empty = CircularBuffer::with_capacity(8);
        let result = parser.parse(&mut empty, 6_000);
        assert_eq!(result.packets.len(), 1);
        assert_eq!(result.packets[0].payload, b"x");
    }

    #[test]
    fn no_flush_without_trigger() {
        let mut parser = RawParser::new(1024, PhysicalInterface::Uart1);
        let mut buf = buf_with(b"xx");
        let result = parser.parse(&mut buf, 0);
        assert!(result.packets.is_empty());
        assert_eq!(result.bytes_consumed, 2);
    }

    #[test]
    fn burst_active_after_four_fast_flushes() {
        let mut parser = RawParser::new(2, PhysicalInterface::Uart1);
        let mut t = 0u64;
        for _ in 0..4 {
            let mut buf = buf_with(b"zz");
            parser.parse(&mut buf, t);
            t += 10;
        }
        assert!(parser.is_burst_active());
    }
}
