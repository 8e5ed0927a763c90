//! SBUS fast-path frame synchronizer (spec.md §4.3.3).
//!
//! Directly ports `SbusFastParser::tryFastProcess` from
//! `sbus_fast_parser.h`: a 25-byte fixed-frame fast path that never
//! allocates a `ParsedPacket`, instead handing the frame straight to the
//! shared [`crate::router::sbus_router::SbusRouter`].

use super::{Parser, ParserContext};
use crate::buffer::CircularBuffer;
use crate::packet::ParseResult;
use crate::router::sbus_router::{SbusRouter, SbusSourceId};
use crate::stats::ProtocolStats;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const SBUS_FRAME_LEN: usize = 25;
const SBUS_START_BYTE: u8 = 0x0F;
const VALID_END_BYTES: [u8; 4] = [0x00, 0x04, 0x14, 0x24];

pub struct SbusFastParser {
    router: Arc<SbusRouter>,
    source_id: SbusSourceId,
    invalid_frames: AtomicU32,
    valid_frames: AtomicU32,
    stats: Option<Arc<ProtocolStats>>,
}

impl SbusFastParser {
    pub fn new(router: Arc<SbusRouter>, source_id: SbusSourceId) -> Self {
        Self {
            router,
            source_id,
            invalid_frames: AtomicU32::new(0),
            valid_frames: AtomicU32::new(0),
            stats: None,
        }
    }

    pub fn invalid_frames(&self) -> u32 {
        self.invalid_frames.load(Ordering::Relaxed)
    }

    pub fn valid_frames(&self) -> u32 {
        self.valid_frames.load(Ordering::Relaxed)
    }
}

impl Parser for SbusFastParser {
    fn try_fast_process(&mut self, buffer: &mut CircularBuffer, ctx: &ParserContext) -> bool {
        if buffer.available() < SBUS_FRAME_LEN {
            return false;
        }

        let view = buffer.get_contiguous_for_parser(SBUS_FRAME_LEN);
        if view.len() < SBUS_FRAME_LEN {
            // Not enough contiguous data before wrap; caller's flow can
            // retry once more bytes land or the wrap rolls over.
            return false;
        }

        if view[0] != SBUS_START_BYTE {
            buffer.consume(1);
            return true;
        }

        if !VALID_END_BYTES.contains(&view[24]) {
            buffer.consume(1);
            self.invalid_frames.fetch_add(1, Ordering::Relaxed);
            if let Some(stats) = &self.stats {
                stats.record_error();
            }
            return true;
        }

        let mut frame = [0u8; SBUS_FRAME_LEN];
        frame.copy_from_slice(view);
        buffer.consume(SBUS_FRAME_LEN);
        self.valid_frames.fetch_add(1, Ordering::Relaxed);
        if let Some(stats) = &self.stats {
            stats.record_packet(SBUS_FRAME_LEN, 0);
        }

        self.router.route_frame(frame, self.source_id, ctx.now_us / 1000);
        true
    }

    /// Called only when [`Self::try_fast_process`] returned `false`;
    /// partial frames simply wait for more data (spec.md §4.3.3:
    /// "`parse()` returns empty").
    fn parse(&mut self, _buffer: &mut CircularBuffer, _now_us: u64) -> ParseResult {
        ParseResult::empty()
    }

    fn reset(&mut self) {
        self.invalid_frames.store(0, Ordering::Relaxed);
        self.valid_frames.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "SBUS_Fast"
    }

    fn minimum_bytes(&self) -> usize {
        SBUS_FRAME_LEN
    }

    fn set_stats(&mut self, stats: Arc<ProtocolStats>) {
        self.stats = Some(stats);
    }
}
