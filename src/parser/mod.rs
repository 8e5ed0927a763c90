//! Parser trait and the three protocol implementations (spec.md §4.3).

pub mod line;
pub mod mavlink;
pub mod raw;
pub mod sbus;

use crate::buffer::CircularBuffer;
use crate::packet::{ParseResult, ParsedPacket};
use crate::stats::ProtocolStats;
use std::sync::Arc;

/// Shared capability surface for all three protocol parsers (spec.md
/// §4.3, and §9: "one trait per capability... inside a parser, keep state
/// monomorphic").
///
/// `parse` must never read beyond `buffer.available()` bytes, must report
/// `bytes_consumed` exactly equal to the prefix of the buffer it commits
/// to, and must leave the buffer unchanged if it returns zero packets and
/// zero consumed bytes (spec.md §4.3).
///
/// Timestamps are microseconds from an arbitrary monotonic epoch chosen
/// by the embedder, not milliseconds: the RAW parser's flush thresholds
/// need sub-millisecond resolution (spec.md §4.3.1: "idle gap since last
/// byte >= 200 us"), so the whole pipeline standardizes on microseconds
/// and downscales to milliseconds only where a component's contract
/// explicitly wants it (`ProtocolStats::record_packet`, MAVLink router
/// expiry).
/// Context handed to [`Parser::try_fast_process`] (spec.md §4.3:
/// `tryFastProcess(buffer, ctx)`). Carries only what the fast path needs
/// to reason about liveness/failsafe timing; parsers never get a handle
/// back into the pipeline itself.
#[derive(Debug, Clone, Copy)]
pub struct ParserContext {
    pub now_us: u64,
}

pub trait Parser: Send {
    /// Optional fast path that bypasses `ParsedPacket` allocation
    /// entirely (spec.md §4.3.3: used by SBUS). Returns `true` if it
    /// consumed bytes and handled the buffer state itself; `false` means
    /// "defer to `parse`".
    fn try_fast_process(&mut self, buffer: &mut CircularBuffer, ctx: &ParserContext) -> bool {
        let _ = (buffer, ctx);
        false
    }

    fn parse(&mut self, buffer: &mut CircularBuffer, now_us: u64) -> ParseResult;

    fn reset(&mut self);

    fn name(&self) -> &'static str;

    /// Smallest number of bytes this parser can ever act on; used to size
    /// a flow's ingress buffer (spec.md §3 invariant: "Circular buffers
    /// have capacity >= the parser's stated minimum bytes").
    fn minimum_bytes(&self) -> usize;

    /// True while a sustained high-rate burst is in progress (spec.md
    /// §4.3.1, §4.6: drives sender bulk-mode).
    fn is_burst_active(&self) -> bool {
        false
    }

    fn set_stats(&mut self, stats: Arc<ProtocolStats>);

    /// Called when the ingress adapter reports a detected inter-frame
    /// timeout (spec.md §4.2, §4.3.1: the RAW parser's primary flush
    /// trigger). Parsers that don't key off this signal return `None`.
    fn notify_adapter_timeout(&mut self, now_us: u64) -> Option<ParsedPacket> {
        let _ = now_us;
        None
    }
}
