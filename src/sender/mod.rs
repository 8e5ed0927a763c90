//! Sender trait and per-transport implementations (spec.md §4.6).

pub mod uart;
pub mod uart1;
pub mod udp;
pub mod usb;

use crate::packet::ParsedPacket;
use crate::stats::SenderStats;

/// Capability surface shared by every egress transport (spec.md §4.6).
///
/// Queue policy is drop-newest on a full queue; bulk mode lets
/// `process_send_queue` drain more than one packet per pipeline pass
/// while any parser reports a sustained burst (spec.md §4.6, §4.9).
pub trait Sender: Send {
    fn enqueue(&mut self, packet: ParsedPacket) -> bool;

    /// `now_us` lets the UDP sender's batching deadline (spec.md §4.6:
    /// "up to... a 2 ms deadline") fire on wall-clock time rather than
    /// pass count; other senders ignore it.
    fn process_send_queue(&mut self, bulk_mode: bool, now_us: u64);

    fn stats(&self) -> SenderStats;

    fn name(&self) -> &'static str;

    /// Whether the underlying transport is currently usable (e.g. USB
    /// CDC connected). Senders that are always ready return `true`.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Drop-count interval at which a full queue logs, instead of once per
/// drop (spec.md's ambient logging rules: a full send queue is routine
/// backpressure, not worth a line per packet).
const DROP_LOG_INTERVAL: u32 = 64;

/// Logs a queue-full drop at `debug!`, rate-limited to once every
/// [`DROP_LOG_INTERVAL`] drops so a sustained full queue doesn't flood
/// the log. `dropped_total` is the sender's running count *after*
/// counting this drop.
pub(crate) fn log_dropped_ratelimited(sender_name: &str, dropped_total: u32) {
    if dropped_total % DROP_LOG_INTERVAL == 1 {
        log::debug!("{sender_name} send queue full, dropped {dropped_total} packets so far");
    }
}
