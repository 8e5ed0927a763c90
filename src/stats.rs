//! Statistics counters.
//!
//! Spec.md §6 describes the statistics block as an external collaborator's
//! atomic-counter contract ("atomic counters for bytes per interface"); §9
//! notes counters are monotonic within a run and reset only by an external
//! snapshot-copier. [`DeviceByteStats`] implements that external contract
//! (it is written to from interrupt-like ingress contexts and the UDP
//! receive callback on another core, per spec.md §5). Per-sender counters
//! (spec.md §4.6) are plain fields: spec.md §5 states "Sender counters are
//! updated only by the owning sender," so no atomics are needed there — the
//! pipeline orchestrator never runs sender code concurrently with itself.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-physical-interface byte counters, safe to update from any context
/// (ingress interrupt callback, UDP receive callback on the other core, or
/// the main pipeline pass).
#[derive(Debug, Default)]
pub struct DeviceByteStats {
    pub rx_bytes: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub overrun_count: AtomicU32,
}

impl DeviceByteStats {
    pub fn add_rx(&self, n: usize) {
        self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_tx(&self, n: usize) {
        self.tx_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn note_overrun(&self) {
        self.overrun_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rx(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }
}

/// Protocol-wide parse statistics, one instance shared across all flows
/// of a pipeline (spec.md §4.3: `setStats(stats)`).
#[derive(Debug, Default)]
pub struct ProtocolStats {
    pub total_bytes: AtomicU64,
    pub packets_detected: AtomicU32,
    pub detection_errors: AtomicU32,
    pub sum_packet_size: AtomicU64,
    pub min_packet_size: AtomicU32,
    pub max_packet_size: AtomicU32,
    pub last_packet_time_ms: AtomicU64,
}

impl ProtocolStats {
    pub fn record_packet(&self, size: usize, now_ms: u64) {
        self.total_bytes.fetch_add(size as u64, Ordering::Relaxed);
        self.packets_detected.fetch_add(1, Ordering::Relaxed);
        self.sum_packet_size
            .fetch_add(size as u64, Ordering::Relaxed);
        self.min_packet_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(if cur == 0 { size as u32 } else { cur.min(size as u32) })
            })
            .ok();
        self.max_packet_size
            .fetch_max(size as u32, Ordering::Relaxed);
        self.last_packet_time_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.detection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_packet_size(&self) -> u32 {
        let count = self.packets_detected.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            (self.sum_packet_size.load(Ordering::Relaxed) / count as u64) as u32
        }
    }
}

/// Snapshot of one sender's counters, owned solely by the sender and read
/// out through [`crate::sender::Sender`] accessor methods — never atomic,
/// per spec.md §5's single-mutator rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub sent_packets: u32,
    pub dropped_packets: u32,
    pub dropped_bytes: u64,
    pub queue_depth: usize,
    pub max_queue_depth: usize,
}

/// Counters maintained by [`crate::router::mavlink_router::MavlinkRouter`]
/// (spec.md §4.4).
#[derive(Debug, Default)]
pub struct RouterStats {
    pub unicast_hits: AtomicU32,
    pub broadcasts: AtomicU32,
}

impl RouterStats {
    pub fn snapshot(&self) -> (u32, u32) {
        (
            self.unicast_hits.load(Ordering::Relaxed),
            self.broadcasts.load(Ordering::Relaxed),
        )
    }
}

/// A one-shot, read-only view of the whole pipeline's counters, built by
/// [`crate::pipeline::Pipeline::stats_snapshot`]. This is the seam an
/// external UI/telemetry collaborator reads through (spec.md §1: the web
/// configuration UI is out of scope but consumes this shape); the pipeline
/// core never formats text or JSON itself.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub flows: Vec<FlowStats>,
    pub senders: Vec<(&'static str, SenderStats)>,
    pub router: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct FlowStats {
    pub name: &'static str,
    pub parser_name: &'static str,
}
