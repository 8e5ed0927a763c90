//! UDP egress sender (spec.md §4.6): enqueues packet bytes into the SPSC
//! ring consumed by the other core's UDP transmit task. Optional
//! batching coalesces multiple packets up to MTU or a 2 ms deadline
//! before producing a single ring entry.

use super::Sender;
use crate::packet::ParsedPacket;
use crate::spsc::{SpscQueue, MTU};
use crate::stats::SenderStats;
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_QUEUE_CAPACITY_PACKETS: usize = 16;
const DEFAULT_QUEUE_CAPACITY_BYTES: usize = 8 * 1024;
const BATCH_DEADLINE_US: u64 = 2_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct UdpBatchingStats {
    pub packets_coalesced: u64,
    pub batches_emitted: u64,
}

impl UdpBatchingStats {
    pub fn average_batch_size(&self) -> f64 {
        if self.batches_emitted == 0 {
            0.0
        } else {
            self.packets_coalesced as f64 / self.batches_emitted as f64
        }
    }
}

pub struct UdpSender {
    ring: Arc<SpscQueue>,
    queue: VecDeque<ParsedPacket>,
    queue_bytes: usize,
    capacity_packets: usize,
    capacity_bytes: usize,
    batching_enabled: bool,
    batch: Vec<u8>,
    batch_packet_count: u64,
    batch_started_us: Option<u64>,
    batching_stats: UdpBatchingStats,
    stats: SenderStats,
}

impl UdpSender {
    pub fn new(ring: Arc<SpscQueue>, batching_enabled: bool) -> Self {
        Self {
            ring,
            queue: VecDeque::new(),
            queue_bytes: 0,
            capacity_packets: DEFAULT_QUEUE_CAPACITY_PACKETS,
            capacity_bytes: DEFAULT_QUEUE_CAPACITY_BYTES,
            batching_enabled,
            batch: Vec::with_capacity(MTU),
            batch_packet_count: 0,
            batch_started_us: None,
            batching_stats: UdpBatchingStats::default(),
            stats: SenderStats::default(),
        }
    }

    pub fn batching_stats(&self) -> UdpBatchingStats {
        self.batching_stats
    }

    fn flush_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        if self.ring.enqueue(&self.batch) {
            self.batching_stats.batches_emitted += 1;
            self.batching_stats.packets_coalesced += self.batch_packet_count;
        } else {
            self.stats.dropped_packets += self.batch_packet_count as u32;
            self.stats.dropped_bytes += self.batch.len() as u64;
            super::log_dropped_ratelimited("UDP", self.stats.dropped_packets);
        }
        self.batch.clear();
        self.batch_packet_count = 0;
        self.batch_started_us = None;
    }

    fn send_one(&mut self, packet: ParsedPacket, now_us: u64) {
        if !self.batching_enabled {
            if self.ring.enqueue(&packet.payload) {
                self.stats.sent_packets += 1;
            } else {
                self.stats.dropped_packets += 1;
                self.stats.dropped_bytes += packet.len() as u64;
                super::log_dropped_ratelimited("UDP", self.stats.dropped_packets);
            }
            return;
        }

        if self.batch.len() + packet.len() > MTU {
            self.flush_batch();
        }
        if self.batch_started_us.is_none() {
            self.batch_started_us = Some(now_us);
        }
        self.batch.extend_from_slice(&packet.payload);
        self.batch_packet_count += 1;
        self.stats.sent_packets += 1;

        if self.batch.len() >= MTU {
            self.flush_batch();
        }
    }
}

impl Sender for UdpSender {
    fn enqueue(&mut self, packet: ParsedPacket) -> bool {
        if self.queue.len() >= self.capacity_packets
            || self.queue_bytes + packet.len() > self.capacity_bytes
        {
            self.stats.dropped_packets += 1;
            self.stats.dropped_bytes += packet.len() as u64;
            super::log_dropped_ratelimited("UDP", self.stats.dropped_packets);
            return false;
        }
        self.queue_bytes += packet.len();
        self.queue.push_back(packet);
        self.stats.queue_depth = self.queue.len();
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.queue.len());
        true
    }

    fn process_send_queue(&mut self, bulk_mode: bool, now_us: u64) {
        loop {
            match self.queue.pop_front() {
                Some(packet) => {
                    self.queue_bytes -= packet.len();
                    self.send_one(packet, now_us);
                    self.stats.queue_depth = self.queue.len();
                }
                None => break,
            }
            if !bulk_mode {
                break;
            }
        }

        if self.batching_enabled {
            if let Some(started) = self.batch_started_us {
                if now_us.saturating_sub(started) >= BATCH_DEADLINE_US {
                    self.flush_batch();
                }
            }
        }
    }

    fn stats(&self) -> SenderStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}
