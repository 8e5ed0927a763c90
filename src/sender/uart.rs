//! UART egress sender (spec.md §4.6: "UART senders (UART1/UART2/UART3):
//! write directly to the DMA adapter when `availableForWrite() >=
//! packet.size`; otherwise requeue the packet at the head").
//!
//! UART1 itself never uses this type directly — it goes through the
//! shared TX service wrapper in [`crate::sender::uart1`]. This is used
//! for UART2 and UART3 output roles.

use super::Sender;
use crate::ingress::IngressPort;
use crate::packet::ParsedPacket;
use crate::stats::SenderStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DEFAULT_QUEUE_CAPACITY_PACKETS: usize = 16;
const DEFAULT_QUEUE_CAPACITY_BYTES: usize = 8 * 1024;

pub struct UartSender {
    name: &'static str,
    port: Arc<Mutex<dyn IngressPort>>,
    queue: VecDeque<ParsedPacket>,
    queue_bytes: usize,
    capacity_packets: usize,
    capacity_bytes: usize,
    stats: SenderStats,
}

impl UartSender {
    pub fn new(name: &'static str, port: Arc<Mutex<dyn IngressPort>>) -> Self {
        Self {
            name,
            port,
            queue: VecDeque::new(),
            queue_bytes: 0,
            capacity_packets: DEFAULT_QUEUE_CAPACITY_PACKETS,
            capacity_bytes: DEFAULT_QUEUE_CAPACITY_BYTES,
            stats: SenderStats::default(),
        }
    }

    pub fn with_capacity(mut self, packets: usize, bytes: usize) -> Self {
        self.capacity_packets = packets;
        self.capacity_bytes = bytes;
        self
    }
}

impl Sender for UartSender {
    fn enqueue(&mut self, packet: ParsedPacket) -> bool {
        if self.queue.len() >= self.capacity_packets
            || self.queue_bytes + packet.len() > self.capacity_bytes
        {
            self.stats.dropped_packets += 1;
            self.stats.dropped_bytes += packet.len() as u64;
            super::log_dropped_ratelimited(self.name, self.stats.dropped_packets);
            return false;
        }
        self.queue_bytes += packet.len();
        self.queue.push_back(packet);
        self.stats.queue_depth = self.queue.len();
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.queue.len());
        true
    }

    fn process_send_queue(&mut self, bulk_mode: bool, _now_us: u64) {
        loop {
            let Some(packet) = self.queue.front() else {
                break;
            };
            let Ok(mut port) = self.port.try_lock() else {
                // Shared-resource contention: transient, retry next pass
                // (spec.md §7).
                break;
            };
            if port.available_for_write() < packet.len() {
                break;
            }
            let packet = self.queue.pop_front().expect("checked non-empty above");
            self.queue_bytes -= packet.len();
            port.write(&packet.payload);
            drop(port);
            self.stats.sent_packets += 1;
            self.stats.queue_depth = self.queue.len();
            if !bulk_mode {
                break;
            }
        }
    }

    fn stats(&self) -> SenderStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
