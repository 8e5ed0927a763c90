//! USB CDC egress sender (spec.md §4.6: "wraps an adaptive-batching USB
//! interface; splits large packets at MTU boundaries").

use super::Sender;
use crate::ingress::IngressPort;
use crate::packet::ParsedPacket;
use crate::stats::SenderStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DEFAULT_QUEUE_CAPACITY_PACKETS: usize = 16;
const DEFAULT_QUEUE_CAPACITY_BYTES: usize = 8 * 1024;
const USB_MTU: usize = 64;

pub struct UsbSender {
    port: Arc<Mutex<dyn IngressPort>>,
    connected: Arc<std::sync::atomic::AtomicBool>,
    queue: VecDeque<ParsedPacket>,
    queue_bytes: usize,
    capacity_packets: usize,
    capacity_bytes: usize,
    /// Byte offset into the packet at the front of the queue already
    /// written out, for mid-packet MTU-split resumption.
    in_flight_offset: usize,
    stats: SenderStats,
}

impl UsbSender {
    pub fn new(port: Arc<Mutex<dyn IngressPort>>, connected: Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self {
            port,
            connected,
            queue: VecDeque::new(),
            queue_bytes: 0,
            capacity_packets: DEFAULT_QUEUE_CAPACITY_PACKETS,
            capacity_bytes: DEFAULT_QUEUE_CAPACITY_BYTES,
            in_flight_offset: 0,
            stats: SenderStats::default(),
        }
    }
}

impl Sender for UsbSender {
    fn enqueue(&mut self, packet: ParsedPacket) -> bool {
        if self.queue.len() >= self.capacity_packets
            || self.queue_bytes + packet.len() > self.capacity_bytes
        {
            self.stats.dropped_packets += 1;
            self.stats.dropped_bytes += packet.len() as u64;
            super::log_dropped_ratelimited("USB", self.stats.dropped_packets);
            return false;
        }
        self.queue_bytes += packet.len();
        self.queue.push_back(packet);
        self.stats.queue_depth = self.queue.len();
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.queue.len());
        true
    }

    fn process_send_queue(&mut self, bulk_mode: bool, _now_us: u64) {
        if !self.is_ready() {
            return;
        }
        loop {
            let Some(packet) = self.queue.front() else {
                break;
            };
            let Ok(mut port) = self.port.try_lock() else {
                break;
            };
            let remaining = &packet.payload[self.in_flight_offset..];
            let chunk_len = remaining.len().min(USB_MTU).min(port.available_for_write());
            if chunk_len == 0 {
                break;
            }
            port.write(&remaining[..chunk_len]);
            drop(port);
            self.in_flight_offset += chunk_len;

            if self.in_flight_offset >= packet.len() {
                let packet = self.queue.pop_front().expect("checked non-empty above");
                self.queue_bytes -= packet.len();
                self.in_flight_offset = 0;
                self.stats.sent_packets += 1;
                self.stats.queue_depth = self.queue.len();
            }

            if !bulk_mode {
                break;
            }
        }
    }

    fn stats(&self) -> SenderStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "USB"
    }

    fn is_ready(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::TestPort;
    use crate::interfaces::PhysicalInterface;
    use crate::packet::PacketFormat;
    use std::sync::atomic::AtomicBool;

    fn packet(bytes: &[u8]) -> ParsedPacket {
        ParsedPacket::new(bytes.to_vec(), PacketFormat::Raw, PhysicalInterface::Uart1)
    }

    #[test]
    fn splits_large_packet_across_mtu_chunks() {
        let port: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(TestPort::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let mut sender = UsbSender::new(port.clone(), connected);
        let big = vec![0xAAu8; 150];
        sender.enqueue(packet(&big));
        sender.process_send_queue(true, 0);
        assert_eq!(sender.stats().sent_packets, 1);
    }

    #[test]
    fn not_ready_when_disconnected() {
        let port: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(TestPort::new()));
        let connected = Arc::new(AtomicBool::new(false));
        let mut sender = UsbSender::new(port, connected);
        sender.enqueue(packet(b"x"));
        sender.process_send_queue(true, 0);
        assert_eq!(sender.stats().sent_packets, 0);
    }
}
