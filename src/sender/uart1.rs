//! Thin zero-queue UART1 sender (spec.md §4.6): "the UART1 sender is a
//! zero-queue thin wrapper around the shared TX service, so that every
//! flow targeting UART1 converges into one FIFO with in-order draining."
//!
//! Unlike the other senders, this type holds no packet queue of its own —
//! `enqueue` writes straight through to [`Uart1TxService`], and
//! `process_send_queue` just asks the service to drain whatever is
//! already buffered there.

use super::Sender;
use crate::ingress::IngressPort;
use crate::packet::ParsedPacket;
use crate::stats::SenderStats;
use crate::uart1_tx_service::Uart1TxService;
use std::sync::{Arc, Mutex};

pub struct Uart1Sender {
    service: Arc<Uart1TxService>,
    port: Arc<Mutex<dyn IngressPort>>,
    stats: SenderStats,
}

impl Uart1Sender {
    pub fn new(service: Arc<Uart1TxService>, port: Arc<Mutex<dyn IngressPort>>) -> Self {
        Self {
            service,
            port,
            stats: SenderStats::default(),
        }
    }
}

impl Sender for Uart1Sender {
    fn enqueue(&mut self, packet: ParsedPacket) -> bool {
        if self.service.enqueue(&packet.payload) {
            self.stats.sent_packets += 1;
            true
        } else {
            self.stats.dropped_packets += 1;
            self.stats.dropped_bytes += packet.len() as u64;
            super::log_dropped_ratelimited("UART1", self.stats.dropped_packets);
            false
        }
    }

    fn process_send_queue(&mut self, _bulk_mode: bool, _now_us: u64) {
        self.service.process_tx_queue(&self.port);
    }

    fn stats(&self) -> SenderStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "UART1"
    }

    fn is_ready(&self) -> bool {
        self.service.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::TestPort;
    use crate::interfaces::PhysicalInterface;
    use crate::packet::PacketFormat;
    use crate::stats::DeviceByteStats;

    fn packet(bytes: &[u8]) -> ParsedPacket {
        ParsedPacket::new(bytes.to_vec(), PacketFormat::Raw, PhysicalInterface::Uart2)
    }

    #[test]
    fn enqueue_writes_through_to_shared_service() {
        let service = Arc::new(Uart1TxService::new(64, Arc::new(DeviceByteStats::default())));
        let port: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(TestPort::new()));
        let mut sender = Uart1Sender::new(service.clone(), port);
        assert!(sender.enqueue(packet(b"hello")));
        assert_eq!(service.queued_bytes(), 5);
        assert_eq!(sender.stats().sent_packets, 1);
    }

    #[test]
    fn process_send_queue_drains_shared_ring() {
        let service = Arc::new(Uart1TxService::new(64, Arc::new(DeviceByteStats::default())));
        let port: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(TestPort::new()));
        let mut sender = Uart1Sender::new(service.clone(), port);
        sender.enqueue(packet(b"hello"));
        sender.process_send_queue(false, 0);
        assert_eq!(service.queued_bytes(), 0);
    }

    #[test]
    fn not_ready_when_service_disabled_for_sbus_in() {
        let service = Arc::new(Uart1TxService::disabled(Arc::new(DeviceByteStats::default())));
        let port: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(TestPort::new()));
        let sender = Uart1Sender::new(service, port);
        assert!(!sender.is_ready());
    }
}
