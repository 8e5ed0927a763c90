//! Shared UART1 TX service (spec.md §4.7).
//!
//! A direct port of `Uart1TxService` (`uart1_tx_service.cpp`): every flow
//! that targets UART1 converges on one mutex-protected ring so draining
//! stays in order and in one place. Not allocated at all when
//! `Config::device1 == SbusIn`, saving the ring's memory on that role
//! (ported from `init()`'s early return for `D1_SBUS_IN`).

use crate::buffer::CircularBuffer;
use crate::ingress::IngressPort;
use crate::stats::DeviceByteStats;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_RING_CAPACITY: usize = 8 * 1024;
const DEFAULT_MAX_WRITE_PER_CALL: usize = 1024;

struct Ring {
    buffer: CircularBuffer,
}

/// `None` when the service was constructed for a `D1=SBUS_IN` config
/// (spec.md §9 and SPEC_FULL.md §3: the ring is deliberately not
/// allocated in that case).
pub struct Uart1TxService {
    ring: Option<Mutex<Ring>>,
    max_write_per_call: usize,
    dropped_bytes: AtomicU32,
    stats: Arc<DeviceByteStats>,
}

impl Uart1TxService {
    pub fn new(ring_capacity: usize, stats: Arc<DeviceByteStats>) -> Self {
        Self {
            ring: Some(Mutex::new(Ring {
                buffer: CircularBuffer::with_capacity(ring_capacity),
            })),
            max_write_per_call: DEFAULT_MAX_WRITE_PER_CALL,
            dropped_bytes: AtomicU32::new(0),
            stats,
        }
    }

    /// Constructs the service with no backing ring at all, for the
    /// `D1=SBUS_IN` role (spec.md §4.7, SPEC_FULL.md §3).
    pub fn disabled(stats: Arc<DeviceByteStats>) -> Self {
        Self {
            ring: None,
            max_write_per_call: DEFAULT_MAX_WRITE_PER_CALL,
            dropped_bytes: AtomicU32::new(0),
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ring.is_some()
    }

    /// Thread-safe enqueue; callable from the pipeline pass or the UDP
    /// receive callback on the other core (spec.md §4.7). Evicts the
    /// oldest bytes to make room on overflow rather than rejecting the
    /// new data.
    pub fn enqueue(&self, data: &[u8]) -> bool {
        let Some(ring) = &self.ring else {
            return false;
        };
        let mut ring = ring.lock().expect("uart1 tx ring mutex poisoned");
        let free = ring.buffer.free_space();
        if free < data.len() {
            let to_drop = data.len() - free;
            ring.buffer.consume(to_drop);
            self.dropped_bytes.fetch_add(to_drop as u32, Ordering::Relaxed);
        }
        let written = ring.buffer.write(data);
        written == data.len()
    }

    pub fn queued_bytes(&self) -> usize {
        self.ring
            .as_ref()
            .map(|r| r.lock().expect("uart1 tx ring mutex poisoned").buffer.available())
            .unwrap_or(0)
    }

    pub fn dropped_bytes(&self) -> u32 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }

    /// Drains the ring into `port`, bounded to `max_write_per_call` bytes
    /// total (spec.md §4.7: default 1024) so one pipeline pass can't be
    /// monopolized by UART1 drain.
    pub fn process_tx_queue(&self, port: &Mutex<dyn IngressPort>) {
        let Some(ring) = &self.ring else { return };
        let mut ring = ring.lock().expect("uart1 tx ring mutex poisoned");
        if ring.buffer.available() == 0 {
            return;
        }
        let Ok(mut port) = port.try_lock() else {
            return;
        };
        if port.available_for_write() == 0 {
            return;
        }

        let mut total_written = 0usize;
        while ring.buffer.available() > 0 && total_written < self.max_write_per_call {
            let can_write = port.available_for_write();
            if can_write == 0 {
                break;
            }
            let (first, second) = ring.buffer.get_read_segments();
            let mut wrote_this_round = 0usize;

            if !first.is_empty() {
                let budget = (self.max_write_per_call - total_written).min(can_write);
                let to_write = first.len().min(budget);
                if to_write > 0 {
                    let written = port.write(&first[..to_write]);
                    if written > 0 {
                        wrote_this_round += written;
                    }
                }
            }
            if wrote_this_round > 0 {
                ring.buffer.consume(wrote_this_round);
                total_written += wrote_this_round;
                self.stats.add_tx(wrote_this_round);
                continue;
            }

            if !second.is_empty() && total_written < self.max_write_per_call {
                let can_write = port.available_for_write();
                if can_write > 0 {
                    let budget = (self.max_write_per_call - total_written).min(can_write);
                    let to_write = second.len().min(budget);
                    let written = port.write(&second[..to_write]);
                    if written > 0 {
                        ring.buffer.consume(written);
                        total_written += written;
                        self.stats.add_tx(written);
                        continue;
                    }
                }
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::TestPort;

    #[test]
    fn disabled_service_rejects_enqueue() {
        let service = Uart1TxService::disabled(Arc::new(DeviceByteStats::default()));
        assert!(!service.is_enabled());
        assert!(!service.enqueue(b"x"));
    }

    #[test]
    fn evicts_oldest_on_overflow() {
        let service = Uart1TxService::new(8, Arc::new(DeviceByteStats::default()));
        assert!(service.enqueue(b"aaaaaaaa"));
        assert!(service.enqueue(b"bb"));
        assert_eq!(service.dropped_bytes(), 2);
        assert_eq!(service.queued_bytes(), 8);
    }

    #[test]
    fn drains_into_port_bounded_by_max_write_per_call() {
        let service = Uart1TxService::new(4096, Arc::new(DeviceByteStats::default()));
        service.enqueue(&vec![0xABu8; 2048]);
        let port: Mutex<dyn IngressPort> = Mutex::new(TestPort::new());
        service.process_tx_queue(&port);
        assert_eq!(service.queued_bytes(), 2048 - DEFAULT_MAX_WRITE_PER_CALL);
    }
}
