//! Minimal demo driver: wires a RAW UART1→USB bridge pipeline and runs
//! it against synthetic traffic, logging stats every second. Not a
//! substitute for a real embedder's transport layer — see
//! [`bridge_pipeline::ingress::IngressPort`] for the contract a real
//! UART/USB driver implements.

use bridge_pipeline::clock::SystemClock;
use bridge_pipeline::config::{Config, Device1Role, Device2Role};
use bridge_pipeline::ingress::IngressPort;
use bridge_pipeline::interfaces::PhysicalInterface;
use bridge_pipeline::pipeline::{Pipeline, PipelinePorts};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Emits an incrementing byte counter as fake telemetry, standing in for
/// a real UART1 DMA source.
struct SyntheticSource {
    counter: u8,
    bytes_per_tick: usize,
}

impl IngressPort for SyntheticSource {
    fn available(&self) -> usize {
        self.bytes_per_tick
    }

    fn available_for_write(&self) -> usize {
        0
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.bytes_per_tick);
        for slot in buf.iter_mut().take(n) {
            *slot = self.counter;
            self.counter = self.counter.wrapping_add(1);
        }
        n
    }

    fn write(&mut self, _buf: &[u8]) -> usize {
        0
    }

    fn flush(&mut self) {}

    fn has_packet_timeout(&mut self) -> bool {
        false
    }

    fn has_overrun(&mut self) -> bool {
        false
    }
}

/// Discards written bytes after counting them, standing in for a USB CDC
/// link to a ground station.
#[derive(Default)]
struct CountingSink {
    pending: VecDeque<u8>,
    total_written: u64,
}

impl IngressPort for CountingSink {
    fn available(&self) -> usize {
        self.pending.len()
    }

    fn available_for_write(&self) -> usize {
        4096
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap();
        }
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        self.total_written += buf.len() as u64;
        buf.len()
    }

    fn flush(&mut self) {}

    fn has_packet_timeout(&mut self) -> bool {
        false
    }

    fn has_overrun(&mut self) -> bool {
        false
    }
}

fn main() {
    env_logger::init();

    let config = Config {
        device1: Device1Role::Uart1,
        device2: Device2Role::Usb,
        ..Config::default()
    };
    config.validate().expect("demo config is self-consistent");

    let uart1: Arc<Mutex<dyn IngressPort>> = Arc::new(Mutex::new(SyntheticSource {
        counter: 0,
        bytes_per_tick: 32,
    }));
    let usb_sink = Arc::new(Mutex::new(CountingSink::default()));
    let usb: Arc<Mutex<dyn IngressPort>> = usb_sink.clone();

    let ports = PipelinePorts {
        uart1,
        uart2: None,
        uart3: None,
        usb: Some(usb),
        usb_connected: Some(Arc::new(AtomicBool::new(true))),
        udp_ingress: None,
        udp_tx_ring: None,
        log_source: None,
        mavlink_message_table: None,
    };

    let clock = Arc::new(SystemClock::new());
    let mut pipeline = Pipeline::new(&config, ports, clock);

    log::info!("bridge-sim running a RAW {}->{} pipeline", PhysicalInterface::Uart1, PhysicalInterface::Usb);

    for tick in 0.. {
        pipeline.run_once();

        if tick % 1000 == 0 {
            let stats = pipeline.stats_snapshot();
            for flow in &stats.flows {
                log::info!("flow {} ({})", flow.name, flow.parser_name);
            }
            let forwarded = usb_sink.lock().expect("usb sink mutex poisoned").total_written;
            log::info!("usb bytes forwarded so far: {forwarded}");
        }

        std::thread::sleep(Duration::from_micros(100));
    }
}
