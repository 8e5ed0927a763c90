//! Pipeline orchestrator (spec.md §4.9, §4.10).
//!
//! Translates a frozen [`Config`] into a fixed set of [`DataFlow`]s at
//! construction (`setup_flows`, evaluated exactly once), then runs the
//! two-phase cooperative schedule every main-loop iteration: input flows
//! under a 5 ms budget, the telemetry/SBUS/log flows under a 10 ms /
//! 20-iteration budget, then sender drains. Distribution applies the
//! anti-echo rule (spec.md §4.10) as the single place a packet's
//! destination mask is finalized.

use crate::buffer::CircularBuffer;
use crate::clock::Clock;
use crate::config::{Config, Device2Role, Device3Role, Device4Role, ProtocolOptimization};
use crate::ingress::IngressPort;
use crate::interfaces::{PhysicalInterface, SenderMask, SenderSlot};
use crate::packet::{PacketSource, ParsedPacket};
use crate::parser::line::LineParser;
use crate::parser::mavlink::{MavlinkParser, MessageTable};
use crate::parser::raw::RawParser;
use crate::parser::sbus::SbusFastParser;
use crate::parser::{Parser, ParserContext};
use crate::router::mavlink_router::{MavlinkRouter, Resolution};
use crate::router::sbus_router::{SbusRouter, SbusSourceId};
use crate::sender::uart::UartSender;
use crate::sender::uart1::Uart1Sender;
use crate::sender::udp::UdpSender;
use crate::sender::usb::UsbSender;
use crate::sender::Sender;
use crate::spsc::SpscQueue;
use crate::stats::{DeviceByteStats, FlowStats, PipelineStats, ProtocolStats};
use crate::uart1_tx_service::Uart1TxService;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

const INPUT_BUDGET_US: u64 = 5_000;
const TELEMETRY_BUDGET_US: u64 = 10_000;
const TELEMETRY_MAX_ITERATIONS: u32 = 20;
const INGRESS_SCRATCH: usize = 256;
const FLOW_BUFFER_CAPACITY: usize = 2048;
/// Sender queue depth above which [`Pipeline::check_backpressure`] warns,
/// matching the original firmware's `handleBackpressure()` threshold.
const BACKPRESSURE_QUEUE_DEPTH: usize = 15;

/// Byte-level transports and auxiliary resources the embedder wires up
/// before constructing a [`Pipeline`] (spec.md §6 collaborator contracts).
/// UART1 is mandatory; everything else is only required when `config`
/// actually enables the corresponding device role.
pub struct PipelinePorts {
    pub uart1: Arc<Mutex<dyn IngressPort>>,
    pub uart2: Option<Arc<Mutex<dyn IngressPort>>>,
    pub uart3: Option<Arc<Mutex<dyn IngressPort>>>,
    pub usb: Option<Arc<Mutex<dyn IngressPort>>>,
    pub usb_connected: Option<Arc<AtomicBool>>,
    /// UDP is exposed as an ordinary [`IngressPort`] for the ingest side
    /// (spec.md §6: "incoming datagrams are appended to the UDP ingress
    /// buffer as an opaque byte stream") and as the SPSC ring for egress
    /// (spec.md §4.8).
    pub udp_ingress: Option<Arc<Mutex<dyn IngressPort>>>,
    pub udp_tx_ring: Option<Arc<SpscQueue>>,
    /// Source for the `D4=LOG_NETWORK` logger flow (spec.md §1: the
    /// logging ring buffer itself is an out-of-scope collaborator; this
    /// is just the byte-level read side of it).
    pub log_source: Option<Arc<Mutex<dyn IngressPort>>>,
    /// CRC-extra and target-sysid lookup for MAVLink flows (spec.md §4.4
    /// "Target selection"). An embedder that links a generated MAVLink
    /// dialect supplies one here; without it every MAVLink flow falls
    /// back to [`crate::parser::mavlink::MavlinkParser::new`]'s default
    /// (CRC skipped, every packet broadcast, sysid-targeted unicast
    /// unreachable).
    pub mavlink_message_table: Option<Arc<dyn MessageTable>>,
}

struct DataFlow {
    name: &'static str,
    port: Arc<Mutex<dyn IngressPort>>,
    buffer: CircularBuffer,
    physical_interface: PhysicalInterface,
    source: PacketSource,
    sender_mask: SenderMask,
    is_input_flow: bool,
    parser: Box<dyn Parser>,
}

/// Runtime pipeline built once from a [`Config`] and [`PipelinePorts`]
/// (spec.md §3: "created once at boot from the frozen configuration").
pub struct Pipeline {
    flows: Vec<DataFlow>,
    senders: [Option<Box<dyn Sender>>; crate::interfaces::MAX_SENDERS],
    protocol_stats: Arc<ProtocolStats>,
    device_stats: HashMap<PhysicalInterface, Arc<DeviceByteStats>>,
    mavlink_router: Option<Arc<MavlinkRouter>>,
    sbus_router: Option<Arc<SbusRouter>>,
    uart1_tx_service: Arc<Uart1TxService>,
    mavlink_routing_enabled: bool,
    clock: Arc<dyn Clock>,
    /// Edge-triggered latch per sender slot for [`Pipeline::check_backpressure`]:
    /// true once a slot has warned for its current excursion above
    /// [`BACKPRESSURE_QUEUE_DEPTH`], cleared once the queue drains back
    /// under it.
    backpressure_warned: [bool; crate::interfaces::MAX_SENDERS],
}

impl Pipeline {
    pub fn new(config: &Config, ports: PipelinePorts, clock: Arc<dyn Clock>) -> Self {
        let protocol_stats = Arc::new(ProtocolStats::default());
        let mut device_stats = HashMap::new();
        for phys in [
            PhysicalInterface::Uart1,
            PhysicalInterface::Uart2,
            PhysicalInterface::Uart3,
            PhysicalInterface::Usb,
            PhysicalInterface::Udp,
        ] {
            device_stats.insert(phys, Arc::new(DeviceByteStats::default()));
        }

        let needs_mavlink_router =
            config.protocol == ProtocolOptimization::Mavlink && config.mavlink_routing;
        let mavlink_router = needs_mavlink_router.then(|| Arc::new(MavlinkRouter::new()));

        let needs_sbus_router = config.has_sbus_input()
            || config.device4 == Device4Role::SbusUdpRx
            || config.device4 == Device4Role::SbusUdpTx;
        let sbus_router = needs_sbus_router.then(|| Arc::new(SbusRouter::new()));

        let uart1_tx_service = if config.device1 == crate::config::Device1Role::SbusIn {
            Arc::new(Uart1TxService::disabled(device_stats[&PhysicalInterface::Uart1].clone()))
        } else {
            Arc::new(Uart1TxService::new(
                config.uart1_tx_ring_capacity,
                device_stats[&PhysicalInterface::Uart1].clone(),
            ))
        };

        let mut flows = setup_flows(config, &ports, sbus_router.as_ref());

        for flow in &mut flows {
            flow.parser.set_stats(protocol_stats.clone());
        }

        register_sbus_sinks(config, &ports, sbus_router.as_ref());

        let mut senders: [Option<Box<dyn Sender>>; crate::interfaces::MAX_SENDERS] =
            Default::default();
        senders[SenderSlot::Uart1.index()] = Some(Box::new(Uart1Sender::new(
            uart1_tx_service.clone(),
            ports.uart1.clone(),
        )));
        if let (Device2Role::Usb, Some(usb), Some(connected)) =
            (config.device2, ports.usb.clone(), ports.usb_connected.clone())
        {
            senders[SenderSlot::Usb.index()] = Some(Box::new(UsbSender::new(usb, connected)));
        }
        if config.device2 == Device2Role::Uart2 {
            if let Some(uart2) = ports.uart2.clone() {
                senders[SenderSlot::Uart2.index()] =
                    Some(Box::new(UartSender::new("UART2", uart2)));
            }
        }
        if matches!(
            config.device3,
            Device3Role::Uart3Bridge | Device3Role::Uart3Mirror | Device3Role::Uart3Log
        ) {
            if let Some(uart3) = ports.uart3.clone() {
                senders[SenderSlot::Uart3.index()] =
                    Some(Box::new(UartSender::new("UART3", uart3)));
            }
        }
        if matches!(
            config.device4,
            Device4Role::NetworkBridge | Device4Role::LogNetwork
        ) {
            if let Some(ring) = ports.udp_tx_ring.clone() {
                senders[SenderSlot::Udp.index()] = Some(Box::new(UdpSender::new(
                    ring,
                    config.udp_batching_enabled,
                )));
            }
        }

        Self {
            flows,
            senders,
            protocol_stats,
            device_stats,
            mavlink_router,
            sbus_router,
            uart1_tx_service,
            mavlink_routing_enabled: config.mavlink_routing,
            clock,
            backpressure_warned: [false; crate::interfaces::MAX_SENDERS],
        }
    }

    /// Warns once per threshold-crossing when a sender's queue depth
    /// exceeds [`BACKPRESSURE_QUEUE_DEPTH`], and clears the latch once it
    /// drains back under. Distinct from the per-packet drop logging in
    /// [`Pipeline::distribute`]; callable independently of the regular
    /// per-pass schedule, matching the original firmware's separate
    /// `handleBackpressure()`.
    pub fn check_backpressure(&mut self) {
        for (slot, sender) in self.senders.iter().enumerate() {
            let Some(sender) = sender else { continue };
            let depth = sender.stats().queue_depth;
            if depth > BACKPRESSURE_QUEUE_DEPTH {
                if !self.backpressure_warned[slot] {
                    log::warn!("{} send queue depth {depth} exceeds backpressure threshold", sender.name());
                    self.backpressure_warned[slot] = true;
                }
            } else {
                self.backpressure_warned[slot] = false;
            }
        }
    }

    fn run_one_pass(&mut self, i: usize) -> bool {
        let now_us = self.clock.now_us();
        let ctx = ParserContext { now_us };
        let flow_mask = self.flows[i].sender_mask;

        let fast = self.flows[i]
            .parser
            .try_fast_process(&mut self.flows[i].buffer, &ctx);
        if fast {
            return true;
        }

        let result = self.flows[i].parser.parse(&mut self.flows[i].buffer, now_us);
        let progressed = result.bytes_consumed > 0 || !result.packets.is_empty();
        let now_ms = now_us / 1000;
        for packet in result.packets {
            self.distribute(flow_mask, packet, now_ms);
        }
        progressed
    }

    /// spec.md §4.10: finalizes and applies a packet's destination mask,
    /// the only place the anti-echo rule is enforced.
    fn distribute(&mut self, flow_mask: SenderMask, mut packet: ParsedPacket, now_ms: u64) {
        if self.mavlink_routing_enabled && packet.format == crate::packet::PacketFormat::Mavlink {
            if let Some(router) = &self.mavlink_router {
                if let Some(sysid) = packet.hints.mavlink_sysid {
                    router.learn(sysid, packet.physical_interface, now_ms);
                }
                if let Some(target_sysid) = packet.hints.mavlink_target_sysid {
                    match router.resolve(target_sysid, now_ms) {
                        Resolution::Unicast(mask) => {
                            packet.hints.has_explicit_target = true;
                            packet.hints.target_devices = mask & flow_mask;
                        }
                        Resolution::Broadcast => {
                            packet.hints.has_explicit_target = false;
                        }
                    }
                }
            }
        }

        let final_mask = if packet.hints.has_explicit_target {
            packet.hints.target_devices
        } else if packet.physical_interface == PhysicalInterface::None {
            flow_mask
        } else {
            flow_mask - SenderMask::exclude(packet.physical_interface)
        };

        let mut targets: Vec<usize> = SenderSlot::ALL
            .iter()
            .filter(|slot| final_mask.contains(slot.mask()))
            .map(|slot| slot.index())
            .collect();
        if let Some(last) = targets.pop() {
            for idx in targets {
                if let Some(sender) = self.senders[idx].as_mut() {
                    sender.enqueue(packet.clone());
                }
            }
            if let Some(sender) = self.senders[last].as_mut() {
                sender.enqueue(packet);
            }
        }
    }

    fn fill_buffer_for(&mut self, i: usize) {
        let now_us = self.clock.now_us();
        let (timeout, overrun, read_bytes) = {
            let flow = &mut self.flows[i];
            let Ok(mut port) = flow.port.try_lock() else {
                return;
            };
            let mut scratch = [0u8; INGRESS_SCRATCH];
            let mut read_bytes = 0usize;
            loop {
                let room = flow.buffer.free_space();
                if room == 0 {
                    break;
                }
                let to_read = room.min(scratch.len());
                let n = port.read_bytes(&mut scratch[..to_read]);
                if n == 0 {
                    break;
                }
                flow.buffer.write(&scratch[..n]);
                read_bytes += n;
                if n < to_read {
                    break;
                }
            }
            (port.has_packet_timeout(), port.has_overrun(), read_bytes)
        };

        if read_bytes > 0 {
            if let Some(stats) = self.device_stats.get(&self.flows[i].physical_interface) {
                stats.add_rx(read_bytes);
            }
        }

        if overrun {
            log::warn!("{} ingress overrun", self.flows[i].name);
            if let Some(stats) = self.device_stats.get(&self.flows[i].physical_interface) {
                stats.note_overrun();
            }
        }

        if timeout {
            let now_ms = now_us / 1000;
            let flow_mask = self.flows[i].sender_mask;
            if let Some(packet) = self.flows[i].parser.notify_adapter_timeout(now_us) {
                self.distribute(flow_mask, packet, now_ms);
            }
        }
    }

    /// Phase 1 (spec.md §4.9): GCS→FC command flows, 5 ms total budget,
    /// one parse/route/distribute pass per flow.
    pub fn process_input_flows(&mut self) {
        let start = self.clock.now_us();
        for i in 0..self.flows.len() {
            if !self.flows[i].is_input_flow {
                continue;
            }
            if self.clock.now_us().saturating_sub(start) >= INPUT_BUDGET_US {
                break;
            }
            self.fill_buffer_for(i);
            self.run_one_pass(i);
        }
    }

    /// Phase 2 (spec.md §4.9): telemetry/SBUS flows drained exhaustively
    /// up to 10 ms or 20 iterations (RAW parsers take exactly one pass,
    /// since their flush logic depends on real gaps between orchestrator
    /// cycles); log flows get one pass each.
    pub fn process_telemetry_flow(&mut self) {
        let start = self.clock.now_us();
        for i in 0..self.flows.len() {
            if self.flows[i].is_input_flow || self.flows[i].source == PacketSource::Logs {
                continue;
            }
            self.fill_buffer_for(i);

            if self.flows[i].parser.name() == "RAW" {
                self.run_one_pass(i);
                continue;
            }

            let mut iterations = 0u32;
            loop {
                if self.clock.now_us().saturating_sub(start) >= TELEMETRY_BUDGET_US {
                    break;
                }
                if iterations >= TELEMETRY_MAX_ITERATIONS {
                    break;
                }
                let progressed = self.run_one_pass(i);
                iterations += 1;
                if !progressed {
                    break;
                }
            }
        }

        for i in 0..self.flows.len() {
            if self.flows[i].is_input_flow || self.flows[i].source != PacketSource::Logs {
                continue;
            }
            self.fill_buffer_for(i);
            self.run_one_pass(i);
        }

        if let Some(router) = &self.sbus_router {
            router.tick(self.clock.now_us() / 1000);
        }
    }

    /// Phase 3 (spec.md §4.9): drains every sender's queue. `bulkMode` is
    /// the OR of every active parser's `isBurstActive()`. SBUS fast-path
    /// flows have no corresponding sender slot (the router writes sinks
    /// directly), so they never appear here.
    pub fn process_senders(&mut self) {
        let now_us = self.clock.now_us();
        let bulk_mode = self.flows.iter().any(|f| f.parser.is_burst_active());
        for slot in SenderSlot::ALL {
            if let Some(sender) = self.senders[slot.index()].as_mut() {
                sender.process_send_queue(bulk_mode, now_us);
            }
        }
    }

    /// Runs one full orchestrator iteration: input flows, telemetry
    /// flows, then sender drains (spec.md §4.9).
    pub fn run_once(&mut self) {
        self.process_input_flows();
        self.process_telemetry_flow();
        self.process_senders();
    }

    pub fn stats_snapshot(&self) -> PipelineStats {
        PipelineStats {
            flows: self
                .flows
                .iter()
                .map(|f| FlowStats {
                    name: f.name,
                    parser_name: f.parser.name(),
                })
                .collect(),
            senders: self
                .senders
                .iter()
                .filter_map(|s| s.as_ref())
                .map(|s| (s.name(), s.stats()))
                .collect(),
            router: self.mavlink_router.as_ref().map(|r| r.stats_snapshot()),
        }
    }

    pub fn uart1_tx_service(&self) -> &Arc<Uart1TxService> {
        &self.uart1_tx_service
    }
}

fn telemetry_sender_mask(config: &Config) -> SenderMask {
    let mut mask = SenderMask::empty();
    if config.device2 == Device2Role::Usb {
        mask |= SenderMask::USB;
    }
    if config.device2 == Device2Role::Uart2 {
        mask |= SenderMask::UART2;
    }
    if matches!(
        config.device3,
        Device3Role::Uart3Bridge | Device3Role::Uart3Mirror | Device3Role::Uart3Log
    ) {
        mask |= SenderMask::UART3;
    }
    if config.device4 == Device4Role::NetworkBridge {
        mask |= SenderMask::UDP;
    }
    mask
}

fn new_telemetry_parser(
    config: &Config,
    channel: u8,
    phys: PhysicalInterface,
    message_table: Option<&Arc<dyn MessageTable>>,
) -> Box<dyn Parser> {
    match config.protocol {
        ProtocolOptimization::Mavlink => {
            let mut parser = MavlinkParser::new(channel, phys, config.mavlink_routing);
            if let Some(table) = message_table {
                parser = parser.with_message_table(table.clone());
            }
            Box::new(parser)
        }
        _ => Box::new(RawParser::new(config.raw_staging_capacity, phys)),
    }
}

fn setup_flows(
    config: &Config,
    ports: &PipelinePorts,
    sbus_router: Option<&Arc<SbusRouter>>,
) -> Vec<DataFlow> {
    let mut flows = Vec::new();

    if config.device1 == crate::config::Device1Role::SbusIn {
        if let Some(router) = sbus_router {
            flows.push(DataFlow {
                name: "Device1_SBUS_IN",
                port: ports.uart1.clone(),
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Uart1,
                source: PacketSource::Telemetry,
                sender_mask: config.compute_sbus_mask(),
                is_input_flow: false,
                parser: Box::new(SbusFastParser::new(router.clone(), SbusSourceId::Device1)),
            });
        }
    }

    if config.device2 == Device2Role::SbusIn {
        if let (Some(router), Some(uart2)) = (sbus_router, ports.uart2.clone()) {
            flows.push(DataFlow {
                name: "Device2_SBUS_IN",
                port: uart2,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Uart2,
                source: PacketSource::Telemetry,
                sender_mask: config.compute_sbus_mask(),
                is_input_flow: false,
                parser: Box::new(SbusFastParser::new(router.clone(), SbusSourceId::Device2)),
            });
        }
    }

    if config.device1 == crate::config::Device1Role::Uart1 {
        let mask = telemetry_sender_mask(config);
        if !mask.is_empty() {
            flows.push(DataFlow {
                name: "Telemetry",
                port: ports.uart1.clone(),
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Uart1,
                source: PacketSource::Telemetry,
                sender_mask: mask,
                is_input_flow: false,
                parser: new_telemetry_parser(
                    config,
                    0,
                    PhysicalInterface::Uart1,
                    ports.mavlink_message_table.as_ref(),
                ),
            });
        }
    }

    if config.device4 == Device4Role::LogNetwork {
        if let Some(log_source) = ports.log_source.clone() {
            let parser: Box<dyn Parser> = Box::new(LineParser::new());
            flows.push(DataFlow {
                name: "Logger",
                port: log_source,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::None,
                source: PacketSource::Logs,
                sender_mask: SenderMask::UDP,
                is_input_flow: false,
                parser,
            });
        }
    }

    let sbus_active = config.has_sbus_input();

    if config.device2 == Device2Role::Usb {
        if let Some(usb) = ports.usb.clone() {
            flows.push(DataFlow {
                name: "USB_Input",
                port: usb,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Usb,
                source: PacketSource::Telemetry,
                sender_mask: SenderMask::UART1,
                is_input_flow: true,
                parser: new_telemetry_parser(
                    config,
                    1,
                    PhysicalInterface::Usb,
                    ports.mavlink_message_table.as_ref(),
                ),
            });
        }
    }

    if config.device4 == Device4Role::NetworkBridge && !sbus_active {
        if let Some(udp) = ports.udp_ingress.clone() {
            flows.push(DataFlow {
                name: "UDP_Input",
                port: udp,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Udp,
                source: PacketSource::Telemetry,
                sender_mask: SenderMask::UART1,
                is_input_flow: true,
                parser: new_telemetry_parser(
                    config,
                    2,
                    PhysicalInterface::Udp,
                    ports.mavlink_message_table.as_ref(),
                ),
            });
        }
    }

    if config.device2 == Device2Role::Uart2 && !sbus_active {
        if let Some(uart2) = ports.uart2.clone() {
            flows.push(DataFlow {
                name: "UART2_Input",
                port: uart2,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Uart2,
                source: PacketSource::Telemetry,
                sender_mask: SenderMask::UART1,
                is_input_flow: true,
                parser: new_telemetry_parser(
                    config,
                    3,
                    PhysicalInterface::Uart2,
                    ports.mavlink_message_table.as_ref(),
                ),
            });
        }
    }

    if config.device3 == Device3Role::Uart3Bridge && !sbus_active {
        if let Some(uart3) = ports.uart3.clone() {
            flows.push(DataFlow {
                name: "UART3_Input",
                port: uart3,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Uart3,
                source: PacketSource::Telemetry,
                sender_mask: SenderMask::UART1,
                is_input_flow: true,
                parser: new_telemetry_parser(
                    config,
                    4,
                    PhysicalInterface::Uart3,
                    ports.mavlink_message_table.as_ref(),
                ),
            });
        }
    }

    // Legacy `D2/D3=SBUS_OUT` driven straight from UART1 with no fast
    // SBUS_IN source anywhere is left unimplemented (spec.md §9: "Legacy
    // UART→SBUS conversion... this spec omits it — a reimplementation
    // should document its absence rather than guess"). See DESIGN.md.
    if !sbus_active
        && (config.device2 == Device2Role::SbusOut || config.device3 == Device3Role::SbusOut)
    {
        log::debug!(
            "configured SBUS output role with no fast SBUS_IN source anywhere; \
             legacy UART->SBUS conversion is not implemented, no flow created"
        );
    }

    if config.device4 == Device4Role::SbusUdpRx && sbus_active {
        if let (Some(router), Some(udp)) = (sbus_router, ports.udp_ingress.clone()) {
            flows.push(DataFlow {
                name: "UDP_SBUS_Input",
                port: udp,
                buffer: CircularBuffer::with_capacity(FLOW_BUFFER_CAPACITY),
                physical_interface: PhysicalInterface::Udp,
                source: PacketSource::Telemetry,
                sender_mask: SenderMask::empty(),
                is_input_flow: false,
                parser: Box::new(SbusFastParser::new(router.clone(), SbusSourceId::Udp)),
            });
        }
    }

    flows
}

/// Registers direct-write sinks with the SBUS router for configured SBUS
/// output roles (spec.md §4.5, §9: sinks are weak output handles the
/// router calls via `sendDirect`, never senders the pipeline queues
/// through). `SBUS_UDP_Output` (spec.md §4.9 flow table) is also a sink:
/// it serializes frames straight onto the UDP SPSC ring rather than
/// going through `UdpSender`'s queue.
fn register_sbus_sinks(config: &Config, ports: &PipelinePorts, sbus_router: Option<&Arc<SbusRouter>>) {
    let Some(router) = sbus_router else { return };

    if config.device2 == Device2Role::SbusOut {
        if let Some(uart2) = ports.uart2.clone() {
            router.register_sink(
                "UART2_SBUS_OUT",
                Box::new(move |frame| {
                    if let Ok(mut port) = uart2.lock() {
                        port.write(frame);
                    }
                }),
            );
        }
    }

    if config.device3 == Device3Role::SbusOut {
        if let Some(uart3) = ports.uart3.clone() {
            router.register_sink(
                "UART3_SBUS_OUT",
                Box::new(move |frame| {
                    if let Ok(mut port) = uart3.lock() {
                        port.write(frame);
                    }
                }),
            );
        }
    }

    if config.device4 == Device4Role::SbusUdpTx && config.has_sbus_input() {
        if let Some(ring) = ports.udp_tx_ring.clone() {
            router.register_sink(
                "UDP_SBUS_TX",
                Box::new(move |frame| {
                    ring.enqueue(frame);
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::{Config, Device1Role, Device2Role as D2, Device3Role as D3};
    use crate::ingress::TestPort;

    fn ports_with_uart1(uart1: Arc<Mutex<dyn IngressPort>>) -> PipelinePorts {
        PipelinePorts {
            uart1,
            uart2: None,
            uart3: None,
            usb: None,
            usb_connected: None,
            udp_ingress: None,
            udp_tx_ring: None,
            log_source: None,
            mavlink_message_table: None,
        }
    }

    #[test]
    fn raw_bridge_moves_bytes_uart1_to_usb() {
        let uart1_concrete = Arc::new(Mutex::new(TestPort::new()));
        uart1_concrete.lock().unwrap().feed(b"hello world");
        let uart1: Arc<Mutex<dyn IngressPort>> = uart1_concrete;

        let usb_concrete = Arc::new(Mutex::new(TestPort::new()));
        let usb: Arc<Mutex<dyn IngressPort>> = usb_concrete.clone();
        let connected = Arc::new(AtomicBool::new(true));

        let cfg = Config {
            device1: Device1Role::Uart1,
            device2: D2::Usb,
            protocol: ProtocolOptimization::Raw,
            ..Config::default()
        };
        let mut ports = ports_with_uart1(uart1);
        ports.usb = Some(usb);
        ports.usb_connected = Some(connected);

        let clock = Arc::new(FakeClock::new());
        let mut pipeline = Pipeline::new(&cfg, ports, clock.clone());
        clock.set(6_000);
        pipeline.process_telemetry_flow();
        pipeline.process_senders();

        assert_eq!(usb_concrete.lock().unwrap().written(), b"hello world");
    }

    #[test]
    fn anti_echo_excludes_physical_origin_from_final_mask() {
        let mask = SenderMask::USB | SenderMask::UART2;
        let final_mask = mask - SenderMask::exclude(PhysicalInterface::Usb);
        assert_eq!(final_mask, SenderMask::UART2);
    }

    #[test]
    fn sbus_config_skips_legacy_output_without_fast_input() {
        let cfg = Config {
            device1: Device1Role::Uart1,
            device2: D2::Disabled,
            device3: D3::SbusOut,
            ..Config::default()
        };
        assert!(!cfg.has_sbus_input());
    }
}
