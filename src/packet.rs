//! [`ParsedPacket`] and the routing hints that travel with it (spec.md §3).

use crate::interfaces::{PhysicalInterface, SenderMask};

/// Protocol tag carried by a [`ParsedPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    Raw,
    Mavlink,
    Sbus,
}

/// Distinguishes GCS-bound telemetry from the internal log stream
/// (spec.md §3: "source tag (`TELEMETRY` | `LOGS`)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSource {
    Telemetry,
    Logs,
}

/// Routing hints attached by a router (spec.md §3, §4.10).
///
/// `has_explicit_target == true` implies `target_devices` is a subset of the
/// owning flow's default sender mask; routers must uphold that invariant
/// themselves (it is intersected in at the point the hint is set, see
/// [`crate::pipeline::Pipeline::distribute`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingHints {
    pub has_explicit_target: bool,
    pub target_devices: SenderMask,
    /// Raw sysid this packet came from, set by the MAVLink parser so the
    /// pipeline orchestrator can feed
    /// [`crate::router::mavlink_router::MavlinkRouter::learn`] without the
    /// parser needing a reference to the shared router (spec.md §4.4: the
    /// router, not the parser, owns learning and resolution).
    pub mavlink_sysid: Option<u8>,
    /// Raw `target_sysid` extracted from the payload, if the message
    /// carries one, for the pipeline to resolve against the shared router
    /// and intersect with the flow's default mask (spec.md §4.4,
    /// §4.10). Not itself a resolved mask — no field translation happens
    /// here (spec.md §1 Non-goals).
    pub mavlink_target_sysid: Option<u8>,
}

/// A single parsed, pipeline-owned unit of data.
///
/// Lives only from `parse()` to the end of one dispatch pass — nothing
/// holds a `ParsedPacket` across pipeline cycles (spec.md §3: "No packet
/// outlives the pipeline pass that produced it").
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    pub payload: Vec<u8>,
    pub format: PacketFormat,
    pub source: PacketSource,
    /// Set exactly once, before routing; routers and distribution read but
    /// never modify it (spec.md §3 invariants).
    pub physical_interface: PhysicalInterface,
    pub hints: RoutingHints,
}

impl ParsedPacket {
    pub fn new(payload: Vec<u8>, format: PacketFormat, physical_interface: PhysicalInterface) -> Self {
        Self {
            payload,
            format,
            source: PacketSource::Telemetry,
            physical_interface,
            hints: RoutingHints::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of a single [`crate::parser::Parser::parse`] call.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub packets: Vec<ParsedPacket>,
    pub bytes_consumed: usize,
}

impl ParseResult {
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.packets.len()
    }
}
