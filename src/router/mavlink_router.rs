//! MAVLink sysid routing table (spec.md §4.4).
//!
//! Shared by `Arc` across every MAVLink flow (spec.md §3 invariant: "The
//! MAVLink router is shared across all MAVLink flows, never duplicated";
//! §9: "Model it as an arena-allocated service passed by reference to
//! each flow at construction"). Mutation happens only from the single
//! cooperative orchestrator pass (spec.md §5), so the mutex here is never
//! meaningfully contended — it exists for the `Send`/`Sync` bound that
//! lets the router be shared the same way the UART1 TX service is.

use crate::interfaces::{PhysicalInterface, SenderMask};
use crate::stats::RouterStats;
use std::collections::HashMap;
use std::sync::Mutex;

const MAX_ENTRIES: usize = 64;
const ENTRY_IDLE_EXPIRY_MS: u64 = 60_000;

struct RouteEntry {
    mask: SenderMask,
    last_seen_ms: u64,
}

struct Table {
    entries: HashMap<u8, RouteEntry>,
    /// Insertion/refresh order, oldest first, for LRU eviction at the
    /// `MAX_ENTRIES` bound.
    order: Vec<u8>,
}

impl Table {
    fn touch_order(&mut self, sysid: u8) {
        self.order.retain(|&s| s != sysid);
        self.order.push(sysid);
    }
}

/// The result of resolving a target sysid into a destination mask.
pub enum Resolution {
    Broadcast,
    Unicast(SenderMask),
}

pub struct MavlinkRouter {
    table: Mutex<Table>,
    stats: RouterStats,
}

impl MavlinkRouter {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            stats: RouterStats::default(),
        }
    }

    /// Records that `sysid` is reachable via `physical_interface`
    /// (spec.md §4.4: "record sysid of the packet as reachable via
    /// packet.physicalInterface"). Entries older than 60 s are pruned
    /// opportunistically on each learn call.
    pub fn learn(&self, sysid: u8, physical_interface: PhysicalInterface, now_ms: u64) {
        let mut table = self.table.lock().expect("mavlink router mutex poisoned");
        prune_expired(&mut table, now_ms);

        let bit = SenderMask::exclude(physical_interface);
        match table.entries.get_mut(&sysid) {
            Some(entry) => {
                entry.mask |= bit;
                entry.last_seen_ms = now_ms;
            }
            None => {
                if table.entries.len() >= MAX_ENTRIES {
                    if let Some(oldest) = table.order.first().copied() {
                        table.entries.remove(&oldest);
                        table.order.remove(0);
                    }
                }
                table.entries.insert(
                    sysid,
                    RouteEntry {
                        mask: bit,
                        last_seen_ms: now_ms,
                    },
                );
            }
        }
        table.touch_order(sysid);
    }

    /// Target selection (spec.md §4.4). `target_sysid == 0` or unknown ⇒
    /// broadcast; otherwise unicast to the learned mask.
    pub fn resolve(&self, target_sysid: u8, now_ms: u64) -> Resolution {
        if target_sysid == 0 {
            self.stats.broadcasts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Resolution::Broadcast;
        }

        let mut table = self.table.lock().expect("mavlink router mutex poisoned");
        prune_expired(&mut table, now_ms);
        match table.entries.get(&target_sysid) {
            Some(entry) => {
                self.stats.unicast_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Resolution::Unicast(entry.mask)
            }
            None => {
                self.stats.broadcasts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Resolution::Broadcast
            }
        }
    }

    pub fn stats_snapshot(&self) -> (u32, u32) {
        self.stats.snapshot()
    }
}

impl Default for MavlinkRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_expired(table: &mut Table, now_ms: u64) {
    let expired: Vec<u8> = table
        .entries
        .iter()
        .filter(|(_, e)| now_ms.saturating_sub(e.last_seen_ms) > ENTRY_IDLE_EXPIRY_MS)
        .map(|(&sysid, _)| sysid)
        .collect();
    for sysid in expired {
        table.entries.remove(&sysid);
        table.order.retain(|&s| s != sysid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_on_unknown_target() {
        let router = MavlinkRouter::new();
        match router.resolve(42, 0) {
            Resolution::Broadcast => {}
            _ => panic!("expected broadcast"),
        }
        assert_eq!(router.stats_snapshot().1, 1);
    }

    #[test]
    fn unicast_after_learning() {
        let router = MavlinkRouter::new();
        router.learn(7, PhysicalInterface::Usb, 1000);
        match router.resolve(7, 1001) {
            Resolution::Unicast(mask) => assert_eq!(mask, SenderMask::USB),
            _ => panic!("expected unicast"),
        }
        assert_eq!(router.stats_snapshot().0, 1);
    }

    #[test]
    fn entries_expire_after_60s_idle() {
        let router = MavlinkRouter::new();
        router.learn(7, PhysicalInterface::Usb, 0);
        match router.resolve(7, 60_001) {
            Resolution::Broadcast => {}
            _ => panic!("expected expiry to force broadcast"),
        }
    }

    #[test]
    fn lru_eviction_bounds_table_at_64() {
        let router = MavlinkRouter::new();
        for sysid in 0..70u16 {
            router.learn(sysid as u8, PhysicalInterface::Usb, sysid as u64);
        }
        let table = router.table.lock().unwrap();
        assert!(table.entries.len() <= MAX_ENTRIES);
    }
}
