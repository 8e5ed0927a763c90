//! Shared routers (spec.md §4.4 MAVLink, §4.5 SBUS).

pub mod mavlink_router;
pub mod sbus_router;
