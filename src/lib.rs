//! Packet routing core for a multi-interface serial/UDP telemetry bridge.
//!
//! Embeds as a library: an embedder builds a [`config::Config`], supplies
//! byte-level transports via [`pipeline::PipelinePorts`], and drives
//! [`pipeline::Pipeline::run_once`] from its own main loop. The core is
//! synchronous and has no knowledge of any particular embedder's
//! scheduler or transport stack beyond the [`ingress::IngressPort`] and
//! [`clock::Clock`] traits; the `std` feature only gates
//! [`clock::SystemClock`], the one place this crate otherwise touches a
//! concrete wall-clock source.

pub mod buffer;
pub mod bytes;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingress;
pub mod interfaces;
pub mod packet;
pub mod parser;
pub mod pipeline;
pub mod router;
pub mod sender;
pub mod spsc;
pub mod stats;

pub use config::Config;
pub use error::ConfigError;
pub use pipeline::{Pipeline, PipelinePorts};
