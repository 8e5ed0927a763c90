//! Error types for the pipeline core.
//!
//! Following `mavlink-core::error`'s convention, these are hand-rolled
//! enums with manual `Display`/`Error` impls rather than a `thiserror`
//! derive. Nothing on the hot path (`parse`, `enqueue`,
//! `process_send_queue`, [`crate::pipeline::Pipeline::distribute`])
//! returns a `Result`: nothing in the running pipeline is fatal. `Result`
//! is reserved for construction-time validation.

use core::fmt::{self, Display, Formatter};

/// Raised by [`crate::config::Config::validate`] for configuration
/// impossibilities that must be resolved before the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// More than one SBUS input source is configured; only one is supported
    /// in single-source mode (spec.md §9: "Router LRU bound... not a hard
    /// requirement", but multi-source SBUS arbitration is explicitly phase-2).
    MultipleSbusSources(&'static str, &'static str),
    /// A device role requires a buffer that was never allocated by the
    /// embedder (e.g. telemetry senders configured but no telemetry buffer).
    MissingBuffer { role: &'static str },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleSbusSources(a, b) => write!(
                f,
                "multiple SBUS input sources configured ({a}, {b}); only one source is supported"
            ),
            Self::MissingBuffer { role } => {
                write!(f, "buffer not allocated for configured role {role}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
