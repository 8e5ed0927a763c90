//! Frozen pipeline configuration (spec.md §3: "Config enumerates the role
//! of each device").
//!
//! The core never loads configuration itself — an external collaborator
//! builds a [`Config`] and hands it to [`crate::pipeline::Pipeline::new`]
//! once at boot (spec.md §6: "Config store: read-only, frozen at pipeline
//! init"). `Config` carries no behavior beyond the role lookups and the
//! impossibility checks in [`Config::validate`].

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device1Role {
    Uart1,
    SbusIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device2Role {
    Disabled,
    Usb,
    Uart2,
    SbusIn,
    SbusOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device3Role {
    Disabled,
    Uart3Mirror,
    Uart3Bridge,
    Uart3Log,
    SbusOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device4Role {
    Disabled,
    NetworkBridge,
    LogNetwork,
    SbusUdpTx,
    SbusUdpRx,
}

/// Protocol optimisation selected for the primary telemetry flow
/// (spec.md §3: "Protocol optimisation: NONE (RAW), MAVLINK, SBUS").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolOptimization {
    Raw,
    Mavlink,
    Sbus,
}

/// Frozen device/flag configuration. Construct, call [`Config::validate`],
/// then hand to the pipeline. `Config` is `Copy` since nothing in it owns
/// heap memory; an embedder is free to keep the value around for
/// diagnostics after handing a copy to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub device1: Device1Role,
    pub device2: Device2Role,
    pub device3: Device3Role,
    pub device4: Device4Role,
    pub protocol: ProtocolOptimization,
    pub mavlink_routing: bool,
    pub udp_batching_enabled: bool,
    /// UART1 TX ring capacity in bytes (spec.md §4.7, default 8 KB).
    pub uart1_tx_ring_capacity: usize,
    /// RAW parser staging buffer size in bytes (spec.md §4.3.1, typically
    /// 512 or 1024).
    pub raw_staging_capacity: usize,
    /// Whether a telemetry buffer was allocated by the embedder for any
    /// sender roles that require one. Used by [`Config::validate`] to
    /// detect the "buffer not allocated while a sender needs it"
    /// impossibility from spec.md §7.
    pub telemetry_buffer_allocated: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device1: Device1Role::Uart1,
            device2: Device2Role::Disabled,
            device3: Device3Role::Disabled,
            device4: Device4Role::Disabled,
            protocol: ProtocolOptimization::Raw,
            mavlink_routing: false,
            udp_batching_enabled: false,
            uart1_tx_ring_capacity: 8192,
            raw_staging_capacity: 1024,
            telemetry_buffer_allocated: true,
        }
    }
}

impl Config {
    /// How many of the four devices are configured to source SBUS frames.
    fn sbus_input_sources(&self) -> Vec<&'static str> {
        let mut sources = Vec::new();
        if self.device1 == Device1Role::SbusIn {
            sources.push("Device1");
        }
        if self.device2 == Device2Role::SbusIn {
            sources.push("Device2");
        }
        sources
    }

    /// Configuration-impossibility checks (spec.md §7: "Configuration
    /// impossibility... log at ERROR, create no flow for that role,
    /// continue with remaining flows"). Validation happens once, at
    /// construction time, distinct from the per-cycle pipeline which
    /// never returns `Result` (SPEC_FULL.md §2.2).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sources = self.sbus_input_sources();
        if sources.len() > 1 {
            return Err(ConfigError::MultipleSbusSources(sources[0], sources[1]));
        }

        let needs_telemetry_buffer = self.device1 == Device1Role::Uart1
            && (self.device2 == Device2Role::Usb
                || self.device2 == Device2Role::Uart2
                || matches!(self.device3, Device3Role::Uart3Bridge)
                || matches!(self.device4, Device4Role::NetworkBridge));
        if needs_telemetry_buffer && !self.telemetry_buffer_allocated {
            return Err(ConfigError::MissingBuffer { role: "Telemetry" });
        }

        Ok(())
    }

    /// Whether any device is configured as an SBUS input source
    /// (spec.md §4.9 flow table: `D1=SBUS_IN`, `D2=SBUS_IN`).
    pub fn has_sbus_input(&self) -> bool {
        self.device1 == Device1Role::SbusIn || self.device2 == Device2Role::SbusIn
    }

    /// `computeSbusMask(cfg)` (spec.md §4.9): always includes UART1, adds
    /// UART3 when Device3 is a UART3 output alongside `D2=SBUS_IN`, adds
    /// UDP when `D4=NETWORK_BRIDGE`.
    pub fn compute_sbus_mask(&self) -> crate::interfaces::SenderMask {
        use crate::interfaces::SenderMask;
        let mut mask = SenderMask::UART1;
        let d2_sbus_in = self.device2 == Device2Role::SbusIn;
        if d2_sbus_in
            && matches!(
                self.device3,
                Device3Role::Uart3Bridge | Device3Role::Uart3Mirror | Device3Role::SbusOut
            )
        {
            mask |= SenderMask::UART3;
        }
        if self.device4 == Device4Role::NetworkBridge {
            mask |= SenderMask::UDP;
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn multiple_sbus_sources_rejected() {
        let cfg = Config {
            device1: Device1Role::SbusIn,
            device2: Device2Role::SbusIn,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MultipleSbusSources("Device1", "Device2"))
        );
    }

    #[test]
    fn missing_telemetry_buffer_rejected() {
        let cfg = Config {
            device2: Device2Role::Usb,
            telemetry_buffer_allocated: false,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingBuffer { role: "Telemetry" })
        );
    }

    #[test]
    fn sbus_mask_always_includes_uart1() {
        let cfg = Config::default();
        assert!(cfg.compute_sbus_mask().contains(crate::interfaces::SenderMask::UART1));
    }
}
