//! Interface identity (spec.md §3: "Interface identity").

use core::fmt;

/// The closed set of physical interfaces a packet can originate from.
///
/// `None` is the synthetic source used for internally generated data (e.g.
/// the log flow) that has no physical origin and is therefore exempt from
/// the anti-echo rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhysicalInterface {
    Uart1,
    Uart2,
    Uart3,
    Usb,
    Udp,
    None,
}

impl fmt::Display for PhysicalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uart1 => "UART1",
            Self::Uart2 => "UART2",
            Self::Uart3 => "UART3",
            Self::Usb => "USB",
            Self::Udp => "UDP",
            Self::None => "NONE",
        };
        f.write_str(s)
    }
}

/// The closed set of sender slots, indexed 0..N-1 with stable assignment.
///
/// The index is load-bearing: it is the bit position used in
/// [`SenderMask`] and the array index into the pipeline's fixed sender-slot
/// table (spec.md §3: "A closed set of sender slots indexed 0..N−1 with
/// stable assignment").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SenderSlot {
    Uart1 = 0,
    Usb = 1,
    Uart2 = 2,
    Uart3 = 3,
    Udp = 4,
}

/// Total number of fixed sender slots (`MAX_SENDERS` in the original).
pub const MAX_SENDERS: usize = 5;

impl SenderSlot {
    pub const ALL: [SenderSlot; MAX_SENDERS] = [
        SenderSlot::Uart1,
        SenderSlot::Usb,
        SenderSlot::Uart2,
        SenderSlot::Uart3,
        SenderSlot::Udp,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn mask(self) -> SenderMask {
        SenderMask::from_bits_truncate(1 << self.index())
    }
}

impl fmt::Display for SenderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uart1 => "UART1",
            Self::Usb => "USB",
            Self::Uart2 => "UART2",
            Self::Uart3 => "UART3",
            Self::Udp => "UDP",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// A bit set over sender slots (spec.md §3: "A sender mask is a bit set
    /// over sender slots").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SenderMask: u8 {
        const UART1 = 1 << SenderSlot::Uart1.index();
        const USB   = 1 << SenderSlot::Usb.index();
        const UART2 = 1 << SenderSlot::Uart2.index();
        const UART3 = 1 << SenderSlot::Uart3.index();
        const UDP   = 1 << SenderSlot::Udp.index();
    }
}

impl SenderMask {
    /// Returns the physical-interface exclusion bit for anti-echo, or
    /// `None` for [`PhysicalInterface::None`] which has no corresponding
    /// sender slot and is never excluded.
    pub fn exclude(phys: PhysicalInterface) -> SenderMask {
        match phys {
            PhysicalInterface::Uart1 => SenderMask::UART1,
            PhysicalInterface::Uart2 => SenderMask::UART2,
            PhysicalInterface::Uart3 => SenderMask::UART3,
            PhysicalInterface::Usb => SenderMask::USB,
            PhysicalInterface::Udp => SenderMask::UDP,
            PhysicalInterface::None => SenderMask::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_mask_matches_index() {
        assert_eq!(SenderSlot::Uart1.mask(), SenderMask::UART1);
        assert_eq!(SenderSlot::Udp.mask().bits(), 1 << 4);
    }

    #[test]
    fn anti_echo_excludes_origin_only() {
        let default_mask = SenderMask::USB | SenderMask::UART2 | SenderMask::UDP;
        let final_mask = default_mask - SenderMask::exclude(PhysicalInterface::Usb);
        assert_eq!(final_mask, SenderMask::UART2 | SenderMask::UDP);
    }
}
