use core::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask of hardware events delivered to the driver's interrupt handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareEvents(pub u32);

impl HardwareEvents {
    /// No event
    pub const NONE: Self = Self(0);
    /// A complete frame is waiting in the receive FIFO
    pub const RX_PACKET_RECEIVED: Self = Self(1 << 0);
    /// The frame being received asks for an ACK and its header is readable
    pub const RX_ACK_REQUESTED: Self = Self(1 << 1);
    /// No ACK arrived for the last transmitted frame
    pub const RX_ACK_TIMEOUT: Self = Self(1 << 2);
    /// A frame failed its CRC check
    pub const RX_FRAME_ERROR: Self = Self(1 << 3);
    /// A frame was rejected by the address filter
    pub const RX_ADDRESS_FILTERED: Self = Self(1 << 4);
    /// The receive FIFO overflowed
    pub const RX_FIFO_OVERFLOW: Self = Self(1 << 5);
    /// Reception was aborted mid-frame
    pub const RX_PACKET_ABORTED: Self = Self(1 << 6);
    /// A scheduled receive window closed
    pub const RX_SCHEDULED_END: Self = Self(1 << 7);
    /// A data frame left the antenna
    pub const TX_PACKET_SENT: Self = Self(1 << 8);
    /// An ACK frame left the antenna
    pub const TX_ACK_PACKET_SENT: Self = Self(1 << 9);
    /// The transmitted frame was aborted
    pub const TX_ABORTED: Self = Self(1 << 10);
    /// The transmission was blocked by the radio scheduler
    pub const TX_BLOCKED: Self = Self(1 << 11);
    /// The transmit FIFO ran dry
    pub const TX_UNDERFLOW: Self = Self(1 << 12);
    /// CCA found the channel busy on every attempt
    pub const TX_CHANNEL_BUSY: Self = Self(1 << 13);
    /// The outgoing ACK was aborted
    pub const TX_ACK_ABORTED: Self = Self(1 << 14);
    /// The outgoing ACK was blocked
    pub const TX_ACK_BLOCKED: Self = Self(1 << 15);
    /// The outgoing ACK underflowed
    pub const TX_ACK_UNDERFLOW: Self = Self(1 << 16);
    /// The radio scheduler reported a status, see [`SchedulerStatus`]
    pub const SCHEDULER_STATUS: Self = Self(1 << 17);
    /// An RSSI average is ready
    pub const RSSI_AVERAGE_DONE: Self = Self(1 << 18);

    /// Every event the driver handles
    pub const ALL: Self = Self((1 << 19) - 1);

    /// Data transmit failures other than a busy channel
    pub const TX_FAILURES: Self =
        Self(Self::TX_ABORTED.0 | Self::TX_BLOCKED.0 | Self::TX_UNDERFLOW.0);

    /// ACK transmit failures
    pub const TX_ACK_FAILURES: Self =
        Self(Self::TX_ACK_ABORTED.0 | Self::TX_ACK_BLOCKED.0 | Self::TX_ACK_UNDERFLOW.0);

    /// Whether any of `other` is set
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether all of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no event is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for HardwareEvents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for HardwareEvents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for HardwareEvents {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Status reported alongside [`HardwareEvents::SCHEDULER_STATUS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerStatus {
    /// Nothing to report
    NoError,
    /// The scheduled event was interrupted by a higher priority one
    EventInterrupted,
    /// The event could not be scheduled at all
    ScheduleFail,
    /// A scheduled transmit failed
    ScheduledTxFail,
    /// An immediate transmit failed
    SingleTxFail,
    /// A CSMA/CCA transmit failed
    CcaCsmaTxFail,
    /// A scheduled receive failed
    ScheduledRxFail,
    /// An RSSI averaging request failed
    AverageRssiFail,
    /// Internal scheduler error
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_masks() {
        let events = HardwareEvents::TX_PACKET_SENT | HardwareEvents::RX_PACKET_RECEIVED;
        assert!(events.contains(HardwareEvents::TX_PACKET_SENT));
        assert!(!events.contains(HardwareEvents::TX_PACKET_SENT | HardwareEvents::TX_ABORTED));
        assert!(events.intersects(HardwareEvents::TX_PACKET_SENT | HardwareEvents::TX_ABORTED));
        assert!(HardwareEvents::ALL.contains(HardwareEvents::RSSI_AVERAGE_DONE));
        assert!((events & HardwareEvents::TX_FAILURES).is_empty());
    }
}
