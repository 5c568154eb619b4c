//! Upper MAC callbacks
//!
//! The driver delivers every result through this trait from
//! [`crate::RadioDriver::process`], never from interrupt context.

use crate::config::Iid;
use crate::error::TxStatus;
use crate::frame::{RxFrame, TxFrame};

/// Why inbound frames were dropped before reaching the upper layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    /// CRC check failed
    CrcError,
    /// Rejected by address or filter-mask checks
    Filtered,
    /// The receive queue was full
    QueueFull,
    /// No receive buffer was free
    NoBuffer,
    /// Bad length, missing timestamp, or unparseable header
    Invalid,
}

/// Callbacks implemented by the upper MAC
pub trait UpperMac {
    /// A frame was received for `iid`
    fn receive_done(&mut self, iid: Iid, frame: &RxFrame);

    /// The transmit requested by `iid` finished
    ///
    /// `ack` is the received ACK when the frame asked for one and it arrived.
    fn transmit_done(&mut self, iid: Iid, frame: &TxFrame, ack: Option<&RxFrame>, status: TxStatus);

    /// An energy scan requested by `iid` finished
    ///
    /// `rssi` is in dBm, or [`crate::driver::RSSI_INVALID`].
    fn energy_scan_done(&mut self, iid: Iid, rssi: i8);

    /// Frames were dropped since the last report
    fn frames_dropped(&mut self, _reason: DropReason, _count: u32) {}
}
