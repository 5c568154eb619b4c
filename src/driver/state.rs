use heapless::{Deque, Vec};

use crate::config::{
    DriverConfig, ExtAddress, Iid, InterfaceConfig, ShortAddress, LINK_METRICS_ENTRIES,
    MAX_INTERFACES, SRC_MATCH_EXT_ENTRIES, SRC_MATCH_SHORT_ENTRIES,
};
use crate::error::{RadioError, TxError, TxStatus};
use crate::frame::{AckInfo, MacAddress, RxFrame, TxFrame};
use crate::radio::Band;
use crate::security::{FrameCounter, LinkMetrics, MacKeys};

use super::rx::RxStats;

/// Internal flag register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Flags(u16);

impl Flags {
    pub const INIT_DONE: Flags = Flags(1 << 0);
    pub const ONGOING_TX_DATA: Flags = Flags(1 << 1);
    pub const ONGOING_TX_ACK: Flags = Flags(1 << 2);
    pub const WAITING_FOR_ACK: Flags = Flags(1 << 3);
    pub const CURRENT_TX_USE_CSMA: Flags = Flags(1 << 4);
    pub const SCHEDULED_RX_PENDING: Flags = Flags(1 << 5);

    pub const EVENT_TX_SUCCESS: Flags = Flags(1 << 8);
    pub const EVENT_TX_CCA_FAILED: Flags = Flags(1 << 9);
    pub const EVENT_TX_NO_ACK: Flags = Flags(1 << 10);
    pub const EVENT_TX_SCHEDULER_ERROR: Flags = Flags(1 << 11);
    pub const EVENT_TX_FAILED: Flags = Flags(1 << 12);

    const TX_OUTCOME: Flags = Flags(0x1f << 8);

    pub fn contains(self, flag: Flags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn set(&mut self, flag: Flags) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: Flags) {
        self.0 &= !flag.0;
    }

    pub fn assign(&mut self, flag: Flags, value: bool) {
        if value {
            self.set(flag)
        } else {
            self.clear(flag)
        }
    }

    pub fn clear_outcome(&mut self) {
        self.clear(Self::TX_OUTCOME);
    }

    /// Sticky outcome of the last transmit, cleared on read
    pub fn take_outcome(&mut self) -> Option<TxOutcome> {
        let outcome = if self.contains(Self::EVENT_TX_SUCCESS) {
            TxOutcome::Success
        } else if self.contains(Self::EVENT_TX_CCA_FAILED) {
            TxOutcome::CcaFailed
        } else if self.contains(Self::EVENT_TX_NO_ACK) {
            TxOutcome::NoAck
        } else if self.contains(Self::EVENT_TX_SCHEDULER_ERROR) {
            TxOutcome::SchedulerError
        } else if self.contains(Self::EVENT_TX_FAILED) {
            TxOutcome::Aborted
        } else {
            return None;
        };
        self.clear_outcome();
        Some(outcome)
    }
}

/// Final result of a transmit as recorded by the interrupt handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum TxOutcome {
    Success,
    CcaFailed,
    NoAck,
    Aborted,
    SchedulerError,
}

impl TxOutcome {
    pub fn flag(self) -> Flags {
        match self {
            TxOutcome::Success => Flags::EVENT_TX_SUCCESS,
            TxOutcome::CcaFailed => Flags::EVENT_TX_CCA_FAILED,
            TxOutcome::NoAck => Flags::EVENT_TX_NO_ACK,
            TxOutcome::Aborted => Flags::EVENT_TX_FAILED,
            TxOutcome::SchedulerError => Flags::EVENT_TX_SCHEDULER_ERROR,
        }
    }

    pub fn status(self) -> TxStatus {
        match self {
            TxOutcome::Success => Ok(()),
            TxOutcome::CcaFailed | TxOutcome::SchedulerError => {
                Err(TxError::ChannelAccessFailure)
            }
            TxOutcome::NoAck => Err(TxError::NoAck),
            TxOutcome::Aborted => Err(TxError::Abort),
        }
    }
}

/// Coarse radio state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Not initialized or disabled
    Disabled,
    /// Enabled and idle
    Sleep,
    /// Listening
    Receive,
    /// A data transmit is in progress
    Transmit,
}

/// Energy scan progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ScanStatus {
    Idle,
    InProgress,
    Completed,
}

/// How the scan result is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum ScanMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanState {
    pub status: ScanStatus,
    pub mode: ScanMode,
    pub iid: Iid,
    pub rssi: i8,
}

impl ScanState {
    pub fn is_idle(&self) -> bool {
        self.status == ScanStatus::Idle
    }
}

/// Request deferred while the radio works for another interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum PendingCommand {
    /// The frame waits in the interface's transmit buffer
    Transmit { iid: Iid },
    EnergyScan {
        iid: Iid,
        channel: u8,
        duration_ms: u16,
    },
}

impl PendingCommand {
    pub fn iid(&self) -> Iid {
        match self {
            PendingCommand::Transmit { iid } | PendingCommand::EnergyScan { iid, .. } => *iid,
        }
    }
}

/// The single in-flight transmit
#[derive(Debug, Clone, Default)]
pub(crate) struct TxSlot {
    /// Owner, cleared once transmit-done has been delivered
    pub iid: Option<Iid>,
    pub sequence: Option<u8>,
    pub ack_required: bool,
    /// A deferred coexistence grant is outstanding
    pub coex_pending: bool,
    pub requested_at_us: u32,
    pub ack: Option<RxFrame>,
}

/// Neighbor registered for enhanced-ACK link metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProbingEntry {
    pub short_address: ShortAddress,
    pub ext_address: ExtAddress,
    pub metrics: LinkMetrics,
}

impl ProbingEntry {
    pub fn matches(&self, address: &MacAddress) -> bool {
        match address {
            MacAddress::Short(short) => *short == self.short_address,
            MacAddress::Extended(ext) => *ext == self.ext_address,
            MacAddress::None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InterfaceState {
    pub bound: bool,
    pub config: InterfaceConfig,
    pub keys: Option<MacKeys>,
    pub frame_counter: FrameCounter,
    pub tx_frame: TxFrame,
    pub src_match_enabled: bool,
    pub src_short: Vec<ShortAddress, SRC_MATCH_SHORT_ENTRIES>,
    pub src_ext: Vec<ExtAddress, SRC_MATCH_EXT_ENTRIES>,
    pub probing: Vec<ProbingEntry, LINK_METRICS_ENTRIES>,
}

impl InterfaceState {
    /// Frame pending decision for a data request from `source`
    pub fn frame_pending_for(&self, source: &MacAddress) -> bool {
        if !self.src_match_enabled {
            return true;
        }
        match source {
            MacAddress::Short(short) => self.src_short.contains(short),
            MacAddress::Extended(ext) => self.src_ext.contains(ext),
            MacAddress::None => false,
        }
    }

    pub fn probing_for(&self, source: &MacAddress) -> Option<&ProbingEntry> {
        self.probing.iter().find(|entry| entry.matches(source))
    }
}

/// CSL receiver configuration
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CslConfig {
    /// Period in units of ten symbols, zero when disabled
    pub period: u16,
    pub sample_time_us: u32,
    pub peer_short: ShortAddress,
    pub peer_ext: ExtAddress,
}

impl CslConfig {
    pub fn is_enabled(&self) -> bool {
        self.period > 0
    }

    pub fn is_peer(&self, address: &MacAddress) -> bool {
        match address {
            MacAddress::Short(short) => *short == self.peer_short,
            MacAddress::Extended(ext) => *ext == self.peer_ext,
            MacAddress::None => false,
        }
    }
}

/// Everything shared between the interrupt handler and the main context
pub(crate) struct DriverState {
    pub flags: Flags,
    pub radio_state: RadioState,
    pub band: Option<Band>,
    pub channel: u8,
    pub tx: TxSlot,
    pub scan: ScanState,
    pub pending: Deque<PendingCommand, MAX_INTERFACES>,
    pub interfaces: [InterfaceState; MAX_INTERFACES],
    pub cca_threshold_dbm: i8,
    pub tx_power_dbm: i8,
    pub promiscuous: bool,
    pub csl: CslConfig,
    /// ACK sent for the frame currently being received
    pub last_ack: Option<AckInfo>,
    pub stats: RxStats,
    pub reported: RxStats,
}

impl DriverState {
    pub fn new(config: &DriverConfig) -> Self {
        let mut state = Self {
            flags: Flags::default(),
            radio_state: RadioState::Disabled,
            band: None,
            channel: 11,
            tx: TxSlot::default(),
            scan: ScanState {
                status: ScanStatus::Idle,
                mode: ScanMode::Async,
                iid: Iid::BROADCAST,
                rssi: 0,
            },
            pending: Deque::new(),
            interfaces: core::array::from_fn(|_| InterfaceState::default()),
            cca_threshold_dbm: config.cca_threshold_dbm,
            tx_power_dbm: config.tx_power_dbm,
            promiscuous: false,
            csl: CslConfig::default(),
            last_ack: None,
            stats: RxStats::default(),
            reported: RxStats::default(),
        };
        if !config.multipan {
            state.interfaces[0].bound = true;
        }
        state
    }

    pub fn is_initialized(&self) -> bool {
        self.flags.contains(Flags::INIT_DONE)
    }

    pub fn iface(&self, iid: Iid) -> Option<&InterfaceState> {
        iid.slot().and_then(|slot| self.interfaces.get(slot))
    }

    pub fn iface_mut(&mut self, iid: Iid) -> Option<&mut InterfaceState> {
        iid.slot().and_then(move |slot| self.interfaces.get_mut(slot))
    }

    /// Interface addressed by a request, which must be bound
    pub fn bound_iface_mut(&mut self, iid: Iid) -> Result<&mut InterfaceState, RadioError> {
        match self.iface_mut(iid) {
            Some(iface) if iface.bound => Ok(iface),
            _ => Err(RadioError::InvalidArgs),
        }
    }

    pub fn check_bound(&self, iid: Iid) -> Result<(), RadioError> {
        match self.iface(iid) {
            Some(iface) if iface.bound => Ok(()),
            _ => Err(RadioError::InvalidArgs),
        }
    }

    /// Whether the transmit slot is held, including an undelivered result
    pub fn tx_busy(&self) -> bool {
        self.flags.contains(Flags::ONGOING_TX_DATA) || self.tx.iid.is_some()
    }

    /// Interface currently owning the radio, if any
    pub fn busy_iid(&self) -> Option<Iid> {
        if let Some(iid) = self.tx.iid {
            return Some(iid);
        }
        if !self.scan.is_idle() {
            return Some(self.scan.iid);
        }
        None
    }

    pub fn is_pending(&self, iid: Iid) -> bool {
        self.pending.iter().any(|cmd| cmd.iid() == iid)
    }

    pub fn bound_interfaces(&self) -> impl Iterator<Item = Iid> + '_ {
        Iid::all().filter(move |iid| self.iface(*iid).is_some_and(|iface| iface.bound))
    }
}
