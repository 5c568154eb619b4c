//! Radio driver core
//!
//! [`RadioDriver`] owns the radio hardware and all state shared between
//! the two execution contexts of the driver:
//!
//! - the interrupt handler, which calls [`RadioDriver::on_hardware_event`]
//!   and must return quickly
//! - the main loop, which issues requests and calls
//!   [`RadioDriver::process`] to have results delivered to the upper MAC
//!
//! Both go through a single critical section. Upper-layer callbacks are
//! always made outside of it, on data copied out of the shared state.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::coex::{CoexArbiter, NoCoex};
use crate::config::{DriverConfig, ExtAddress, Iid, PanId, ShortAddress};
use crate::error::{OrFault, RadioError, TxError};
use crate::radio::{Band, HardwareEvents, RadioHardware};
use crate::security::{MacKey, MacKeys};
use crate::upper::UpperMac;

/// Multi-PAN filter mask resolution
pub mod interface;

mod ack;
mod energy_scan;
mod events;
mod rx;
mod state;
mod tx;

pub use energy_scan::{RSSI_INVALID, RSSI_INVALID_QUARTER_DBM};
pub use rx::RxStats;
pub use state::RadioState;
pub use tx::{CCA_THRESHOLD_ALWAYS_BUSY, CSMA_BACKOFF_US, CSMA_MAX_BE, CSMA_MIN_BE};

use rx::RxPipeline;
use state::{DriverState, Flags, PendingCommand, ScanStatus};

/// Band of a channel, or `InvalidArgs` for channels no band covers
pub(crate) fn validate_channel(channel: u8) -> Result<Band, RadioError> {
    Band::for_channel(channel).ok_or(RadioError::InvalidArgs)
}

/// State guarded by the driver's critical section
pub(crate) struct Core<R: RadioHardware, C: CoexArbiter> {
    pub(crate) radio: R,
    pub(crate) coex: C,
    pub(crate) state: DriverState,
    pub(crate) rx: RxPipeline,
    pub(crate) config: DriverConfig,
}

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    pub(crate) fn check_ready(&self) -> Result<(), RadioError> {
        if !self.state.is_initialized() || self.state.radio_state == RadioState::Disabled {
            return Err(RadioError::InvalidState);
        }
        Ok(())
    }

    /// Load the PHY configuration of `channel`'s band if it is not loaded yet
    pub(crate) fn ensure_band(&mut self, channel: u8) -> Result<(), RadioError> {
        let band = validate_channel(channel)?;
        if self.state.band != Some(band) {
            self.radio
                .load_channel_config(band)
                .or_fault("load_channel_config");
            self.state.band = Some(band);
            debug!("loaded channel config for {:?}", band);
        }
        Ok(())
    }

    fn init(&mut self) -> Result<(), RadioError> {
        if self.state.is_initialized() {
            return Ok(());
        }
        if self.radio.init().is_err() {
            error!("radio init failed");
            return Err(RadioError::HardwareFault);
        }
        self.radio
            .configure_events(HardwareEvents::ALL, HardwareEvents::ALL)
            .or_fault("configure_events");
        let channel = self.state.channel;
        self.ensure_band(channel)?;
        self.radio
            .set_cca_threshold(self.state.cca_threshold_dbm)
            .or_fault("set_cca_threshold");
        self.radio
            .set_tx_power(self.state.tx_power_dbm)
            .or_fault("set_tx_power");

        self.state.flags.set(Flags::INIT_DONE);
        self.state.radio_state = RadioState::Sleep;
        info!(
            "radio initialized, multipan: {}, enhanced ack: {}",
            self.config.multipan,
            self.config.enhanced_ack
        );
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        if !self.state.is_initialized() || self.state.radio_state == RadioState::Disabled {
            return Err(RadioError::InvalidState);
        }
        if self.state.flags.contains(Flags::ONGOING_TX_DATA)
            || self.state.flags.contains(Flags::ONGOING_TX_ACK)
        {
            return Err(RadioError::Busy);
        }
        if self.state.radio_state == RadioState::Sleep
            && !self.state.flags.contains(Flags::SCHEDULED_RX_PENDING)
            && self.state.scan.status != ScanStatus::InProgress
        {
            return Ok(());
        }
        self.radio.idle().or_fault("idle");
        self.abort_scan();
        self.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
        self.state.radio_state = RadioState::Sleep;
        Ok(())
    }

    /// Hardware address filter of an interface
    fn filter_index(iid: Iid) -> Result<u8, RadioError> {
        iid.slot()
            .map(|slot| slot as u8)
            .ok_or(RadioError::InvalidArgs)
    }

    /// Pop the next deferred request if the radio is free for it
    fn next_pending(&mut self) -> Option<PendingCommand> {
        if self.state.tx_busy() || !self.state.scan.is_idle() {
            return None;
        }
        self.state.pending.pop_front()
    }
}

/// IEEE 802.15.4 radio driver
///
/// Shared by reference between the interrupt handler and the main loop,
/// typically from a `static`.
pub struct RadioDriver<R: RadioHardware, C: CoexArbiter = NoCoex> {
    core: Mutex<RefCell<Core<R, C>>>,
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Create a driver
    ///
    /// The radio is left untouched until [`RadioDriver::init`].
    pub fn new(radio: R, coex: C, config: DriverConfig) -> Self {
        Self {
            core: Mutex::new(RefCell::new(Core {
                radio,
                coex,
                state: DriverState::new(&config),
                rx: RxPipeline::new(),
                config,
            })),
        }
    }

    pub(crate) fn with_core<T>(&self, f: impl FnOnce(&mut Core<R, C>) -> T) -> T {
        critical_section::with(|cs| f(&mut self.core.borrow_ref_mut(cs)))
    }

    /// Driver configuration
    pub fn config(&self) -> DriverConfig {
        self.with_core(|core| core.config)
    }

    /// Initialize the hardware and enable the radio
    ///
    /// Calling it again once initialized has no effect.
    pub fn init(&self) -> Result<(), RadioError> {
        self.with_core(|core| core.init())
    }

    /// Re-enable a disabled radio
    pub fn enable(&self) -> Result<(), RadioError> {
        self.with_core(|core| {
            if !core.state.is_initialized() {
                return Err(RadioError::InvalidState);
            }
            if core.state.radio_state == RadioState::Disabled {
                core.state.radio_state = RadioState::Sleep;
            }
            Ok(())
        })
    }

    /// Disable the radio
    pub fn disable(&self) -> Result<(), RadioError> {
        self.with_core(|core| {
            if core.state.radio_state == RadioState::Disabled {
                return Ok(());
            }
            if core.state.flags.contains(Flags::ONGOING_TX_DATA) {
                return Err(RadioError::Busy);
            }
            core.radio.idle().or_fault("idle");
            core.abort_scan();
            core.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
            core.state.radio_state = RadioState::Disabled;
            Ok(())
        })
    }

    /// Whether the radio is initialized and enabled
    pub fn is_enabled(&self) -> bool {
        self.with_core(|core| core.check_ready().is_ok())
    }

    /// Stop receiving and idle the radio
    ///
    /// Returns `Busy` while a frame or an ACK is being sent. An energy
    /// scan in progress is cut short and reports [`RSSI_INVALID`]. Idling
    /// an already idle radio does not touch the hardware.
    pub fn sleep(&self) -> Result<(), RadioError> {
        self.with_core(|core| core.sleep())
    }

    /// Current radio state
    pub fn state(&self) -> RadioState {
        self.with_core(|core| core.state.radio_state)
    }

    /// Make `iid` available for requests
    pub fn bind_interface(&self, iid: Iid) -> Result<(), RadioError> {
        self.with_core(|core| {
            let iface = core.state.iface_mut(iid).ok_or(RadioError::InvalidArgs)?;
            iface.bound = true;
            Ok(())
        })
    }

    /// Withdraw `iid`; frames filtered to it are dropped from now on
    pub fn unbind_interface(&self, iid: Iid) -> Result<(), RadioError> {
        self.with_core(|core| {
            if core.state.busy_iid() == Some(iid) || core.state.is_pending(iid) {
                return Err(RadioError::Busy);
            }
            let iface = core.state.iface_mut(iid).ok_or(RadioError::InvalidArgs)?;
            iface.bound = false;
            Ok(())
        })
    }

    /// Set the PAN id of `iid`
    pub fn set_pan_id(&self, iid: Iid, pan_id: PanId) -> Result<(), RadioError> {
        self.with_core(|core| {
            let index = Core::<R, C>::filter_index(iid)?;
            core.radio.set_pan_id(index, pan_id).or_fault("set_pan_id");
            if let Some(iface) = core.state.iface_mut(iid) {
                iface.config.pan_id = pan_id;
            }
            Ok(())
        })
    }

    /// Set the short address of `iid`
    pub fn set_short_address(&self, iid: Iid, address: ShortAddress) -> Result<(), RadioError> {
        self.with_core(|core| {
            let index = Core::<R, C>::filter_index(iid)?;
            core.radio
                .set_short_address(index, address)
                .or_fault("set_short_address");
            if let Some(iface) = core.state.iface_mut(iid) {
                iface.config.short_address = address;
            }
            Ok(())
        })
    }

    /// Set the extended address of `iid`
    pub fn set_extended_address(&self, iid: Iid, address: ExtAddress) -> Result<(), RadioError> {
        self.with_core(|core| {
            let index = Core::<R, C>::filter_index(iid)?;
            core.radio
                .set_extended_address(index, address)
                .or_fault("set_extended_address");
            if let Some(iface) = core.state.iface_mut(iid) {
                iface.config.ext_address = address;
            }
            Ok(())
        })
    }

    /// Install the MAC key triple of `iid`
    ///
    /// `key_id` is the key index of `current`, in `1..=128`.
    pub fn set_mac_keys(
        &self,
        iid: Iid,
        key_id: u8,
        prev: MacKey,
        current: MacKey,
        next: MacKey,
    ) -> Result<(), RadioError> {
        let keys = MacKeys::new(key_id, prev, current, next).ok_or(RadioError::InvalidArgs)?;
        self.with_core(|core| {
            let iface = core.state.iface_mut(iid).ok_or(RadioError::InvalidArgs)?;
            iface.keys = Some(keys);
            Ok(())
        })
    }

    /// Set the outgoing frame counter of `iid`
    ///
    /// With `if_larger` the counter is only ever raised.
    pub fn set_mac_frame_counter(
        &self,
        iid: Iid,
        value: u32,
        if_larger: bool,
    ) -> Result<(), RadioError> {
        self.with_core(|core| {
            let iface = core.state.iface_mut(iid).ok_or(RadioError::InvalidArgs)?;
            iface.frame_counter.set(value, if_larger);
            Ok(())
        })
    }

    /// Next frame counter `iid` will use
    pub fn mac_frame_counter(&self, iid: Iid) -> Result<u32, RadioError> {
        self.with_core(|core| {
            core.state
                .iface(iid)
                .map(|iface| iface.frame_counter.get())
                .ok_or(RadioError::InvalidArgs)
        })
    }

    /// Set the CCA energy-detect threshold
    pub fn set_cca_threshold(&self, dbm: i8) {
        self.with_core(|core| {
            core.radio
                .set_cca_threshold(dbm)
                .or_fault("set_cca_threshold");
            core.state.cca_threshold_dbm = dbm;
        })
    }

    /// CCA energy-detect threshold in dBm
    pub fn cca_threshold(&self) -> i8 {
        self.with_core(|core| core.state.cca_threshold_dbm)
    }

    /// Set the default transmit power
    pub fn set_transmit_power(&self, dbm: i8) {
        self.with_core(|core| {
            core.radio.set_tx_power(dbm).or_fault("set_tx_power");
            core.state.tx_power_dbm = dbm;
        })
    }

    /// Default transmit power in dBm
    pub fn transmit_power(&self) -> i8 {
        self.with_core(|core| core.state.tx_power_dbm)
    }

    /// Turn coexistence arbitration on or off
    pub fn set_coex_enabled(&self, enabled: bool) {
        self.with_core(|core| core.coex.set_enabled(enabled))
    }

    /// Whether coexistence arbitration is on
    pub fn coex_enabled(&self) -> bool {
        self.with_core(|core| core.coex.is_enabled())
    }

    /// Main-loop entry point
    ///
    /// Delivers received frames, transmit and scan results and drop
    /// reports to `upper`, then starts deferred requests.
    pub fn process<U: UpperMac>(&self, upper: &mut U) {
        self.with_core(|core| core.check_coex_watchdog());
        self.process_rx(upper);
        self.process_tx_complete(upper);
        self.process_energy_scan(upper);
        self.report_drops(upper);
        self.process_pending(upper);
    }

    fn process_pending<U: UpperMac>(&self, upper: &mut U) {
        while let Some(command) = self.with_core(|core| core.next_pending()) {
            match command {
                PendingCommand::Transmit { iid } => {
                    let failed = self.with_core(|core| match core.start_transmit(iid) {
                        Ok(()) => None,
                        Err(err) => {
                            debug!("queued transmit from {:?} not started: {:?}", iid, err);
                            core.state.tx = Default::default();
                            core.state.flags.clear(Flags::ONGOING_TX_DATA);
                            core.state.iface(iid).map(|iface| iface.tx_frame.clone())
                        }
                    });
                    if let Some(frame) = failed {
                        upper.transmit_done(iid, &frame, None, Err(TxError::Abort));
                    }
                }
                PendingCommand::EnergyScan {
                    iid,
                    channel,
                    duration_ms,
                } => {
                    let started = self.with_core(|core| {
                        core.start_energy_scan(
                            iid,
                            channel,
                            duration_ms as u32 * 1000,
                            state::ScanMode::Async,
                        )
                    });
                    if let Err(err) = started {
                        debug!("queued energy scan from {:?} not started: {:?}", iid, err);
                        upper.energy_scan_done(iid, RSSI_INVALID);
                    }
                }
            }
        }
    }
}
