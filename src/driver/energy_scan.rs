use embedded_hal::blocking::delay::DelayUs;

use crate::coex::CoexArbiter;
use crate::config::Iid;
use crate::error::{OrFault, RadioError};
use crate::radio::RadioHardware;
use crate::upper::UpperMac;

use super::state::{Flags, PendingCommand, RadioState, ScanMode, ScanStatus};
use super::{Core, RadioDriver};

/// RSSI reported when no valid measurement exists
pub const RSSI_INVALID: i8 = 127;

/// Hardware average meaning no valid measurement, in quarter dBm
pub const RSSI_INVALID_QUARTER_DBM: i16 = -512;

/// Convert a hardware average to dBm
fn quarter_dbm_to_dbm(quarter_dbm: i16) -> i8 {
    if quarter_dbm == RSSI_INVALID_QUARTER_DBM {
        return RSSI_INVALID;
    }
    // Truncates toward zero
    let dbm = quarter_dbm / 4;
    dbm.clamp(i8::MIN as i16, (RSSI_INVALID - 1) as i16) as i8
}

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    pub(crate) fn start_energy_scan(
        &mut self,
        iid: Iid,
        channel: u8,
        duration_us: u32,
        mode: ScanMode,
    ) -> Result<(), RadioError> {
        if self.state.scan.status == ScanStatus::InProgress {
            return Err(RadioError::Busy);
        }
        super::validate_channel(channel)?;

        self.state.scan.status = ScanStatus::InProgress;
        self.state.scan.mode = mode;
        self.state.scan.iid = iid;
        self.state.scan.rssi = RSSI_INVALID;

        self.radio.idle().or_fault("idle");
        self.state.radio_state = RadioState::Sleep;
        self.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
        self.ensure_band(channel)?;

        if self.radio.start_average_rssi(channel, duration_us).is_err() {
            debug!("rssi average refused on channel {}", channel);
            self.complete_scan(RSSI_INVALID);
        }
        Ok(())
    }

    pub(crate) fn complete_scan(&mut self, rssi: i8) {
        if self.state.scan.status != ScanStatus::InProgress {
            return;
        }
        self.state.scan.rssi = rssi;
        self.state.scan.status = ScanStatus::Completed;
    }

    /// Give up on a scan whose hardware average was torn down by an idle
    pub(crate) fn abort_scan(&mut self) {
        if self.state.scan.status == ScanStatus::InProgress {
            debug!("energy scan aborted");
            self.complete_scan(RSSI_INVALID);
        }
    }

    pub(crate) fn on_rssi_average_done(&mut self) {
        let rssi = quarter_dbm_to_dbm(self.radio.average_rssi());
        self.complete_scan(rssi);
    }

    fn request_energy_scan(
        &mut self,
        iid: Iid,
        channel: u8,
        duration_ms: u16,
    ) -> Result<(), RadioError> {
        self.check_ready()?;
        self.state.check_bound(iid)?;
        super::validate_channel(channel)?;
        if !self.state.scan.is_idle() {
            return Err(RadioError::Busy);
        }

        if let Some(busy) = self.state.busy_iid() {
            if busy == iid || !self.config.multipan {
                return Err(RadioError::Busy);
            }
            if self.state.is_pending(iid) {
                warn!("energy scan from {:?} already pending", iid);
                return Err(RadioError::Busy);
            }
            let command = PendingCommand::EnergyScan {
                iid,
                channel,
                duration_ms,
            };
            if self.state.pending.push_back(command).is_err() {
                warn!("pending command queue full");
                return Err(RadioError::Busy);
            }
            debug!("energy scan from {:?} queued behind {:?}", iid, busy);
            return Ok(());
        }

        self.start_energy_scan(iid, channel, duration_ms as u32 * 1000, ScanMode::Async)
    }
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Measure the energy on `channel` for `duration_ms`
    ///
    /// The result arrives through [`UpperMac::energy_scan_done`].
    pub fn energy_scan(&self, iid: Iid, channel: u8, duration_ms: u16) -> Result<(), RadioError> {
        self.with_core(|core| core.request_energy_scan(iid, channel, duration_ms))
    }

    /// Progress of the current energy scan
    ///
    /// A completed result stays readable until it has been delivered by
    /// [`RadioDriver::process`].
    pub fn poll_energy_scan(&self) -> nb::Result<i8, RadioError> {
        self.with_core(|core| match core.state.scan.status {
            ScanStatus::Idle => Err(nb::Error::Other(RadioError::InvalidState)),
            ScanStatus::InProgress => Err(nb::Error::WouldBlock),
            ScanStatus::Completed => Ok(core.state.scan.rssi),
        })
    }

    /// Instant RSSI on the current channel, in dBm
    ///
    /// Busy-waits for a short hardware average. Returns [`RSSI_INVALID`]
    /// when the radio is not initialized, a transmit or scan is in
    /// progress, or the average does not complete in time.
    pub fn rssi<D: DelayUs<u32>>(&self, delay: &mut D) -> i8 {
        let started = self.with_core(|core| {
            if !core.state.is_initialized()
                || core.state.radio_state == RadioState::Disabled
                || core.state.flags.contains(Flags::ONGOING_TX_DATA)
                || !core.state.scan.is_idle()
            {
                return false;
            }
            let channel = core.state.channel;
            let averaging = core.config.sync_rssi_averaging_us;
            core.start_energy_scan(Iid::BROADCAST, channel, averaging, ScanMode::Sync)
                .is_ok()
        });
        if !started {
            return RSSI_INVALID;
        }

        let timeout_us = self.with_core(|core| core.config.sync_rssi_timeout_us);
        let mut rssi = RSSI_INVALID;
        for _ in 0..timeout_us {
            let done = self.with_core(|core| {
                (core.state.scan.mode == ScanMode::Sync
                    && core.state.scan.status == ScanStatus::Completed)
                    .then_some(core.state.scan.rssi)
            });
            if let Some(value) = done {
                rssi = value;
                break;
            }
            delay.delay_us(1);
        }

        self.with_core(|core| {
            if core.state.scan.status == ScanStatus::InProgress {
                debug!("sync rssi timed out");
                // Tears down the hardware average
                core.radio.idle().or_fault("idle");
            }
            core.state.scan.status = ScanStatus::Idle;
        });
        rssi
    }

    pub(crate) fn process_energy_scan<U: UpperMac>(&self, upper: &mut U) {
        let done = self.with_core(|core| {
            let scan = &mut core.state.scan;
            if scan.status != ScanStatus::Completed || scan.mode != ScanMode::Async {
                return None;
            }
            scan.status = ScanStatus::Idle;
            Some((scan.iid, scan.rssi))
        });
        if let Some((iid, rssi)) = done {
            upper.energy_scan_done(iid, rssi);
        }
    }
}
