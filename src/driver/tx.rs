use crate::coex::{CoexArbiter, CoexDecision};
use crate::config::Iid;
use crate::error::{OrFault, RadioError};
use crate::frame::ie::{write_csl_ie, CSL_IE_ID};
use crate::frame::{Frame, RxFrame, TxFrame};
use crate::radio::{CsmaParams, RadioHardware, RxPacketInfo, TxOptions, TxSchedule};
use crate::security::{ccm_nonce, csl_phase, KEY_ID_MODE_1, SHR_DURATION_US};
use crate::upper::UpperMac;

use super::state::{Flags, PendingCommand, RadioState, TxOutcome, TxSlot};
use super::{Core, RadioDriver};

/// CCA threshold that makes every channel look busy
pub const CCA_THRESHOLD_ALWAYS_BUSY: i8 = -128;

/// Minimum CSMA backoff exponent
pub const CSMA_MIN_BE: u8 = 3;

/// Maximum CSMA backoff exponent
pub const CSMA_MAX_BE: u8 = 5;

/// CSMA backoff period (20 symbols)
pub const CSMA_BACKOFF_US: u16 = 320;

/// CCA duration (8 symbols)
pub const CCA_DURATION_US: u16 = 128;

fn csma_params(max_backoffs: u8, cca_threshold_dbm: i8) -> CsmaParams {
    CsmaParams {
        min_be: CSMA_MIN_BE,
        max_be: CSMA_MAX_BE,
        max_tries: max_backoffs,
        cca_threshold_dbm,
        backoff_us: CSMA_BACKOFF_US,
        cca_duration_us: CCA_DURATION_US,
    }
}

/// A single CCA right before the scheduled start
fn single_cca_params(cca_threshold_dbm: i8) -> CsmaParams {
    CsmaParams {
        min_be: 0,
        max_be: 0,
        max_tries: 1,
        cca_threshold_dbm,
        backoff_us: CSMA_BACKOFF_US,
        cca_duration_us: CCA_DURATION_US,
    }
}

/// Why a frame could not be prepared for the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum PrepareError {
    Malformed,
    NoKey,
    CounterExhausted,
    Engine,
}

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    /// Accept a transmit request, queueing it when another interface owns the radio
    pub(crate) fn request_transmit(&mut self, iid: Iid, frame: TxFrame) -> Result<(), RadioError> {
        self.check_ready()?;
        self.state.check_bound(iid)?;
        super::validate_channel(frame.channel)?;

        if let Some(busy) = self.state.busy_iid() {
            if busy == iid || !self.config.multipan {
                return Err(RadioError::Busy);
            }
            if self.state.is_pending(iid) {
                warn!("transmit from {:?} already pending", iid);
                return Err(RadioError::Busy);
            }
            if self.state.pending.is_full() {
                warn!("pending command queue full");
                return Err(RadioError::Busy);
            }
            self.state.bound_iface_mut(iid)?.tx_frame = frame;
            let _ = self.state.pending.push_back(PendingCommand::Transmit { iid });
            debug!("transmit from {:?} queued behind {:?}", iid, busy);
            return Ok(());
        }

        self.state.bound_iface_mut(iid)?.tx_frame = frame;
        self.start_transmit(iid)
    }

    /// Start the frame waiting in the transmit buffer of `iid`
    pub(crate) fn start_transmit(&mut self, iid: Iid) -> Result<(), RadioError> {
        let (channel, sequence, ack_required, use_csma) = {
            let frame = &self.state.bound_iface_mut(iid)?.tx_frame;
            (
                frame.channel,
                frame.sequence(),
                frame.ack_request(),
                frame.info.csma_ca_enabled && !frame.info.is_scheduled(),
            )
        };
        self.ensure_band(channel)?;

        let flags = &mut self.state.flags;
        flags.clear_outcome();
        flags.clear(Flags::WAITING_FOR_ACK);
        flags.set(Flags::ONGOING_TX_DATA);
        flags.assign(Flags::CURRENT_TX_USE_CSMA, use_csma);
        self.state.tx = TxSlot {
            iid: Some(iid),
            sequence,
            ack_required,
            ..TxSlot::default()
        };

        if let Err(err) = self.prepare_frame(iid) {
            debug!("transmit from {:?} not prepared: {:?}", iid, err);
            self.finish_transmit(TxOutcome::Aborted);
            return Ok(());
        }

        if !self.coex.is_enabled() {
            self.kick_transmit();
            return Ok(());
        }
        match self.coex.request_transmit(ack_required) {
            CoexDecision::Proceed => self.kick_transmit(),
            CoexDecision::Deferred => {
                self.state.tx.coex_pending = true;
                self.state.tx.requested_at_us = self.radio.now_us();
                trace!("transmit waiting for coexistence grant");
            }
            CoexDecision::Denied => {
                debug!("transmit denied by coexistence arbiter");
                self.finish_transmit(TxOutcome::CcaFailed);
            }
        }
        Ok(())
    }

    /// Refresh time-dependent IEs and apply security
    fn prepare_frame(&mut self, iid: Iid) -> Result<(), PrepareError> {
        let csl = self.state.csl;
        let iface = self
            .state
            .iface_mut(iid)
            .ok_or(PrepareError::Malformed)?;
        let frame = &mut iface.tx_frame;

        if csl.is_enabled() && !frame.info.is_header_updated {
            let ie = Frame::new(&frame.psdu).and_then(|f| f.find_header_ie(CSL_IE_ID));
            if let Some(ie) = ie {
                let shr_time = if frame.info.is_scheduled() {
                    frame.info.tx_delay_base_time.wrapping_add(frame.info.tx_delay)
                } else {
                    self.radio.now_us()
                };
                let phase = csl_phase(csl.sample_time_us, shr_time, csl.period);
                write_csl_ie(&mut frame.psdu, &ie, phase, csl.period)
                    .map_err(|_| PrepareError::Malformed)?;
            }
            frame.info.is_header_updated = true;
        }

        if frame.info.is_security_processed {
            return Ok(());
        }
        let parsed = Frame::new(&frame.psdu).ok_or(PrepareError::Malformed)?;
        let Some(aux) = parsed.aux_security_header() else {
            return Ok(());
        };
        // Other key id modes are secured by the upper layer
        if aux.key_id_mode != KEY_ID_MODE_1 {
            return Ok(());
        }
        let header_len = parsed.header_len().ok_or(PrepareError::Malformed)?;
        let counter_offset = aux.frame_counter_offset.ok_or(PrepareError::Malformed)?;
        let key_index_offset = aux.key_index_offset.ok_or(PrepareError::Malformed)?;

        let keys = iface.keys.as_ref().ok_or(PrepareError::NoKey)?;
        let (key, counter) = if frame.info.is_retransmission {
            let index = aux.key_index.ok_or(PrepareError::Malformed)?;
            let key = keys.key_for_index(index).ok_or(PrepareError::NoKey)?;
            (key, aux.frame_counter.ok_or(PrepareError::Malformed)?)
        } else {
            let counter = iface
                .frame_counter
                .allocate()
                .ok_or(PrepareError::CounterExhausted)?;
            frame.psdu[key_index_offset] = keys.key_id;
            frame.psdu[counter_offset..counter_offset + 4].copy_from_slice(&counter.to_le_bytes());
            (&keys.current, counter)
        };

        let nonce = ccm_nonce(&iface.config.ext_address, counter, aux.level);
        self.radio
            .secure_frame(&mut frame.psdu, header_len, key, &nonce, aux.mic_len())
            .map_err(|_| PrepareError::Engine)?;
        frame.info.is_security_processed = true;
        Ok(())
    }

    /// Load the FIFO and hand the frame to the hardware
    pub(crate) fn kick_transmit(&mut self) {
        let Some(iid) = self.state.tx.iid else {
            return;
        };
        let Some(iface) = self.state.iface(iid) else {
            return;
        };
        let frame = &iface.tx_frame;
        self.radio
            .write_tx_fifo(&frame.psdu)
            .or_fault("write_tx_fifo");

        let info = frame.info;
        let channel = frame.channel;
        let options = TxOptions {
            wait_for_ack: self.state.tx.ack_required,
            tx_power_dbm: info.tx_power.unwrap_or(self.state.tx_power_dbm),
        };
        let threshold = if self.coex.is_enabled() && self.coex.tx_hold_off() {
            CCA_THRESHOLD_ALWAYS_BUSY
        } else {
            self.state.cca_threshold_dbm
        };

        let result = if info.is_scheduled() {
            let schedule = TxSchedule {
                when_us: info
                    .tx_delay_base_time
                    .wrapping_add(info.tx_delay)
                    .wrapping_sub(SHR_DURATION_US),
                postpone_during_rx: true,
            };
            self.radio.start_scheduled_cca_csma_tx(
                channel,
                schedule,
                single_cca_params(threshold),
                options,
            )
        } else if info.csma_ca_enabled {
            self.radio.start_cca_csma_tx(
                channel,
                csma_params(info.max_csma_backoffs, threshold),
                options,
            )
        } else {
            self.radio.start_tx(channel, options)
        };

        self.state.radio_state = RadioState::Transmit;
        if result.is_err() {
            debug!("transmit start refused by hardware");
            self.finish_transmit(TxOutcome::Aborted);
        }
    }

    /// Record the outcome and give the radio back
    pub(crate) fn finish_transmit(&mut self, outcome: TxOutcome) {
        let flags = &mut self.state.flags;
        flags.set(outcome.flag());
        flags.clear(Flags::ONGOING_TX_DATA);
        flags.clear(Flags::WAITING_FOR_ACK);
        self.state.tx.coex_pending = false;
        self.radio.yield_radio();
        if self.coex.is_enabled() {
            self.coex.transmit_finished();
        }
        if self.state.radio_state == RadioState::Transmit {
            self.state.radio_state = RadioState::Receive;
        }
    }

    pub(crate) fn on_packet_sent(&mut self) {
        if !self.state.flags.contains(Flags::ONGOING_TX_DATA) {
            return;
        }
        if self.state.tx.ack_required {
            self.state.flags.set(Flags::WAITING_FOR_ACK);
        } else {
            self.finish_transmit(TxOutcome::Success);
        }
    }

    pub(crate) fn on_tx_failed(&mut self, outcome: TxOutcome) {
        if !self.state.flags.contains(Flags::ONGOING_TX_DATA) {
            return;
        }
        if outcome == TxOutcome::CcaFailed {
            self.state.flags.clear(Flags::CURRENT_TX_USE_CSMA);
        }
        self.finish_transmit(outcome);
    }

    pub(crate) fn on_ack_timeout(&mut self) {
        if self.state.flags.contains(Flags::WAITING_FOR_ACK) {
            self.finish_transmit(TxOutcome::NoAck);
        }
    }

    /// Match a received ACK against the transmit waiting for one
    pub(crate) fn on_ack_frame(&mut self, frame: &Frame<'_>, info: &RxPacketInfo) {
        let waiting = self.state.flags.contains(Flags::WAITING_FOR_ACK);
        if !waiting || frame.sequence().is_none() || frame.sequence() != self.state.tx.sequence {
            trace!("unexpected ack ignored");
            return;
        }
        let ack = self.ack_to_rx_frame(frame, info);
        self.state.tx.ack = Some(ack);
        self.finish_transmit(TxOutcome::Success);
    }

    /// A deferred coexistence request was answered
    pub(crate) fn on_coex_grant(&mut self, granted: bool) {
        if !self.state.tx.coex_pending {
            return;
        }
        self.state.tx.coex_pending = false;
        if granted {
            self.kick_transmit();
        } else {
            debug!("coexistence grant refused");
            self.finish_transmit(TxOutcome::CcaFailed);
        }
    }

    /// Fail a deferred request the arbiter never answered
    pub(crate) fn check_coex_watchdog(&mut self) {
        let Some(timeout) = self.config.coex_grant_timeout_us else {
            return;
        };
        if !self.state.tx.coex_pending {
            return;
        }
        let waited = self
            .radio
            .now_us()
            .wrapping_sub(self.state.tx.requested_at_us);
        if waited >= timeout {
            warn!("coexistence grant timed out after {} us", waited);
            self.finish_transmit(TxOutcome::CcaFailed);
        }
    }

    /// Collect a finished transmit for delivery, releasing the slot
    pub(crate) fn take_tx_done(&mut self) -> Option<(Iid, TxFrame, Option<RxFrame>, TxOutcome)> {
        if self.state.flags.contains(Flags::ONGOING_TX_DATA) {
            return None;
        }
        let iid = self.state.tx.iid?;
        let outcome = self.state.flags.take_outcome()?;
        let frame = self.state.iface(iid)?.tx_frame.clone();
        let ack = self.state.tx.ack.take();
        self.state.tx = TxSlot::default();
        Some((iid, frame, ack, outcome))
    }
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Transmit `frame` for `iid`
    ///
    /// Returns immediately; the result arrives through
    /// [`UpperMac::transmit_done`]. In multi-PAN mode a request made while
    /// another interface owns the radio is queued and `Ok` is returned.
    pub fn transmit(&self, iid: Iid, frame: TxFrame) -> Result<(), RadioError> {
        self.with_core(|core| core.request_transmit(iid, frame))
    }

    /// Copy of the transmit buffer of `iid`, as last handed to the hardware
    ///
    /// Retransmissions start from this copy so that the frame counter
    /// assigned on the first attempt is reused.
    pub fn transmit_buffer(&self, iid: Iid) -> Result<TxFrame, RadioError> {
        self.with_core(|core| {
            core.state
                .iface(iid)
                .map(|iface| iface.tx_frame.clone())
                .ok_or(RadioError::InvalidArgs)
        })
    }

    /// Answer a deferred coexistence request
    pub fn coex_granted(&self, granted: bool) {
        self.with_core(|core| core.on_coex_grant(granted))
    }

    pub(crate) fn process_tx_complete<U: UpperMac>(&self, upper: &mut U) {
        let Some((iid, frame, ack, outcome)) = self.with_core(|core| core.take_tx_done()) else {
            return;
        };
        let status = outcome.status();
        if let Err(err) = status {
            debug!("transmit from {:?} failed: {:?}", iid, err);
        }
        upper.transmit_done(iid, &frame, ack.as_ref(), status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csma_profile() {
        let params = csma_params(4, -75);
        assert_eq!(params.min_be, 3);
        assert_eq!(params.max_be, 5);
        assert_eq!(params.max_tries, 4);
        assert_eq!(params.backoff_us, 320);

        let single = single_cca_params(CCA_THRESHOLD_ALWAYS_BUSY);
        assert_eq!(single.max_tries, 1);
        assert_eq!(single.min_be, 0);
        assert_eq!(single.cca_threshold_dbm, -128);
    }
}
