use crate::coex::CoexArbiter;
use crate::radio::{HardwareEvents, RadioHardware, SchedulerStatus};
use crate::upper::DropReason;

use super::energy_scan::RSSI_INVALID;
use super::state::{Flags, RadioState, TxOutcome};
use super::{Core, RadioDriver};

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    /// Dispatch one batch of hardware events
    ///
    /// The ACK request is served first since it races the hardware ACK
    /// turnaround.
    pub(crate) fn handle_events(&mut self, events: HardwareEvents) {
        trace!("hardware events {:x}", events.0);

        if events.contains(HardwareEvents::RX_ACK_REQUESTED) {
            self.on_ack_requested();
        }
        if events.contains(HardwareEvents::TX_PACKET_SENT) {
            self.on_packet_sent();
        }
        if events.contains(HardwareEvents::RX_PACKET_RECEIVED) {
            self.on_packet_received();
        }
        if events.contains(HardwareEvents::RX_FRAME_ERROR) {
            self.state.last_ack = None;
            self.count_drop(DropReason::CrcError);
        }
        if events.contains(HardwareEvents::RX_ADDRESS_FILTERED) {
            self.count_drop(DropReason::Filtered);
        }
        if events.intersects(HardwareEvents::RX_FIFO_OVERFLOW | HardwareEvents::RX_PACKET_ABORTED) {
            self.state.last_ack = None;
            self.state.flags.clear(Flags::ONGOING_TX_ACK);
            self.count_drop(DropReason::Invalid);
        }
        if events.intersects(HardwareEvents::TX_ACK_PACKET_SENT | HardwareEvents::TX_ACK_FAILURES) {
            self.state.flags.clear(Flags::ONGOING_TX_ACK);
        }
        if events.contains(HardwareEvents::RX_ACK_TIMEOUT) {
            self.on_ack_timeout();
        }
        if events.contains(HardwareEvents::TX_CHANNEL_BUSY) {
            self.on_tx_failed(TxOutcome::CcaFailed);
        }
        if events.intersects(HardwareEvents::TX_FAILURES) {
            self.on_tx_failed(TxOutcome::Aborted);
        }
        if events.contains(HardwareEvents::RX_SCHEDULED_END) {
            self.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
            if self.state.radio_state == RadioState::Receive {
                self.state.radio_state = RadioState::Sleep;
            }
        }
        if events.contains(HardwareEvents::SCHEDULER_STATUS) {
            let status = self.radio.scheduler_status();
            self.on_scheduler_status(status);
        }
        if events.contains(HardwareEvents::RSSI_AVERAGE_DONE) {
            self.on_rssi_average_done();
        }
    }

    fn on_scheduler_status(&mut self, status: SchedulerStatus) {
        debug!("scheduler status {:?}", status);
        let tx_ongoing = self.state.flags.contains(Flags::ONGOING_TX_DATA);
        match status {
            SchedulerStatus::NoError => {}
            SchedulerStatus::AverageRssiFail => self.complete_scan(RSSI_INVALID),
            SchedulerStatus::ScheduledRxFail => {
                self.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
            }
            SchedulerStatus::SingleTxFail
            | SchedulerStatus::CcaCsmaTxFail
            | SchedulerStatus::ScheduledTxFail => {
                if tx_ongoing {
                    self.on_tx_failed(TxOutcome::SchedulerError);
                }
            }
            SchedulerStatus::ScheduleFail | SchedulerStatus::EventInterrupted => {
                if self.state.flags.contains(Flags::ONGOING_TX_ACK) {
                    self.state.flags.clear(Flags::ONGOING_TX_ACK);
                    self.state.last_ack = None;
                } else if tx_ongoing {
                    self.on_tx_failed(TxOutcome::SchedulerError);
                }
            }
            SchedulerStatus::InternalError => {
                if tx_ongoing {
                    self.on_tx_failed(TxOutcome::Aborted);
                }
            }
        }
    }
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Interrupt entry point
    ///
    /// Call from the radio interrupt handler with the events raised since
    /// the last call. Never blocks; upper-layer callbacks are deferred to
    /// [`RadioDriver::process`].
    pub fn on_hardware_event(&self, events: HardwareEvents) {
        if events.is_empty() {
            return;
        }
        self.with_core(|core| core.handle_events(events))
    }
}
