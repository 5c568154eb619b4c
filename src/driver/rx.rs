use heapless::{Deque, Vec};

use crate::coex::CoexArbiter;
use crate::config::{Iid, MAX_INTERFACES, RX_POOL_SIZE, RX_QUEUE_SIZE};
use crate::error::{OrFault, RadioError};
use crate::frame::{Frame, FrameType, RxFrame, MAX_PSDU_SIZE, MIN_PSDU_SIZE};
use crate::radio::{RadioHardware, RxPacketInfo};
use crate::upper::{DropReason, UpperMac};

use super::interface::{resolve_interface, validate_filter_mask};
use super::state::{Flags, RadioState};
use super::{Core, RadioDriver};

/// Counters of inbound frames dropped before delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStats {
    /// CRC failures
    pub crc_errors: u32,
    /// Address or filter-mask rejections
    pub filtered: u32,
    /// Receive queue full
    pub queue_full: u32,
    /// Receive pool exhausted
    pub no_buffer: u32,
    /// Bad length, timestamp or header
    pub invalid: u32,
}

impl RxStats {
    fn bump(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::CrcError => &mut self.crc_errors,
            DropReason::Filtered => &mut self.filtered,
            DropReason::QueueFull => &mut self.queue_full,
            DropReason::NoBuffer => &mut self.no_buffer,
            DropReason::Invalid => &mut self.invalid,
        };
        *counter = counter.wrapping_add(1);
    }

    /// Drops counted since `earlier`, by reason
    pub(crate) fn drops_since(&self, earlier: &RxStats) -> [(DropReason, u32); 5] {
        [
            (DropReason::CrcError, self.crc_errors.wrapping_sub(earlier.crc_errors)),
            (DropReason::Filtered, self.filtered.wrapping_sub(earlier.filtered)),
            (DropReason::QueueFull, self.queue_full.wrapping_sub(earlier.queue_full)),
            (DropReason::NoBuffer, self.no_buffer.wrapping_sub(earlier.no_buffer)),
            (DropReason::Invalid, self.invalid.wrapping_sub(earlier.invalid)),
        ]
    }
}

/// Ownership token for one pool slot
///
/// Not `Copy`: a slot can only be released once.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RxHandle(u8);

/// Fixed pool of receive buffers
pub(crate) struct RxPool {
    slots: [RxFrame; RX_POOL_SIZE],
    free: Vec<u8, RX_POOL_SIZE>,
}

impl RxPool {
    fn new() -> Self {
        let mut free = Vec::new();
        for index in (0..RX_POOL_SIZE as u8).rev() {
            let _ = free.push(index);
        }
        Self {
            slots: core::array::from_fn(|_| RxFrame::default()),
            free,
        }
    }

    fn alloc(&mut self) -> Option<RxHandle> {
        self.free.pop().map(RxHandle)
    }

    fn release(&mut self, handle: RxHandle) {
        debug_assert!(!self.free.contains(&handle.0));
        self.slots[handle.0 as usize].psdu.clear();
        let _ = self.free.push(handle.0);
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.free.len()
    }
}

/// Receive queue over pooled buffers
pub(crate) struct RxPipeline {
    pool: RxPool,
    queue: Deque<RxHandle, RX_QUEUE_SIZE>,
}

impl RxPipeline {
    pub fn new() -> Self {
        Self {
            pool: RxPool::new(),
            queue: Deque::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn alloc(&mut self) -> Option<RxHandle> {
        self.pool.alloc()
    }

    pub fn frame(&self, handle: &RxHandle) -> &RxFrame {
        &self.pool.slots[handle.0 as usize]
    }

    pub fn frame_mut(&mut self, handle: &RxHandle) -> &mut RxFrame {
        &mut self.pool.slots[handle.0 as usize]
    }

    /// Queue a filled buffer; newest frames are refused, never older ones
    pub fn enqueue(&mut self, handle: RxHandle) -> Result<(), RxHandle> {
        self.queue.push_back(handle)
    }

    pub fn dequeue(&mut self) -> Option<RxHandle> {
        self.queue.pop_front()
    }

    pub fn release(&mut self, handle: RxHandle) {
        self.pool.release(handle)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn free_buffers(&self) -> usize {
        self.pool.available()
    }
}

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    fn drop_frame(&mut self, reason: DropReason) {
        debug!("rx frame dropped: {:?}", reason);
        self.state.stats.bump(reason);
    }

    pub(crate) fn count_drop(&mut self, reason: DropReason) {
        self.state.stats.bump(reason);
    }

    /// Interrupt path for a complete frame in the receive FIFO
    pub(crate) fn on_packet_received(&mut self) {
        let Some(info) = self.radio.rx_packet_info() else {
            return;
        };
        let ack_sent = self.state.last_ack.take();

        if !info.crc_ok {
            self.radio.drop_rx_packet();
            self.drop_frame(DropReason::CrcError);
            return;
        }
        if !(MIN_PSDU_SIZE..=MAX_PSDU_SIZE).contains(&info.len) || !info.timestamp_valid {
            self.radio.drop_rx_packet();
            self.drop_frame(DropReason::Invalid);
            return;
        }

        let mut buf = [0u8; MAX_PSDU_SIZE];
        let len = self.radio.copy_rx_packet(&mut buf[..info.len]);
        let Some(frame) = Frame::new(&buf[..len]) else {
            self.drop_frame(DropReason::Invalid);
            return;
        };

        if frame.frame_type() == FrameType::Ack {
            self.on_ack_frame(&frame, &info);
            return;
        }

        let iid = if self.config.multipan {
            if !self.state.promiscuous && !validate_filter_mask(info.filter_mask, &frame) {
                self.drop_frame(DropReason::Filtered);
                return;
            }
            let iid = resolve_interface(info.filter_mask);
            if !iid.is_broadcast() && self.state.check_bound(iid).is_err() {
                self.drop_frame(DropReason::Filtered);
                return;
            }
            iid
        } else {
            Iid::PRIMARY
        };

        if self.rx.is_full() {
            self.drop_frame(DropReason::QueueFull);
            return;
        }
        let Some(handle) = self.rx.alloc() else {
            self.drop_frame(DropReason::NoBuffer);
            return;
        };

        let slot = self.rx.frame_mut(&handle);
        slot.psdu.clear();
        if slot.psdu.extend_from_slice(frame.as_bytes()).is_err() {
            self.rx.release(handle);
            self.drop_frame(DropReason::Invalid);
            return;
        }
        slot.channel = info.channel;
        slot.rssi = info.rssi;
        slot.lqi = info.lqi;
        slot.timestamp_us = info.timestamp_us;
        slot.iid = iid;
        slot.ack = if frame.ack_request() {
            ack_sent.unwrap_or_default()
        } else {
            Default::default()
        };
        trace!("rx frame queued, {} bytes", len);

        if let Err(handle) = self.rx.enqueue(handle) {
            self.rx.release(handle);
            self.drop_frame(DropReason::QueueFull);
        }
    }

    /// Build the delivery copy of the ACK matching the in-flight transmit
    pub(crate) fn ack_to_rx_frame(&self, frame: &Frame<'_>, info: &RxPacketInfo) -> RxFrame {
        let mut ack = RxFrame {
            channel: info.channel,
            rssi: info.rssi,
            lqi: info.lqi,
            timestamp_us: info.timestamp_us,
            iid: self.state.tx.iid.unwrap_or_default(),
            ..Default::default()
        };
        let _ = ack.psdu.extend_from_slice(frame.as_bytes());
        ack
    }

    pub(crate) fn start_receive(&mut self, iid: Iid, channel: u8) -> Result<(), RadioError> {
        self.check_ready()?;
        self.state.check_bound(iid)?;
        if self.state.flags.contains(Flags::ONGOING_TX_DATA) || !self.state.scan.is_idle() {
            return Err(RadioError::InvalidState);
        }
        self.ensure_band(channel)?;
        self.radio.start_rx(channel).or_fault("start_rx");
        self.state.channel = channel;
        self.state.radio_state = RadioState::Receive;
        self.state.flags.clear(Flags::SCHEDULED_RX_PENDING);
        Ok(())
    }

    pub(crate) fn schedule_receive(
        &mut self,
        iid: Iid,
        channel: u8,
        start_us: u32,
        duration_us: u32,
    ) -> Result<(), RadioError> {
        self.check_ready()?;
        self.state.check_bound(iid)?;
        if self.state.flags.contains(Flags::ONGOING_TX_DATA) || !self.state.scan.is_idle() {
            return Err(RadioError::InvalidState);
        }
        self.ensure_band(channel)?;
        self.radio
            .schedule_rx(channel, start_us, duration_us)
            .or_fault("schedule_rx");
        self.state.channel = channel;
        self.state.radio_state = RadioState::Receive;
        self.state.flags.set(Flags::SCHEDULED_RX_PENDING);
        Ok(())
    }
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Start listening on `channel` for `iid`
    pub fn receive(&self, iid: Iid, channel: u8) -> Result<(), RadioError> {
        self.with_core(|core| core.start_receive(iid, channel))
    }

    /// Open a receive window of `duration_us` starting at `start_us`
    pub fn receive_at(
        &self,
        iid: Iid,
        channel: u8,
        start_us: u32,
        duration_us: u32,
    ) -> Result<(), RadioError> {
        self.with_core(|core| core.schedule_receive(iid, channel, start_us, duration_us))
    }

    /// Enable or disable promiscuous mode
    pub fn set_promiscuous(&self, enabled: bool) -> Result<(), RadioError> {
        self.with_core(|core| {
            core.radio
                .set_promiscuous(enabled)
                .or_fault("set_promiscuous");
            core.state.promiscuous = enabled;
        });
        Ok(())
    }

    /// Whether promiscuous mode is on
    pub fn is_promiscuous(&self) -> bool {
        self.with_core(|core| core.state.promiscuous)
    }

    /// Inbound drop counters
    pub fn rx_stats(&self) -> RxStats {
        self.with_core(|core| core.state.stats)
    }

    /// Deliver queued frames in arrival order
    pub(crate) fn process_rx<U: UpperMac>(&self, upper: &mut U) {
        loop {
            let next = self.with_core(|core| {
                let handle = core.rx.dequeue()?;
                let frame = core.rx.frame(&handle).clone();
                let mut targets: Vec<Iid, MAX_INTERFACES> = Vec::new();
                if core.config.multipan && frame.iid.is_broadcast() {
                    for iid in core.state.bound_interfaces() {
                        let _ = targets.push(iid);
                    }
                } else {
                    let _ = targets.push(frame.iid);
                }
                if targets.is_empty() {
                    debug!("broadcast frame with no bound interface");
                    core.state.stats.bump(DropReason::Filtered);
                }
                Some((handle, frame, targets))
            });
            let Some((handle, frame, targets)) = next else {
                break;
            };

            for iid in targets.iter() {
                upper.receive_done(*iid, &frame);
            }
            self.with_core(|core| core.rx.release(handle));
        }
    }

    /// Report drops counted since the last call
    pub(crate) fn report_drops<U: UpperMac>(&self, upper: &mut U) {
        let drops = self.with_core(|core| {
            let drops = core.state.stats.drops_since(&core.state.reported);
            core.state.reported = core.state.stats;
            drops
        });
        for (reason, count) in drops {
            if count > 0 {
                upper.frames_dropped(reason, count);
            }
        }
    }
}
