use crate::config::{ExtAddress, PanId, ShortAddress};
use crate::security::MacKey;

use super::events::{HardwareEvents, SchedulerStatus};

/// Nonce size of IEEE 802.15.4 CCM*
pub const CCM_NONCE_SIZE: usize = 13;

/// Frequency band, selected from the channel number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Band {
    /// 868 MHz, channel 0
    Sub868,
    /// 915 MHz, channels 1-10
    Sub915,
    /// 2.4 GHz O-QPSK, channels 11-26
    Ghz2_4,
}

impl Band {
    /// Band serving `channel`, `None` for an invalid channel
    pub fn for_channel(channel: u8) -> Option<Self> {
        match channel {
            0 => Some(Band::Sub868),
            1..=10 => Some(Band::Sub915),
            11..=26 => Some(Band::Ghz2_4),
            _ => None,
        }
    }
}

/// Options common to every transmit start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxOptions {
    /// Listen for an ACK after the frame
    pub wait_for_ack: bool,
    /// Transmit power in dBm
    pub tx_power_dbm: i8,
}

/// CSMA-CA parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CsmaParams {
    /// Minimum backoff exponent
    pub min_be: u8,
    /// Maximum backoff exponent
    pub max_be: u8,
    /// Number of CCA attempts
    pub max_tries: u8,
    /// Energy-detect threshold in dBm
    pub cca_threshold_dbm: i8,
    /// Backoff unit in microseconds
    pub backoff_us: u16,
    /// CCA duration in microseconds
    pub cca_duration_us: u16,
}

/// When a scheduled transmit starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxSchedule {
    /// Absolute start time in microseconds
    pub when_us: u32,
    /// Delay the transmit instead of aborting a receive in progress
    pub postpone_during_rx: bool,
}

/// Metadata of a fully received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxPacketInfo {
    /// PSDU length including FCS
    pub len: usize,
    /// CRC check passed
    pub crc_ok: bool,
    /// Timestamp could be captured
    pub timestamp_valid: bool,
    /// RSSI in dBm
    pub rssi: i8,
    /// Link quality indicator
    pub lqi: u8,
    /// End-of-SHR timestamp in microseconds
    pub timestamp_us: u32,
    /// Channel the frame was received on
    pub channel: u8,
    /// Address filter result, see [`crate::driver::interface`]
    pub filter_mask: u8,
}

/// Metadata of a frame that is still being received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IncomingPacket {
    /// Number of bytes copied out so far
    pub len: usize,
    /// PSDU length announced by the PHR
    pub psdu_len: usize,
    /// Address filter result
    pub filter_mask: u8,
    /// RSSI in dBm
    pub rssi: i8,
    /// Link quality indicator
    pub lqi: u8,
    /// End-of-SHR timestamp in microseconds
    pub timestamp_us: u32,
}

/// Radio hardware interface consumed by the driver core
///
/// Calls are made from both the main context and the interrupt handler, but
/// never concurrently. Implementations report events by calling
/// [`crate::RadioDriver::on_hardware_event`] from their interrupt handler.
pub trait RadioHardware {
    /// Error type for hardware operations
    type Error: core::fmt::Debug;

    /// Initialize the transceiver
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Stop any receive or transmit and idle the transceiver
    fn idle(&mut self) -> Result<(), Self::Error>;

    /// Start receiving on a channel
    fn start_rx(&mut self, channel: u8) -> Result<(), Self::Error>;

    /// Schedule a receive window
    fn schedule_rx(&mut self, channel: u8, start_us: u32, duration_us: u32)
        -> Result<(), Self::Error>;

    /// Transmit the FIFO content without CCA
    fn start_tx(&mut self, channel: u8, options: TxOptions) -> Result<(), Self::Error>;

    /// Transmit the FIFO content after CSMA-CA
    fn start_cca_csma_tx(
        &mut self,
        channel: u8,
        csma: CsmaParams,
        options: TxOptions,
    ) -> Result<(), Self::Error>;

    /// Transmit the FIFO content at a scheduled time, after CCA
    fn start_scheduled_cca_csma_tx(
        &mut self,
        channel: u8,
        schedule: TxSchedule,
        csma: CsmaParams,
        options: TxOptions,
    ) -> Result<(), Self::Error>;

    /// Load a PSDU into the transmit FIFO
    fn write_tx_fifo(&mut self, psdu: &[u8]) -> Result<(), Self::Error>;

    /// Metadata of the oldest complete frame in the receive FIFO
    fn rx_packet_info(&mut self) -> Option<RxPacketInfo>;

    /// Copy out and release the oldest complete frame, returns bytes copied
    fn copy_rx_packet(&mut self, buffer: &mut [u8]) -> usize;

    /// Release the oldest complete frame without copying it
    fn drop_rx_packet(&mut self);

    /// Copy the received prefix of the frame still arriving
    fn peek_rx_packet(&mut self, buffer: &mut [u8]) -> Option<IncomingPacket>;

    /// Enable events in `mask` and set them to `values`
    fn configure_events(
        &mut self,
        mask: HardwareEvents,
        values: HardwareEvents,
    ) -> Result<(), Self::Error>;

    /// Status attached to the last scheduler event
    fn scheduler_status(&mut self) -> SchedulerStatus;

    /// Start an RSSI average
    fn start_average_rssi(&mut self, channel: u8, duration_us: u32) -> Result<(), Self::Error>;

    /// Result of the last RSSI average, in quarter dBm
    fn average_rssi(&mut self) -> i16;

    /// Set the frame pending bit of the immediate ACK being sent
    ///
    /// Fails when the ACK has already left the FIFO.
    fn set_frame_pending(&mut self) -> Result<(), Self::Error>;

    /// Load an enhanced ACK to be sent in reply to the incoming frame
    fn write_enhanced_ack(&mut self, psdu: &[u8]) -> Result<(), Self::Error>;

    /// Load PHY settings for a band
    fn load_channel_config(&mut self, band: Band) -> Result<(), Self::Error>;

    /// Program the PAN id of an address filter
    fn set_pan_id(&mut self, filter_index: u8, pan_id: PanId) -> Result<(), Self::Error>;

    /// Program the short address of an address filter
    fn set_short_address(
        &mut self,
        filter_index: u8,
        address: ShortAddress,
    ) -> Result<(), Self::Error>;

    /// Program the extended address of an address filter
    fn set_extended_address(
        &mut self,
        filter_index: u8,
        address: ExtAddress,
    ) -> Result<(), Self::Error>;

    /// Enable or disable address filtering
    fn set_promiscuous(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Set the CCA energy-detect threshold
    fn set_cca_threshold(&mut self, dbm: i8) -> Result<(), Self::Error>;

    /// Set the default transmit power
    fn set_tx_power(&mut self, dbm: i8) -> Result<(), Self::Error>;

    /// Radio timebase in microseconds
    fn now_us(&mut self) -> u32;

    /// Hand the radio back to the scheduler once a transmit is over
    fn yield_radio(&mut self);

    /// Apply AES-CCM* in place
    ///
    /// `psdu[..header_len]` is authenticated, the rest up to the MIC is
    /// encrypted, and `mic_len` bytes before the FCS receive the MIC.
    fn secure_frame(
        &mut self,
        psdu: &mut [u8],
        header_len: usize,
        key: &MacKey,
        nonce: &[u8; CCM_NONCE_SIZE],
        mic_len: usize,
    ) -> Result<(), Self::Error>;
}
