//! IEEE 802.15.4 frame handling
//!
//! This module provides the parts of the MAC frame format the driver core
//! needs to touch in real time:
//! - Frame control field decoding
//! - Addressing field layout for 2003/2006 and 2015 frames
//! - Auxiliary security header location
//! - Header information element lookup
//!
//! Frames are always handled as a PSDU: the MAC header, payload and the
//! two-byte FCS, whose value is produced and checked by the hardware.

use heapless::Vec;

use crate::config::{ExtAddress, Iid, PanId, ShortAddress};
use crate::error::RadioError;

/// Header information elements
pub mod ie;

/// Largest PSDU accepted by the PHY
pub const MAX_PSDU_SIZE: usize = 127;

/// FCS length
pub const FCS_SIZE: usize = 2;

/// Smallest valid PSDU (an immediate ACK)
pub const MIN_PSDU_SIZE: usize = 5;

/// MAC command identifier of a data request
pub const CMD_DATA_REQUEST: u8 = 0x04;

/// PSDU storage
pub type Psdu = Vec<u8, MAX_PSDU_SIZE>;

/// MAC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    /// Beacon
    Beacon,
    /// Data
    Data,
    /// Acknowledgment
    Ack,
    /// MAC command
    Command,
    /// Any other (reserved, multipurpose, fragment) frame type
    Other(u8),
}

/// MAC frame version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameVersion {
    /// IEEE 802.15.4-2003
    V2003,
    /// IEEE 802.15.4-2006
    V2006,
    /// IEEE 802.15.4-2015
    V2015,
    /// Reserved value
    Reserved,
}

/// Addressing mode of a source or destination field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrMode {
    /// Field absent
    None,
    /// Reserved value
    Reserved,
    /// 16-bit short address
    Short,
    /// 64-bit extended address
    Extended,
}

impl AddrMode {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => AddrMode::None,
            1 => AddrMode::Reserved,
            2 => AddrMode::Short,
            _ => AddrMode::Extended,
        }
    }

    fn bits(self) -> u16 {
        match self {
            AddrMode::None => 0,
            AddrMode::Reserved => 1,
            AddrMode::Short => 2,
            AddrMode::Extended => 3,
        }
    }

    fn len(self) -> Option<usize> {
        match self {
            AddrMode::None => Some(0),
            AddrMode::Reserved => None,
            AddrMode::Short => Some(2),
            AddrMode::Extended => Some(8),
        }
    }

    fn is_present(self) -> bool {
        !matches!(self, AddrMode::None)
    }
}

/// MAC address carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacAddress {
    /// No address
    None,
    /// Short address
    Short(ShortAddress),
    /// Extended address
    Extended(ExtAddress),
}

/// Frame control field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameControl(pub u16);

impl FrameControl {
    const SECURITY: u16 = 1 << 3;
    const FRAME_PENDING: u16 = 1 << 4;
    const ACK_REQUEST: u16 = 1 << 5;
    const PAN_ID_COMPRESSION: u16 = 1 << 6;
    const SEQ_SUPPRESSION: u16 = 1 << 8;
    const IE_PRESENT: u16 = 1 << 9;

    /// Frame type
    pub fn frame_type(self) -> FrameType {
        match self.0 & 0x7 {
            0 => FrameType::Beacon,
            1 => FrameType::Data,
            2 => FrameType::Ack,
            3 => FrameType::Command,
            other => FrameType::Other(other as u8),
        }
    }

    /// Frame version
    pub fn version(self) -> FrameVersion {
        match (self.0 >> 12) & 0x3 {
            0 => FrameVersion::V2003,
            1 => FrameVersion::V2006,
            2 => FrameVersion::V2015,
            _ => FrameVersion::Reserved,
        }
    }

    /// Security enabled bit
    pub fn security_enabled(self) -> bool {
        self.0 & Self::SECURITY != 0
    }

    /// Frame pending bit
    pub fn frame_pending(self) -> bool {
        self.0 & Self::FRAME_PENDING != 0
    }

    /// Acknowledgment request bit
    pub fn ack_request(self) -> bool {
        self.0 & Self::ACK_REQUEST != 0
    }

    /// PAN id compression bit
    pub fn pan_id_compression(self) -> bool {
        self.0 & Self::PAN_ID_COMPRESSION != 0
    }

    /// Sequence number suppression, only meaningful for 2015 frames
    pub fn seq_suppressed(self) -> bool {
        self.version() == FrameVersion::V2015 && self.0 & Self::SEQ_SUPPRESSION != 0
    }

    /// Information elements present, only meaningful for 2015 frames
    pub fn ie_present(self) -> bool {
        self.version() == FrameVersion::V2015 && self.0 & Self::IE_PRESENT != 0
    }

    /// Destination addressing mode
    pub fn dst_addr_mode(self) -> AddrMode {
        AddrMode::from_bits(self.0 >> 10)
    }

    /// Source addressing mode
    pub fn src_addr_mode(self) -> AddrMode {
        AddrMode::from_bits(self.0 >> 14)
    }

    /// PAN id presence as `(destination, source)`
    fn pan_ids_present(self) -> (bool, bool) {
        let dst = self.dst_addr_mode().is_present();
        let src = self.src_addr_mode().is_present();
        let compressed = self.pan_id_compression();

        if self.version() != FrameVersion::V2015 {
            return (dst, src && !(compressed && dst));
        }

        match (dst, src) {
            (false, false) => (compressed, false),
            (true, false) => (!compressed, false),
            (false, true) => (false, !compressed),
            (true, true) => {
                let both_ext = self.dst_addr_mode() == AddrMode::Extended
                    && self.src_addr_mode() == AddrMode::Extended;
                if both_ext {
                    (!compressed, false)
                } else {
                    (true, !compressed)
                }
            }
        }
    }
}

/// Frame control of an ACK sent in reply to a 2015 frame
pub(crate) fn enh_ack_fcf(
    dst_mode: AddrMode,
    security: bool,
    frame_pending: bool,
    seq_suppressed: bool,
    ie_present: bool,
) -> FrameControl {
    let mut fcf: u16 = 2 | (2 << 12) | FrameControl::PAN_ID_COMPRESSION;
    fcf |= dst_mode.bits() << 10;
    if security {
        fcf |= FrameControl::SECURITY;
    }
    if frame_pending {
        fcf |= FrameControl::FRAME_PENDING;
    }
    if seq_suppressed {
        fcf |= FrameControl::SEQ_SUPPRESSION;
    }
    if ie_present {
        fcf |= FrameControl::IE_PRESENT;
    }
    FrameControl(fcf)
}

/// Location of the addressing fields
#[derive(Debug, Clone, Copy)]
struct Addressing {
    dst_pan: Option<usize>,
    dst: (AddrMode, usize),
    src_pan: Option<usize>,
    src: (AddrMode, usize),
    end: usize,
}

/// Decoded auxiliary security header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AuxSecurityHeader {
    /// Offset of the security control byte
    pub offset: usize,
    /// Security level (0..=7)
    pub level: u8,
    /// Key identifier mode (0..=3)
    pub key_id_mode: u8,
    /// Frame counter, `None` when suppressed
    pub frame_counter: Option<u32>,
    /// Offset of the frame counter field
    pub frame_counter_offset: Option<usize>,
    /// Key index, `None` for key id mode 0
    pub key_index: Option<u8>,
    /// Offset of the key index byte
    pub key_index_offset: Option<usize>,
    /// Total header length
    pub len: usize,
}

impl AuxSecurityHeader {
    /// MIC length for this header's security level
    pub fn mic_len(&self) -> usize {
        mic_len(self.level)
    }
}

/// MIC length for a security level
pub fn mic_len(level: u8) -> usize {
    match level & 0x3 {
        0 => 0,
        1 => 4,
        2 => 8,
        _ => 16,
    }
}

/// Read-only view over a PSDU
///
/// Accessors return `None` when the field is absent or the buffer is too
/// short to contain it, so a partially received frame can be inspected.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    buf: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Wrap a PSDU (or the received prefix of one)
    pub fn new(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < 2 {
            return None;
        }
        Some(Self { buf })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Frame control field
    pub fn fcf(&self) -> FrameControl {
        FrameControl(u16::from_le_bytes([self.buf[0], self.buf[1]]))
    }

    /// Frame type
    pub fn frame_type(&self) -> FrameType {
        self.fcf().frame_type()
    }

    /// Frame version
    pub fn version(&self) -> FrameVersion {
        self.fcf().version()
    }

    /// Whether the sender asked for an acknowledgment
    pub fn ack_request(&self) -> bool {
        self.fcf().ack_request()
    }

    /// Whether the frame pending bit is set
    pub fn frame_pending(&self) -> bool {
        self.fcf().frame_pending()
    }

    /// Whether the frame is secured
    pub fn security_enabled(&self) -> bool {
        self.fcf().security_enabled()
    }

    /// Sequence number
    pub fn sequence(&self) -> Option<u8> {
        if self.fcf().seq_suppressed() {
            None
        } else {
            self.buf.get(2).copied()
        }
    }

    fn addressing(&self) -> Option<Addressing> {
        let fcf = self.fcf();
        let mut off = if fcf.seq_suppressed() { 2 } else { 3 };
        let (dst_pan_present, src_pan_present) = fcf.pan_ids_present();

        let dst_pan = dst_pan_present.then_some(off);
        if dst_pan_present {
            off += 2;
        }
        let dst_mode = fcf.dst_addr_mode();
        let dst = (dst_mode, off);
        off += dst_mode.len()?;

        let src_pan = src_pan_present.then_some(off);
        if src_pan_present {
            off += 2;
        }
        let src_mode = fcf.src_addr_mode();
        let src = (src_mode, off);
        off += src_mode.len()?;

        if off > self.buf.len() {
            return None;
        }
        Some(Addressing {
            dst_pan,
            dst,
            src_pan,
            src,
            end: off,
        })
    }

    fn read_u16(&self, off: usize) -> Option<u16> {
        let b = self.buf.get(off..off + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_address(&self, (mode, off): (AddrMode, usize)) -> MacAddress {
        match mode {
            AddrMode::Short => self
                .read_u16(off)
                .map_or(MacAddress::None, MacAddress::Short),
            AddrMode::Extended => self
                .buf
                .get(off..off + 8)
                .and_then(ExtAddress::from_frame_bytes)
                .map_or(MacAddress::None, MacAddress::Extended),
            _ => MacAddress::None,
        }
    }

    /// Destination PAN id
    pub fn dst_pan_id(&self) -> Option<PanId> {
        self.addressing()?.dst_pan.and_then(|off| self.read_u16(off))
    }

    /// Source PAN id, falling back to the destination PAN when compressed
    pub fn src_pan_id(&self) -> Option<PanId> {
        let addressing = self.addressing()?;
        match addressing.src_pan {
            Some(off) => self.read_u16(off),
            None => addressing.dst_pan.and_then(|off| self.read_u16(off)),
        }
    }

    /// Destination address
    pub fn dst_address(&self) -> MacAddress {
        self.addressing()
            .map_or(MacAddress::None, |a| self.read_address(a.dst))
    }

    /// Source address
    pub fn src_address(&self) -> MacAddress {
        self.addressing()
            .map_or(MacAddress::None, |a| self.read_address(a.src))
    }

    /// Source address mode and its bytes in over-the-air order
    pub fn src_address_raw(&self) -> Option<(AddrMode, &'a [u8])> {
        let (mode, off) = self.addressing()?.src;
        let len = mode.len()?;
        if len == 0 {
            return None;
        }
        Some((mode, self.buf.get(off..off + len)?))
    }

    /// Whether the frame carries a destination PAN or address at all
    pub fn has_dst_addressing(&self) -> bool {
        self.fcf().dst_addr_mode().is_present()
            || self.addressing().is_some_and(|a| a.dst_pan.is_some())
    }

    /// Auxiliary security header
    pub fn aux_security_header(&self) -> Option<AuxSecurityHeader> {
        let fcf = self.fcf();
        if !fcf.security_enabled() {
            return None;
        }
        let offset = self.addressing()?.end;
        let control = *self.buf.get(offset)?;
        let level = control & 0x7;
        let key_id_mode = (control >> 3) & 0x3;
        let counter_suppressed = fcf.version() == FrameVersion::V2015 && control & 0x20 != 0;

        let mut off = offset + 1;
        let (frame_counter, frame_counter_offset) = if counter_suppressed {
            (None, None)
        } else {
            let b = self.buf.get(off..off + 4)?;
            let counter = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            off += 4;
            (Some(counter), Some(off - 4))
        };

        let key_id_len = match key_id_mode {
            0 => 0,
            1 => 1,
            2 => 5,
            _ => 9,
        };
        let (key_index, key_index_offset) = if key_id_len == 0 {
            (None, None)
        } else {
            let at = off + key_id_len - 1;
            (Some(*self.buf.get(at)?), Some(at))
        };
        off += key_id_len;

        Some(AuxSecurityHeader {
            offset,
            level,
            key_id_mode,
            frame_counter,
            frame_counter_offset,
            key_index,
            key_index_offset,
            len: off - offset,
        })
    }

    /// MIC length in bytes
    pub fn mic_len(&self) -> usize {
        self.aux_security_header().map_or(0, |h| h.mic_len())
    }

    /// End of the MAC header fields preceding any information elements
    fn fixed_header_end(&self) -> Option<usize> {
        let end = self.addressing()?.end;
        match self.aux_security_header() {
            Some(aux) => Some(end + aux.len),
            None if self.fcf().security_enabled() => None,
            None => Some(end),
        }
    }

    /// End of the MIC-protected region minus the MIC itself
    fn content_end(&self) -> usize {
        self.buf
            .len()
            .saturating_sub(FCS_SIZE + self.mic_len())
    }

    /// Iterate over header information elements
    pub fn header_ies(&self) -> ie::HeaderIeIter<'a> {
        let start = if self.fcf().ie_present() {
            self.fixed_header_end()
        } else {
            None
        };
        match start {
            Some(start) => ie::HeaderIeIter::new(self.buf, start, self.content_end()),
            None => ie::HeaderIeIter::new(self.buf, 0, 0),
        }
    }

    /// Locate a header IE by element id
    pub fn find_header_ie(&self, element_id: u8) -> Option<ie::HeaderIe> {
        self.header_ies().find(|ie| ie.element_id == element_id)
    }

    /// Length of the MAC header, including header IEs and their terminator
    pub fn header_len(&self) -> Option<usize> {
        let fixed = self.fixed_header_end()?;
        if !self.fcf().ie_present() {
            return Some(fixed);
        }
        let mut end = fixed;
        for ie in self.header_ies() {
            end = ie.content_offset + ie.len;
            if ie.is_termination() {
                break;
            }
        }
        Some(end)
    }

    /// Whether this is a MAC command frame carrying a data request
    ///
    /// The command identifier of a secured pre-2015 frame is encrypted, so
    /// such frames never qualify.
    pub fn is_data_request(&self) -> bool {
        if self.frame_type() != FrameType::Command {
            return false;
        }
        if self.security_enabled() && self.version() < FrameVersion::V2015 {
            return false;
        }
        self.header_len()
            .and_then(|off| self.buf.get(off))
            .is_some_and(|id| *id == CMD_DATA_REQUEST)
    }
}

/// Per-frame transmit parameters chosen by the upper layer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxInfo {
    /// Use CSMA-CA before transmitting
    pub csma_ca_enabled: bool,
    /// Maximum number of CSMA backoffs
    pub max_csma_backoffs: u8,
    /// Maximum number of frame retries, handled by the upper layer
    pub max_frame_retries: u8,
    /// Base time of a delayed transmission, in microseconds
    pub tx_delay_base_time: u32,
    /// Delay from the base time, zero for an immediate transmission
    pub tx_delay: u32,
    /// This is a retransmission of an already secured frame
    pub is_retransmission: bool,
    /// The upper layer already applied security
    pub is_security_processed: bool,
    /// The upper layer already refreshed time-dependent header IEs
    pub is_header_updated: bool,
    /// Transmit power for this frame, defaulting to the driver setting
    pub tx_power: Option<i8>,
}

impl Default for TxInfo {
    fn default() -> Self {
        Self {
            csma_ca_enabled: true,
            max_csma_backoffs: 4,
            max_frame_retries: 3,
            tx_delay_base_time: 0,
            tx_delay: 0,
            is_retransmission: false,
            is_security_processed: false,
            is_header_updated: false,
            tx_power: None,
        }
    }
}

impl TxInfo {
    /// Whether the frame is sent at a scheduled time
    pub fn is_scheduled(&self) -> bool {
        self.tx_delay != 0
    }
}

/// Frame handed to the driver for transmission
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TxFrame {
    /// Channel to transmit on
    pub channel: u8,
    /// PSDU including FCS space
    pub psdu: Psdu,
    /// Transmit parameters
    pub info: TxInfo,
}

impl TxFrame {
    /// Build a frame from PSDU bytes, FCS space included
    pub fn new(channel: u8, psdu: &[u8]) -> Result<Self, RadioError> {
        if psdu.len() < MIN_PSDU_SIZE {
            return Err(RadioError::InvalidArgs);
        }
        let mut buf = Psdu::new();
        buf.extend_from_slice(psdu)
            .map_err(|_| RadioError::InvalidArgs)?;
        Ok(Self {
            channel,
            psdu: buf,
            info: TxInfo::default(),
        })
    }

    /// Set the transmit parameters
    pub fn with_info(mut self, info: TxInfo) -> Self {
        self.info = info;
        self
    }

    /// Parsed view of the PSDU
    pub fn frame(&self) -> Option<Frame<'_>> {
        Frame::new(&self.psdu)
    }

    /// Sequence number
    pub fn sequence(&self) -> Option<u8> {
        self.frame().and_then(|f| f.sequence())
    }

    /// Whether the frame asks for an acknowledgment
    pub fn ack_request(&self) -> bool {
        self.frame().is_some_and(|f| f.ack_request())
    }
}

/// Information about the ACK the driver sent for a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AckInfo {
    /// The ACK had the frame pending bit set
    pub acked_with_frame_pending: bool,
    /// The ACK was a secured enhanced ACK
    pub acked_with_sec_enh_ack: bool,
    /// Frame counter used to secure the ACK
    pub ack_frame_counter: u32,
    /// Key index used to secure the ACK
    pub ack_key_id: u8,
}

/// Received frame delivered to the upper layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RxFrame {
    /// PSDU including FCS
    pub psdu: Psdu,
    /// Channel the frame was received on
    pub channel: u8,
    /// RSSI in dBm
    pub rssi: i8,
    /// Link quality indicator
    pub lqi: u8,
    /// End-of-SHR timestamp in microseconds
    pub timestamp_us: u32,
    /// Interface the frame is attributed to
    pub iid: Iid,
    /// ACK sent for this frame
    pub ack: AckInfo,
}

impl RxFrame {
    /// Parsed view of the PSDU
    pub fn frame(&self) -> Option<Frame<'_>> {
        Frame::new(&self.psdu)
    }

    /// Sequence number
    pub fn sequence(&self) -> Option<u8> {
        self.frame().and_then(|f| f.sequence())
    }

    /// Frame pending bit, relevant for received ACKs
    pub fn frame_pending(&self) -> bool {
        self.frame().is_some_and(|f| f.frame_pending())
    }
}
