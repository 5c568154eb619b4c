//! MAC security bookkeeping
//!
//! This module provides the pieces of 802.15.4 security the driver handles
//! itself; the AES-CCM* transform runs in the radio's crypto engine:
//! - Per-interface key triple with rotation lookup
//! - Monotonic frame counters
//! - CCM* nonce construction
//! - CSL phase and link-metrics value computation

use core::fmt;

use crate::config::ExtAddress;
use crate::radio::CCM_NONCE_SIZE;

/// Key identifier mode supported by the driver (key index only)
pub const KEY_ID_MODE_1: u8 = 1;

/// Highest key index; key indices wrap over `1..=MAX_KEY_INDEX`
pub const MAX_KEY_INDEX: u8 = 128;

/// Duration of the 802.15.4 SHR at 2.4 GHz, in microseconds
pub const SHR_DURATION_US: u32 = 160;

/// CSL phase and period unit (ten symbols), in microseconds
pub const CSL_UNIT_US: u32 = 160;

/// Noise floor used for link margin, in dBm
pub const LINK_MARGIN_NOISE_FLOOR_DBM: i16 = -100;

/// AES-128 MAC key, opaque to the driver
#[derive(Clone, PartialEq, Eq, Default)]
pub struct MacKey([u8; 16]);

impl MacKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacKey(..)")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MacKey {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "MacKey(..)")
    }
}

fn prev_key_index(index: u8) -> u8 {
    if index <= 1 {
        MAX_KEY_INDEX
    } else {
        index - 1
    }
}

fn next_key_index(index: u8) -> u8 {
    if index >= MAX_KEY_INDEX {
        1
    } else {
        index + 1
    }
}

/// Previous, current and next MAC keys of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacKeys {
    /// Key index of the current key
    pub key_id: u8,
    /// Key of `key_id - 1`
    pub prev: MacKey,
    /// Key of `key_id`
    pub current: MacKey,
    /// Key of `key_id + 1`
    pub next: MacKey,
}

impl MacKeys {
    /// Create a key triple, `None` for a key index outside `1..=128`
    pub fn new(key_id: u8, prev: MacKey, current: MacKey, next: MacKey) -> Option<Self> {
        if key_id == 0 || key_id > MAX_KEY_INDEX {
            return None;
        }
        Some(Self {
            key_id,
            prev,
            current,
            next,
        })
    }

    /// Key matching a received key index
    ///
    /// Frames secured just before or after a rotation carry the previous or
    /// next index.
    pub fn key_for_index(&self, key_index: u8) -> Option<&MacKey> {
        if key_index == self.key_id {
            Some(&self.current)
        } else if key_index == prev_key_index(self.key_id) {
            Some(&self.prev)
        } else if key_index == next_key_index(self.key_id) {
            Some(&self.next)
        } else {
            None
        }
    }
}

/// Outgoing MAC frame counter
///
/// Shared by transmitted frames and enhanced ACKs so that no nonce is ever
/// used twice with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameCounter(u32);

impl FrameCounter {
    /// Value the next secured frame will use
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Take the next value, `None` once the counter is exhausted
    pub fn allocate(&mut self) -> Option<u32> {
        if self.0 == u32::MAX {
            return None;
        }
        let value = self.0;
        self.0 += 1;
        Some(value)
    }

    /// Set the counter
    ///
    /// # Arguments
    /// * `value` - New counter value
    /// * `if_larger` - Only move the counter forward
    pub fn set(&mut self, value: u32, if_larger: bool) {
        if !if_larger || value > self.0 {
            self.0 = value;
        }
    }
}

/// Build the CCM* nonce for a frame
///
/// # Arguments
/// * `source` - Extended address of the sender
/// * `frame_counter` - Frame counter of the secured frame
/// * `level` - Security level
pub fn ccm_nonce(source: &ExtAddress, frame_counter: u32, level: u8) -> [u8; CCM_NONCE_SIZE] {
    let mut nonce = [0u8; CCM_NONCE_SIZE];
    nonce[..8].copy_from_slice(source.as_bytes());
    nonce[8..12].copy_from_slice(&frame_counter.to_be_bytes());
    nonce[12] = level;
    nonce
}

/// CSL phase, in units of ten symbols
///
/// # Arguments
/// * `sample_time_us` - Time of the next CSL sample window
/// * `shr_time_us` - Time at which the frame's SHR is sent
/// * `period` - CSL period in units of ten symbols
pub fn csl_phase(sample_time_us: u32, shr_time_us: u32, period: u16) -> u16 {
    let period_us = period as u32 * CSL_UNIT_US;
    if period_us == 0 {
        return 0;
    }
    let phase_us =
        (sample_time_us % period_us + period_us - shr_time_us % period_us) % period_us;
    (phase_us / CSL_UNIT_US) as u16
}

/// Metrics requested by an enhanced-ACK probing initiator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkMetrics {
    /// Count of received PDUs
    pub pdu_count: bool,
    /// Link quality indicator
    pub lqi: bool,
    /// Link margin
    pub link_margin: bool,
    /// RSSI
    pub rssi: bool,
}

impl LinkMetrics {
    /// Whether no metric is selected
    pub fn is_empty(&self) -> bool {
        !(self.pdu_count || self.lqi || self.link_margin || self.rssi)
    }

    /// Encode the selected metrics into `out`, returns the number written
    ///
    /// Enhanced ACKs carry at most LQI, link margin and RSSI, in that order.
    pub fn encode(&self, lqi: u8, rssi: i8, out: &mut [u8; 3]) -> usize {
        let mut n = 0;
        if self.lqi {
            out[n] = lqi;
            n += 1;
        }
        if self.link_margin {
            out[n] = scale_link_margin(rssi);
            n += 1;
        }
        if self.rssi {
            out[n] = scale_rssi(rssi);
            n += 1;
        }
        n
    }
}

fn scale_to_byte(value: i16) -> u8 {
    let clamped = value.clamp(0, 130) as u16;
    (clamped * 255 / 130) as u8
}

/// Scale an RSSI in `-130..=0` dBm to `0..=255`
pub fn scale_rssi(rssi: i8) -> u8 {
    scale_to_byte(rssi as i16 + 130)
}

/// Scale the link margin above the noise floor to `0..=255`
pub fn scale_link_margin(rssi: i8) -> u8 {
    scale_to_byte(rssi as i16 - LINK_MARGIN_NOISE_FLOOR_DBM)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(id: u8) -> MacKeys {
        MacKeys::new(id, MacKey::new([1; 16]), MacKey::new([2; 16]), MacKey::new([3; 16])).unwrap()
    }

    #[test]
    fn key_rotation_lookup() {
        let k = keys(5);
        assert_eq!(k.key_for_index(5), Some(&MacKey::new([2; 16])));
        assert_eq!(k.key_for_index(4), Some(&MacKey::new([1; 16])));
        assert_eq!(k.key_for_index(6), Some(&MacKey::new([3; 16])));
        assert_eq!(k.key_for_index(7), None);
    }

    #[test]
    fn key_index_wraps() {
        let k = keys(1);
        assert_eq!(k.key_for_index(128), Some(&MacKey::new([1; 16])));
        let k = keys(128);
        assert_eq!(k.key_for_index(1), Some(&MacKey::new([3; 16])));
        let blank = MacKey::default();
        assert!(MacKeys::new(0, blank.clone(), blank.clone(), blank.clone()).is_none());
        assert!(MacKeys::new(129, blank.clone(), blank.clone(), blank).is_none());
    }

    #[test]
    fn frame_counter_is_monotonic() {
        let mut fc = FrameCounter::default();
        assert_eq!(fc.allocate(), Some(0));
        assert_eq!(fc.allocate(), Some(1));
        fc.set(1, true);
        assert_eq!(fc.get(), 2);
        fc.set(100, true);
        assert_eq!(fc.get(), 100);
        fc.set(u32::MAX, false);
        assert_eq!(fc.allocate(), None);
    }

    #[test]
    fn key_debug_is_redacted() {
        let text = format!("{:?}", MacKey::new([0x42; 16]));
        assert_eq!(text, "MacKey(..)");
    }

    #[test]
    fn nonce_layout() {
        let nonce = ccm_nonce(&ExtAddress::new([1, 2, 3, 4, 5, 6, 7, 8]), 0x0a0b0c0d, 5);
        assert_eq!(nonce, [1, 2, 3, 4, 5, 6, 7, 8, 0x0a, 0x0b, 0x0c, 0x0d, 5]);
    }

    #[test]
    fn csl_phase_units() {
        // Period 100 units = 16 ms
        assert_eq!(csl_phase(16_000, 0, 100), 0);
        assert_eq!(csl_phase(1_600, 0, 100), 10);
        // Sample before SHR wraps to the next period
        assert_eq!(csl_phase(0, 1_600, 100), 90);
        assert_eq!(csl_phase(1_234, 5_678, 0), 0);
    }

    #[test]
    fn link_metric_scaling() {
        assert_eq!(scale_rssi(-130), 0);
        assert_eq!(scale_rssi(0), 255);
        assert_eq!(scale_rssi(-65), 127);
        assert_eq!(scale_link_margin(-100), 0);
        assert_eq!(scale_link_margin(-120), 0);
        assert_eq!(scale_link_margin(-35), 127);

        let metrics = LinkMetrics {
            lqi: true,
            rssi: true,
            ..LinkMetrics::default()
        };
        let mut out = [0u8; 3];
        assert_eq!(metrics.encode(200, -130, &mut out), 2);
        assert_eq!(&out[..2], &[200, 0]);
    }
}
