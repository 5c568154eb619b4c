//! Driver and interface configuration
//!
//! This module contains the knobs of the driver core:
//! - Driver-wide configuration (multi-PAN, CCA threshold, timeouts)
//! - Per-interface addressing (PAN id, short and extended address)
//! - Compile-time capacities of the bounded queues and tables

/// Per-interface addressing configuration
pub mod interface;

pub use interface::{ExtAddress, Iid, InterfaceConfig, PanId, ShortAddress};

/// Number of logical interfaces besides the broadcast one
pub const MAX_INTERFACES: usize = 3;

/// Depth of the receive queue
pub const RX_QUEUE_SIZE: usize = 4;

/// Number of receive buffers in the pool
pub const RX_POOL_SIZE: usize = 4;

/// Short address entries per source-match table
pub const SRC_MATCH_SHORT_ENTRIES: usize = 10;

/// Extended address entries per source-match table
pub const SRC_MATCH_EXT_ENTRIES: usize = 10;

/// Neighbors that can be probed through enhanced ACKs, per interface
pub const LINK_METRICS_ENTRIES: usize = 4;

/// Default CCA energy-detect threshold in dBm
pub const DEFAULT_CCA_THRESHOLD_DBM: i8 = -75;

/// Driver-wide configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// Several logical interfaces share the radio
    pub multipan: bool,
    /// CCA energy-detect threshold in dBm
    pub cca_threshold_dbm: i8,
    /// Default transmit power in dBm
    pub tx_power_dbm: i8,
    /// RSSI averaging time of the synchronous RSSI read, in microseconds
    pub sync_rssi_averaging_us: u32,
    /// Upper bound of the synchronous RSSI busy-wait, in microseconds
    pub sync_rssi_timeout_us: u32,
    /// How long a deferred coexistence request may stay unanswered
    pub coex_grant_timeout_us: Option<u32>,
    /// Time between the end of a received frame and the ACK SHR
    pub ack_turnaround_us: u32,
    /// Answer 2015 frames with enhanced ACKs
    pub enhanced_ack: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            multipan: false,
            cca_threshold_dbm: DEFAULT_CCA_THRESHOLD_DBM,
            tx_power_dbm: 0,
            sync_rssi_averaging_us: 16,
            sync_rssi_timeout_us: 300,
            coex_grant_timeout_us: Some(20_000),
            ack_turnaround_us: 192,
            enhanced_ack: true,
        }
    }
}

impl DriverConfig {
    /// Configuration for a radio owned by a single interface
    pub fn single_pan() -> Self {
        Self::default()
    }

    /// Configuration for a radio shared by several interfaces
    pub fn multi_pan() -> Self {
        Self {
            multipan: true,
            ..Self::default()
        }
    }

    /// Set the CCA threshold
    pub fn with_cca_threshold(mut self, dbm: i8) -> Self {
        self.cca_threshold_dbm = dbm;
        self
    }

    /// Set the default transmit power
    pub fn with_tx_power(mut self, dbm: i8) -> Self {
        self.tx_power_dbm = dbm;
        self
    }

    /// Set the synchronous RSSI busy-wait bound
    pub fn with_sync_rssi_timeout(mut self, us: u32) -> Self {
        self.sync_rssi_timeout_us = us;
        self
    }

    /// Set or disable the deferred coexistence grant watchdog
    pub fn with_coex_grant_timeout(mut self, us: Option<u32>) -> Self {
        self.coex_grant_timeout_us = us;
        self
    }

    /// Enable or disable enhanced ACK generation
    pub fn with_enhanced_ack(mut self, enabled: bool) -> Self {
        self.enhanced_ack = enabled;
        self
    }
}
