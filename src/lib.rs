//! IEEE 802.15.4 radio driver core in Rust
//!
//! This crate provides the hardware-independent part of an 802.15.4 radio
//! driver: the transmit state machine, the receive pipeline, ACK
//! generation, energy scanning and multi-PAN interface handling. A vendor
//! radio is plugged in through [`RadioHardware`], the MAC layer above
//! through [`UpperMac`].
//!
//! # Features
//! - Single transmit slot with CSMA-CA, direct and scheduled (CSL) transmit
//! - Bounded receive queue over a fixed buffer pool, delivered in order
//! - Immediate and enhanced ACKs with frame pending, CSL and link metrics IEs
//! - Frame security through the hardware AES-CCM* engine
//! - Up to three logical interfaces sharing one radio
//! - Optional packet traffic arbitration through [`CoexArbiter`]
//! - No heap, no unsafe code
//!
//! # Example
//! ```no_run
//! use radio802154::{
//!     config::{DriverConfig, Iid},
//!     frame::TxFrame,
//!     RadioDriver,
//! };
//! # use radio802154::{coex::NoCoex, frame::RxFrame, TxStatus, UpperMac};
//! # struct Mac;
//! # impl UpperMac for Mac {
//! #     fn receive_done(&mut self, _: Iid, _: &RxFrame) {}
//! #     fn transmit_done(&mut self, _: Iid, _: &TxFrame, _: Option<&RxFrame>, _: TxStatus) {}
//! #     fn energy_scan_done(&mut self, _: Iid, _: i8) {}
//! # }
//! # fn run<R: radio802154::RadioHardware>(radio: R) {
//! // Create the driver (radio implementation omitted)
//! let driver = RadioDriver::new(radio, NoCoex, DriverConfig::single_pan());
//! driver.init().unwrap();
//! driver.receive(Iid::PRIMARY, 15).unwrap();
//!
//! // Send a data frame, the result arrives through `process`
//! let psdu = [0x41, 0x88, 0x01, 0x34, 0x12, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00];
//! driver.transmit(Iid::PRIMARY, TxFrame::new(15, &psdu).unwrap()).unwrap();
//!
//! let mut mac = Mac;
//! loop {
//!     driver.process(&mut mac);
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![no_std]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

// Must come first so the logging macros are visible to the other modules
mod fmt;

/// Coexistence arbitration hook
pub mod coex;

/// Driver and interface configuration
pub mod config;

/// Radio driver core
pub mod driver;

/// Error types
pub mod error;

/// 802.15.4 frame parsing and building
pub mod frame;

/// Radio hardware abstraction layer
pub mod radio;

/// MAC security and timing helpers
pub mod security;

/// Upper MAC callbacks
pub mod upper;

pub use coex::CoexArbiter;
pub use config::{DriverConfig, Iid};
pub use driver::RadioDriver;
pub use error::{RadioError, TxError, TxStatus};
pub use radio::RadioHardware;
pub use upper::UpperMac;
