//! Coexistence arbitration hook
//!
//! Before every data transmit the driver asks the arbiter for the channel.
//! A deferred request is answered later through
//! [`crate::RadioDriver::coex_granted`].

/// Arbiter answer to a transmit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoexDecision {
    /// Start now
    Proceed,
    /// The grant will be signalled later
    Deferred,
    /// The channel is not available
    Denied,
}

/// External RF coexistence arbiter
///
/// Implementations must not call back into the driver from within
/// `request_transmit`; a deferred grant is reported afterwards.
pub trait CoexArbiter {
    /// Whether arbitration is active
    fn is_enabled(&self) -> bool;

    /// Turn arbitration on or off
    fn set_enabled(&mut self, enabled: bool);

    /// Ask for the channel ahead of a transmit
    fn request_transmit(&mut self, ack_required: bool) -> CoexDecision;

    /// Whether CCA should treat the channel as busy while the grant is withheld
    fn tx_hold_off(&self) -> bool {
        false
    }

    /// The transmit that was granted is over
    fn transmit_finished(&mut self) {}
}

/// Arbiter for radios that do not share the spectrum
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCoex;

impl CoexArbiter for NoCoex {
    fn is_enabled(&self) -> bool {
        false
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    fn request_transmit(&mut self, _ack_required: bool) -> CoexDecision {
        CoexDecision::Proceed
    }
}
