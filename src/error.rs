use core::fmt;

/// Radio driver error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The transmit or scan slot is occupied
    Busy,
    /// Called before init or in the wrong radio state
    InvalidState,
    /// Bad channel, interface or parameter
    InvalidArgs,
    /// CCA or CSMA found the channel busy
    ChannelAccessFailure,
    /// No ACK was received
    NoAck,
    /// The transmit was aborted
    Abort,
    /// The radio hardware reported an unexpected error
    HardwareFault,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RadioError::Busy => "radio busy",
            RadioError::InvalidState => "invalid radio state",
            RadioError::InvalidArgs => "invalid arguments",
            RadioError::ChannelAccessFailure => "channel access failure",
            RadioError::NoAck => "no ack received",
            RadioError::Abort => "transmit aborted",
            RadioError::HardwareFault => "radio hardware fault",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RadioError {}

/// Failed transmit outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// CCA failed, CSMA was exhausted, or the arbiter denied the channel
    ChannelAccessFailure,
    /// No ACK was received
    NoAck,
    /// The transmit was aborted
    Abort,
}

impl From<TxError> for RadioError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::ChannelAccessFailure => RadioError::ChannelAccessFailure,
            TxError::NoAck => RadioError::NoAck,
            TxError::Abort => RadioError::Abort,
        }
    }
}

/// Outcome delivered with a transmit-done callback
pub type TxStatus = Result<(), TxError>;

/// Report a failed hardware call that must always succeed
#[track_caller]
pub(crate) fn hw_fault<E: fmt::Debug>(op: &'static str, err: E) -> ! {
    error!("radio hardware fault during {}", op);
    panic!("radio hardware fault during {}: {:?}", op, err)
}

/// Turn a hardware error into a fatal fault
pub(crate) trait OrFault<T> {
    fn or_fault(self, op: &'static str) -> T;
}

impl<T, E: fmt::Debug> OrFault<T> for Result<T, E> {
    #[track_caller]
    fn or_fault(self, op: &'static str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => hw_fault(op, err),
        }
    }
}
