/// Hardware event bits
pub mod events;
/// Radio hardware interface
pub mod traits;

pub use events::{HardwareEvents, SchedulerStatus};
pub use traits::{
    Band, CsmaParams, IncomingPacket, RadioHardware, RxPacketInfo, TxOptions, TxSchedule,
    CCM_NONCE_SIZE,
};
