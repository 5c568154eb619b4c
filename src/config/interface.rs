use super::MAX_INTERFACES;

/// PAN identifier
pub type PanId = u16;

/// Short (16-bit) MAC address
pub type ShortAddress = u16;

/// Broadcast PAN id
pub const BROADCAST_PAN_ID: PanId = 0xFFFF;

/// Broadcast short address
pub const BROADCAST_SHORT_ADDRESS: ShortAddress = 0xFFFF;

/// Short address value meaning "no short address assigned"
pub const SHORT_ADDRESS_NONE: ShortAddress = 0xFFFE;

/// Extended (EUI-64) MAC address, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtAddress(pub [u8; 8]);

impl ExtAddress {
    /// Create from bytes in most-significant-first order
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create from the little-endian order used on the air
    pub fn from_frame_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        let mut out = [0u8; 8];
        for (i, b) in bytes[..8].iter().enumerate() {
            out[7 - i] = *b;
        }
        Some(Self(out))
    }

    /// Bytes in the little-endian order used on the air
    pub fn to_frame_bytes(&self) -> [u8; 8] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// Logical interface identifier
///
/// IID 0 is the broadcast interface shared by every addressing context;
/// IIDs `1..=MAX_INTERFACES` are the individual interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Iid(u8);

impl Iid {
    /// The broadcast / shared interface
    pub const BROADCAST: Iid = Iid(0);
    /// The interface used in single-PAN operation
    pub const PRIMARY: Iid = Iid(1);

    /// Validate a raw interface index
    pub const fn new(index: u8) -> Option<Self> {
        if index as usize <= MAX_INTERFACES {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Raw interface index
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Slot in per-interface tables, `None` for the broadcast interface
    pub const fn slot(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0 as usize - 1)
        }
    }

    /// Whether this is the broadcast interface
    pub const fn is_broadcast(self) -> bool {
        self.0 == 0
    }

    /// Iterate over every non-broadcast interface
    pub fn all() -> impl Iterator<Item = Iid> {
        (1..=MAX_INTERFACES as u8).map(Iid)
    }
}

impl Default for Iid {
    fn default() -> Self {
        Iid::BROADCAST
    }
}

/// Addressing configuration of one logical interface
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceConfig {
    /// PAN id
    pub pan_id: PanId,
    /// Short address
    pub short_address: ShortAddress,
    /// Extended address
    pub ext_address: ExtAddress,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            pan_id: BROADCAST_PAN_ID,
            short_address: SHORT_ADDRESS_NONE,
            ext_address: ExtAddress::default(),
        }
    }
}

impl InterfaceConfig {
    /// Create a configuration for an already-commissioned interface
    pub fn new(pan_id: PanId, short_address: ShortAddress, ext_address: ExtAddress) -> Self {
        Self {
            pan_id,
            short_address,
            ext_address,
        }
    }
}
