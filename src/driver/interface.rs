//! Multi-PAN interface resolution
//!
//! The hardware address filter reports which filter indices matched a
//! received frame as a bitmask:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0    | destination PAN is broadcast |
//! | 1..3 | destination PAN matched filter 0..2 (IID 1..3) |
//! | 4    | destination address is broadcast |
//! | 5..7 | destination address matched filter 0..2 (IID 1..3) |

use crate::config::Iid;
use crate::frame::Frame;

/// Broadcast PAN id matched
pub const FILTER_BROADCAST_PAN: u8 = 0x01;

/// PAN id matched one of the per-interface filters
pub const FILTER_PAN_MASK: u8 = 0x0e;

/// Broadcast address matched
pub const FILTER_BROADCAST_ADDR: u8 = 0x10;

/// Address matched one of the per-interface filters
pub const FILTER_ADDR_MASK: u8 = 0xe0;

/// Offset between the PAN and address halves of the mask
const ADDR_SHIFT: u32 = 4;

/// Interface a received frame belongs to
///
/// Anything but exactly one matching per-interface PAN filter resolves to
/// the broadcast interface; the frame is still processed there.
pub fn resolve_interface(filter_mask: u8) -> Iid {
    let pan_bits = (filter_mask & FILTER_PAN_MASK) >> 1;
    if pan_bits == 0 || !pan_bits.is_power_of_two() {
        return Iid::BROADCAST;
    }
    Iid::new(pan_bits.trailing_zeros() as u8 + 1).unwrap_or(Iid::BROADCAST)
}

/// Whether the PAN and address matches of a frame are consistent
pub fn validate_filter_mask(filter_mask: u8, frame: &Frame<'_>) -> bool {
    if filter_mask & (FILTER_BROADCAST_PAN | FILTER_BROADCAST_ADDR) != 0 {
        return true;
    }
    let pan_bits = filter_mask & FILTER_PAN_MASK;
    let addr_bits = (filter_mask & FILTER_ADDR_MASK) >> ADDR_SHIFT;
    if pan_bits != 0 && pan_bits == addr_bits {
        return true;
    }
    !frame.has_dst_addressing()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Data frame, short dst/src, compressed PAN
    const ADDRESSED: [u8; 11] = [0x41, 0x88, 0x01, 0x34, 0x12, 0x02, 0x00, 0x01, 0x00, 0, 0];
    // Data frame, short src only, no destination fields
    const NO_DST: [u8; 9] = [0x41, 0x80, 0x01, 0x34, 0x12, 0x01, 0x00, 0, 0];

    #[test]
    fn single_match_resolves() {
        assert_eq!(resolve_interface(0x02).index(), 1);
        assert_eq!(resolve_interface(0x04 | 0x40).index(), 2);
        assert_eq!(resolve_interface(0x08).index(), 3);
    }

    #[test]
    fn ambiguous_match_falls_back_to_broadcast() {
        assert_eq!(resolve_interface(0x00), Iid::BROADCAST);
        assert_eq!(resolve_interface(0x06), Iid::BROADCAST);
        assert_eq!(resolve_interface(0x0e), Iid::BROADCAST);
        assert_eq!(resolve_interface(FILTER_BROADCAST_PAN), Iid::BROADCAST);
    }

    #[test]
    fn mask_validation() {
        let addressed = Frame::new(&ADDRESSED).unwrap();
        assert!(validate_filter_mask(FILTER_BROADCAST_PAN, &addressed));
        assert!(validate_filter_mask(0x02 | FILTER_BROADCAST_ADDR, &addressed));
        assert!(validate_filter_mask(0x02 | 0x20, &addressed));
        // PAN of IID 1 with the address of IID 2
        assert!(!validate_filter_mask(0x02 | 0x40, &addressed));
        assert!(!validate_filter_mask(0x02, &addressed));

        let no_dst = Frame::new(&NO_DST).unwrap();
        assert!(validate_filter_mask(0x00, &no_dst));
    }
}
