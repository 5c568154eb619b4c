use heapless::Vec;

/// Element id of the CSL header IE
pub const CSL_IE_ID: u8 = 0x1a;

/// Content length of a CSL IE carrying phase and period
pub const CSL_IE_CONTENT_LEN: usize = 4;

/// Element id of a vendor-specific header IE
pub const VENDOR_IE_ID: u8 = 0x00;

/// Thread vendor OUI, in over-the-air order
pub const THREAD_OUI: [u8; 3] = [0x9b, 0xb8, 0xea];

/// Vendor IE subtype of the Thread enhanced-ACK probing IE
pub const THREAD_IE_SUBTYPE_LINK_METRICS: u8 = 0x00;

/// Header termination IE 1 (payload IEs follow)
pub const HT1_IE_ID: u8 = 0x7e;

/// Header termination IE 2 (payload follows)
pub const HT2_IE_ID: u8 = 0x7f;

/// Header IE descriptor size
pub const IE_HEADER_SIZE: usize = 2;

/// Largest header IE block an enhanced ACK carries
pub const MAX_ACK_IE_SIZE: usize = 2 + CSL_IE_CONTENT_LEN + 2 + 4 + 3;

/// Encoded header IEs
pub type IeBuffer = Vec<u8, MAX_ACK_IE_SIZE>;

/// Location of one header IE inside a PSDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaderIe {
    /// Element id
    pub element_id: u8,
    /// Offset of the IE content
    pub content_offset: usize,
    /// Content length
    pub len: usize,
}

impl HeaderIe {
    /// Whether this IE terminates the header IE list
    pub fn is_termination(&self) -> bool {
        self.element_id == HT1_IE_ID || self.element_id == HT2_IE_ID
    }
}

/// Iterator over the header IEs of a frame
#[derive(Debug, Clone)]
pub struct HeaderIeIter<'a> {
    buf: &'a [u8],
    offset: usize,
    end: usize,
    done: bool,
}

impl<'a> HeaderIeIter<'a> {
    pub(crate) fn new(buf: &'a [u8], offset: usize, end: usize) -> Self {
        Self {
            buf,
            offset,
            end: end.min(buf.len()),
            done: false,
        }
    }
}

impl<'a> Iterator for HeaderIeIter<'a> {
    type Item = HeaderIe;

    fn next(&mut self) -> Option<HeaderIe> {
        if self.done || self.offset + IE_HEADER_SIZE > self.end {
            return None;
        }
        let descriptor = u16::from_le_bytes([self.buf[self.offset], self.buf[self.offset + 1]]);
        // Payload IE descriptors never appear in the header list
        if descriptor & 0x8000 != 0 {
            self.done = true;
            return None;
        }
        let ie = HeaderIe {
            element_id: ((descriptor >> 7) & 0xff) as u8,
            content_offset: self.offset + IE_HEADER_SIZE,
            len: (descriptor & 0x7f) as usize,
        };
        if ie.content_offset + ie.len > self.end {
            self.done = true;
            return None;
        }
        self.offset = ie.content_offset + ie.len;
        if ie.is_termination() {
            self.done = true;
        }
        Some(ie)
    }
}

fn descriptor(element_id: u8, len: usize) -> [u8; 2] {
    let value = (len as u16 & 0x7f) | ((element_id as u16) << 7);
    value.to_le_bytes()
}

/// Append a CSL IE
pub fn push_csl_ie(out: &mut IeBuffer, phase: u16, period: u16) -> Result<(), ()> {
    out.extend_from_slice(&descriptor(CSL_IE_ID, CSL_IE_CONTENT_LEN))?;
    out.extend_from_slice(&phase.to_le_bytes())?;
    out.extend_from_slice(&period.to_le_bytes())
}

/// Rewrite the phase and period of a CSL IE in place
pub fn write_csl_ie(psdu: &mut [u8], ie: &HeaderIe, phase: u16, period: u16) -> Result<(), ()> {
    if ie.element_id != CSL_IE_ID || ie.len < CSL_IE_CONTENT_LEN {
        return Err(());
    }
    let content = psdu
        .get_mut(ie.content_offset..ie.content_offset + CSL_IE_CONTENT_LEN)
        .ok_or(())?;
    content[..2].copy_from_slice(&phase.to_le_bytes());
    content[2..].copy_from_slice(&period.to_le_bytes());
    Ok(())
}

/// Append a Thread enhanced-ACK probing IE with the given metric values
pub fn push_link_metrics_ie(out: &mut IeBuffer, values: &[u8]) -> Result<(), ()> {
    let len = THREAD_OUI.len() + 1 + values.len();
    out.extend_from_slice(&descriptor(VENDOR_IE_ID, len))?;
    out.extend_from_slice(&THREAD_OUI)?;
    out.push(THREAD_IE_SUBTYPE_LINK_METRICS).map_err(|_| ())?;
    out.extend_from_slice(values)
}
