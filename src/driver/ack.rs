use crate::coex::CoexArbiter;
use crate::config::{ExtAddress, Iid, ShortAddress};
use crate::error::RadioError;
use crate::frame::ie::{push_csl_ie, push_link_metrics_ie, IeBuffer};
use crate::frame::{
    enh_ack_fcf, mic_len, AckInfo, Frame, FrameVersion, MacAddress, Psdu, FCS_SIZE, MAX_PSDU_SIZE,
};
use crate::radio::{IncomingPacket, RadioHardware};
use crate::security::{ccm_nonce, csl_phase, LinkMetrics, KEY_ID_MODE_1};

use super::interface::resolve_interface;
use super::state::{Flags, InterfaceState, ProbingEntry};
use super::{Core, RadioDriver};

/// PHY symbol time for one octet on 2.4 GHz O-QPSK
const OCTET_DURATION_US: u32 = 32;

/// Why an enhanced ACK could not be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum EnhAckError {
    NoSource,
    Security,
    Encoding,
    Radio,
}

impl<R: RadioHardware, C: CoexArbiter> Core<R, C> {
    /// Interrupt path for a frame still arriving that requests an ACK
    ///
    /// Runs against the hardware ACK turnaround: only the header that has
    /// already been received is inspected.
    pub(crate) fn on_ack_requested(&mut self) {
        let mut buf = [0u8; MAX_PSDU_SIZE];
        let Some(incoming) = self.radio.peek_rx_packet(&mut buf) else {
            return;
        };
        let len = incoming.len.min(MAX_PSDU_SIZE);
        let Some(frame) = Frame::new(&buf[..len]) else {
            return;
        };
        if !frame.ack_request() {
            return;
        }

        let iid = if self.config.multipan {
            resolve_interface(incoming.filter_mask)
        } else {
            Iid::PRIMARY
        };
        self.state.flags.set(Flags::ONGOING_TX_ACK);

        let source = frame.src_address();
        let frame_pending = (frame.is_data_request() || frame.version() == FrameVersion::V2015)
            && self.frame_pending_for(iid, &source);

        if self.config.enhanced_ack && frame.version() == FrameVersion::V2015 {
            let sent = self
                .build_enhanced_ack(iid, &frame, &incoming, frame_pending)
                .and_then(|(psdu, info)| {
                    self.radio
                        .write_enhanced_ack(&psdu)
                        .map(|_| info)
                        .map_err(|_| EnhAckError::Radio)
                });
            match sent {
                Ok(info) => {
                    self.state.last_ack = Some(info);
                    return;
                }
                Err(err) => warn!("enhanced ack failed ({:?}), sending immediate ack", err),
            }
        }

        let mut acked_with_frame_pending = false;
        if frame_pending {
            match self.radio.set_frame_pending() {
                Ok(()) => acked_with_frame_pending = true,
                Err(_) => warn!("too late to set frame pending"),
            }
        }
        self.state.last_ack = Some(AckInfo {
            acked_with_frame_pending,
            ..AckInfo::default()
        });
    }

    fn frame_pending_for(&self, iid: Iid, source: &MacAddress) -> bool {
        if iid.is_broadcast() {
            return self
                .state
                .interfaces
                .iter()
                .filter(|iface| iface.bound)
                .any(|iface| iface.frame_pending_for(source));
        }
        self.state
            .iface(iid)
            .is_some_and(|iface| iface.frame_pending_for(source))
    }

    fn build_enhanced_ack(
        &mut self,
        iid: Iid,
        frame: &Frame<'_>,
        incoming: &IncomingPacket,
        frame_pending: bool,
    ) -> Result<(Psdu, AckInfo), EnhAckError> {
        let (src_mode, src_bytes) = frame.src_address_raw().ok_or(EnhAckError::NoSource)?;
        let source = frame.src_address();

        let mut ies = IeBuffer::new();
        let csl = self.state.csl;
        if csl.is_enabled() && csl.is_peer(&source) {
            let ack_shr = incoming
                .timestamp_us
                .wrapping_add((1 + incoming.psdu_len as u32) * OCTET_DURATION_US)
                .wrapping_add(self.config.ack_turnaround_us);
            let phase = csl_phase(csl.sample_time_us, ack_shr, csl.period);
            push_csl_ie(&mut ies, phase, csl.period).map_err(|_| EnhAckError::Encoding)?;
        }
        if let Some(entry) = self.state.iface(iid).and_then(|iface| iface.probing_for(&source)) {
            let mut values = [0u8; 3];
            let n = entry.metrics.encode(incoming.lqi, incoming.rssi, &mut values);
            if n > 0 {
                push_link_metrics_ie(&mut ies, &values[..n]).map_err(|_| EnhAckError::Encoding)?;
            }
        }

        let sequence = frame.sequence();
        let secured = frame.security_enabled();
        let fcf = enh_ack_fcf(
            src_mode,
            secured,
            frame_pending,
            sequence.is_none(),
            !ies.is_empty(),
        );

        let mut psdu = Psdu::new();
        let mut info = AckInfo {
            acked_with_frame_pending: frame_pending,
            ..AckInfo::default()
        };
        psdu.extend_from_slice(&fcf.0.to_le_bytes())
            .map_err(|_| EnhAckError::Encoding)?;
        if let Some(sequence) = sequence {
            psdu.push(sequence).map_err(|_| EnhAckError::Encoding)?;
        }
        psdu.extend_from_slice(src_bytes)
            .map_err(|_| EnhAckError::Encoding)?;

        let security = if secured {
            let aux = frame.aux_security_header().ok_or(EnhAckError::Security)?;
            if aux.key_id_mode != KEY_ID_MODE_1 {
                return Err(EnhAckError::Security);
            }
            let key_index = aux.key_index.ok_or(EnhAckError::Security)?;
            let iface = self.state.iface_mut(iid).ok_or(EnhAckError::Security)?;
            let key = iface
                .keys
                .as_ref()
                .and_then(|keys| keys.key_for_index(key_index))
                .cloned()
                .ok_or(EnhAckError::Security)?;
            let counter = iface.frame_counter.allocate().ok_or(EnhAckError::Security)?;

            psdu.push(aux.level | (KEY_ID_MODE_1 << 3))
                .map_err(|_| EnhAckError::Encoding)?;
            psdu.extend_from_slice(&counter.to_le_bytes())
                .map_err(|_| EnhAckError::Encoding)?;
            psdu.push(key_index).map_err(|_| EnhAckError::Encoding)?;

            info.acked_with_sec_enh_ack = true;
            info.ack_frame_counter = counter;
            info.ack_key_id = key_index;
            Some((key, counter, aux.level, iface.config.ext_address))
        } else {
            None
        };

        psdu.extend_from_slice(&ies)
            .map_err(|_| EnhAckError::Encoding)?;
        let header_len = psdu.len();
        let mic = security.as_ref().map_or(0, |(_, _, level, _)| mic_len(*level));
        psdu.resize(header_len + mic + FCS_SIZE, 0)
            .map_err(|_| EnhAckError::Encoding)?;

        if let Some((key, counter, level, ext_address)) = security {
            let nonce = ccm_nonce(&ext_address, counter, level);
            self.radio
                .secure_frame(&mut psdu, header_len, &key, &nonce, mic)
                .map_err(|_| EnhAckError::Radio)?;
        }
        trace!("enhanced ack built, {} bytes", psdu.len());
        Ok((psdu, info))
    }

    fn config_iface_mut(&mut self, iid: Iid) -> Result<&mut InterfaceState, RadioError> {
        self.state.iface_mut(iid).ok_or(RadioError::InvalidArgs)
    }
}

impl<R: RadioHardware, C: CoexArbiter> RadioDriver<R, C> {
    /// Turn source-address matching on or off for `iid`
    ///
    /// While disabled, every data request is acknowledged with frame
    /// pending set.
    pub fn enable_src_match(&self, iid: Iid, enabled: bool) -> Result<(), RadioError> {
        self.with_core(|core| {
            core.config_iface_mut(iid)?.src_match_enabled = enabled;
            Ok(())
        })
    }

    /// Add a short address to the source-match table of `iid`
    pub fn add_src_match_short_entry(
        &self,
        iid: Iid,
        address: ShortAddress,
    ) -> Result<(), RadioError> {
        self.with_core(|core| {
            let table = &mut core.config_iface_mut(iid)?.src_short;
            if table.contains(&address) {
                return Ok(());
            }
            table.push(address).map_err(|_| RadioError::Busy)
        })
    }

    /// Remove a short address from the source-match table of `iid`
    pub fn clear_src_match_short_entry(
        &self,
        iid: Iid,
        address: ShortAddress,
    ) -> Result<(), RadioError> {
        self.with_core(|core| {
            let table = &mut core.config_iface_mut(iid)?.src_short;
            let index = table
                .iter()
                .position(|entry| *entry == address)
                .ok_or(RadioError::InvalidArgs)?;
            table.swap_remove(index);
            Ok(())
        })
    }

    /// Add an extended address to the source-match table of `iid`
    pub fn add_src_match_ext_entry(&self, iid: Iid, address: ExtAddress) -> Result<(), RadioError> {
        self.with_core(|core| {
            let table = &mut core.config_iface_mut(iid)?.src_ext;
            if table.contains(&address) {
                return Ok(());
            }
            table.push(address).map_err(|_| RadioError::Busy)
        })
    }

    /// Remove an extended address from the source-match table of `iid`
    pub fn clear_src_match_ext_entry(
        &self,
        iid: Iid,
        address: ExtAddress,
    ) -> Result<(), RadioError> {
        self.with_core(|core| {
            let table = &mut core.config_iface_mut(iid)?.src_ext;
            let index = table
                .iter()
                .position(|entry| *entry == address)
                .ok_or(RadioError::InvalidArgs)?;
            table.swap_remove(index);
            Ok(())
        })
    }

    /// Empty the short-address source-match table of `iid`
    pub fn clear_src_match_short_entries(&self, iid: Iid) -> Result<(), RadioError> {
        self.with_core(|core| {
            core.config_iface_mut(iid)?.src_short.clear();
            Ok(())
        })
    }

    /// Empty the extended-address source-match table of `iid`
    pub fn clear_src_match_ext_entries(&self, iid: Iid) -> Result<(), RadioError> {
        self.with_core(|core| {
            core.config_iface_mut(iid)?.src_ext.clear();
            Ok(())
        })
    }

    /// Configure the CSL receiver
    ///
    /// `period` is in units of ten symbols; zero disables CSL. Enhanced
    /// ACKs sent to the peer carry a CSL IE.
    pub fn enable_csl(&self, period: u16, peer_short: ShortAddress, peer_ext: ExtAddress) {
        self.with_core(|core| {
            let csl = &mut core.state.csl;
            csl.period = period;
            csl.peer_short = peer_short;
            csl.peer_ext = peer_ext;
        });
        debug!("csl period set to {}", period);
    }

    /// Set the time of the next CSL sample window
    pub fn update_csl_sample_time(&self, sample_time_us: u32) {
        self.with_core(|core| core.state.csl.sample_time_us = sample_time_us)
    }

    /// Register a neighbor for enhanced-ACK link metrics probing
    ///
    /// Empty `metrics` removes the neighbor.
    pub fn configure_enh_ack_probing(
        &self,
        iid: Iid,
        short_address: ShortAddress,
        ext_address: ExtAddress,
        metrics: LinkMetrics,
    ) -> Result<(), RadioError> {
        self.with_core(|core| {
            let probing = &mut core.config_iface_mut(iid)?.probing;
            let existing = probing.iter().position(|entry| {
                entry.short_address == short_address || entry.ext_address == ext_address
            });
            match (existing, metrics.is_empty()) {
                (Some(index), true) => {
                    probing.swap_remove(index);
                    Ok(())
                }
                (None, true) => Err(RadioError::InvalidArgs),
                (Some(index), false) => {
                    probing[index] = ProbingEntry {
                        short_address,
                        ext_address,
                        metrics,
                    };
                    Ok(())
                }
                (None, false) => probing
                    .push(ProbingEntry {
                        short_address,
                        ext_address,
                        metrics,
                    })
                    .map_err(|_| RadioError::Busy),
            }
        })
    }
}
