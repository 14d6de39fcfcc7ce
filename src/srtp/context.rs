
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::rtp;

use super::cipher::CipherAesCmHmacSha1;
use super::replay::ReplayWindow;
use super::SrtpProfile;

/// Rollover bookkeeping for a single inbound SSRC (RFC 3550 appendix A.1 /
/// RFC 3711 appendix A index estimation).
#[derive(Debug, Default)]
struct SsrcState {
    started: bool,
    rollover_counter: u32,
    last_sequence_number: u16,
    replay: ReplayWindow,
}

impl SsrcState {
    /// Guesses which rollover cycle `seq` belongs to without committing.
    fn next_rollover_count(&self, seq: u16) -> u32 {
        if !self.started {
            return self.rollover_counter;
        }
        let delta = seq as i64 - self.last_sequence_number as i64;
        if (self.last_sequence_number as i64) < 0x8000 {
            if delta > 0x8000 {
                return self.rollover_counter.wrapping_sub(1);
            }
        } else if delta < -0x8000 {
            return self.rollover_counter.wrapping_add(1);
        }
        self.rollover_counter
    }

    /// Commits after the packet authenticated.
    fn update(&mut self, seq: u16, roc: u32) {
        if !self.started {
            self.started = true;
            self.rollover_counter = roc;
            self.last_sequence_number = seq;
            return;
        }
        let advanced = roc > self.rollover_counter
            || (roc == self.rollover_counter && seq > self.last_sequence_number);
        if advanced {
            self.rollover_counter = roc;
            self.last_sequence_number = seq;
        }
    }
}

/// One-way SRTP/SRTCP cryptographic context. A context is either used only
/// for unprotecting inbound traffic or only for protecting outbound RTCP.
pub struct Context {
    cipher: CipherAesCmHmacSha1,
    ssrc_states: HashMap<u32, SsrcState>,
    srtcp_replay: HashMap<u32, ReplayWindow>,
    srtcp_index: u32,
}

impl Context {
    pub fn new(profile: SrtpProfile, master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        if master_key.len() != profile.key_len() {
            return Err(Error::ErrBadMasterKeyLength {
                expect: profile.key_len(),
                got: master_key.len(),
            });
        }
        if master_salt.len() != profile.salt_len() {
            return Err(Error::ErrBadMasterSaltLength {
                expect: profile.salt_len(),
                got: master_salt.len(),
            });
        }
        Ok(Context {
            cipher: CipherAesCmHmacSha1::new(profile, master_key, master_salt)?,
            ssrc_states: HashMap::new(),
            srtcp_replay: HashMap::new(),
            srtcp_index: 0,
        })
    }

    /// Authenticates and decrypts one SRTP packet in place, returning the
    /// plain RTP length. Any-SSRC: state is created on first sight.
    pub fn unprotect_rtp(&mut self, packet: &mut [u8]) -> Result<usize> {
        let header = rtp::RtpHeader::parse(packet).map_err(|_| Error::ErrSrtpTooSmall)?;
        let state = self.ssrc_states.entry(header.ssrc).or_default();
        let roc = state.next_rollover_count(header.sequence_number);

        let len = self.cipher.decrypt_rtp_in_place(
            packet,
            header.header_len,
            header.sequence_number,
            header.ssrc,
            roc,
        )?;

        let index = ((roc as u64) << 16) | header.sequence_number as u64;
        if let Some(state) = self.ssrc_states.get_mut(&header.ssrc) {
            if !state.replay.check_and_update(index) {
                return Err(Error::ErrSrtpReplayed(index));
            }
            state.update(header.sequence_number, roc);
        }
        Ok(len)
    }

    /// Authenticates and decrypts one SRTCP packet in place, returning the
    /// plain RTCP length.
    pub fn unprotect_rtcp(&mut self, packet: &mut [u8]) -> Result<usize> {
        let (len, index) = self.cipher.decrypt_rtcp_in_place(packet)?;
        let ssrc = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        let replay = self.srtcp_replay.entry(ssrc).or_default();
        if !replay.check_and_update(index as u64) {
            return Err(Error::ErrSrtpReplayed(index as u64));
        }
        Ok(len)
    }

    /// Protects an outbound RTCP compound, consuming the next SRTCP index.
    pub fn protect_rtcp(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.srtcp_index = (self.srtcp_index + 1) & 0x7FFF_FFFF;
        self.cipher.encrypt_rtcp(plaintext, self.srtcp_index)
    }

    #[cfg(test)]
    pub(crate) fn cipher(&self) -> &CipherAesCmHmacSha1 {
        &self.cipher
    }
}
