//! SRTP/SRTCP ingress per RFC 3711, keyed from the DTLS handshake per
//! RFC 5764. One send and one recv session per peer, any-SSRC, with a
//! 1024-packet anti-replay window on inbound traffic.

mod cipher;
mod context;
mod key_derivation;
mod replay;


pub use context::Context;

use std::fmt;

use log::{info, warn};

use crate::error::{Error, Result};

/// Negotiated protection profile (RFC 5764 section 4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProfile {
    Aes128CmHmacSha1_80,
    Aes128CmHmacSha1_32,
}

impl SrtpProfile {
    pub fn key_len(&self) -> usize {
        16
    }

    pub fn salt_len(&self) -> usize {
        14
    }

    pub fn rtp_auth_tag_len(&self) -> usize {
        match self {
            SrtpProfile::Aes128CmHmacSha1_80 => 10,
            SrtpProfile::Aes128CmHmacSha1_32 => 4,
        }
    }

    /// The RTCP tag is 80 bits for both profiles.
    pub fn rtcp_auth_tag_len(&self) -> usize {
        10
    }
}

impl fmt::Display for SrtpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrtpProfile::Aes128CmHmacSha1_80 => write!(f, "SRTP_AES128_CM_SHA1_80"),
            SrtpProfile::Aes128CmHmacSha1_32 => write!(f, "SRTP_AES128_CM_SHA1_32"),
        }
    }
}

/// One cryptographic direction.
pub struct SrtpSession {
    context: Context,
}

impl SrtpSession {
    /// `key` is the concatenated master key and master salt, the layout the
    /// DTLS exporter output is split into.
    pub fn new(profile: SrtpProfile, key: &[u8]) -> Result<Self> {
        let key_len = profile.key_len();
        if key.len() != key_len + profile.salt_len() {
            return Err(Error::ErrBadMasterKeyLength {
                expect: key_len + profile.salt_len(),
                got: key.len(),
            });
        }
        Ok(SrtpSession {
            context: Context::new(profile, &key[..key_len], &key[key_len..])?,
        })
    }

    pub fn unprotect_rtp(&mut self, packet: &mut [u8]) -> Result<usize> {
        self.context.unprotect_rtp(packet)
    }

    pub fn unprotect_rtcp(&mut self, packet: &mut [u8]) -> Result<usize> {
        self.context.unprotect_rtcp(packet)
    }

    pub fn protect_rtcp(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.context.protect_rtcp(plaintext)
    }
}

/// The send/recv session pair of one peer.
#[derive(Default)]
pub struct SrtpTransport {
    profile: Option<SrtpProfile>,
    send_key: Vec<u8>,
    recv_key: Vec<u8>,
    send_session: Option<SrtpSession>,
    recv_session: Option<SrtpSession>,
    rtp_unprotect_fails: u64,
    rtcp_unprotect_fails: u64,
}

impl SrtpTransport {
    pub fn new() -> Self {
        SrtpTransport::default()
    }

    pub fn is_active(&self) -> bool {
        self.send_session.is_some() && self.recv_session.is_some()
    }

    /// Installs the negotiated keys. Re-installing identical parameters is a
    /// no-op; changed parameters re-key the existing sessions.
    pub fn set_rtp_params(
        &mut self,
        profile: SrtpProfile,
        send_key: &[u8],
        recv_key: &[u8],
    ) -> Result<()> {
        if self.is_active()
            && self.profile == Some(profile)
            && self.send_key == send_key
            && self.recv_key == recv_key
        {
            info!("SRTP params unchanged, ignoring");
            return Ok(());
        }
        let new_session = !self.is_active();

        let send_session = SrtpSession::new(profile, send_key);
        let recv_session = SrtpSession::new(profile, recv_key);
        match (send_session, recv_session) {
            (Ok(send), Ok(recv)) => {
                self.profile = Some(profile);
                self.send_key = send_key.to_vec();
                self.recv_key = recv_key.to_vec();
                self.send_session = Some(send);
                self.recv_session = Some(recv);
                info!(
                    "SRTP {} params: profile {profile}",
                    if new_session { "activated" } else { "updated" }
                );
                Ok(())
            }
            (send, recv) => {
                self.reset_params();
                Err(send.err().or(recv.err()).unwrap_or(Error::ErrSessionNotStarted))
            }
        }
    }

    pub fn reset_params(&mut self) {
        self.profile = None;
        self.send_key.clear();
        self.recv_key.clear();
        self.send_session = None;
        self.recv_session = None;
        info!("SRTP params reset");
    }

    /// In-place unprotect; `None` means drop. The first failure is logged,
    /// later ones only counted.
    pub fn unprotect_rtp(&mut self, packet: &mut [u8]) -> Option<usize> {
        let session = match self.recv_session.as_mut() {
            Some(session) => session,
            None => {
                warn!("failed to unprotect RTP on a non-existing SRTP session");
                return None;
            }
        };
        match session.unprotect_rtp(packet) {
            Ok(len) => Some(len),
            Err(e) => {
                if self.rtp_unprotect_fails == 0 {
                    warn!("failed to unprotect RTP packet: {e}");
                }
                self.rtp_unprotect_fails += 1;
                None
            }
        }
    }

    pub fn unprotect_rtcp(&mut self, packet: &mut [u8]) -> Option<usize> {
        let session = match self.recv_session.as_mut() {
            Some(session) => session,
            None => {
                warn!("failed to unprotect RTCP on a non-existing SRTP session");
                return None;
            }
        };
        match session.unprotect_rtcp(packet) {
            Ok(len) => Some(len),
            Err(e) => {
                if self.rtcp_unprotect_fails == 0 {
                    warn!("failed to unprotect RTCP packet: {e}");
                }
                self.rtcp_unprotect_fails += 1;
                None
            }
        }
    }

    /// Protects a locally-built RTCP compound with the send session.
    pub fn protect_rtcp(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self.send_session.as_mut() {
            Some(session) => session.protect_rtcp(plaintext),
            None => Err(Error::ErrSessionNotStarted),
        }
    }

    pub fn rtp_unprotect_fails(&self) -> u64 {
        self.rtp_unprotect_fails
    }

    pub fn rtcp_unprotect_fails(&self) -> u64 {
        self.rtcp_unprotect_fails
    }
}
