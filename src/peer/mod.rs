//! Per-peer composition: the transport controller owning {ICE, DTLS, SRTP,
//! RTP/RTCP} and the peer connection wrapping it with description handling
//! and deferred teardown.

pub mod peer_connection;
pub mod state;
pub mod transport_controller;

pub use peer_connection::*;
pub use state::*;
pub use transport_controller::*;

use crate::ice::Candidate;

/// What the external signaling layer needs from us to build the local SDP:
/// ICE credentials, the certificate fingerprint and the gathered candidates.
#[derive(Debug, Clone)]
pub struct LocalDescription {
    pub ice_ufrag: String,
    pub ice_pwd: String,
    /// Always `"sha-256"`.
    pub fingerprint_algorithm: String,
    /// Upper-case colon-separated hex, as it appears in `a=fingerprint`.
    pub fingerprint: String,
    pub candidates: Vec<Candidate>,
}

/// What the signaling layer extracted from the remote SDP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescription {
    pub ice_ufrag: String,
    pub ice_pwd: String,
    pub fingerprint_algorithm: String,
    /// Raw digest bytes of the remote certificate.
    pub fingerprint: Vec<u8>,
    pub audio_ssrc: Option<u32>,
    pub video_ssrc: Option<u32>,
}
