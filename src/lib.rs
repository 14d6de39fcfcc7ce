//! Media-server endpoint core: negotiates, establishes, secures and receives
//! real-time media over a single UDP 5-tuple with a browser-class peer.
//!
//! The crate covers the network-and-transport plane only: ICE connectivity
//! (STUN binding checks), a server-role DTLS handshake that keys SRTP, SRTP
//! ingress, and the RTP/RTCP receive pipeline with receiver reports. The
//! surrounding signaling server and SDP text handling are external
//! collaborators; they talk to this crate through [`server::RtcServer`] and
//! [`server::RtcEventObserver`].

#![warn(rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod dtls_transport;
pub mod error;
pub mod ice;
pub mod peer;
pub mod rtcp;
pub mod rtp;
pub mod server;
pub mod srtp;
pub mod stun;

pub use error::{Error, Result};

/// Media kind of a demuxed packet, used to route payloads and pick RTCP
/// report cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
        }
    }
}
