//! ICE-lite style connectivity: host candidate gathering, per-remote
//! connections driven by STUN binding checks, and the adaptive ping
//! scheduler. The server never resolves role conflicts; it always answers
//! checks and pings back on learned peer-reflexive candidates.

pub mod agent;
pub mod candidate;
pub mod channel;
pub mod connection;
pub mod controller;
pub mod port;

pub use agent::*;
pub use candidate::*;
pub use channel::*;
pub use connection::*;
pub use controller::*;
pub use port::*;

use std::fmt;

use rand::Rng;

pub const ICE_UFRAG_LENGTH: usize = 4;
pub const ICE_PWD_LENGTH: usize = 24;

/// 60-byte STUN checks at the assumed bandwidth budgets give the two base
/// cadences (bits / bps * 1000 ms).
const STUN_PACKET_SIZE_BITS: i64 = 60 * 8;
pub(crate) const WEAK_PING_INTERVAL: i64 = 1000 * STUN_PACKET_SIZE_BITS / 10_000;
pub(crate) const STRONG_PING_INTERVAL: i64 = 1000 * STUN_PACKET_SIZE_BITS / 1_000;
pub(crate) const STABILIZING_CONNECTION_PING_INTERVAL: i64 = 900;
pub(crate) const STABLE_CONNECTION_PING_INTERVAL: i64 = 2500;
pub(crate) const MIN_PINGS_AT_WEAK_PING_INTERVAL: u32 = 3;
pub(crate) const PING_INTERVAL_DIFF: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceCandidateComponent {
    Rtp = 1,
    Rtcp = 2,
}

/// Channel-level connectivity state, aggregated with the DTLS state into the
/// peer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceTransportState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for IceTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceParameters {
    pub ufrag: String,
    pub pwd: String,
}

impl IceParameters {
    pub fn new(ufrag: String, pwd: String) -> Self {
        IceParameters { ufrag, pwd }
    }

    /// Random alphanumeric credentials: 4-char ufrag, 24-char pwd.
    pub fn random() -> Self {
        IceParameters {
            ufrag: random_alnum(ICE_UFRAG_LENGTH),
            pwd: random_alnum(ICE_PWD_LENGTH),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ufrag.is_empty() || self.pwd.is_empty()
    }
}

pub(crate) fn random_alnum(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
