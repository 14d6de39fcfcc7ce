
use std::fmt;
use std::net::SocketAddr;

use crc::{Crc, CRC_32_ISO_HDLC};

use super::IceCandidateComponent;

pub const LOCAL_PORT_TYPE: &str = "host";
pub const PRFLX_PORT_TYPE: &str = "prflx";

pub const ICE_TYPE_PREFERENCE_HOST: u32 = 126;
pub const ICE_TYPE_PREFERENCE_PRFLX: u32 = 110;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A transport address usable for one side of a connection. Host candidates
/// come out of gathering; peer-reflexive ones are learned from binding
/// requests that arrive from an address we have never been told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub component: IceCandidateComponent,
    pub protocol: String,
    pub address: SocketAddr,
    pub port: u16,
    pub priority: u32,
    pub username: String,
    pub password: String,
    pub typ: String,
    pub foundation: String,
}

impl Candidate {
    /// `(type_pref << 24) | (local_pref << 8) | (256 - component)` per
    /// RFC 5245 section 4.1.2.1.
    pub fn compute_priority(
        type_preference: u32,
        local_preference: u32,
        component: IceCandidateComponent,
    ) -> u32 {
        (type_preference << 24) | (local_preference << 8) | (256 - component as u32)
    }

    /// CRC32 over `"type" || host-as-uri || protocol || relay_protocol`,
    /// rendered in decimal.
    pub fn compute_foundation(protocol: &str, relay_protocol: &str, base: &SocketAddr) -> String {
        let data = format!("type{}{}{}", base.ip(), protocol, relay_protocol);
        CRC32.checksum(data.as_bytes()).to_string()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cand[{}:{}:{}:{}:{}:{}]",
            self.foundation,
            self.component as u32,
            self.protocol,
            self.priority,
            self.address,
            self.typ
        )
    }
}
