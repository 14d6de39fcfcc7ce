#[cfg(test)]
mod attributes_test;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{Error, Result};

use super::MAGIC_COOKIE;

// Comprehension-required range (0x0000-0x7FFF).
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_PRIORITY: u16 = 0x0024;
pub const ATTR_USE_CANDIDATE: u16 = 0x0025;

// Comprehension-optional range (0x8000-0xFFFF).
pub const ATTR_FINGERPRINT: u16 = 0x8028;
pub const ATTR_ICE_CONTROLLED: u16 = 0x8029;
pub const ATTR_ICE_CONTROLLING: u16 = 0x802A;

const FAMILY_IPV4: u8 = 0x01;

/// Encodes a XOR-MAPPED-ADDRESS attribute value. IPv4 only; the port is
/// XOR-ed with the top half of the magic cookie, the address with the whole
/// cookie (RFC 5389 section 15.2).
pub fn encode_xor_mapped_address(addr: &SocketAddr) -> Result<Vec<u8>> {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(_) => return Err(Error::ErrUnsupportedAddressFamily),
    };
    let xport = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let xip = u32::from(ip) ^ MAGIC_COOKIE;

    let mut value = Vec::with_capacity(8);
    value.push(0);
    value.push(FAMILY_IPV4);
    value.extend_from_slice(&xport.to_be_bytes());
    value.extend_from_slice(&xip.to_be_bytes());
    Ok(value)
}

pub fn decode_xor_mapped_address(value: &[u8]) -> Result<SocketAddr> {
    if value.len() < 8 {
        return Err(Error::ErrAttributeSizeInvalid);
    }
    if value[1] != FAMILY_IPV4 {
        return Err(Error::ErrUnsupportedAddressFamily);
    }
    let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = u32::from_be_bytes([value[4], value[5], value[6], value[7]]) ^ MAGIC_COOKIE;
    Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port))
}

/// Encodes an ERROR-CODE attribute value (RFC 5389 section 15.6).
pub fn encode_error_code(code: u16, reason: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(4 + reason.len());
    value.extend_from_slice(&[0, 0]);
    value.push((code / 100) as u8);
    value.push((code % 100) as u8);
    value.extend_from_slice(reason.as_bytes());
    value
}

pub fn decode_error_code(value: &[u8]) -> Result<(u16, String)> {
    if value.len() < 4 {
        return Err(Error::ErrBadErrorCode);
    }
    let class = (value[2] & 0x07) as u16;
    let number = value[3] as u16;
    let reason = String::from_utf8_lossy(&value[4..]).into_owned();
    Ok((class * 100 + number, reason))
}

/// Splits a USERNAME attribute of the form `"<a>:<b>"` on its single colon.
/// Inbound binding requests carry `"<local_ufrag>:<remote_ufrag>"`.
pub fn split_username(value: &[u8]) -> Result<(String, String)> {
    let s = std::str::from_utf8(value).map_err(|_| Error::ErrBadUsernameFormat)?;
    let mut parts = s.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            Ok((a.to_owned(), b.to_owned()))
        }
        _ => Err(Error::ErrBadUsernameFormat),
    }
}

/// Joins the username for an outbound ping: `"<remote_ufrag>:<local_ufrag>"`.
pub fn join_username(remote_ufrag: &str, local_ufrag: &str) -> String {
    format!("{remote_ufrag}:{local_ufrag}")
}
