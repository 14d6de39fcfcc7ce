#[cfg(test)]
mod packet_test;

use crate::error::{Error, Result};

use super::MIN_RTP_PACKET_LEN;

const EXTENSION_HEADER_LEN: usize = 4;

/// Parsed fixed header of an RTP packet (RFC 3550 section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Bytes before the payload: fixed header, CSRCs and extension.
    pub header_len: usize,
}

impl RtpHeader {
    pub fn parse(packet: &[u8]) -> Result<RtpHeader> {
        if packet.len() < MIN_RTP_PACKET_LEN {
            return Err(Error::ErrRtpTooSmall);
        }
        if packet[0] >> 6 != super::RTP_VERSION {
            return Err(Error::ErrBadVersion);
        }
        let has_extension = packet[0] & 0x10 != 0;
        let csrc_count = (packet[0] & 0x0F) as usize;

        let mut header_len = MIN_RTP_PACKET_LEN + 4 * csrc_count;
        if packet.len() < header_len {
            return Err(Error::ErrRtpTooSmall);
        }
        if has_extension {
            if packet.len() < header_len + EXTENSION_HEADER_LEN {
                return Err(Error::ErrRtpTooSmall);
            }
            let ext_words = u16::from_be_bytes([
                packet[header_len + 2],
                packet[header_len + 3],
            ]) as usize;
            header_len += EXTENSION_HEADER_LEN + 4 * ext_words;
            if packet.len() < header_len {
                return Err(Error::ErrRtpTooSmall);
            }
        }

        Ok(RtpHeader {
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7F,
            sequence_number: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
            header_len,
        })
    }
}

/// One received RTP packet as seen by the statistics updater.
#[derive(Debug, Clone, Copy)]
pub struct RtpPacketReceived {
    pub header: RtpHeader,
    pub payload_len: usize,
    /// RTP clock rate of the payload, for jitter in timestamp units.
    pub payload_type_frequency: u32,
}

impl RtpPacketReceived {
    pub fn new(packet: &[u8], payload_type_frequency: u32) -> Result<Self> {
        let header = RtpHeader::parse(packet)?;
        Ok(RtpPacketReceived {
            header,
            payload_len: packet.len() - header.header_len,
            payload_type_frequency,
        })
    }
}
