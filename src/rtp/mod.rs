//! RTP/RTCP packet typing and the per-SSRC receive statistics that feed
//! RTCP receiver reports.

pub mod packet;
pub mod receive_stat;

#[cfg(test)]
mod rtp_utils_test;

pub use packet::*;
pub use receive_stat::*;

const RTP_VERSION: u8 = 2;
pub const MIN_RTP_PACKET_LEN: usize = 12;
pub const MIN_RTCP_PACKET_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtpPacketType {
    Rtp,
    Rtcp,
    Unknown,
}

fn has_correct_rtp_version(packet: &[u8]) -> bool {
    packet[0] >> 6 == RTP_VERSION
}

/// Payload types 64..=95 can only appear in RTCP packets when RTP and RTCP
/// share a port (RFC 5761 section 4).
fn payload_type_is_reserved_for_rtcp(payload_type: u8) -> bool {
    (64..96).contains(&payload_type)
}

pub fn is_rtp_packet(packet: &[u8]) -> bool {
    packet.len() >= MIN_RTP_PACKET_LEN
        && has_correct_rtp_version(packet)
        && !payload_type_is_reserved_for_rtcp(packet[1] & 0x7F)
}

pub fn is_rtcp_packet(packet: &[u8]) -> bool {
    packet.len() >= MIN_RTCP_PACKET_LEN
        && has_correct_rtp_version(packet)
        && payload_type_is_reserved_for_rtcp(packet[1] & 0x7F)
}

pub fn infer_rtp_packet_type(packet: &[u8]) -> RtpPacketType {
    if is_rtp_packet(packet) {
        RtpPacketType::Rtp
    } else if is_rtcp_packet(packet) {
        RtpPacketType::Rtcp
    } else {
        RtpPacketType::Unknown
    }
}

pub fn parse_rtp_ssrc(packet: &[u8]) -> u32 {
    u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]])
}

pub fn parse_rtp_sequence_number(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[2], packet[3]])
}
