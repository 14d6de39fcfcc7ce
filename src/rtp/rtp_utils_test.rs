use super::*;

fn rtp_bytes(payload_type: u8) -> Vec<u8> {
    let mut packet = vec![0x80, payload_type];
    packet.extend_from_slice(&[0u8; 10]);
    packet
}

#[test]
fn test_rtp_rtcp_discrimination_by_payload_type() {
    // Payload types below the RTCP block are RTP.
    assert_eq!(infer_rtp_packet_type(&rtp_bytes(0)), RtpPacketType::Rtp);
    assert_eq!(infer_rtp_packet_type(&rtp_bytes(63)), RtpPacketType::Rtp);
    assert_eq!(infer_rtp_packet_type(&rtp_bytes(96)), RtpPacketType::Rtp);
    assert_eq!(infer_rtp_packet_type(&rtp_bytes(111)), RtpPacketType::Rtp);

    // 64..=95 (SR=72 with marker bit, RR=73, ...) is RTCP.
    for pt in [64u8, 72, 73, 95] {
        assert_eq!(infer_rtp_packet_type(&rtp_bytes(pt)), RtpPacketType::Rtcp);
        // The marker/padding bit of the second byte is masked off.
        assert_eq!(
            infer_rtp_packet_type(&rtp_bytes(pt | 0x80)),
            RtpPacketType::Rtcp
        );
    }
}

#[test]
fn test_wrong_version_is_unknown() {
    let mut packet = rtp_bytes(96);
    packet[0] = 0x40;
    assert_eq!(infer_rtp_packet_type(&packet), RtpPacketType::Unknown);
}

#[test]
fn test_short_packets() {
    // RTCP only needs 4 bytes; RTP needs a full 12-byte header.
    assert_eq!(
        infer_rtp_packet_type(&[0x80, 200, 0, 0]),
        RtpPacketType::Rtcp
    );
    assert_eq!(
        infer_rtp_packet_type(&[0x80, 96, 0, 0]),
        RtpPacketType::Unknown
    );
    assert_eq!(infer_rtp_packet_type(&[]), RtpPacketType::Unknown);
}

#[test]
fn test_field_parsers() {
    let mut packet = rtp_bytes(96);
    packet[2..4].copy_from_slice(&0xBEEFu16.to_be_bytes());
    packet[8..12].copy_from_slice(&0x1122_3344u32.to_be_bytes());
    assert_eq!(parse_rtp_sequence_number(&packet), 0xBEEF);
    assert_eq!(parse_rtp_ssrc(&packet), 0x1122_3344);
}
