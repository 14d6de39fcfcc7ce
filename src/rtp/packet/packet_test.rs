use super::*;

fn base_packet() -> Vec<u8> {
    let mut packet = vec![0x80u8, 0xE0]; // v2, marker set, pt 96
    packet.extend_from_slice(&0x1234u16.to_be_bytes());
    packet.extend_from_slice(&0x0001_E240u32.to_be_bytes());
    packet.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
    packet.extend_from_slice(b"payload");
    packet
}

#[test]
fn test_parse_fixed_header() {
    let packet = base_packet();
    let header = RtpHeader::parse(&packet).unwrap();
    assert!(header.marker);
    assert_eq!(header.payload_type, 96);
    assert_eq!(header.sequence_number, 0x1234);
    assert_eq!(header.timestamp, 0x0001_E240);
    assert_eq!(header.ssrc, 0xDEAD_BEEF);
    assert_eq!(header.header_len, 12);

    let received = RtpPacketReceived::new(&packet, 90_000).unwrap();
    assert_eq!(received.payload_len, 7);
}

#[test]
fn test_parse_with_csrcs_and_extension() {
    let mut packet = base_packet();
    // Two CSRCs.
    packet[0] = 0x80 | 0x02;
    packet.splice(12..12, [0u8; 8]);
    let header = RtpHeader::parse(&packet).unwrap();
    assert_eq!(header.header_len, 20);

    // Extension of 1 word.
    packet[0] |= 0x10;
    packet.splice(20..20, [0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4]);
    let header = RtpHeader::parse(&packet).unwrap();
    assert_eq!(header.header_len, 28);
}

#[test]
fn test_truncated_packets_rejected() {
    let packet = base_packet();
    assert!(RtpHeader::parse(&packet[..11]).is_err());

    // CSRC count pointing past the end.
    let mut bad = base_packet();
    bad[0] = 0x80 | 0x0F;
    bad.truncate(14);
    assert!(RtpHeader::parse(&bad).is_err());

    // Extension length pointing past the end.
    let mut bad = base_packet();
    bad[0] |= 0x10;
    bad.truncate(12);
    bad.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x10]);
    assert!(RtpHeader::parse(&bad).is_err());
}

#[test]
fn test_wrong_version_rejected() {
    let mut packet = base_packet();
    packet[0] = 0x00;
    assert!(matches!(
        RtpHeader::parse(&packet),
        Err(crate::error::Error::ErrBadVersion)
    ));
}
