use super::*;

fn sample_report(ssrc: u32) -> ReceptionReport {
    ReceptionReport {
        ssrc,
        fraction_lost: 63,
        total_lost: 2,
        last_sequence_number: 10,
        jitter: 56,
        last_sender_report: 0x63FF_8000,
        delay: 16_384,
    }
}

#[test]
fn test_marshal_unmarshal_round_trip() {
    let rr = ReceiverReport {
        ssrc: 1,
        reports: vec![sample_report(0x1122_3344), sample_report(0x5566_7788)],
    };
    let buf = rr.marshal();
    assert_eq!(buf.len(), rr.marshal_size());
    assert_eq!(buf.len(), 8 + 2 * 24);

    let header = Header::unmarshal(&buf).unwrap();
    assert_eq!(header.packet_type, PT_RECEIVER_REPORT);
    assert_eq!(header.count, 2);
    assert_eq!(header.packet_len(), buf.len());

    let parsed = ReceiverReport::unmarshal(&header, &buf).unwrap();
    assert_eq!(parsed, rr);
}

#[test]
fn test_empty_report_is_valid() {
    let rr = ReceiverReport {
        ssrc: 7,
        reports: vec![],
    };
    let buf = rr.marshal();
    assert_eq!(buf.len(), 8);
    let header = Header::unmarshal(&buf).unwrap();
    let parsed = ReceiverReport::unmarshal(&header, &buf).unwrap();
    assert_eq!(parsed.ssrc, 7);
    assert!(parsed.reports.is_empty());
}

#[test]
fn test_total_lost_is_24_bits() {
    let mut report = sample_report(1);
    report.total_lost = 0x7F_FFFF;
    let rr = ReceiverReport {
        ssrc: 1,
        reports: vec![report],
    };
    let buf = rr.marshal();
    let header = Header::unmarshal(&buf).unwrap();
    let parsed = ReceiverReport::unmarshal(&header, &buf).unwrap();
    assert_eq!(parsed.reports[0].total_lost, 0x7F_FFFF);
}

#[test]
fn test_truncated_body_rejected() {
    let rr = ReceiverReport {
        ssrc: 1,
        reports: vec![sample_report(2)],
    };
    let buf = rr.marshal();
    let header = Header::unmarshal(&buf).unwrap();
    assert!(ReceiverReport::unmarshal(&header, &buf[..buf.len() - 1]).is_err());
}
