use super::*;
use crate::clock::testutil::ManualClock;
use crate::rtp::{RtpHeader, RtpPacketReceived};

fn feed_packets(stat: &mut ReceiveStat, clock: &ManualClock, ssrc: u32, count: u16) {
    for i in 0..count {
        let packet = RtpPacketReceived {
            header: RtpHeader {
                marker: false,
                payload_type: 111,
                sequence_number: 100 + i,
                timestamp: i as u32 * 960,
                ssrc,
                header_len: 12,
            },
            payload_len: 120,
            payload_type_frequency: 48_000,
        };
        stat.on_rtp_packet(&packet);
        clock.advance(20);
    }
}

fn setup(audio: bool, interval: Option<u32>) -> (Rc<ManualClock>, RtcpSender, ReceiveStat) {
    let clock = Rc::new(ManualClock::new(0));
    let sender = RtcpSender::new(Rc::clone(&clock) as Rc<dyn Clock>, audio, 1, interval);
    let stat = ReceiveStat::new(Rc::clone(&clock) as Rc<dyn Clock>);
    (clock, sender, stat)
}

#[test]
fn test_report_contains_blocks_for_active_streams() {
    let (clock, mut sender, mut stat) = setup(true, None);
    feed_packets(&mut stat, &clock, 0xAAAA, 10);

    let compound = sender.send_rtcp(&FeedbackState::default(), &mut stat);
    let header = crate::rtcp::Header::unmarshal(&compound).unwrap();
    assert_eq!(header.packet_type, crate::rtcp::PT_RECEIVER_REPORT);
    let rr = crate::rtcp::ReceiverReport::unmarshal(&header, &compound).unwrap();
    assert_eq!(rr.ssrc, 1);
    assert_eq!(rr.reports.len(), 1);
    assert_eq!(rr.reports[0].ssrc, 0xAAAA);
    // No SR seen yet: LSR and DLSR stay zero.
    assert_eq!(rr.reports[0].last_sender_report, 0);
    assert_eq!(rr.reports[0].delay, 0);
}

#[test]
fn test_lsr_dlsr_applied_to_every_block() {
    let (clock, mut sender, mut stat) = setup(true, None);
    feed_packets(&mut stat, &clock, 0xAAAA, 5);
    feed_packets(&mut stat, &clock, 0xBBBB, 5);

    let arrival = crate::clock::NtpTime::new(0x0001_0000, 0);
    // 250 ms after the SR arrived: 250 * 65536 / 1000 compact units.
    clock.set_ntp(crate::clock::NtpTime(arrival.0 + ((250u64 << 32) / 1000)));
    let feedback = FeedbackState {
        last_rr_ntp_secs: arrival.seconds(),
        last_rr_ntp_frac: arrival.fractions(),
        remote_sr: 0x63FF_8000,
    };
    let compound = sender.send_rtcp(&feedback, &mut stat);
    let header = crate::rtcp::Header::unmarshal(&compound).unwrap();
    let rr = crate::rtcp::ReceiverReport::unmarshal(&header, &compound).unwrap();
    assert_eq!(rr.reports.len(), 2);
    for report in &rr.reports {
        assert_eq!(report.last_sender_report, 0x63FF_8000);
        let expected = 250 * 65_536 / 1000;
        assert!((report.delay as i64 - expected).abs() <= 1, "{}", report.delay);
    }
}

#[test]
fn test_interval_randomised_within_bounds() {
    let (_clock, mut sender, mut stat) = setup(true, None);
    assert_eq!(sender.cur_report_interval_ms(), 2500);
    for _ in 0..50 {
        sender.send_rtcp(&FeedbackState::default(), &mut stat);
        let interval = sender.cur_report_interval_ms();
        assert!((2500..=7500).contains(&interval), "{interval}");
    }
}

#[test]
fn test_video_and_override_intervals() {
    let (_clock, sender, _stat) = setup(false, None);
    assert_eq!(sender.cur_report_interval_ms(), 500);

    let (_clock, sender, _stat) = setup(false, Some(2000));
    assert_eq!(sender.cur_report_interval_ms(), 1000);
}

#[test]
fn test_empty_receiver_report_when_no_streams() {
    let (_clock, mut sender, mut stat) = setup(true, None);
    let compound = sender.send_rtcp(&FeedbackState::default(), &mut stat);
    let header = crate::rtcp::Header::unmarshal(&compound).unwrap();
    assert_eq!(header.count, 0);
    assert_eq!(compound.len(), 8);
}
