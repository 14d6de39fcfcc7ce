
use std::rc::Rc;

use crate::clock::{compact_ntp, Clock};
use crate::rtp::{ReceiveStat, RtpPacketReceived};

use super::rtcp_receiver::RtcpReceiver;
use super::rtcp_sender::{FeedbackState, RtcpSender};

/// Construction parameters for one RTP/RTCP module instance.
pub struct RtpRtcpConfig {
    pub clock: Rc<dyn Clock>,
    pub audio: bool,
    pub local_media_ssrc: u32,
    pub rtcp_report_interval_ms: Option<u32>,
}

/// Per-media-stream composition of receive statistics, RTCP absorption and
/// the periodic receiver report. Driven by a repeating timer owned by the
/// transport controller.
pub struct RtpRtcp {
    receive_stat: ReceiveStat,
    rtcp_sender: RtcpSender,
    rtcp_receiver: RtcpReceiver,
}

impl RtpRtcp {
    pub fn new(config: RtpRtcpConfig) -> Self {
        RtpRtcp {
            receive_stat: ReceiveStat::new(Rc::clone(&config.clock)),
            rtcp_sender: RtcpSender::new(
                Rc::clone(&config.clock),
                config.audio,
                config.local_media_ssrc,
                config.rtcp_report_interval_ms,
            ),
            rtcp_receiver: RtcpReceiver::new(config.clock),
        }
    }

    pub fn audio(&self) -> bool {
        self.rtcp_sender.audio()
    }

    pub fn set_remote_ssrc(&mut self, ssrc: u32) {
        self.rtcp_receiver.set_remote_ssrc(ssrc);
    }

    pub fn receive_stat(&self) -> &ReceiveStat {
        &self.receive_stat
    }

    pub fn on_rtp_packet(&mut self, packet: &RtpPacketReceived) {
        self.receive_stat.on_rtp_packet(packet);
    }

    pub fn incoming_rtcp(&mut self, packet: &[u8]) {
        self.rtcp_receiver.incoming_packet(packet);
    }

    /// The timer fired: build the compound receiver report, seeding LSR and
    /// DLSR from the last absorbed sender report.
    pub fn time_to_send_rtcp(&mut self) -> Vec<u8> {
        let mut feedback_state = FeedbackState::default();
        if let Some(sr) = self.rtcp_receiver.ntp() {
            feedback_state.last_rr_ntp_secs = sr.arrival_ntp.seconds();
            feedback_state.last_rr_ntp_frac = sr.arrival_ntp.fractions();
            feedback_state.remote_sr = compact_ntp(sr.ntp_time);
        }
        self.rtcp_sender
            .send_rtcp(&feedback_state, &mut self.receive_stat)
    }

    pub fn cur_report_interval_ms(&self) -> i64 {
        self.rtcp_sender.cur_report_interval_ms()
    }
}
