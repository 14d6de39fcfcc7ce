#[cfg(test)]
mod rtcp_sender_test;

use std::rc::Rc;

use rand::Rng;

use crate::clock::{compact_ntp, Clock, NtpTime};
use crate::rtp::ReceiveStat;

use super::receiver_report::ReceiverReport;

pub const RTCP_MAX_REPORT_BLOCKS: usize = 31;

const IP_PACKET_SIZE: usize = 1500;
/// IP + UDP header overhead subtracted from the compound budget.
const PACKET_OVERHEAD: usize = 28;

const DEFAULT_AUDIO_REPORT_INTERVAL_MS: i64 = 5000;
const DEFAULT_VIDEO_REPORT_INTERVAL_MS: i64 = 1000;

/// Receive-side timing of the remote's last SR, injected by the module that
/// owns the RTCP receiver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackState {
    /// Local NTP time when the last SR arrived (seconds part).
    pub last_rr_ntp_secs: u32,
    /// Local NTP time when the last SR arrived (fraction part).
    pub last_rr_ntp_frac: u32,
    /// Compact NTP timestamp carried in that SR.
    pub remote_sr: u32,
}

/// Builds the periodic compound receiver report for one media stream.
pub struct RtcpSender {
    clock: Rc<dyn Clock>,
    audio: bool,
    ssrc: u32,
    max_packet_size: usize,
    report_interval_ms: i64,
    cur_report_interval_ms: i64,
}

impl RtcpSender {
    pub fn new(
        clock: Rc<dyn Clock>,
        audio: bool,
        ssrc: u32,
        rtcp_report_interval_ms: Option<u32>,
    ) -> Self {
        let report_interval_ms = rtcp_report_interval_ms
            .map(|ms| ms as i64)
            .unwrap_or(if audio {
                DEFAULT_AUDIO_REPORT_INTERVAL_MS
            } else {
                DEFAULT_VIDEO_REPORT_INTERVAL_MS
            });
        RtcpSender {
            clock,
            audio,
            ssrc,
            max_packet_size: IP_PACKET_SIZE - PACKET_OVERHEAD,
            report_interval_ms,
            // First report fires after half the base interval.
            cur_report_interval_ms: report_interval_ms / 2,
        }
    }

    pub fn audio(&self) -> bool {
        self.audio
    }

    /// Interval until the next report, randomised each cycle.
    pub fn cur_report_interval_ms(&self) -> i64 {
        self.cur_report_interval_ms
    }

    /// Builds one compound RTCP packet (currently a single RR). Returns the
    /// serialised compound, respecting the packet budget.
    pub fn send_rtcp(
        &mut self,
        feedback_state: &FeedbackState,
        receive_stat: &mut ReceiveStat,
    ) -> Vec<u8> {
        self.prepare_report();

        let mut reports = receive_stat.rtcp_report_blocks(RTCP_MAX_REPORT_BLOCKS);

        if !reports.is_empty()
            && (feedback_state.last_rr_ntp_secs > 0 || feedback_state.last_rr_ntp_frac > 0)
        {
            let now = compact_ntp(self.clock.now_ntp());
            let receive_time = compact_ntp(NtpTime::new(
                feedback_state.last_rr_ntp_secs,
                feedback_state.last_rr_ntp_frac,
            ));
            let delay_since_last_sr = now.wrapping_sub(receive_time);
            for report in &mut reports {
                report.last_sender_report = feedback_state.remote_sr;
                report.delay = delay_since_last_sr;
            }
        }

        let rr = ReceiverReport {
            ssrc: self.ssrc,
            reports,
        };

        let mut compound = Vec::with_capacity(rr.marshal_size());
        if rr.marshal_size() <= self.max_packet_size {
            rr.marshal_to(&mut compound);
        }
        compound
    }

    /// Uniformly randomises the next cycle in `[base/2, 3*base/2]`.
    fn prepare_report(&mut self) {
        let min_interval = self.report_interval_ms;
        self.cur_report_interval_ms =
            rand::thread_rng().gen_range(min_interval / 2..=min_interval * 3 / 2);
    }
}
