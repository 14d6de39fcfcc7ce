
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::clock::Clock;
use crate::rtcp::ReceptionReport;

use super::packet::RtpPacketReceived;

const MAX_REORDERING_THRESHOLD: i64 = 450;
const STREAM_STAT_TIMEOUT_MS: i64 = 8000;
/// Interarrival deltas past this many RTP clock units (5 s of 90 kHz video)
/// are treated as clock jumps and excluded from the jitter estimate.
const MAX_JITTER_DIFF: i32 = 450_000;

/// Unwraps 16-bit sequence numbers into a monotonic 64-bit space using a
/// rolling last value.
#[derive(Debug, Default)]
struct SeqUnwrapper {
    last: Option<i64>,
}

fn is_newer(value: u16, prev: u16) -> bool {
    value != prev && value.wrapping_sub(prev) < 0x8000
}

impl SeqUnwrapper {
    fn unwrap_without_update(&self, value: u16) -> i64 {
        let last = match self.last {
            Some(last) => last,
            None => return value as i64,
        };
        let cropped = (last & 0xFFFF) as u16;
        let mut delta = value as i64 - cropped as i64;
        if is_newer(value, cropped) {
            if delta < 0 {
                delta += 1 << 16;
            }
        } else if delta > 0 && last + delta - (1 << 16) >= 0 {
            delta -= 1 << 16;
        }
        last + delta
    }

    fn update_last(&mut self, value: i64) {
        self.last = Some(value);
    }
}

/// Receive statistics of one inbound SSRC: extended sequence tracking,
/// cumulative loss, interarrival jitter and the report-block generation
/// watermarks.
pub struct StreamStat {
    ssrc: u32,
    clock: Rc<dyn Clock>,

    packets_received: u64,
    packets_retransmitted: u64,

    seq_unwrapper: SeqUnwrapper,
    received_seq_first: i64,
    received_seq_max: i64,
    received_seq_out_of_order: Option<u16>,

    /// May go negative when retransmissions arrive without RTX.
    cumulative_loss: i32,
    last_report_seq_max: i64,
    last_report_cumulative_loss: i32,
    cumulative_loss_rtcp_offset: i32,
    cumulative_loss_is_capped: bool,

    last_received_timestamp: u32,
    last_received_time_ms: i64,
    jitter_q4: u32,
}

impl StreamStat {
    fn new(ssrc: u32, clock: Rc<dyn Clock>) -> Self {
        StreamStat {
            ssrc,
            clock,
            packets_received: 0,
            packets_retransmitted: 0,
            seq_unwrapper: SeqUnwrapper::default(),
            received_seq_first: -1,
            received_seq_max: -1,
            received_seq_out_of_order: None,
            cumulative_loss: 0,
            last_report_seq_max: -1,
            last_report_cumulative_loss: 0,
            cumulative_loss_rtcp_offset: 0,
            cumulative_loss_is_capped: false,
            last_received_timestamp: 0,
            last_received_time_ms: 0,
            jitter_q4: 0,
        }
    }

    fn received_rtp_packet(&self) -> bool {
        self.received_seq_first >= 0
    }

    pub fn cumulative_loss(&self) -> i32 {
        self.cumulative_loss
    }

    pub fn received_seq_max(&self) -> i64 {
        self.received_seq_max
    }

    pub fn jitter_q4(&self) -> u32 {
        self.jitter_q4
    }

    pub fn update_counters(&mut self, packet: &RtpPacketReceived) {
        let now_ms = self.clock.now_ms();
        self.packets_received += 1;
        // Speculative: an in-order packet explains exactly one expected slot.
        self.cumulative_loss -= 1;

        let sequence_number = self
            .seq_unwrapper
            .unwrap_without_update(packet.header.sequence_number);

        if !self.received_rtp_packet() {
            self.received_seq_first = sequence_number;
            self.received_seq_max = sequence_number - 1;
        } else if self.update_out_of_order(packet, sequence_number) {
            return;
        }

        // In-order arrival.
        self.cumulative_loss += (sequence_number - self.received_seq_max) as i32;
        self.received_seq_max = sequence_number;
        self.seq_unwrapper.update_last(sequence_number);

        if packet.header.timestamp != self.last_received_timestamp
            && (self.packets_received - self.packets_retransmitted) > 1
        {
            self.update_jitter(packet, now_ms);
        }

        self.last_received_timestamp = packet.header.timestamp;
        self.last_received_time_ms = now_ms;
    }

    /// Returns true when the packet is a reorder (or possible sequence
    /// mutation) that must not advance `received_seq_max`.
    fn update_out_of_order(&mut self, packet: &RtpPacketReceived, sequence_number: i64) -> bool {
        if let Some(armed) = self.received_seq_out_of_order.take() {
            let expected = armed.wrapping_add(1);
            if packet.header.sequence_number == expected {
                // Two adjacent packets far outside the window: the sender
                // restarted its sequence numbering. Resync to it.
                self.received_seq_max = sequence_number - 2;
                return false;
            }
        }

        if (sequence_number - self.received_seq_max).abs() > MAX_REORDERING_THRESHOLD {
            self.received_seq_out_of_order = Some(packet.header.sequence_number);
            // Undo the speculative decrement; this packet explained nothing.
            self.cumulative_loss += 1;
            return true;
        }

        if sequence_number > self.received_seq_max {
            // A gap: handled by the in-order path.
            return false;
        }

        // Genuine reorder: the earlier speculative decrement stands and
        // cancels the loss this packet was once counted as.
        true
    }

    /// RFC 3550 appendix A.8, in Q4 timestamp units.
    fn update_jitter(&mut self, packet: &RtpPacketReceived, receive_time_ms: i64) {
        let receive_time_diff = receive_time_ms - self.last_received_time_ms;
        let receive_rtp_diff =
            (receive_time_diff * packet.payload_type_frequency as i64 / 1000) as u32;

        let send_rtp_diff = packet
            .header
            .timestamp
            .wrapping_sub(self.last_received_timestamp);
        let time_diff_samples = (receive_rtp_diff.wrapping_sub(send_rtp_diff) as i32).abs();

        if time_diff_samples < MAX_JITTER_DIFF {
            let jitter_q4_diff = ((time_diff_samples as u32) << 4) as i32 - self.jitter_q4 as i32;
            self.jitter_q4 = (self.jitter_q4 as i32 + ((jitter_q4_diff + 8) >> 4)) as u32;
        }
    }

    /// Appends a report block unless the stream is silent (no packet for
    /// 8000 ms) or never started, and advances the report watermarks.
    pub fn maybe_append_report_block(&mut self, result: &mut Vec<ReceptionReport>) {
        let now_ms = self.clock.now_ms();
        if now_ms - self.last_received_time_ms > STREAM_STAT_TIMEOUT_MS {
            return;
        }
        if !self.received_rtp_packet() {
            return;
        }

        let mut stats = ReceptionReport {
            ssrc: self.ssrc,
            ..Default::default()
        };

        let exp_since_last = self.received_seq_max - self.last_report_seq_max;
        let loss_since_last = self.cumulative_loss - self.last_report_cumulative_loss;
        if exp_since_last > 0 && loss_since_last > 0 {
            stats.fraction_lost = (255 * loss_since_last as i64 / exp_since_last) as u8;
        }

        let mut packets_lost = self.cumulative_loss + self.cumulative_loss_rtcp_offset;
        if packets_lost < 0 {
            // Clamp to zero and remember the excess so future reports keep
            // reporting a sane non-negative total.
            packets_lost = 0;
            self.cumulative_loss_rtcp_offset = -self.cumulative_loss;
        }
        if packets_lost > 0x7F_FFFF {
            if !self.cumulative_loss_is_capped {
                self.cumulative_loss_is_capped = true;
                warn!("cumulative loss reached max value for ssrc {}", self.ssrc);
            }
            packets_lost = 0x7F_FFFF;
        }
        stats.total_lost = packets_lost as u32;
        stats.last_sequence_number = self.received_seq_max as u32;
        stats.jitter = self.jitter_q4 >> 4;
        result.push(stats);

        self.last_report_seq_max = self.received_seq_max;
        self.last_report_cumulative_loss = self.cumulative_loss;
    }
}

/// All per-SSRC stats of one peer, created lazily on first packet.
pub struct ReceiveStat {
    clock: Rc<dyn Clock>,
    stats: HashMap<u32, StreamStat>,
    all_ssrcs: Vec<u32>,
    last_returned_ssrc_idx: usize,
}

impl ReceiveStat {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        ReceiveStat {
            clock,
            stats: HashMap::new(),
            all_ssrcs: Vec::new(),
            last_returned_ssrc_idx: 0,
        }
    }

    pub fn on_rtp_packet(&mut self, packet: &RtpPacketReceived) {
        self.get_or_create_stat(packet.header.ssrc)
            .update_counters(packet);
    }

    pub fn get_or_create_stat(&mut self, ssrc: u32) -> &mut StreamStat {
        let clock = Rc::clone(&self.clock);
        let all_ssrcs = &mut self.all_ssrcs;
        self.stats.entry(ssrc).or_insert_with(|| {
            all_ssrcs.push(ssrc);
            StreamStat::new(ssrc, clock)
        })
    }

    pub fn stat(&self, ssrc: u32) -> Option<&StreamStat> {
        self.stats.get(&ssrc)
    }

    /// Collects up to `max_blocks` report blocks, rotating over SSRCs so no
    /// stream starves when there are more sources than block slots.
    pub fn rtcp_report_blocks(&mut self, max_blocks: usize) -> Vec<ReceptionReport> {
        let mut result = Vec::with_capacity(max_blocks.min(self.all_ssrcs.len()));
        if self.all_ssrcs.is_empty() {
            return result;
        }
        let mut ssrc_idx = self.last_returned_ssrc_idx;
        for i in 0..self.all_ssrcs.len() {
            if result.len() >= max_blocks {
                break;
            }
            ssrc_idx = (self.last_returned_ssrc_idx + 1 + i) % self.all_ssrcs.len();
            let ssrc = self.all_ssrcs[ssrc_idx];
            if let Some(stat) = self.stats.get_mut(&ssrc) {
                stat.maybe_append_report_block(&mut result);
            }
        }
        self.last_returned_ssrc_idx = ssrc_idx;
        result
    }
}
