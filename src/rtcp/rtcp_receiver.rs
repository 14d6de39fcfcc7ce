
use std::rc::Rc;

use log::{debug, warn};

use crate::clock::{Clock, NtpTime};

use super::header::{Header, HEADER_LENGTH, PT_RECEIVER_REPORT, PT_SENDER_REPORT};
use super::receiver_report::ReceiverReport;
use super::sender_report::SenderReport;

/// Sender-report data absorbed from the remote, as needed for the LSR/DLSR
/// fields of outbound receiver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSenderInfo {
    pub ntp_time: NtpTime,
    pub rtp_time: u32,
    /// Local NTP time when the SR arrived.
    pub arrival_ntp: NtpTime,
}

/// Parses inbound RTCP compounds and records the most recent sender report
/// of the remote media source.
pub struct RtcpReceiver {
    clock: Rc<dyn Clock>,
    remote_ssrc: u32,

    remote_sender_ntp_time: NtpTime,
    remote_sender_rtp_time: u32,
    last_received_sr_ntp: NtpTime,
    remote_sender_packet_count: u32,
    remote_sender_octet_count: u32,

    num_skipped_packets: u64,
}

impl RtcpReceiver {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        RtcpReceiver {
            clock,
            remote_ssrc: 0,
            remote_sender_ntp_time: NtpTime::default(),
            remote_sender_rtp_time: 0,
            last_received_sr_ntp: NtpTime::default(),
            remote_sender_packet_count: 0,
            remote_sender_octet_count: 0,
            num_skipped_packets: 0,
        }
    }

    pub fn set_remote_ssrc(&mut self, ssrc: u32) {
        self.remote_ssrc = ssrc;
    }

    pub fn remote_ssrc(&self) -> u32 {
        self.remote_ssrc
    }

    /// The last SR from the remote source, if one arrived.
    pub fn ntp(&self) -> Option<RemoteSenderInfo> {
        if !self.last_received_sr_ntp.valid() {
            return None;
        }
        Some(RemoteSenderInfo {
            ntp_time: self.remote_sender_ntp_time,
            rtp_time: self.remote_sender_rtp_time,
            arrival_ntp: self.last_received_sr_ntp,
        })
    }

    pub fn remote_sender_counts(&self) -> (u32, u32) {
        (
            self.remote_sender_packet_count,
            self.remote_sender_octet_count,
        )
    }

    pub fn num_skipped_packets(&self) -> u64 {
        self.num_skipped_packets
    }

    /// Walks a compound packet by common headers and dispatches the blocks
    /// it understands. A malformed first block voids the whole compound;
    /// later damage only skips the tail.
    pub fn incoming_packet(&mut self, packet: &[u8]) {
        if packet.is_empty() {
            warn!("incoming rtcp packet is empty");
            return;
        }

        let mut pos = 0;
        while pos + HEADER_LENGTH <= packet.len() {
            let header = match Header::unmarshal(&packet[pos..]) {
                Ok(header) => header,
                Err(_) => {
                    if pos == 0 {
                        warn!("invalid incoming rtcp packet");
                        return;
                    }
                    self.num_skipped_packets += 1;
                    break;
                }
            };
            let block_len = header.packet_len();
            if pos + block_len > packet.len() {
                if pos == 0 {
                    warn!("invalid incoming rtcp packet");
                    return;
                }
                self.num_skipped_packets += 1;
                break;
            }
            let block = &packet[pos..pos + block_len];

            match header.packet_type {
                PT_SENDER_REPORT => self.handle_sr(&header, block),
                PT_RECEIVER_REPORT => self.handle_rr(&header, block),
                packet_type => {
                    debug!("unhandled rtcp packet_type: {packet_type}");
                    self.num_skipped_packets += 1;
                }
            }
            pos += block_len;
        }
    }

    fn handle_sr(&mut self, header: &Header, block: &[u8]) {
        let sr = match SenderReport::unmarshal(header, block) {
            Ok(sr) => sr,
            Err(_) => {
                self.num_skipped_packets += 1;
                return;
            }
        };
        if sr.ssrc != self.remote_ssrc {
            return;
        }
        debug!(
            "received SR from ssrc {:#x}, packet_count {}",
            sr.ssrc, sr.packet_count
        );
        self.remote_sender_ntp_time = sr.ntp_time;
        self.remote_sender_rtp_time = sr.rtp_time;
        self.last_received_sr_ntp = self.clock.now_ntp();
        self.remote_sender_packet_count = sr.packet_count;
        self.remote_sender_octet_count = sr.octet_count;
    }

    fn handle_rr(&mut self, header: &Header, block: &[u8]) {
        // Receiver reports carry no state this endpoint consumes; parse for
        // validity accounting only.
        if ReceiverReport::unmarshal(header, block).is_err() {
            self.num_skipped_packets += 1;
        }
    }
}
