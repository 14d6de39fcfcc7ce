
use bytes::{Buf, BufMut};

use crate::clock::NtpTime;
use crate::error::{Error, Result};

use super::header::{Header, HEADER_LENGTH, PT_SENDER_REPORT, SSRC_LENGTH};
use super::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

const SENDER_INFO_LENGTH: usize = 20;

/// An RTCP sender report (RFC 3550 section 6.4.1). The server only receives
/// these; marshalling exists for tests and loopbacks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: NtpTime,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
}

impl SenderReport {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH
            + SSRC_LENGTH
            + SENDER_INFO_LENGTH
            + self.reports.len() * RECEPTION_REPORT_LENGTH
    }

    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PT_SENDER_REPORT,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf);
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_time.0);
        buf.put_u32(self.rtp_time);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        for report in &self.reports {
            report.marshal_to(&mut buf);
        }
        buf
    }

    /// Parses the body of an SR whose common header was already read.
    pub fn unmarshal(header: &Header, buf: &[u8]) -> Result<SenderReport> {
        if header.packet_type != PT_SENDER_REPORT {
            return Err(Error::ErrWrongRtcpType(header.packet_type));
        }
        let expected = HEADER_LENGTH
            + SSRC_LENGTH
            + SENDER_INFO_LENGTH
            + header.count as usize * RECEPTION_REPORT_LENGTH;
        if buf.len() < expected {
            return Err(Error::ErrBadRtcpLength);
        }

        let mut body = &buf[HEADER_LENGTH..];
        let ssrc = body.get_u32();
        let ntp_time = NtpTime(body.get_u64());
        let rtp_time = body.get_u32();
        let packet_count = body.get_u32();
        let octet_count = body.get_u32();

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut pos = HEADER_LENGTH + SSRC_LENGTH + SENDER_INFO_LENGTH;
        for _ in 0..header.count {
            reports.push(ReceptionReport::unmarshal(&buf[pos..])?);
            pos += RECEPTION_REPORT_LENGTH;
        }

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
        })
    }
}
