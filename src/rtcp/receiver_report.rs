#[cfg(test)]
mod receiver_report_test;

use bytes::BufMut;

use crate::error::{Error, Result};

use super::header::{Header, HEADER_LENGTH, PT_RECEIVER_REPORT, SSRC_LENGTH};
use super::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

/// An RTCP receiver report (RFC 3550 section 6.4.2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    /// Sender of this report (the reporting endpoint, not a media source).
    pub ssrc: u32,
    pub reports: Vec<ReceptionReport>,
}

impl ReceiverReport {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + SSRC_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH
    }

    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PT_RECEIVER_REPORT,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut impl BufMut) {
        self.header().marshal_to(buf);
        buf.put_u32(self.ssrc);
        for report in &self.reports {
            report.marshal_to(buf);
        }
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf);
        buf
    }

    /// Parses the body of an RR whose common header was already read.
    pub fn unmarshal(header: &Header, buf: &[u8]) -> Result<ReceiverReport> {
        if header.packet_type != PT_RECEIVER_REPORT {
            return Err(Error::ErrWrongRtcpType(header.packet_type));
        }
        let expected = HEADER_LENGTH
            + SSRC_LENGTH
            + header.count as usize * RECEPTION_REPORT_LENGTH;
        if buf.len() < expected {
            return Err(Error::ErrBadRtcpLength);
        }
        let ssrc = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut reports = Vec::with_capacity(header.count as usize);
        let mut pos = HEADER_LENGTH + SSRC_LENGTH;
        for _ in 0..header.count {
            reports.push(ReceptionReport::unmarshal(&buf[pos..])?);
            pos += RECEPTION_REPORT_LENGTH;
        }
        Ok(ReceiverReport { ssrc, reports })
    }
}
