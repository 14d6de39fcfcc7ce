use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

pub const RECEPTION_REPORT_LENGTH: usize = 24;

/// One reception report block: the receive statistics for a single
/// synchronization source, as carried in SR and RR packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionReport {
    /// Source this block reports on.
    pub ssrc: u32,
    /// Fraction of packets lost since the previous report, Q8.
    pub fraction_lost: u8,
    /// Cumulative packets lost, clamped to 24 bits.
    pub total_lost: u32,
    /// Extended highest sequence number received: cycle count in the top
    /// 16 bits, sequence number in the bottom 16.
    pub last_sequence_number: u32,
    /// Interarrival jitter in timestamp units.
    pub jitter: u32,
    /// Compact NTP timestamp of the last SR from this source.
    pub last_sender_report: u32,
    /// Delay since that SR arrived, in 1/65536 seconds.
    pub delay: u32,
}

impl ReceptionReport {
    pub fn marshal_to(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        // 24-bit cumulative loss.
        buf.put_u8(((self.total_lost >> 16) & 0xFF) as u8);
        buf.put_u8(((self.total_lost >> 8) & 0xFF) as u8);
        buf.put_u8((self.total_lost & 0xFF) as u8);
        buf.put_u32(self.last_sequence_number);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay);
    }

    pub fn unmarshal(mut buf: &[u8]) -> Result<ReceptionReport> {
        if buf.len() < RECEPTION_REPORT_LENGTH {
            return Err(Error::ErrRtcpTooSmall);
        }
        let ssrc = buf.get_u32();
        let fraction_lost = buf.get_u8();
        let total_lost =
            ((buf.get_u8() as u32) << 16) | ((buf.get_u8() as u32) << 8) | buf.get_u8() as u32;
        Ok(ReceptionReport {
            ssrc,
            fraction_lost,
            total_lost,
            last_sequence_number: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sender_report: buf.get_u32(),
            delay: buf.get_u32(),
        })
    }
}
