
use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

pub const RTCP_VERSION: u8 = 2;
pub const HEADER_LENGTH: usize = 4;
pub const SSRC_LENGTH: usize = 4;

/// RTCP packet types handled by the receive pipeline.
pub const PT_SENDER_REPORT: u8 = 200;
pub const PT_RECEIVER_REPORT: u8 = 201;

/// The common RTCP packet header (RFC 3550 section 6.4.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|    RC   |   PT          |             length            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub padding: bool,
    /// Report count or packet subtype, 5 bits.
    pub count: u8,
    pub packet_type: u8,
    /// Packet length in 32-bit words, minus one.
    pub length: u16,
}

impl Header {
    pub fn marshal_to(&self, buf: &mut impl BufMut) {
        let mut b0 = RTCP_VERSION << 6;
        if self.padding {
            b0 |= 1 << 5;
        }
        b0 |= self.count & 0x1F;
        buf.put_u8(b0);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.length);
    }

    pub fn unmarshal(mut buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::ErrRtcpTooSmall);
        }
        let b0 = buf.get_u8();
        if b0 >> 6 != RTCP_VERSION {
            return Err(Error::ErrBadVersion);
        }
        Ok(Header {
            padding: b0 & (1 << 5) != 0,
            count: b0 & 0x1F,
            packet_type: buf.get_u8(),
            length: buf.get_u16(),
        })
    }

    /// Total size of the packet this header announces, in bytes.
    pub fn packet_len(&self) -> usize {
        (self.length as usize + 1) * 4
    }
}
