#[cfg(test)]
mod message_test;

use std::fmt;

use crc::{Crc, CRC_32_ISO_HDLC};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

use super::attributes::{ATTR_FINGERPRINT, ATTR_MESSAGE_INTEGRITY};
use super::{
    ATTRIBUTE_HEADER_SIZE, FINGERPRINT_SIZE, FINGERPRINT_XOR_VALUE, MAGIC_COOKIE,
    MESSAGE_HEADER_SIZE, MESSAGE_INTEGRITY_SIZE, TRANSACTION_ID_SIZE,
};

type HmacSha1 = Hmac<Sha1>;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn fingerprint_value(buf: &[u8]) -> u32 {
    CRC32.checksum(buf) ^ FINGERPRINT_XOR_VALUE
}

fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; MESSAGE_INTEGRITY_SIZE] {
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// A fresh random id; every outbound ping gets a unique one.
    pub fn new() -> Self {
        let mut id = [0u8; TRANSACTION_ID_SIZE];
        rand::thread_rng().fill(&mut id);
        TransactionId(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: u16,
    pub value: Vec<u8>,
}

/// A single STUN message. The serialised form is kept in `raw` and updated
/// in step with every added attribute, so MESSAGE-INTEGRITY and FINGERPRINT
/// can hash the exact bytes that go on the wire.
#[derive(Debug, Clone)]
pub struct Message {
    pub typ: u16,
    pub transaction_id: TransactionId,
    attributes: Vec<RawAttribute>,
    raw: Vec<u8>,
}

impl Message {
    pub fn new(typ: u16, transaction_id: TransactionId) -> Self {
        let mut raw = Vec::with_capacity(128);
        raw.extend_from_slice(&typ.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        raw.extend_from_slice(&transaction_id.0);
        Message {
            typ,
            transaction_id,
            attributes: Vec::new(),
            raw,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn length(&self) -> u16 {
        (self.raw.len() - MESSAGE_HEADER_SIZE) as u16
    }

    fn write_length(&mut self, length: u16) {
        self.raw[2..4].copy_from_slice(&length.to_be_bytes());
    }

    /// Appends a TLV attribute, padding the value to a 32-bit boundary.
    pub fn add(&mut self, typ: u16, value: &[u8]) {
        self.raw.extend_from_slice(&typ.to_be_bytes());
        self.raw.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.raw.extend_from_slice(value);
        self.raw.resize(padded(self.raw.len()), 0);
        let length = self.length();
        self.write_length(length);
        self.attributes.push(RawAttribute {
            typ,
            value: value.to_vec(),
        });
    }

    pub fn get(&self, typ: u16) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.typ == typ)
            .map(|a| a.value.as_slice())
    }

    pub fn get_u32(&self, typ: u16) -> Option<u32> {
        let v = self.get(typ)?;
        if v.len() != 4 {
            return None;
        }
        Some(u32::from_be_bytes([v[0], v[1], v[2], v[3]]))
    }

    /// HMAC-SHA1 over the message with the header length rewritten to end at
    /// the MESSAGE-INTEGRITY attribute, keyed with the applicable ICE
    /// password (RFC 5389 section 15.4).
    pub fn add_message_integrity(&mut self, password: &str) {
        let length = self.length();
        let adjusted = length + (ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE) as u16;
        self.write_length(adjusted);
        let mac = hmac_sha1(password.as_bytes(), &self.raw);
        self.write_length(length);
        self.add(ATTR_MESSAGE_INTEGRITY, &mac);
    }

    /// CRC32 of the message up to (excluding) the fingerprint attribute,
    /// XOR-ed with 0x5354554E. Always the last attribute.
    pub fn add_fingerprint(&mut self) {
        let length = self.length();
        let adjusted = length + (ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE) as u16;
        self.write_length(adjusted);
        let val = fingerprint_value(&self.raw);
        self.write_length(length);
        self.add(ATTR_FINGERPRINT, &val.to_be_bytes());
    }

    /// Checks that `buf` carries a well-formed fingerprint as its final
    /// attribute. Cheap and bounds-safe on arbitrary input; a mismatch means
    /// the packet is not STUN at all and belongs to another protocol on the
    /// same 5-tuple.
    pub fn validate_fingerprint(buf: &[u8]) -> bool {
        let fp_attr_size = ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE;
        if buf.len() < MESSAGE_HEADER_SIZE + fp_attr_size || buf.len() % 4 != 0 {
            return false;
        }
        if u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) != MAGIC_COOKIE {
            return false;
        }
        let attr = &buf[buf.len() - fp_attr_size..];
        if u16::from_be_bytes([attr[0], attr[1]]) != ATTR_FINGERPRINT
            || u16::from_be_bytes([attr[2], attr[3]]) != FINGERPRINT_SIZE as u16
        {
            return false;
        }
        let val = u32::from_be_bytes([attr[4], attr[5], attr[6], attr[7]]);
        val == fingerprint_value(&buf[..buf.len() - fp_attr_size])
    }

    /// Parses a message that already passed [`Message::validate_fingerprint`].
    /// The top two bits of the type must be zero; RTP and RTCP land in
    /// 0x80..0xBF and can never alias a STUN method.
    pub fn parse(buf: &[u8]) -> Result<Message> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrStunUnexpectedEof);
        }
        let typ = u16::from_be_bytes([buf[0], buf[1]]);
        if typ & 0xC000 != 0 {
            return Err(Error::ErrNotStunMessage);
        }
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) != MAGIC_COOKIE {
            return Err(Error::ErrNotStunMessage);
        }
        if buf.len() != MESSAGE_HEADER_SIZE + length {
            return Err(Error::ErrStunUnexpectedEof);
        }

        let mut transaction_id = TransactionId::default();
        transaction_id.0.copy_from_slice(&buf[8..MESSAGE_HEADER_SIZE]);

        let mut attributes = Vec::new();
        let mut pos = MESSAGE_HEADER_SIZE;
        while pos + ATTRIBUTE_HEADER_SIZE <= buf.len() {
            let attr_type = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
            let attr_len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
            let value_start = pos + ATTRIBUTE_HEADER_SIZE;
            if value_start + attr_len > buf.len() {
                return Err(Error::ErrStunUnexpectedEof);
            }
            attributes.push(RawAttribute {
                typ: attr_type,
                value: buf[value_start..value_start + attr_len].to_vec(),
            });
            pos = value_start + padded(attr_len);
        }
        if pos != buf.len() {
            return Err(Error::ErrStunUnexpectedEof);
        }

        Ok(Message {
            typ,
            transaction_id,
            attributes,
            raw: buf.to_vec(),
        })
    }

    /// Verifies MESSAGE-INTEGRITY against `password`. The hash input is the
    /// message up to the MI attribute with the header length rewritten as it
    /// was when the sender computed the HMAC.
    pub fn validate_integrity(&self, password: &str) -> Result<()> {
        let mi = self
            .get(ATTR_MESSAGE_INTEGRITY)
            .ok_or(Error::ErrAttributeNotFound)?;
        if mi.len() != MESSAGE_INTEGRITY_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        // Locate the MI attribute inside the raw bytes.
        let mut pos = MESSAGE_HEADER_SIZE;
        let mut mi_pos = None;
        while pos + ATTRIBUTE_HEADER_SIZE <= self.raw.len() {
            let attr_type = u16::from_be_bytes([self.raw[pos], self.raw[pos + 1]]);
            let attr_len =
                u16::from_be_bytes([self.raw[pos + 2], self.raw[pos + 3]]) as usize;
            if attr_type == ATTR_MESSAGE_INTEGRITY {
                mi_pos = Some(pos);
                break;
            }
            pos += ATTRIBUTE_HEADER_SIZE + padded(attr_len);
        }
        let mi_pos = mi_pos.ok_or(Error::ErrAttributeNotFound)?;

        let mut input = self.raw[..mi_pos].to_vec();
        let adjusted =
            (mi_pos + ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE - MESSAGE_HEADER_SIZE)
                as u16;
        input[2..4].copy_from_slice(&adjusted.to_be_bytes());

        let expected = hmac_sha1(password.as_bytes(), &input);
        if expected.ct_eq(mi).unwrap_u8() == 1 {
            Ok(())
        } else {
            Err(Error::ErrIntegrityMismatch)
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={}",
            super::method_to_string(self.typ),
            self.length(),
            self.attributes.len(),
            self.transaction_id
        )
    }
}
