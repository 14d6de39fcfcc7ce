use super::*;
use crate::stun::attributes::*;
use crate::stun::{BINDING_REQUEST, BINDING_RESPONSE};

fn sample_request(password: &str) -> Message {
    let mut m = Message::new(BINDING_REQUEST, TransactionId::new());
    m.add(ATTR_USERNAME, b"abcd:wxyz");
    m.add(ATTR_PRIORITY, &0x6e7f1effu32.to_be_bytes());
    m.add_message_integrity(password);
    m.add_fingerprint();
    m
}

#[test]
fn test_parse_round_trip() {
    let m = sample_request("kkkkkkkkkkkkkkkkkkkkkkkk");
    assert!(Message::validate_fingerprint(m.raw()));

    let parsed = Message::parse(m.raw()).unwrap();
    assert_eq!(parsed.typ, BINDING_REQUEST);
    assert_eq!(parsed.transaction_id, m.transaction_id);
    assert_eq!(parsed.get(ATTR_USERNAME), Some(&b"abcd:wxyz"[..]));
    assert_eq!(parsed.get_u32(ATTR_PRIORITY), Some(0x6e7f1eff));
    assert_eq!(parsed.raw(), m.raw());
}

#[test]
fn test_fingerprint_rejects_mutation() {
    let m = sample_request("p");
    let mut raw = m.raw().to_vec();
    raw[MESSAGE_HEADER_SIZE + 5] ^= 0x01;
    assert!(!Message::validate_fingerprint(&raw));
}

#[test]
fn test_fingerprint_short_buffer() {
    // 19 bytes: shorter than the header, must not be read past.
    let buf = [0u8; 19];
    assert!(!Message::validate_fingerprint(&buf));
    assert!(!Message::validate_fingerprint(&[]));
    // Header-only message has no fingerprint attribute.
    let m = Message::new(BINDING_REQUEST, TransactionId::new());
    assert!(!Message::validate_fingerprint(m.raw()));
}

#[test]
fn test_fingerprint_must_be_last_attribute() {
    let mut m = Message::new(BINDING_REQUEST, TransactionId::new());
    m.add_fingerprint();
    m.add(ATTR_USERNAME, b"a:b");
    assert!(!Message::validate_fingerprint(m.raw()));
}

#[test]
fn test_integrity_ok_with_matching_password() {
    let pwd = "rrrrrrrrrrrrrrrrrrrrrrrr";
    let m = sample_request(pwd);
    let parsed = Message::parse(m.raw()).unwrap();
    parsed.validate_integrity(pwd).unwrap();
}

#[test]
fn test_integrity_detects_any_flipped_byte() {
    let pwd = "rrrrrrrrrrrrrrrrrrrrrrrr";
    let m = sample_request(pwd);

    // Flip one byte of the covered portion (the USERNAME value).
    let mut raw = m.raw().to_vec();
    raw[MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE] ^= 0x01;
    let parsed = Message::parse(&raw).unwrap();
    assert!(matches!(
        parsed.validate_integrity(pwd),
        Err(Error::ErrIntegrityMismatch)
    ));
}

#[test]
fn test_integrity_detects_wrong_password() {
    let m = sample_request("password-aaaaaaaaaaaaaaa");
    let parsed = Message::parse(m.raw()).unwrap();
    // One bit of difference in the key.
    assert!(matches!(
        parsed.validate_integrity("password-aaaaaaaaaaaaaab"),
        Err(Error::ErrIntegrityMismatch)
    ));
}

#[test]
fn test_integrity_ignores_fingerprint_after_mi() {
    // The fingerprint attribute is appended after MESSAGE-INTEGRITY and must
    // not break verification.
    let pwd = "k";
    let mut with_fp = Message::new(BINDING_RESPONSE, TransactionId::new());
    with_fp.add(ATTR_USERNAME, b"x:y");
    with_fp.add_message_integrity(pwd);
    with_fp.add_fingerprint();
    Message::parse(with_fp.raw())
        .unwrap()
        .validate_integrity(pwd)
        .unwrap();
}

#[test]
fn test_parse_rejects_rtp_like_type() {
    // First byte 0x80 puts the top bits of the type outside STUN space.
    let mut m = sample_request("p");
    let mut raw = m.raw().to_vec();
    raw[0] = 0x80;
    assert!(Message::parse(&raw).is_err());
    // And a length field that disagrees with the buffer.
    m.raw.truncate(m.raw.len() - 1);
    assert!(Message::parse(m.raw()).is_err());
}

#[test]
fn test_parse_skips_unknown_attributes() {
    let mut m = Message::new(BINDING_REQUEST, TransactionId::new());
    m.add(0x7777, b"odd");
    m.add(ATTR_PRIORITY, &42u32.to_be_bytes());
    let parsed = Message::parse(m.raw()).unwrap();
    assert_eq!(parsed.get_u32(ATTR_PRIORITY), Some(42));
    assert_eq!(parsed.get(0x7777), Some(&b"odd"[..]));
}

#[test]
fn test_transaction_ids_are_unique() {
    let a = TransactionId::new();
    let b = TransactionId::new();
    assert_ne!(a, b);
}
