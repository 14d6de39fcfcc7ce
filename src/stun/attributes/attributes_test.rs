use super::*;

#[test]
fn test_xor_mapped_address_round_trip() {
    let addr: SocketAddr = "10.0.0.1:40000".parse().unwrap();
    let value = encode_xor_mapped_address(&addr).unwrap();
    assert_eq!(value.len(), 8);
    assert_eq!(value[1], 0x01);
    assert_eq!(decode_xor_mapped_address(&value).unwrap(), addr);
}

#[test]
fn test_xor_mapped_address_actually_xors() {
    let addr: SocketAddr = "192.168.1.2:5000".parse().unwrap();
    let value = encode_xor_mapped_address(&addr).unwrap();
    let raw_port = u16::from_be_bytes([value[2], value[3]]);
    assert_ne!(raw_port, 5000);
    assert_eq!(raw_port ^ (MAGIC_COOKIE >> 16) as u16, 5000);
}

#[test]
fn test_xor_mapped_address_rejects_ipv6() {
    let addr: SocketAddr = "[2001:db8::1]:5001".parse().unwrap();
    assert!(encode_xor_mapped_address(&addr).is_err());
}

#[test]
fn test_error_code_round_trip() {
    for (code, reason) in [
        (400u16, "Bad Request"),
        (401, "Unauthorized"),
        (500, "Server Error"),
    ] {
        let value = encode_error_code(code, reason);
        let (got_code, got_reason) = decode_error_code(&value).unwrap();
        assert_eq!(got_code, code);
        assert_eq!(got_reason, reason);
    }
}

#[test]
fn test_error_code_too_short() {
    assert!(decode_error_code(&[0, 0, 4]).is_err());
}

#[test]
fn test_split_username() {
    let (local, remote) = split_username(b"abcd:wxyz").unwrap();
    assert_eq!(local, "abcd");
    assert_eq!(remote, "wxyz");

    assert!(split_username(b"nodelimiter").is_err());
    assert!(split_username(b":empty").is_err());
    assert!(split_username(b"empty:").is_err());
    assert!(split_username(&[0xff, 0xfe, b':', b'a']).is_err());
}

#[test]
fn test_join_username_order() {
    assert_eq!(join_username("wxyz", "abcd"), "wxyz:abcd");
}
