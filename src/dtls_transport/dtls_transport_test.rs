use tokio::sync::mpsc;

use super::*;

fn new_transport() -> (DtlsTransport, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(IceEndpoint::new(
        tx,
        "127.0.0.1:1000".parse().unwrap(),
        "10.0.0.1:40000".parse().unwrap(),
    ));
    (DtlsTransport::new(endpoint), rx)
}

fn test_certificate() -> Certificate {
    Certificate::generate_self_signed(vec!["rtcgate".to_owned()]).unwrap()
}

fn client_hello() -> Vec<u8> {
    // Handshake record (22), DTLS 1.0 version bytes, epoch/sequence, a
    // 6-byte body whose first byte is the ClientHello handshake type.
    let mut record = vec![22u8, 254, 255, 0, 0, 0, 0, 0, 0, 0, 0];
    record.extend_from_slice(&6u16.to_be_bytes());
    record.extend_from_slice(&[1, 0, 0, 2, 0, 0]);
    record
}

fn keying_material() -> Vec<u8> {
    (0u8..60).collect()
}

#[test]
fn test_packet_classification_bounds() {
    assert!(!is_dtls_packet(&[]));
    assert!(!is_dtls_packet(&[19; 13]));
    assert!(is_dtls_packet(&[20; 13]));
    assert!(is_dtls_packet(&[63; 13]));
    assert!(!is_dtls_packet(&[64; 13]));
    assert!(!is_dtls_packet(&[22; 12]));

    assert!(is_rtp_packet(&[0x80; 12]));
    assert!(is_rtp_packet(&[0xBF; 12]));
    assert!(!is_rtp_packet(&[0xC0; 12]));
    assert!(!is_rtp_packet(&[0x80; 11]));
}

#[test]
fn test_client_hello_detection() {
    assert!(is_dtls_client_hello(&client_hello()));

    // ServerHello (body type 2) is not a ClientHello.
    let mut other = client_hello();
    other[13] = 2;
    assert!(!is_dtls_client_hello(&other));

    // ChangeCipherSpec record type.
    let mut ccs = client_hello();
    ccs[0] = 20;
    assert!(!is_dtls_client_hello(&ccs));
}

#[test]
fn test_record_tiling_validation() {
    let hello = client_hello();
    assert!(validate_dtls_records(&hello));

    // Two records back to back.
    let mut two = hello.clone();
    two.extend_from_slice(&hello);
    assert!(validate_dtls_records(&two));

    // Truncated second record.
    let mut bad = hello.clone();
    bad.extend_from_slice(&hello[..hello.len() - 1]);
    assert!(!validate_dtls_records(&bad));

    // Record length running past the datagram.
    let mut overrun = hello;
    overrun[12] += 1;
    assert!(!validate_dtls_records(&overrun));
}

#[test]
fn test_client_hello_cached_until_certificate() {
    let (mut transport, mut rx) = new_transport();
    transport.on_read_packet(&client_hello(), 0);

    // Still New, nothing sent back, no handshake asked for.
    assert_eq!(transport.state(), DtlsTransportState::New);
    assert!(rx.try_recv().is_err());
    assert!(transport
        .take_events()
        .iter()
        .all(|e| !matches!(e, DtlsEvent::StartHandshake(_))));

    // Installing the certificate replays the cached hello and starts the
    // engine in server role.
    transport.set_local_certificate(test_certificate()).unwrap();
    assert_eq!(transport.state(), DtlsTransportState::Connecting);
    let events = transport.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, DtlsEvent::StartHandshake(_))));
}

#[test]
fn test_non_hello_dropped_in_new_state() {
    let (mut transport, _rx) = new_transport();
    let mut ccs = client_hello();
    ccs[0] = 20;
    transport.on_read_packet(&ccs, 0);
    assert_eq!(transport.state(), DtlsTransportState::New);
    assert!(transport.take_events().is_empty());
}

#[test]
fn test_certificate_starts_engine_on_writable() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    assert_eq!(transport.state(), DtlsTransportState::New);

    transport.on_ice_writable_state(true);
    assert_eq!(transport.state(), DtlsTransportState::Connecting);
}

#[test]
fn test_cannot_change_certificate_once_active() {
    let (mut transport, _rx) = new_transport();
    let cert = test_certificate();
    transport.set_local_certificate(cert.clone()).unwrap();
    // Identical certificate: fine.
    transport.set_local_certificate(cert).unwrap();
    // A different one: refused.
    assert!(matches!(
        transport.set_local_certificate(test_certificate()),
        Err(Error::ErrCertificateChange)
    ));
}

fn complete_handshake(transport: &mut DtlsTransport, peer_cert: &[u8]) {
    transport.on_handshake_result(Ok(HandshakeOutcome {
        conn: None,
        profile: SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
        keying_material: keying_material(),
        peer_cert: peer_cert.to_vec(),
    }));
}

#[test]
fn test_keys_split_for_server_role() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    transport.on_ice_writable_state(true);
    transport.take_events();

    let peer_cert = b"peer certificate der".to_vec();
    let digest = Sha256::digest(&peer_cert);
    transport
        .set_remote_fingerprint("sha-256", digest.as_slice())
        .unwrap();

    complete_handshake(&mut transport, &peer_cert);
    assert_eq!(transport.state(), DtlsTransportState::Connected);
    assert!(transport.writable());

    let events = transport.take_events();
    let keys = events
        .iter()
        .find_map(|e| match e {
            DtlsEvent::SrtpKeysReady(keys) => Some(keys.clone()),
            _ => None,
        })
        .expect("keys must be emitted");
    let material = keying_material();
    // send = server_write_key || server_write_salt, recv = client side.
    assert_eq!(&keys.send_key[..16], &material[16..32]);
    assert_eq!(&keys.send_key[16..], &material[46..60]);
    assert_eq!(&keys.recv_key[..16], &material[..16]);
    assert_eq!(&keys.recv_key[16..], &material[32..46]);
    assert_eq!(keys.profile, SrtpProfile::Aes128CmHmacSha1_80);
}

#[test]
fn test_fingerprint_after_handshake_verifies_peer_cert() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    transport.on_ice_writable_state(true);

    let peer_cert = b"peer certificate der".to_vec();
    complete_handshake(&mut transport, &peer_cert);
    // No fingerprint yet: keys are held back.
    assert_eq!(transport.state(), DtlsTransportState::Connecting);

    let digest = Sha256::digest(&peer_cert);
    transport
        .set_remote_fingerprint("sha-256", digest.as_slice())
        .unwrap();
    assert_eq!(transport.state(), DtlsTransportState::Connected);
    assert!(transport
        .take_events()
        .iter()
        .any(|e| matches!(e, DtlsEvent::SrtpKeysReady(_))));
}

#[test]
fn test_fingerprint_mismatch_fails_transport() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    transport.on_ice_writable_state(true);

    complete_handshake(&mut transport, b"actual peer certificate");
    transport
        .set_remote_fingerprint("sha-256", &[0u8; 32])
        .unwrap();
    assert_eq!(transport.state(), DtlsTransportState::Failed);
}

#[test]
fn test_identical_fingerprint_reinstall_is_noop() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();

    let digest = vec![7u8; 32];
    transport.set_remote_fingerprint("sha-256", &digest).unwrap();
    transport.take_events();
    transport.set_remote_fingerprint("sha-256", &digest).unwrap();
    assert!(transport.take_events().is_empty());
    assert_ne!(transport.state(), DtlsTransportState::Failed);
}

#[test]
fn test_handshake_failure_fails_transport() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    transport.on_ice_writable_state(true);
    transport.on_handshake_result(Err(Error::ErrDtlsHandshake("timeout".to_owned())));
    assert_eq!(transport.state(), DtlsTransportState::Failed);
}

#[test]
fn test_srtp_packets_forwarded_only_when_connected() {
    let (mut transport, _rx) = new_transport();
    transport.set_local_certificate(test_certificate()).unwrap();
    transport.on_ice_writable_state(true);
    transport.take_events();

    let srtp_packet = vec![0x80u8; 64];
    // Connecting: not forwarded.
    transport.on_read_packet(&srtp_packet, 1);
    assert!(transport.take_events().is_empty());

    let peer_cert = b"cert".to_vec();
    let digest = Sha256::digest(&peer_cert);
    transport
        .set_remote_fingerprint("sha-256", digest.as_slice())
        .unwrap();
    complete_handshake(&mut transport, &peer_cert);
    transport.take_events();

    transport.on_read_packet(&srtp_packet, 2);
    let events = transport.take_events();
    assert!(matches!(&events[0], DtlsEvent::ReadPacket(data, 2) if data == &srtp_packet));
}
