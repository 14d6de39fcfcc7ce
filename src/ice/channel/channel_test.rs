use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::*;
use crate::stun::{
    ATTR_ERROR_CODE, ATTR_USERNAME, ATTR_XOR_MAPPED_ADDRESS, BINDING_ERROR_RESPONSE,
    BINDING_RESPONSE,
};

const LOCAL_UFRAG: &str = "abcd";
const LOCAL_PWD: &str = "kkkkkkkkkkkkkkkkkkkkkkkk";
const REMOTE_UFRAG: &str = "wxyz";
const REMOTE_PWD: &str = "rrrrrrrrrrrrrrrrrrrrrrrr";

async fn gathered_channel() -> IceTransportChannel {
    let mut channel = IceTransportChannel::new("audio", IceCandidateComponent::Rtp);
    channel.set_ice_params(IceParameters::new(
        LOCAL_UFRAG.to_owned(),
        LOCAL_PWD.to_owned(),
    ));
    channel
        .gather_candidates("127.0.0.1".parse().unwrap(), 0, 0)
        .await
        .unwrap();
    channel
}

fn binding_request(username: &str, priority: Option<u32>) -> Message {
    let mut request = Message::new(stun::BINDING_REQUEST, stun::TransactionId::new());
    if !username.is_empty() {
        request.add(ATTR_USERNAME, username.as_bytes());
    }
    if let Some(p) = priority {
        request.add(ATTR_PRIORITY, &p.to_be_bytes());
    }
    request.add_message_integrity(REMOTE_PWD);
    request.add_fingerprint();
    request
}

async fn recv_message(socket: &UdpSocket) -> Message {
    let mut buf = [0u8; 1500];
    let (n, _) = timeout(Duration::from_secs(1), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a response")
        .unwrap();
    assert!(Message::validate_fingerprint(&buf[..n]));
    Message::parse(&buf[..n]).unwrap()
}

#[tokio::test]
async fn test_binding_keepalive_creates_prflx_connection() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request(&format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}"), Some(0x6e7f_1eff));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);

    // Binding response with XOR-MAPPED-ADDRESS of the sender, integrity
    // keyed with the local password.
    let response = recv_message(&remote).await;
    assert_eq!(response.typ, BINDING_RESPONSE);
    assert_eq!(response.transaction_id, request.transaction_id);
    let mapped =
        stun::decode_xor_mapped_address(response.get(ATTR_XOR_MAPPED_ADDRESS).unwrap()).unwrap();
    assert_eq!(mapped, remote_addr);
    response.validate_integrity(LOCAL_PWD).unwrap();

    // A peer-reflexive connection now exists carrying the request PRIORITY.
    assert_eq!(channel.connection_count(), 1);
    let conn = channel.connections().values().next().unwrap();
    let remote_candidate = conn.remote_candidate();
    assert_eq!(remote_candidate.typ, PRFLX_PORT_TYPE);
    assert_eq!(remote_candidate.priority, 0x6e7f_1eff);
    assert_eq!(remote_candidate.username, REMOTE_UFRAG);
    assert_eq!(remote_candidate.address, remote_addr);
    assert_eq!(channel.state(), IceTransportState::Checking);
}

#[tokio::test]
async fn test_missing_priority_answered_with_400() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request(&format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}"), None);
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);

    let response = recv_message(&remote).await;
    assert_eq!(response.typ, BINDING_ERROR_RESPONSE);
    let (code, _) = stun::decode_error_code(response.get(ATTR_ERROR_CODE).unwrap()).unwrap();
    assert_eq!(code, 400);
    assert_eq!(channel.connection_count(), 0);
}

#[tokio::test]
async fn test_missing_username_answered_with_400() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request("", Some(1));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);

    let response = recv_message(&remote).await;
    assert_eq!(response.typ, BINDING_ERROR_RESPONSE);
    let (code, _) = stun::decode_error_code(response.get(ATTR_ERROR_CODE).unwrap()).unwrap();
    assert_eq!(code, 400);
}

#[tokio::test]
async fn test_username_mismatch_answered_with_401() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request(&format!("nope:{REMOTE_UFRAG}"), Some(1));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);

    let response = recv_message(&remote).await;
    assert_eq!(response.typ, BINDING_ERROR_RESPONSE);
    let (code, _) = stun::decode_error_code(response.get(ATTR_ERROR_CODE).unwrap()).unwrap();
    assert_eq!(code, 401);
    assert_eq!(channel.connection_count(), 0);
}

#[tokio::test]
async fn test_non_stun_from_unknown_address_dropped() {
    let mut channel = gathered_channel().await;
    channel.take_events();

    channel.on_read_packet(0, &[22, 254, 253, 0, 0], "127.0.0.1:9999".parse().unwrap(), 0, 0);
    assert!(channel
        .take_events()
        .iter()
        .all(|e| !matches!(e, IceChannelEvent::ReadPacket(..))));
}

#[tokio::test]
async fn test_non_stun_from_known_address_forwarded() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request(&format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}"), Some(7));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);
    channel.take_events();

    let dtls_bytes = vec![22u8, 254, 253, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
    channel.on_read_packet(0, &dtls_bytes, remote_addr, 77, 1001);

    let events = channel.take_events();
    let forwarded = events.iter().find_map(|e| match e {
        IceChannelEvent::ReadPacket(data, ts) => Some((data.clone(), *ts)),
        _ => None,
    });
    let (data, ts) = forwarded.expect("non-STUN packet from a known remote must be forwarded");
    assert_eq!(data, dtls_bytes);
    assert_eq!(ts, 77);
}

#[tokio::test]
async fn test_remote_params_trigger_pinging() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    // Connection learned before the answer arrives: no password, no pings.
    let request = binding_request(&format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}"), Some(7));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);
    assert!(!channel.start_pinging());

    channel.set_remote_ice_params(
        IceParameters::new(REMOTE_UFRAG.to_owned(), REMOTE_PWD.to_owned()),
        1001,
    );
    assert!(channel.start_pinging());
    assert!(channel
        .take_events()
        .iter()
        .any(|e| matches!(e, IceChannelEvent::StartPinging)));

    // The check-and-ping cycle now sends a STUN request to the remote.
    let interval = channel.on_check_and_ping(2000);
    assert_eq!(interval, WEAK_PING_INTERVAL);
    let ping = recv_message(&remote).await;
    assert_eq!(ping.typ, stun::BINDING_REQUEST);
    let (remote_part, local_part) =
        stun::split_username(ping.get(ATTR_USERNAME).unwrap()).unwrap();
    assert_eq!(remote_part, REMOTE_UFRAG);
    assert_eq!(local_part, LOCAL_UFRAG);
    ping.validate_integrity(REMOTE_PWD).unwrap();
}

#[tokio::test]
async fn test_response_promotes_channel_to_completed() {
    let mut channel = gathered_channel().await;
    let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let request = binding_request(&format!("{LOCAL_UFRAG}:{REMOTE_UFRAG}"), Some(7));
    channel.on_read_packet(0, request.raw(), remote_addr, 0, 1000);
    channel.set_remote_ice_params(
        IceParameters::new(REMOTE_UFRAG.to_owned(), REMOTE_PWD.to_owned()),
        1001,
    );
    channel.on_check_and_ping(2000);
    let ping = recv_message(&remote).await;

    // Answer the ping with a success response keyed to the remote password.
    let mut response = Message::new(BINDING_RESPONSE, ping.transaction_id);
    response.add_message_integrity(REMOTE_PWD);
    response.add_fingerprint();
    channel.on_read_packet(0, response.raw(), remote_addr, 0, 2100);

    assert!(channel.writable());
    assert_eq!(channel.state(), IceTransportState::Completed);
    let events = channel.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, IceChannelEvent::WritableChanged(true))));
    assert!(events
        .iter()
        .any(|e| matches!(e, IceChannelEvent::StateChanged(IceTransportState::Completed))));
}
