use super::*;
use crate::clock::SystemClock;
use crate::stun::{self, Message, TransactionId, ATTR_PRIORITY, ATTR_USERNAME};

const REMOTE_PWD: &str = "rrrrrrrrrrrrrrrrrrrrrrrr";

fn new_controller(audio: bool, video: bool) -> TransportController {
    TransportController::new(
        "teststream",
        audio,
        video,
        Rc::new(SystemClock),
        None,
    )
}

async fn gathered_controller() -> TransportController {
    let mut controller = new_controller(true, true);
    controller
        .gather_candidates("127.0.0.1".parse().unwrap(), 0, 0)
        .await
        .unwrap();
    controller
}

fn remote_description(fingerprint: Vec<u8>) -> RemoteDescription {
    RemoteDescription {
        ice_ufrag: "wxyz".to_owned(),
        ice_pwd: REMOTE_PWD.to_owned(),
        fingerprint_algorithm: "sha-256".to_owned(),
        fingerprint,
        audio_ssrc: Some(0xAAAA),
        video_ssrc: Some(0xBBBB),
    }
}

#[tokio::test]
async fn test_gathering_emits_local_candidates() {
    let mut controller = gathered_controller().await;
    let events = controller.take_events();
    let candidates = events.iter().find_map(|e| match e {
        TransportEvent::LocalCandidates(c) => Some(c.clone()),
        _ => None,
    });
    let candidates = candidates.expect("candidates event");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].typ, "host");
    assert!(!controller.ice_params().ufrag.is_empty());
    assert_eq!(controller.local_candidates().len(), 1);
    assert_eq!(controller.port_sockets().len(), 1);
}

#[tokio::test]
async fn test_binding_request_advances_peer_state() {
    let mut controller = gathered_controller().await;
    let local_ufrag = controller.ice_params().ufrag;
    controller.take_events();

    let remote = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let remote_addr = remote.local_addr().unwrap();

    let mut request = Message::new(stun::BINDING_REQUEST, TransactionId::new());
    request.add(ATTR_USERNAME, format!("{local_ufrag}:wxyz").as_bytes());
    request.add(ATTR_PRIORITY, &0x6e7f_1effu32.to_be_bytes());
    request.add_message_integrity(REMOTE_PWD);
    request.add_fingerprint();

    controller.on_udp_packet(0, request.raw(), remote_addr, 0, 1000);

    // One connection exists now; the aggregate moves to Connecting.
    assert_eq!(controller.state(), PeerState::Connecting);
    let events = controller.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, TransportEvent::PeerState(PeerState::Connecting))));
}

#[tokio::test]
async fn test_remote_description_routes_ssrcs() {
    let mut controller = gathered_controller().await;
    // Without a local certificate the DTLS leg rejects the fingerprint, but
    // the ICE credentials and SSRC routing are installed regardless.
    let _ = controller.set_remote_description(&remote_description(vec![1u8; 32]), 0);
    assert_eq!(controller.media_type_for_ssrc(0xAAAA), MediaType::Audio);
    assert_eq!(controller.media_type_for_ssrc(0xBBBB), MediaType::Video);
    // Unannounced SSRC on a two-media peer defaults to video.
    assert_eq!(controller.media_type_for_ssrc(0x1234), MediaType::Video);
}

#[tokio::test]
async fn test_unmapped_ssrc_single_media_peer() {
    let mut controller = new_controller(true, false);
    assert_eq!(controller.media_type_for_ssrc(42), MediaType::Audio);
    assert_eq!(controller.media_types(), vec![MediaType::Audio]);
}

#[tokio::test]
async fn test_rtcp_timer_emits_local_packet() {
    let mut controller = gathered_controller().await;
    let next = controller.on_rtcp_timer(MediaType::Audio);
    // Audio base interval 5000 ms, randomised in [2500, 7500].
    assert!((2500..=7500).contains(&next));

    let events = controller.take_events();
    let packet = events.iter().find_map(|e| match e {
        TransportEvent::LocalRtcpPacket(MediaType::Audio, packet) => Some(packet.clone()),
        _ => None,
    });
    // An empty RR keepalive is still built and reported.
    let packet = packet.expect("local rtcp event");
    let header = crate::rtcp::Header::unmarshal(&packet).unwrap();
    assert_eq!(header.packet_type, crate::rtcp::PT_RECEIVER_REPORT);
}

#[tokio::test]
async fn test_close_emits_closed_once() {
    let mut controller = gathered_controller().await;
    controller.take_events();
    controller.close();
    let events = controller.take_events();
    let closed_count = events
        .iter()
        .filter(|e| matches!(e, TransportEvent::PeerState(PeerState::Closed)))
        .count();
    assert_eq!(closed_count, 1);

    controller.close();
    assert!(controller.take_events().is_empty());
}
