use super::*;
use crate::clock::SystemClock;
use crate::peer::TransportEvent;

fn new_peer() -> PeerConnection {
    PeerConnection::new(
        7,
        "camera-1",
        true,
        true,
        true,
        Rc::new(SystemClock),
        None,
    )
}

fn remote_description(fingerprint: Vec<u8>) -> RemoteDescription {
    RemoteDescription {
        ice_ufrag: "wxyz".to_owned(),
        ice_pwd: "rrrrrrrrrrrrrrrrrrrrrrrr".to_owned(),
        fingerprint_algorithm: "sha-256".to_owned(),
        fingerprint,
        audio_ssrc: Some(0xAAAA),
        video_ssrc: None,
    }
}

#[tokio::test]
async fn test_local_description_carries_credentials_and_candidates() {
    let certificate = RtcCertificate::generate().unwrap();
    let mut pc = new_peer();
    pc.init(&certificate).unwrap();
    pc.start("127.0.0.1".parse().unwrap(), 0, 0).await.unwrap();

    let desc = pc.local_description();
    assert_eq!(desc.ice_ufrag.len(), 4);
    assert_eq!(desc.ice_pwd.len(), 24);
    assert_eq!(desc.fingerprint_algorithm, "sha-256");
    assert_eq!(desc.fingerprint, certificate.fingerprint_hex);
    assert_eq!(desc.candidates.len(), 1);
    assert_eq!(desc.candidates[0].username, desc.ice_ufrag);
}

#[tokio::test]
async fn test_set_remote_description_idempotent() {
    let certificate = RtcCertificate::generate().unwrap();
    let mut pc = new_peer();
    pc.init(&certificate).unwrap();

    let fingerprint = vec![9u8; 32];
    pc.set_remote_description(remote_description(fingerprint.clone()), 0)
        .unwrap();
    pc.controller.take_events();

    // The identical description again: nothing changes, no events.
    pc.set_remote_description(remote_description(fingerprint), 1)
        .unwrap();
    assert!(pc.controller.take_events().is_empty());
}

#[tokio::test]
async fn test_close_is_terminal_and_notifies() {
    let certificate = RtcCertificate::generate().unwrap();
    let mut pc = new_peer();
    pc.init(&certificate).unwrap();
    let notify = pc.close_notify();
    let notified = notify.notified();
    tokio::pin!(notified);
    // Register interest before closing.
    assert!(futures_poll_pending(&mut notified).await);

    pc.close();
    assert!(pc.is_closed());
    assert_eq!(pc.state(), PeerState::Closed);
    let events = pc.controller.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, TransportEvent::PeerState(PeerState::Closed))));
    // The notification reached registered waiters.
    notified.await;

    // A second close is a no-op.
    pc.close();
    assert!(pc.controller.take_events().is_empty());
}

/// Polls a future once, reporting whether it is still pending.
async fn futures_poll_pending<F: std::future::Future + Unpin>(fut: &mut F) -> bool {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::Poll;
    let mut polled_pending = false;
    std::future::poll_fn(|cx| {
        polled_pending = Pin::new(&mut *fut).poll(cx).is_pending();
        Poll::Ready(())
    })
    .await;
    polled_pending
}
