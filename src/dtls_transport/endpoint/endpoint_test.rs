use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::*;

fn endpoint() -> (Arc<IceEndpoint>, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ep = Arc::new(IceEndpoint::new(
        tx,
        "127.0.0.1:1000".parse().unwrap(),
        "127.0.0.1:2000".parse().unwrap(),
    ));
    (ep, rx)
}

#[tokio::test]
async fn test_feed_then_recv() {
    let (ep, _rx) = endpoint();
    assert!(ep.feed(&[1, 2, 3]));

    let mut buf = [0u8; 16];
    let n = ep.recv(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3]);
}

#[tokio::test]
async fn test_recv_blocks_until_fed() {
    let (ep, _rx) = endpoint();
    let reader = Arc::clone(&ep);
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        let n = reader.recv(&mut buf).await.unwrap();
        buf[..n].to_vec()
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    ep.feed(b"hello");
    let got = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(got, b"hello");
}

#[tokio::test]
async fn test_queue_bounded_to_two_packets() {
    let (ep, _rx) = endpoint();
    assert!(ep.feed(&[1]));
    assert!(ep.feed(&[2]));
    assert!(!ep.feed(&[3]));

    let mut buf = [0u8; 4];
    assert_eq!(ep.recv(&mut buf).await.unwrap(), 1);
    assert_eq!(buf[0], 1);
    // Room again after a drain.
    assert!(ep.feed(&[4]));
}

#[tokio::test]
async fn test_oversized_packet_dropped() {
    let (ep, _rx) = endpoint();
    let big = vec![0u8; MAX_DTLS_PACKET_LEN + 1];
    assert!(!ep.feed(&big));
    let ok = vec![0u8; MAX_DTLS_PACKET_LEN];
    assert!(ep.feed(&ok));
}

#[tokio::test]
async fn test_send_forwards_to_ice_channel() {
    let (ep, mut rx) = endpoint();
    let n = ep.send(b"flight").await.unwrap();
    assert_eq!(n, 6);
    assert_eq!(rx.recv().await.unwrap(), b"flight");
}

#[tokio::test]
async fn test_close_wakes_reader() {
    let (ep, _rx) = endpoint();
    let reader = Arc::clone(&ep);
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        reader.recv(&mut buf).await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    IceEndpoint::close(&ep);
    let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(result.is_err());
}
