use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::spawn_local;
use tokio::time::sleep;

use crate::clock::{self, SystemClock};
use crate::config::ServerConfig;
use crate::dtls_transport::run_handshake;
use crate::error::{Error, Result};
use crate::ice::MAX_UDP_BUFFER_SIZE;
use crate::peer::{
    LocalDescription, PeerConnection, PeerState, RemoteDescription, TransportEvent,
    PEER_DESTROY_DELAY_MS,
};
use crate::MediaType;

use super::certificate::RtcCertificate;
use super::RtcEventObserver;

/// Upper bound on datagrams handled per socket wakeup before yielding back
/// to the reactor, so a burst cannot starve timers.
const MAX_PACKETS_PER_WAKEUP: usize = 64;

/// Messages into a worker shard, consumed by its reactor loop.
pub enum WorkerMessage {
    CreatePeer {
        uid: u64,
        stream_name: String,
        audio: bool,
        video: bool,
        dtls_on: bool,
        certificate: Arc<RtcCertificate>,
        reply: oneshot::Sender<Result<LocalDescription>>,
    },
    SetRemoteDescription {
        uid: u64,
        stream_name: String,
        desc: RemoteDescription,
        reply: oneshot::Sender<Result<()>>,
    },
    StopPeer {
        uid: u64,
        stream_name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Internal: a peer failed and removes itself from dispatch.
    RemovePeer { uid: u64, stream_name: String },
    Close,
}

/// Control-side handle to one shard.
pub struct WorkerHandle {
    id: usize,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn send(&self, msg: WorkerMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::ErrWorkerGone)
    }

    pub fn close(&mut self) {
        let _ = self.tx.send(WorkerMessage::Close);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns one worker shard: an OS thread running a single-threaded reactor.
/// All state of the peers pinned to this shard is touched only here.
pub fn spawn_worker(
    id: usize,
    config: Arc<ServerConfig>,
    observer: Arc<dyn RtcEventObserver>,
) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let self_tx = tx.clone();
    let join = std::thread::Builder::new()
        .name(format!("rtc-worker-{id}"))
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build worker runtime");
            let local = tokio::task::LocalSet::new();
            local.block_on(&rt, worker_loop(id, config, observer, rx, self_tx));
        })
        .expect("failed to spawn worker thread");
    WorkerHandle {
        id,
        tx,
        join: Some(join),
    }
}

struct Worker {
    id: usize,
    config: Arc<ServerConfig>,
    observer: Arc<dyn RtcEventObserver>,
    self_tx: mpsc::UnboundedSender<WorkerMessage>,
    clock: Rc<SystemClock>,
    peers: HashMap<String, Rc<RefCell<PeerConnection>>>,
}

async fn worker_loop(
    id: usize,
    config: Arc<ServerConfig>,
    observer: Arc<dyn RtcEventObserver>,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    self_tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    info!("rtc worker {id} event loop start");
    let mut worker = Worker {
        id,
        config,
        observer,
        self_tx,
        clock: Rc::new(SystemClock),
        peers: HashMap::new(),
    };

    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMessage::CreatePeer {
                uid,
                stream_name,
                audio,
                video,
                dtls_on,
                certificate,
                reply,
            } => {
                let result = worker
                    .create_peer(uid, &stream_name, audio, video, dtls_on, certificate)
                    .await;
                let _ = reply.send(result);
            }
            WorkerMessage::SetRemoteDescription {
                uid,
                stream_name,
                desc,
                reply,
            } => {
                let _ = reply.send(worker.set_remote_description(uid, &stream_name, desc));
            }
            WorkerMessage::StopPeer {
                uid,
                stream_name,
                reply,
            } => {
                let _ = reply.send(worker.stop_peer(uid, &stream_name));
            }
            WorkerMessage::RemovePeer { uid, stream_name } => {
                if let Some(peer) = worker.peers.get(&stream_name) {
                    if peer.borrow().uid() == uid {
                        worker.remove_peer(&stream_name);
                    }
                }
            }
            WorkerMessage::Close => break,
        }
    }

    let names: Vec<String> = worker.peers.keys().cloned().collect();
    for name in names {
        worker.remove_peer(&name);
    }
    info!("rtc worker {id} event loop stop");
}

impl Worker {
    async fn create_peer(
        &mut self,
        uid: u64,
        stream_name: &str,
        audio: bool,
        video: bool,
        dtls_on: bool,
        certificate: Arc<RtcCertificate>,
    ) -> Result<LocalDescription> {
        info!(
            "worker {}: create peer, uid: {uid}, stream: {stream_name}, audio: {audio}, video: {video}",
            self.id
        );
        if self.peers.contains_key(stream_name) {
            warn!("worker {}: replacing existing stream {stream_name}", self.id);
            self.remove_peer(stream_name);
        }

        let mut pc = PeerConnection::new(
            uid,
            stream_name,
            audio,
            video,
            dtls_on,
            self.clock.clone(),
            self.config.rtcp_report_timer_interval_ms,
        );
        pc.init(&certificate)?;

        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| Error::Other(format!("invalid host address: {}", self.config.host)))?;
        pc.start(ip, self.config.ice.min_port, self.config.ice.max_port)
            .await?;
        let local_desc = pc.local_description();

        let peer = Rc::new(RefCell::new(pc));
        self.peers
            .insert(stream_name.to_owned(), Rc::clone(&peer));
        self.spawn_peer_tasks(&peer);
        dispatch_events(&peer, &self.observer, &self.self_tx);
        Ok(local_desc)
    }

    fn set_remote_description(
        &mut self,
        uid: u64,
        stream_name: &str,
        desc: RemoteDescription,
    ) -> Result<()> {
        let peer = self
            .peers
            .get(stream_name)
            .ok_or_else(|| Error::ErrStreamNotFound(stream_name.to_owned()))?;
        if peer.borrow().uid() != uid {
            return Err(Error::ErrUidMismatch(stream_name.to_owned()));
        }
        let result = peer
            .borrow_mut()
            .set_remote_description(desc, clock::now_ms());
        dispatch_events(peer, &self.observer, &self.self_tx);
        result
    }

    fn stop_peer(&mut self, uid: u64, stream_name: &str) -> Result<()> {
        match self.peers.get(stream_name) {
            Some(peer) if peer.borrow().uid() == uid => {
                self.remove_peer(stream_name);
                Ok(())
            }
            Some(_) => Err(Error::ErrUidMismatch(stream_name.to_owned())),
            None => Err(Error::ErrStreamNotFound(stream_name.to_owned())),
        }
    }

    /// Two-phase teardown: close now (unhooks dispatch, notifies tasks),
    /// drop after a short delay so in-flight frames unwind.
    fn remove_peer(&mut self, stream_name: &str) {
        if let Some(peer) = self.peers.remove(stream_name) {
            peer.borrow_mut().close();
            dispatch_events(&peer, &self.observer, &self.self_tx);
            spawn_local(async move {
                sleep(Duration::from_millis(PEER_DESTROY_DELAY_MS)).await;
                drop(peer);
            });
        }
    }

    fn spawn_peer_tasks(&self, peer: &Rc<RefCell<PeerConnection>>) {
        let notify = peer.borrow().close_notify();

        // Socket readers, one per ICE port.
        for (port_idx, socket) in peer.borrow_mut().controller.port_sockets() {
            spawn_local(socket_reader(
                Rc::clone(peer),
                Arc::clone(&self.observer),
                self.self_tx.clone(),
                Rc::clone(&notify),
                port_idx,
                socket,
            ));
        }

        // Engine write path: DTLS flights out through the ICE channel.
        if let Some(mut outbound) = peer.borrow_mut().controller.take_dtls_outbound() {
            let peer = Rc::clone(peer);
            let notify = Rc::clone(&notify);
            spawn_local(async move {
                loop {
                    tokio::select! {
                        _ = notify.notified() => break,
                        data = outbound.recv() => match data {
                            Some(data) => {
                                let mut pc = peer.borrow_mut();
                                if pc.is_closed() {
                                    break;
                                }
                                pc.controller.send_dtls_packet(&data);
                            }
                            None => break,
                        },
                    }
                }
            });
        }

        // RTCP report timers, one per media stream.
        for media_type in peer.borrow().controller.media_types() {
            spawn_local(rtcp_loop(
                Rc::clone(peer),
                Arc::clone(&self.observer),
                self.self_tx.clone(),
                Rc::clone(&notify),
                media_type,
            ));
        }
    }
}

/// Drains transport events into observer callbacks and follow-up tasks.
fn dispatch_events(
    peer: &Rc<RefCell<PeerConnection>>,
    observer: &Arc<dyn RtcEventObserver>,
    self_tx: &mpsc::UnboundedSender<WorkerMessage>,
) {
    loop {
        let (uid, stream_name, events) = {
            let mut pc = peer.borrow_mut();
            let events = pc.controller.take_events();
            (pc.uid(), pc.stream_name().to_owned(), events)
        };
        if events.is_empty() {
            return;
        }
        for event in events {
            match event {
                TransportEvent::LocalCandidates(candidates) => {
                    for candidate in &candidates {
                        observer.on_candidate(uid, &stream_name, candidate);
                    }
                }
                TransportEvent::PeerState(state) => {
                    observer.on_peer_state(uid, &stream_name, state);
                    if state == PeerState::Failed {
                        let _ = self_tx.send(WorkerMessage::RemovePeer {
                            uid,
                            stream_name: stream_name.clone(),
                        });
                    }
                }
                TransportEvent::RtpPacket(media_type, payload) => {
                    observer.on_rtp_packet(uid, &stream_name, media_type, &payload);
                }
                TransportEvent::LocalRtcpPacket(media_type, packet) => {
                    observer.on_local_rtcp_packet(uid, &stream_name, media_type, &packet);
                }
                TransportEvent::StartDtlsHandshake(request) => {
                    let peer = Rc::clone(peer);
                    let observer = Arc::clone(observer);
                    let self_tx = self_tx.clone();
                    spawn_local(async move {
                        let result = run_handshake(request.endpoint, request.config).await;
                        peer.borrow_mut().controller.on_dtls_handshake_result(result);
                        dispatch_events(&peer, &observer, &self_tx);
                    });
                }
                TransportEvent::StartIcePinging => {
                    let start = {
                        let mut pc = peer.borrow_mut();
                        if pc.ping_task_started() {
                            false
                        } else {
                            pc.mark_ping_task_started();
                            true
                        }
                    };
                    if start {
                        let notify = peer.borrow().close_notify();
                        spawn_local(ping_loop(
                            Rc::clone(peer),
                            Arc::clone(observer),
                            self_tx.clone(),
                            notify,
                        ));
                    }
                }
            }
        }
    }
}

/// Drains one ICE port socket. After each readiness wakeup at most
/// [`MAX_PACKETS_PER_WAKEUP`] datagrams are handled before yielding.
async fn socket_reader(
    peer: Rc<RefCell<PeerConnection>>,
    observer: Arc<dyn RtcEventObserver>,
    self_tx: mpsc::UnboundedSender<WorkerMessage>,
    notify: Rc<Notify>,
    port_idx: usize,
    socket: Rc<UdpSocket>,
) {
    let mut buf = vec![0u8; MAX_UDP_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = notify.notified() => break,
            result = socket.recv_from(&mut buf) => {
                let (n, addr) = match result {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!("socket read error: {e}");
                        continue;
                    }
                };
                if !handle_datagram(&peer, port_idx, &buf[..n], addr) {
                    break;
                }
                dispatch_events(&peer, &observer, &self_tx);

                // Drain whatever else is queued, bounded so timers run.
                let mut handled = 1;
                while handled < MAX_PACKETS_PER_WAKEUP {
                    match socket.try_recv_from(&mut buf) {
                        Ok((n, addr)) => {
                            if !handle_datagram(&peer, port_idx, &buf[..n], addr) {
                                return;
                            }
                            dispatch_events(&peer, &observer, &self_tx);
                            handled += 1;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!("socket read error: {e}");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Returns false once the peer is closed.
fn handle_datagram(
    peer: &Rc<RefCell<PeerConnection>>,
    port_idx: usize,
    data: &[u8],
    addr: std::net::SocketAddr,
) -> bool {
    // Kernel receive timestamps are not exposed here; the monotonic clock
    // at read time is the documented fallback.
    let ts = clock::now_micros();
    let now = clock::now_ms();
    let mut pc = peer.borrow_mut();
    if pc.is_closed() {
        return false;
    }
    pc.controller.on_udp_packet(port_idx, data, addr, ts, now);
    true
}

/// The channel's single repeating check-and-ping timer. The interval comes
/// back from every cycle, so a policy change re-arms the timer naturally.
async fn ping_loop(
    peer: Rc<RefCell<PeerConnection>>,
    observer: Arc<dyn RtcEventObserver>,
    self_tx: mpsc::UnboundedSender<WorkerMessage>,
    notify: Rc<Notify>,
) {
    let mut interval = crate::ice::WEAK_PING_INTERVAL;
    loop {
        tokio::select! {
            _ = notify.notified() => break,
            _ = sleep(Duration::from_millis(interval as u64)) => {
                {
                    let mut pc = peer.borrow_mut();
                    if pc.is_closed() {
                        break;
                    }
                    interval = pc.controller.on_ping_timer(clock::now_ms());
                }
                dispatch_events(&peer, &observer, &self_tx);
            }
        }
    }
}

/// Per-media RTCP report timer; each cycle hands back the next randomised
/// interval.
async fn rtcp_loop(
    peer: Rc<RefCell<PeerConnection>>,
    observer: Arc<dyn RtcEventObserver>,
    self_tx: mpsc::UnboundedSender<WorkerMessage>,
    notify: Rc<Notify>,
    media_type: MediaType,
) {
    let mut interval = {
        let pc = peer.borrow();
        pc.controller.rtcp_report_interval(media_type)
    };
    loop {
        tokio::select! {
            _ = notify.notified() => break,
            _ = sleep(Duration::from_millis(interval.max(1) as u64)) => {
                {
                    let mut pc = peer.borrow_mut();
                    if pc.is_closed() {
                        break;
                    }
                    interval = pc.controller.on_rtcp_timer(media_type);
                }
                dispatch_events(&peer, &observer, &self_tx);
            }
        }
    }
}
