//! Control plane: certificate lifecycle, worker shards and the inbound
//! interface the signaling layer drives.

pub mod certificate;
pub mod worker;

pub use certificate::RtcCertificate;
pub use worker::{spawn_worker, WorkerHandle, WorkerMessage};

use std::sync::{Arc, Mutex};

use crc::{Crc, CRC_32_ISO_HDLC};
use log::info;
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::ice::Candidate;
use crate::peer::{LocalDescription, PeerState, RemoteDescription};
use crate::MediaType;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Outbound callbacks toward the stream/signaling layer. Invoked on worker
/// threads in event order; implementations must not block and must not call
/// back into the server synchronously.
pub trait RtcEventObserver: Send + Sync {
    fn on_candidate(&self, uid: u64, stream_name: &str, candidate: &Candidate);
    fn on_peer_state(&self, uid: u64, stream_name: &str, state: PeerState);
    /// Unprotected RTP, after SRTP ingress.
    fn on_rtp_packet(&self, uid: u64, stream_name: &str, media_type: MediaType, payload: &[u8]);
    /// Locally-built RTCP (pre-SRTP), for send-side metrics.
    fn on_local_rtcp_packet(
        &self,
        uid: u64,
        stream_name: &str,
        media_type: MediaType,
        packet: &[u8],
    );
}

/// The media-server endpoint: N worker shards, each a single-threaded
/// reactor, with peers pinned by `crc32(stream_name) % worker_num`.
pub struct RtcServer {
    config: Arc<ServerConfig>,
    workers: Vec<WorkerHandle>,
    certificate: Mutex<Option<Arc<RtcCertificate>>>,
    closed: Mutex<bool>,
}

impl RtcServer {
    pub fn new(config: ServerConfig, observer: Arc<dyn RtcEventObserver>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let mut workers = Vec::with_capacity(config.worker_num);
        for id in 0..config.worker_num {
            workers.push(spawn_worker(id, Arc::clone(&config), Arc::clone(&observer)));
        }
        info!("rtc server started with {} workers", workers.len());

        Ok(RtcServer {
            config,
            workers,
            certificate: Mutex::new(None),
            closed: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn worker_for(&self, stream_name: &str) -> &WorkerHandle {
        let hash = CRC32.checksum(stream_name.as_bytes());
        &self.workers[hash as usize % self.workers.len()]
    }

    /// Returns the shared certificate, generating (or regenerating, after
    /// expiry) on the control thread.
    fn ensure_certificate(&self) -> Result<Arc<RtcCertificate>> {
        let mut guard = self.certificate.lock().expect("certificate lock poisoned");
        let stale = guard.as_ref().map(|c| c.has_expired()).unwrap_or(true);
        if stale {
            *guard = Some(Arc::new(RtcCertificate::generate()?));
        }
        Ok(Arc::clone(guard.as_ref().expect("certificate present")))
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.lock().expect("closed lock poisoned") {
            return Err(Error::ErrServerClosed);
        }
        Ok(())
    }

    /// Allocates a peer on its shard and returns everything the signaling
    /// layer needs to build the local SDP.
    pub async fn create_peer(
        &self,
        uid: u64,
        stream_name: &str,
        audio: bool,
        video: bool,
        dtls_on: bool,
    ) -> Result<LocalDescription> {
        self.check_open()?;
        let certificate = self.ensure_certificate()?;
        let (reply, rx) = oneshot::channel();
        self.worker_for(stream_name).send(WorkerMessage::CreatePeer {
            uid,
            stream_name: stream_name.to_owned(),
            audio,
            video,
            dtls_on,
            certificate,
            reply,
        })?;
        rx.await.map_err(|_| Error::ErrWorkerGone)?
    }

    /// Installs remote ICE credentials and the DTLS certificate digest.
    pub async fn set_remote_description(
        &self,
        uid: u64,
        stream_name: &str,
        desc: RemoteDescription,
    ) -> Result<()> {
        self.check_open()?;
        let (reply, rx) = oneshot::channel();
        self.worker_for(stream_name)
            .send(WorkerMessage::SetRemoteDescription {
                uid,
                stream_name: stream_name.to_owned(),
                desc,
                reply,
            })?;
        rx.await.map_err(|_| Error::ErrWorkerGone)?
    }

    /// Graceful close of one peer.
    pub async fn stop_peer(&self, uid: u64, stream_name: &str) -> Result<()> {
        self.check_open()?;
        let (reply, rx) = oneshot::channel();
        self.worker_for(stream_name).send(WorkerMessage::StopPeer {
            uid,
            stream_name: stream_name.to_owned(),
            reply,
        })?;
        rx.await.map_err(|_| Error::ErrWorkerGone)?
    }

    /// Stops all shards and joins their threads.
    pub fn close(&mut self) {
        {
            let mut closed = self.closed.lock().expect("closed lock poisoned");
            if *closed {
                return;
            }
            *closed = true;
        }
        for worker in &mut self.workers {
            worker.close();
        }
        info!("rtc server stopped");
    }
}

impl Drop for RtcServer {
    fn drop(&mut self) {
        self.close();
    }
}
