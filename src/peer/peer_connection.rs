#[cfg(test)]
mod peer_connection_test;

use std::net::IpAddr;
use std::rc::Rc;

use log::{info, warn};
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::Result;
use crate::server::RtcCertificate;

use super::state::PeerState;
use super::transport_controller::TransportController;
use super::{LocalDescription, RemoteDescription};

/// How long a closed peer lingers before it is dropped, so frames still on
/// the stack unwind safely.
pub const PEER_DESTROY_DELAY_MS: u64 = 10;

/// One media peer: identity, media flags and the transport composition.
pub struct PeerConnection {
    uid: u64,
    stream_name: String,
    audio: bool,
    video: bool,
    dtls_on: bool,

    pub controller: TransportController,
    certificate_fingerprint: String,
    remote_description: Option<RemoteDescription>,

    closed: bool,
    close_notify: Rc<Notify>,
    ping_task_started: bool,
}

impl PeerConnection {
    pub fn new(
        uid: u64,
        stream_name: &str,
        audio: bool,
        video: bool,
        dtls_on: bool,
        clock: Rc<dyn Clock>,
        rtcp_report_interval_ms: Option<u32>,
    ) -> Self {
        PeerConnection {
            uid,
            stream_name: stream_name.to_owned(),
            audio,
            video,
            dtls_on,
            controller: TransportController::new(
                stream_name,
                audio,
                video,
                clock,
                rtcp_report_interval_ms,
            ),
            certificate_fingerprint: String::new(),
            remote_description: None,
            closed: false,
            close_notify: Rc::new(Notify::new()),
            ping_task_started: false,
        }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn audio(&self) -> bool {
        self.audio
    }

    pub fn video(&self) -> bool {
        self.video
    }

    pub fn state(&self) -> PeerState {
        self.controller.state()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close_notify(&self) -> Rc<Notify> {
        Rc::clone(&self.close_notify)
    }

    pub fn ping_task_started(&self) -> bool {
        self.ping_task_started
    }

    pub fn mark_ping_task_started(&mut self) {
        self.ping_task_started = true;
    }

    /// Installs the shared local certificate (when DTLS is on).
    pub fn init(&mut self, certificate: &RtcCertificate) -> Result<()> {
        if !self.dtls_on {
            warn!("{self}: created without DTLS, media cannot be keyed");
            return Ok(());
        }
        self.certificate_fingerprint = certificate.fingerprint_hex.clone();
        self.controller
            .set_local_certificate(certificate.dtls_cert.clone())
    }

    pub async fn start(&mut self, ip: IpAddr, min_port: u16, max_port: u16) -> Result<()> {
        if let Err(e) = self.controller.gather_candidates(ip, min_port, max_port).await {
            // Zero candidates: the upper layer decides whether to retry.
            warn!("{self}: candidate gathering failed: {e}");
        }
        Ok(())
    }

    pub fn local_description(&mut self) -> LocalDescription {
        let ice_params = self.controller.ice_params();
        LocalDescription {
            ice_ufrag: ice_params.ufrag,
            ice_pwd: ice_params.pwd,
            fingerprint_algorithm: "sha-256".to_owned(),
            fingerprint: self.certificate_fingerprint.clone(),
            candidates: self.controller.local_candidates(),
        }
    }

    /// Installs remote ICE credentials and the DTLS certificate digest. A
    /// repeated call with the identical description is a no-op.
    pub fn set_remote_description(&mut self, desc: RemoteDescription, now: i64) -> Result<()> {
        if self
            .remote_description
            .as_ref()
            .map(|prev| prev.fingerprint == desc.fingerprint)
            .unwrap_or(false)
        {
            info!("{self}: remote description unchanged, ignoring");
            return Ok(());
        }
        let result = self.controller.set_remote_description(&desc, now);
        self.remote_description = Some(desc);
        result
    }

    /// Phase one of teardown: unhook from dispatch and notify all per-peer
    /// tasks; the owner drops the peer after a short delay.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        info!("{self}: closing");
        self.closed = true;
        self.controller.close();
        self.close_notify.notify_waiters();
    }
}

impl std::fmt::Display for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Peer[{}|{}]", self.uid, self.stream_name)
    }
}
