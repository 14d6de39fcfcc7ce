//! Server-role DTLS over the ICE channel: demultiplexes DTLS records from
//! SRTP traffic, caches an early ClientHello until the local certificate is
//! installed, drives the `webrtc-dtls` engine through a bounded adapter and
//! exports the SRTP keying material on completion (RFC 5764).

pub mod endpoint;

#[cfg(test)]
mod dtls_transport_test;

pub use endpoint::IceEndpoint;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dtls::config::{ClientAuthType, Config, ExtendedMasterSecretType};
use dtls::conn::DTLSConn;
use dtls::crypto::Certificate;
use dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use log::{info, warn};
use sha2::{Digest, Sha256};
use util::{Conn, KeyingMaterialExporter};

use crate::error::{Error, Result};
use crate::srtp::SrtpProfile;

pub const DTLS_RECORD_HEADER_LEN: usize = 13;
const MIN_RTP_PACKET_LEN: usize = 12;

const SRTP_MASTER_KEY_LABEL: &str = "EXTRACTOR-dtls_srtp";
const SRTP_MASTER_KEY_LEN: usize = 16;
const SRTP_MASTER_SALT_LEN: usize = 14;
const SRTP_KEY_MATERIAL_LEN: usize = 2 * (SRTP_MASTER_KEY_LEN + SRTP_MASTER_SALT_LEN);

/// First-byte demultiplexing (RFC 5764 section 5.1.2): [20,63] is DTLS,
/// [128,191] is RTP/RTCP, anything else is dropped.
pub fn is_dtls_packet(buf: &[u8]) -> bool {
    buf.len() >= DTLS_RECORD_HEADER_LEN && buf[0] > 19 && buf[0] < 64
}

pub fn is_dtls_client_hello(buf: &[u8]) -> bool {
    is_dtls_packet(buf) && buf.len() > 17 && buf[0] == 22 && buf[13] == 1
}

pub fn is_rtp_packet(buf: &[u8]) -> bool {
    buf.len() >= MIN_RTP_PACKET_LEN && buf[0] & 0xC0 == 0x80
}

/// A datagram may carry several DTLS records; each has a 13-byte header with
/// the body length big-endian at bytes 11..13, and they must tile the
/// datagram exactly.
pub fn validate_dtls_records(buf: &[u8]) -> bool {
    let mut rest = buf;
    while !rest.is_empty() {
        if rest.len() < DTLS_RECORD_HEADER_LEN {
            return false;
        }
        let record_len = ((rest[11] as usize) << 8) | rest[12] as usize;
        if DTLS_RECORD_HEADER_LEN + record_len > rest.len() {
            return false;
        }
        rest = &rest[DTLS_RECORD_HEADER_LEN + record_len..];
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsTransportState {
    New,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl fmt::Display for DtlsTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Keys derived from the DTLS exporter, already split for the server role:
/// `send` is the server write key, `recv` the client write key, each the
/// concatenation of master key and master salt.
#[derive(Clone)]
pub struct SrtpKeyingMaterial {
    pub profile: SrtpProfile,
    pub send_key: Vec<u8>,
    pub recv_key: Vec<u8>,
}

/// Everything the handshake task hands back to the transport.
pub struct HandshakeOutcome {
    pub conn: Option<Arc<DTLSConn>>,
    pub profile: SrtpProtectionProfile,
    pub keying_material: Vec<u8>,
    pub peer_cert: Vec<u8>,
}

/// Ask from the transport to its owner: spawn [`run_handshake`] with these.
pub struct HandshakeRequest {
    pub endpoint: Arc<IceEndpoint>,
    pub config: Config,
}

pub enum DtlsEvent {
    StateChanged(DtlsTransportState),
    WritableChanged(bool),
    ReceivingChanged(bool),
    /// Handshake done and fingerprint verified; install these SRTP keys.
    SrtpKeysReady(SrtpKeyingMaterial),
    /// An SRTP-protected RTP/RTCP packet (only once Connected).
    ReadPacket(Vec<u8>, i64),
    /// The engine must be started; the owner spawns the handshake task.
    StartHandshake(HandshakeRequest),
}

/// Runs the server-role handshake to completion and extracts the negotiated
/// profile, exporter output and peer certificate.
pub async fn run_handshake(
    endpoint: Arc<IceEndpoint>,
    config: Config,
) -> Result<HandshakeOutcome> {
    let conn = DTLSConn::new(
        endpoint as Arc<dyn Conn + Send + Sync>,
        config,
        false,
        None,
    )
    .await
    .map_err(|e| Error::ErrDtlsHandshake(e.to_string()))?;

    let profile = conn.selected_srtpprotection_profile();
    let state = conn.connection_state().await;
    let keying_material = state
        .export_keying_material(SRTP_MASTER_KEY_LABEL, &[], SRTP_KEY_MATERIAL_LEN)
        .await
        .map_err(|e| Error::ErrDtlsHandshake(format!("{e:?}")))?;
    let peer_cert = state.peer_certificates.first().cloned().unwrap_or_default();

    Ok(HandshakeOutcome {
        conn: Some(Arc::new(conn)),
        profile,
        keying_material,
        peer_cert,
    })
}

/// DTLS leg of one peer: state machine, ClientHello cache and the glue
/// around the engine. The owner drains `events` after every call.
pub struct DtlsTransport {
    state: DtlsTransportState,
    writable: bool,
    receiving: bool,
    ice_writable: bool,
    dtls_active: bool,
    handshake_started: bool,

    local_certificate: Option<Certificate>,
    remote_fingerprint_alg: String,
    remote_fingerprint_value: Vec<u8>,
    cached_client_hello: Option<Vec<u8>>,

    endpoint: Arc<IceEndpoint>,
    conn: Option<Arc<DTLSConn>>,
    /// Keys held back until the remote fingerprint has been verified.
    pending_keys: Option<SrtpKeyingMaterial>,
    peer_cert: Vec<u8>,

    events: VecDeque<DtlsEvent>,
}

impl DtlsTransport {
    pub fn new(endpoint: Arc<IceEndpoint>) -> Self {
        DtlsTransport {
            state: DtlsTransportState::New,
            writable: false,
            receiving: false,
            ice_writable: false,
            dtls_active: false,
            handshake_started: false,
            local_certificate: None,
            remote_fingerprint_alg: String::new(),
            remote_fingerprint_value: Vec::new(),
            cached_client_hello: None,
            endpoint,
            conn: None,
            pending_keys: None,
            peer_cert: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> DtlsTransportState {
        self.state
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn take_events(&mut self) -> VecDeque<DtlsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_conn(&mut self) -> Option<Arc<DTLSConn>> {
        self.conn.take()
    }

    pub fn set_local_certificate(&mut self, cert: Certificate) -> Result<()> {
        if self.dtls_active {
            if self
                .local_certificate
                .as_ref()
                .map(|c| *c == cert)
                .unwrap_or(false)
            {
                info!("{self}: ignoring identical DTLS certificate");
                return Ok(());
            }
            warn!("{self}: cannot change certificate in this state");
            return Err(Error::ErrCertificateChange);
        }
        self.local_certificate = Some(cert);
        self.dtls_active = true;
        self.maybe_start_dtls();
        Ok(())
    }

    /// Installs the peer certificate digest learned from signaling. Arriving
    /// before the engine starts it pre-arms verification; arriving after, it
    /// is checked against the already-computed peer certificate.
    pub fn set_remote_fingerprint(&mut self, digest_alg: &str, digest: &[u8]) -> Result<()> {
        if self.dtls_active
            && !digest_alg.is_empty()
            && self.remote_fingerprint_value == digest
            && !self.remote_fingerprint_value.is_empty()
        {
            info!("{self}: ignoring identical remote fingerprint");
            return Ok(());
        }
        if digest_alg.is_empty() {
            warn!("{self}: peer does not support DTLS");
            self.dtls_active = false;
            return Err(Error::ErrDtlsNotActive);
        }
        if !digest_alg.eq_ignore_ascii_case("sha-256") {
            self.set_state(DtlsTransportState::Failed);
            return Err(Error::ErrUnsupportedFingerprintAlgorithm(
                digest_alg.to_owned(),
            ));
        }
        if !self.dtls_active {
            warn!("{self}: cannot set remote fingerprint in this state");
            return Err(Error::ErrDtlsNotActive);
        }

        self.remote_fingerprint_alg = digest_alg.to_ascii_lowercase();
        self.remote_fingerprint_value = digest.to_vec();

        // Handshake already finished: verify right away.
        if !self.peer_cert.is_empty() {
            self.verify_fingerprint_and_finish();
        } else {
            self.maybe_start_dtls();
        }
        Ok(())
    }

    /// ICE writability feeds both the pre-DTLS passthrough and the engine
    /// start gate.
    pub fn on_ice_writable_state(&mut self, writable: bool) {
        info!("{self}: ICE writable changed to {writable}");
        self.ice_writable = writable;
        if !self.dtls_active {
            self.set_writable(writable);
            return;
        }
        match self.state {
            DtlsTransportState::New => self.maybe_start_dtls(),
            DtlsTransportState::Connected => self.set_writable(writable),
            _ => {}
        }
    }

    pub fn on_ice_receiving_state(&mut self, receiving: bool) {
        if self.receiving == receiving {
            return;
        }
        info!("{self}: change receiving to {receiving}");
        self.receiving = receiving;
        self.events.push_back(DtlsEvent::ReceivingChanged(receiving));
    }

    /// Every non-STUN datagram from the ICE channel lands here.
    pub fn on_read_packet(&mut self, buf: &[u8], ts: i64) {
        match self.state {
            DtlsTransportState::New => {
                if is_dtls_client_hello(buf) {
                    info!("{self}: caching DTLS ClientHello until DTLS is started");
                    self.cached_client_hello = Some(buf.to_vec());
                    self.maybe_start_dtls();
                } else {
                    warn!("{self}: not a DTLS ClientHello packet, dropping");
                }
            }
            DtlsTransportState::Connecting | DtlsTransportState::Connected => {
                if is_dtls_packet(buf) {
                    if !self.handle_dtls_packet(buf) {
                        warn!("{self}: handling DTLS packet failed");
                    }
                    return;
                }
                if self.state != DtlsTransportState::Connected {
                    warn!("{self}: received non-DTLS packet before DTLS completed");
                    return;
                }
                if !is_rtp_packet(buf) {
                    warn!("{self}: received unexpected non-DTLS packet");
                    return;
                }
                self.events.push_back(DtlsEvent::ReadPacket(buf.to_vec(), ts));
            }
            _ => {}
        }
    }

    fn handle_dtls_packet(&mut self, buf: &[u8]) -> bool {
        if !validate_dtls_records(buf) {
            return false;
        }
        self.endpoint.feed(buf)
    }

    /// Starts the engine once the certificate is present and either the
    /// remote already spoke (cached ClientHello) or ICE became writable.
    fn maybe_start_dtls(&mut self) {
        if self.handshake_started || self.state != DtlsTransportState::New {
            return;
        }
        let cert = match &self.local_certificate {
            Some(cert) => cert.clone(),
            None => return,
        };
        if self.cached_client_hello.is_none() && !self.ice_writable {
            return;
        }

        let config = Config {
            certificates: vec![cert],
            srtp_protection_profiles: vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            ],
            extended_master_secret: ExtendedMasterSecretType::Require,
            client_auth: ClientAuthType::RequireAnyClientCert,
            insecure_skip_verify: true,
            ..Default::default()
        };

        if let Some(hello) = self.cached_client_hello.take() {
            info!("{self}: replaying cached ClientHello into the engine");
            self.endpoint.feed(&hello);
        }

        self.handshake_started = true;
        info!("{self}: started DTLS in server role");
        self.set_state(DtlsTransportState::Connecting);
        self.events.push_back(DtlsEvent::StartHandshake(HandshakeRequest {
            endpoint: Arc::clone(&self.endpoint),
            config,
        }));
    }

    /// Completion callback from the handshake task.
    pub fn on_handshake_result(&mut self, result: Result<HandshakeOutcome>) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{self}: DTLS handshake failed: {e}");
                self.set_state(DtlsTransportState::Failed);
                return;
            }
        };

        let profile = match outcome.profile {
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80 => SrtpProfile::Aes128CmHmacSha1_80,
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32 => SrtpProfile::Aes128CmHmacSha1_32,
            _ => {
                warn!("{self}: no SRTP protection profile negotiated");
                self.set_state(DtlsTransportState::Failed);
                return;
            }
        };
        if outcome.peer_cert.is_empty() {
            warn!("{self}: no remote certificate presented");
            self.set_state(DtlsTransportState::Failed);
            return;
        }
        if outcome.keying_material.len() < SRTP_KEY_MATERIAL_LEN {
            warn!(
                "{self}: exporter returned short keying material ({} bytes)",
                outcome.keying_material.len()
            );
            self.set_state(DtlsTransportState::Failed);
            return;
        }

        // RFC 5764 section 4.2: client_write_key | server_write_key |
        // client_write_salt | server_write_salt. We are the server.
        let material = &outcome.keying_material;
        let client_key = &material[..SRTP_MASTER_KEY_LEN];
        let server_key = &material[SRTP_MASTER_KEY_LEN..2 * SRTP_MASTER_KEY_LEN];
        let client_salt = &material[2 * SRTP_MASTER_KEY_LEN..2 * SRTP_MASTER_KEY_LEN + SRTP_MASTER_SALT_LEN];
        let server_salt = &material[2 * SRTP_MASTER_KEY_LEN + SRTP_MASTER_SALT_LEN..];

        let mut send_key = server_key.to_vec();
        send_key.extend_from_slice(server_salt);
        let mut recv_key = client_key.to_vec();
        recv_key.extend_from_slice(client_salt);

        self.conn = outcome.conn;
        self.peer_cert = outcome.peer_cert;
        self.pending_keys = Some(SrtpKeyingMaterial {
            profile,
            send_key,
            recv_key,
        });

        if self.remote_fingerprint_value.is_empty() {
            // The answer has not arrived yet; hold the keys until it does.
            info!("{self}: handshake complete, waiting for remote fingerprint");
            return;
        }
        self.verify_fingerprint_and_finish();
    }

    fn verify_fingerprint_and_finish(&mut self) {
        let digest = Sha256::digest(&self.peer_cert);
        if digest.as_slice() != self.remote_fingerprint_value.as_slice() {
            warn!("{self}: remote certificate does not match the signaled fingerprint");
            self.set_state(DtlsTransportState::Failed);
            return;
        }
        info!("{self}: DTLS handshake complete");
        if let Some(keys) = self.pending_keys.take() {
            self.events.push_back(DtlsEvent::SrtpKeysReady(keys));
        }
        self.set_state(DtlsTransportState::Connected);
        self.set_writable(true);
    }

    pub fn close(&mut self) {
        self.endpoint.close();
        self.set_writable(false);
        self.set_state(DtlsTransportState::Closed);
    }

    fn set_state(&mut self, state: DtlsTransportState) {
        if self.state != state {
            info!("{self}: change DTLS state from {} to {state}", self.state);
            self.state = state;
            self.events.push_back(DtlsEvent::StateChanged(state));
        }
    }

    fn set_writable(&mut self, writable: bool) {
        if self.writable != writable {
            info!("{self}: set DTLS writable to {writable}");
            self.writable = writable;
            self.events.push_back(DtlsEvent::WritableChanged(writable));
        }
    }
}

impl fmt::Display for DtlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DtlsTransport[{}|{}]",
            if self.receiving { "R" } else { "-" },
            if self.writable { "W" } else { "-" }
        )
    }
}
