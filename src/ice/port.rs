
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use log::{info, warn};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::stun::{self, Message, TransactionId, ATTR_USERNAME, ATTR_XOR_MAPPED_ADDRESS};

use super::candidate::{Candidate, ICE_TYPE_PREFERENCE_HOST, LOCAL_PORT_TYPE};
use super::{IceCandidateComponent, IceParameters};

/// UDP datagrams are never larger than this on the media path.
pub const MAX_UDP_BUFFER_SIZE: usize = 1500;

/// Outcome of inbound STUN pre-validation on a port.
pub enum StunValidation {
    /// A well-formed message; for binding requests the remote ufrag has been
    /// recovered from USERNAME.
    Ok(Box<Message>, String),
    /// Reply with the given STUN error code.
    Reject(TransactionId, u16, &'static str),
    /// Not a STUN packet at all (hand it to the DTLS layer).
    NotStun,
}

/// One bound UDP socket backing one local host candidate.
pub struct UdpPort {
    transport_name: String,
    component: IceCandidateComponent,
    ice_params: IceParameters,
    socket: Rc<UdpSocket>,
    local_addr: SocketAddr,
    candidate: Candidate,
}

/// Binds inside `[min_port, max_port]`, or an ephemeral port when the range
/// is `0..0`. Exhaustion of the range fails candidate gathering.
async fn bind_in_range(ip: IpAddr, min_port: u16, max_port: u16) -> Result<UdpSocket> {
    if min_port == 0 && max_port == 0 {
        return Ok(UdpSocket::bind(SocketAddr::new(ip, 0)).await?);
    }
    for port in min_port..=max_port {
        match UdpSocket::bind(SocketAddr::new(ip, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::ErrNoFreePortInRange {
        min: min_port,
        max: max_port,
    })
}

impl UdpPort {
    pub async fn create(
        transport_name: &str,
        component: IceCandidateComponent,
        ice_params: IceParameters,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<Self> {
        let socket = bind_in_range(ip, min_port, max_port).await?;
        let local_addr = socket.local_addr()?;
        info!("prepared socket address: {local_addr}");

        let candidate = Candidate {
            component,
            protocol: "udp".to_owned(),
            address: local_addr,
            port: local_addr.port(),
            priority: Candidate::compute_priority(ICE_TYPE_PREFERENCE_HOST, 0, component),
            username: ice_params.ufrag.clone(),
            password: ice_params.pwd.clone(),
            typ: LOCAL_PORT_TYPE.to_owned(),
            foundation: Candidate::compute_foundation("udp", "", &local_addr),
        };

        Ok(UdpPort {
            transport_name: transport_name.to_owned(),
            component,
            ice_params,
            socket: Rc::new(socket),
            local_addr,
            candidate,
        })
    }

    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    pub fn component(&self) -> IceCandidateComponent {
        self.component
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn ice_ufrag(&self) -> &str {
        &self.ice_params.ufrag
    }

    pub fn ice_pwd(&self) -> &str {
        &self.ice_params.pwd
    }

    pub fn socket(&self) -> Rc<UdpSocket> {
        Rc::clone(&self.socket)
    }

    /// Best-effort datagram send; a full socket buffer counts as zero bytes
    /// sent and the packet is lost (upper layers tolerate loss).
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> usize {
        match self.socket.try_send_to(buf, addr) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                warn!("[{}] send_to {addr} failed: {e}", self.transport_name);
                0
            }
        }
    }

    /// Classifies an inbound datagram: a packet whose fingerprint checks out
    /// and whose type has the top two bits clear is STUN, everything else is
    /// forwarded opaque. For binding requests the username and message
    /// integrity are validated against this port's credentials.
    pub fn classify_stun(&self, buf: &[u8]) -> StunValidation {
        if buf.is_empty() || buf[0] & 0xC0 != 0 || !Message::validate_fingerprint(buf) {
            return StunValidation::NotStun;
        }
        let msg = match Message::parse(buf) {
            Ok(msg) => msg,
            Err(_) => return StunValidation::NotStun,
        };

        if msg.typ != stun::BINDING_REQUEST {
            // Responses are integrity-checked against the remote password by
            // the owning connection.
            return StunValidation::Ok(Box::new(msg), String::new());
        }

        let id = msg.transaction_id;
        let username = match msg.get(ATTR_USERNAME) {
            Some(v) => v,
            None => {
                return StunValidation::Reject(id, stun::ERROR_BAD_REQUEST, stun::REASON_BAD_REQUEST)
            }
        };
        let (local_ufrag, remote_ufrag) = match stun::split_username(username) {
            Ok(parts) => parts,
            Err(_) => {
                return StunValidation::Reject(id, stun::ERROR_BAD_REQUEST, stun::REASON_BAD_REQUEST)
            }
        };
        if local_ufrag != self.ice_params.ufrag {
            warn!(
                "[{}] binding request with bad username={local_ufrag}:{remote_ufrag}",
                self.transport_name
            );
            return StunValidation::Reject(id, stun::ERROR_UNAUTHORIZED, stun::REASON_UNAUTHORIZED);
        }

        StunValidation::Ok(Box::new(msg), remote_ufrag)
    }

    /// Binding success response: XOR-MAPPED-ADDRESS of the sender, integrity
    /// keyed with the local password, fingerprint last.
    pub fn send_binding_response(&self, request: &Message, addr: SocketAddr) {
        let mut response = Message::new(stun::BINDING_RESPONSE, request.transaction_id);
        match stun::encode_xor_mapped_address(&addr) {
            Ok(value) => response.add(ATTR_XOR_MAPPED_ADDRESS, &value),
            Err(_) => {
                warn!("[{}] cannot map address {addr}", self.transport_name);
                return;
            }
        }
        response.add_message_integrity(&self.ice_params.pwd);
        response.add_fingerprint();

        if self.send_to(response.raw(), addr) == 0 {
            warn!(
                "[{}] failed to send {} to {addr}, id={}",
                self.transport_name,
                stun::method_to_string(response.typ),
                response.transaction_id
            );
        } else {
            info!(
                "[{}] sent {} to {addr}, id={}",
                self.transport_name,
                stun::method_to_string(response.typ),
                response.transaction_id
            );
        }
    }

    pub fn send_binding_error_response(
        &self,
        transaction_id: TransactionId,
        addr: SocketAddr,
        code: u16,
        reason: &str,
    ) {
        let mut response = Message::new(stun::BINDING_ERROR_RESPONSE, transaction_id);
        response.add(stun::ATTR_ERROR_CODE, &stun::encode_error_code(code, reason));
        response.add_fingerprint();
        self.send_to(response.raw(), addr);
        info!(
            "[{}] sent error response {code} to {addr}",
            self.transport_name
        );
    }
}
