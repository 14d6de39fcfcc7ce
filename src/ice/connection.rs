
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{info, warn};
use tokio::net::UdpSocket;

use crate::stun::{
    self, Message, TransactionId, ATTR_ERROR_CODE, ATTR_ICE_CONTROLLING, ATTR_PRIORITY,
    ATTR_USERNAME, ATTR_USE_CANDIDATE,
};

use super::candidate::{Candidate, ICE_TYPE_PREFERENCE_PRFLX};
use super::IceParameters;

pub const CONNECTION_WRITE_CONNECT_FAILS: usize = 5;
pub const CONNECTION_WRITE_CONNECT_TIMEOUT: i64 = 5000;
pub const CONNECTION_WRITE_TIMEOUT: i64 = 15_000;
pub const WEAK_CONNECTION_RECEIVE_TIMEOUT: i64 = 2500;

const RTT_RATIO: i64 = 3;
const DEFAULT_RTT: i64 = 3000;
const MIN_RTT: i64 = 100;
const MAX_RTT: i64 = 60_000;

/// Writability as seen by the ping scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Init,
    Writable,
    Unreliable,
    Timeout,
}

/// Candidate pair checking state (RFC 5245 section 5.7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePairState {
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SentPing {
    pub id: TransactionId,
    pub sent_ms: i64,
}

/// What the owner must do after feeding an event into a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    None,
    /// A fatal error response arrived; remove and drop this connection.
    Destroy,
}

/// One (local port, remote candidate) pair and its connectivity bookkeeping.
pub struct IceConnection {
    socket: Rc<UdpSocket>,
    local_candidate: Candidate,
    local_params: IceParameters,
    remote: Candidate,

    write_state: WriteState,
    state: CandidatePairState,
    receiving: bool,
    selected: bool,

    last_ping_sent: i64,
    last_ping_received: i64,
    last_ping_response_received: i64,
    last_data_received: i64,

    /// Outstanding pings in send order; cleared by every valid response.
    pings_since_last_response: Vec<SentPing>,
    /// Transaction id -> sent time, for RTT on whichever response arrives.
    pending_requests: HashMap<[u8; 12], i64>,

    rtt: i64,
    rtt_samples: u32,
    num_pings_sent: u32,
}

impl IceConnection {
    pub fn new(
        socket: Rc<UdpSocket>,
        local_candidate: Candidate,
        local_params: IceParameters,
        remote: Candidate,
    ) -> Self {
        IceConnection {
            socket,
            local_candidate,
            local_params,
            remote,
            write_state: WriteState::Init,
            state: CandidatePairState::Waiting,
            receiving: false,
            selected: false,
            last_ping_sent: 0,
            last_ping_received: 0,
            last_ping_response_received: 0,
            last_data_received: 0,
            pings_since_last_response: Vec::new(),
            pending_requests: HashMap::new(),
            rtt: DEFAULT_RTT,
            rtt_samples: 0,
            num_pings_sent: 0,
        }
    }

    pub fn remote_candidate(&self) -> &Candidate {
        &self.remote
    }

    pub fn local_candidate(&self) -> &Candidate {
        &self.local_candidate
    }

    pub fn write_state(&self) -> WriteState {
        self.write_state
    }

    pub fn pair_state(&self) -> CandidatePairState {
        self.state
    }

    pub fn writable(&self) -> bool {
        self.write_state == WriteState::Writable
    }

    pub fn receiving(&self) -> bool {
        self.receiving
    }

    /// Weak means not usable for steady media flow right now.
    pub fn weak(&self) -> bool {
        !self.writable() || !self.receiving()
    }

    pub fn active(&self) -> bool {
        self.write_state != WriteState::Timeout
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn num_pings_sent(&self) -> u32 {
        self.num_pings_sent
    }

    pub fn last_ping_sent(&self) -> i64 {
        self.last_ping_sent
    }

    pub fn rtt(&self) -> i64 {
        self.rtt
    }

    pub fn rtt_samples(&self) -> u32 {
        self.rtt_samples
    }

    pub fn pings_since_last_response(&self) -> &[SentPing] {
        &self.pings_since_last_response
    }

    /// RFC 5245 section 5.7.2: `2^32*MIN(G,D) + 2*MAX(G,D) + (G>D ? 1 : 0)`
    /// with G the local candidate priority and D the remote one.
    pub fn priority(&self) -> u64 {
        let g = self.local_candidate.priority;
        let d = self.remote.priority;
        ((g.min(d) as u64) << 32) + 2 * g.max(d) as u64 + u64::from(g > d)
    }

    /// An answer arriving after the first pings fills in the remote password.
    pub fn maybe_set_remote_ice_params(&mut self, params: &IceParameters) {
        if self.remote.username == params.ufrag && self.remote.password.is_empty() {
            self.remote.password = params.pwd.clone();
        }
    }

    pub fn last_received(&self) -> i64 {
        self.last_ping_received
            .max(self.last_ping_response_received)
            .max(self.last_data_received)
    }

    /// Stable when RTT has converged and nothing is overdue.
    pub fn stable(&self, now: i64) -> bool {
        self.rtt_samples > 3 && !self.missing_response(now)
    }

    fn missing_response(&self, now: i64) -> bool {
        match self.pings_since_last_response.first() {
            Some(ping) => now - ping.sent_ms > 2 * self.rtt,
            None => false,
        }
    }

    fn too_many_ping_fails(&self, max_fails: usize, rtt: i64, now: i64) -> bool {
        if self.pings_since_last_response.len() < max_fails {
            return false;
        }
        let expected_response_time = self.pings_since_last_response[max_fails - 1].sent_ms + rtt;
        now > expected_response_time
    }

    fn too_long_without_response(&self, min_time: i64, now: i64) -> bool {
        match self.pings_since_last_response.first() {
            Some(ping) => now > ping.sent_ms + min_time,
            None => false,
        }
    }

    /// Sends one STUN binding request carrying the reflexive PRIORITY this
    /// connection would have if discovered by the peer.
    pub fn ping(&mut self, now: i64) {
        let id = TransactionId::new();
        let mut request = Message::new(stun::BINDING_REQUEST, id);
        let username = stun::join_username(&self.remote.username, &self.local_params.ufrag);
        request.add(ATTR_USERNAME, username.as_bytes());
        request.add(ATTR_ICE_CONTROLLING, &0u64.to_be_bytes());
        request.add(ATTR_USE_CANDIDATE, &[]);
        let prflx_priority =
            (ICE_TYPE_PREFERENCE_PRFLX << 24) | (self.local_candidate.priority & 0x00FF_FFFF);
        request.add(ATTR_PRIORITY, &prflx_priority.to_be_bytes());
        request.add_message_integrity(&self.remote.password);
        request.add_fingerprint();

        self.last_ping_sent = now;
        self.pings_since_last_response
            .push(SentPing { id, sent_ms: now });
        self.pending_requests.insert(id.0, now);
        info!("{self}: sending STUN ping, id={id}");
        self.send_stun(&request);
        self.set_state(CandidatePairState::InProgress);
        self.num_pings_sent += 1;
    }

    /// Best-effort opaque send toward the remote (DTLS flights, RTCP).
    pub fn send_data(&self, buf: &[u8]) -> usize {
        match self.socket.try_send_to(buf, self.remote.address) {
            Ok(n) => n,
            Err(e) => {
                warn!("{self}: failed to send {} bytes: {e}", buf.len());
                0
            }
        }
    }

    fn send_stun(&self, msg: &Message) {
        match self.socket.try_send_to(msg.raw(), self.remote.address) {
            Ok(_) => {}
            Err(e) => warn!(
                "{self}: failed to send {}: {e}, id={}",
                stun::method_to_string(msg.typ),
                msg.transaction_id
            ),
        }
    }

    /// A validated binding request arrived from this remote.
    pub fn on_ping_received(&mut self, now: i64) {
        self.last_ping_received = now;
        self.update_receiving(now);
    }

    /// Opaque (non-STUN) data arrived from this remote.
    pub fn on_data_received(&mut self, now: i64) {
        self.last_data_received = now;
        self.update_receiving(now);
    }

    /// A binding success or error response arrived. Integrity is verified
    /// with the remote password before anything is believed.
    pub fn on_stun_response(&mut self, msg: &Message, now: i64) -> ConnectionAction {
        if msg.validate_integrity(&self.remote.password).is_err() {
            warn!("{self}: response failed integrity check, id={}", msg.transaction_id);
            return ConnectionAction::None;
        }
        let sent_ms = match self.pending_requests.remove(&msg.transaction_id.0) {
            Some(t) => t,
            None => {
                warn!("{self}: response for unknown request, id={}", msg.transaction_id);
                return ConnectionAction::None;
            }
        };
        let rtt = now - sent_ms;

        match msg.typ {
            stun::BINDING_RESPONSE => {
                info!(
                    "{self}: received {}, id={}, rtt={rtt}, pings={}",
                    stun::method_to_string(msg.typ),
                    msg.transaction_id,
                    self.format_pings_since_last_response(5)
                );
                self.received_ping_response(rtt, now);
                ConnectionAction::None
            }
            stun::BINDING_ERROR_RESPONSE => {
                let code = msg
                    .get(ATTR_ERROR_CODE)
                    .and_then(|v| stun::decode_error_code(v).ok())
                    .map(|(code, _)| code)
                    .unwrap_or(0);
                warn!(
                    "{self}: received error response, id={}, rtt={rtt}, code={code}",
                    msg.transaction_id
                );
                match code {
                    stun::ERROR_UNAUTHORIZED
                    | stun::ERROR_UNKNOWN_ATTRIBUTE
                    | stun::ERROR_SERVER_ERROR => {
                        // May recover; retried by the next scheduled ping.
                        ConnectionAction::None
                    }
                    _ => {
                        self.fail_and_destroy();
                        ConnectionAction::Destroy
                    }
                }
            }
            _ => ConnectionAction::None,
        }
    }

    fn received_ping_response(&mut self, rtt: i64, now: i64) {
        if self.rtt_samples > 0 {
            // 3:1 smoothing, old to new.
            self.rtt = (self.rtt * RTT_RATIO + rtt) / (RTT_RATIO + 1);
        } else {
            self.rtt = rtt;
        }
        self.rtt = self.rtt.clamp(MIN_RTT, MAX_RTT);
        self.rtt_samples += 1;
        self.last_ping_response_received = now;
        self.pings_since_last_response.clear();
        self.update_receiving(now);
        self.set_write_state(WriteState::Writable);
        self.set_state(CandidatePairState::Succeeded);
    }

    pub fn update_receiving(&mut self, now: i64) {
        let receiving = if self.last_ping_sent < self.last_ping_response_received {
            true
        } else {
            self.last_received() > 0
                && now < self.last_received() + WEAK_CONNECTION_RECEIVE_TIMEOUT
        };
        if self.receiving == receiving {
            return;
        }
        info!("{self}: set receiving to {receiving}");
        self.receiving = receiving;
    }

    /// Periodic demotion: Writable -> Unreliable after enough unanswered
    /// pings, and {Unreliable, Init} -> Timeout after a long silence.
    pub fn update_state(&mut self, now: i64) {
        let rtt = (2 * self.rtt).clamp(MIN_RTT, MAX_RTT);

        if self.write_state == WriteState::Writable
            && self.too_many_ping_fails(CONNECTION_WRITE_CONNECT_FAILS, rtt, now)
            && self.too_long_without_response(CONNECTION_WRITE_CONNECT_TIMEOUT, now)
        {
            info!(
                "{self}: unwritable after {CONNECTION_WRITE_CONNECT_FAILS} ping fails and {}ms without a response",
                now - self.pings_since_last_response[0].sent_ms
            );
            self.set_write_state(WriteState::Unreliable);
        }
        if matches!(self.write_state, WriteState::Unreliable | WriteState::Init)
            && self.too_long_without_response(CONNECTION_WRITE_TIMEOUT, now)
        {
            info!(
                "{self}: timeout after {}ms without a response",
                now - self.pings_since_last_response[0].sent_ms
            );
            self.set_write_state(WriteState::Timeout);
        }
        self.update_receiving(now);
    }

    pub fn fail_and_destroy(&mut self) {
        self.set_state(CandidatePairState::Failed);
        info!("{self}: connection destroyed");
    }

    fn set_write_state(&mut self, state: WriteState) {
        if self.write_state != state {
            info!("{self}: set write state {:?} -> {state:?}", self.write_state);
            self.write_state = state;
        }
    }

    fn set_state(&mut self, state: CandidatePairState) {
        if self.state != state {
            info!("{self}: set pair state {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    fn format_pings_since_last_response(&self, max: usize) -> String {
        let mut out = String::new();
        for ping in self.pings_since_last_response.iter().take(max) {
            out.push_str(&ping.id.to_string());
            out.push(' ');
        }
        if self.pings_since_last_response.len() > max {
            out.push_str(&format!(
                "... {} more",
                self.pings_since_last_response.len() - max
            ));
        }
        out
    }
}

impl fmt::Display for IceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conn[{}->{}]",
            self.local_candidate.address, self.remote.address
        )
    }
}
