#[cfg(test)]
mod channel_test;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use log::{info, warn};

use crate::error::Result;
use crate::stun::{self, Message, ATTR_PRIORITY};

use super::candidate::{Candidate, PRFLX_PORT_TYPE};
use super::connection::{ConnectionAction, IceConnection, WriteState};
use super::controller::IceController;
use super::port::{StunValidation, UdpPort};
use super::{
    IceCandidateComponent, IceParameters, IceTransportState, PING_INTERVAL_DIFF,
    WEAK_PING_INTERVAL,
};

/// Upper bound on learned peer-reflexive connections per channel; going past
/// it answers further unknown addresses with 500 Server Error.
const MAX_CONNECTIONS: usize = 32;

/// Events produced by the channel and drained by its owner after every call
/// into it. Processing happens outside the call that produced the event, so
/// listeners can never re-enter the channel.
#[derive(Debug)]
pub enum IceChannelEvent {
    CandidatesReady(Vec<Candidate>),
    /// A non-STUN datagram from an established remote, for the DTLS layer.
    ReadPacket(Vec<u8>, i64),
    StateChanged(IceTransportState),
    WritableChanged(bool),
    ReceivingChanged(bool),
    /// The first pingable connection appeared; arm the check-and-ping timer.
    StartPinging,
}

/// The per-(transport, component) aggregation of ports, connections and the
/// ping controller. With BUNDLE there is exactly one per peer.
pub struct IceTransportChannel {
    transport_name: String,
    component: IceCandidateComponent,
    ice_params: IceParameters,
    remote_ice_params: Option<IceParameters>,

    ports: Vec<UdpPort>,
    local_candidates: Vec<Candidate>,

    connections: HashMap<u64, IceConnection>,
    conn_by_addr: HashMap<SocketAddr, u64>,
    next_conn_id: u64,
    controller: IceController,

    start_pinging: bool,
    cur_ping_interval: i64,
    last_ping_sent_ms: i64,

    state: IceTransportState,
    writable: bool,
    receiving: bool,
    ever_writable: bool,

    dropped_packets: u64,
    events: VecDeque<IceChannelEvent>,
}

impl IceTransportChannel {
    pub fn new(transport_name: &str, component: IceCandidateComponent) -> Self {
        info!("ice transport channel created, transport_name: {transport_name}, component: {component:?}");
        IceTransportChannel {
            transport_name: transport_name.to_owned(),
            component,
            ice_params: IceParameters::default(),
            remote_ice_params: None,
            ports: Vec::new(),
            local_candidates: Vec::new(),
            connections: HashMap::new(),
            conn_by_addr: HashMap::new(),
            next_conn_id: 0,
            controller: IceController::new(),
            start_pinging: false,
            cur_ping_interval: WEAK_PING_INTERVAL,
            last_ping_sent_ms: 0,
            state: IceTransportState::New,
            writable: false,
            receiving: false,
            ever_writable: false,
            dropped_packets: 0,
            events: VecDeque::new(),
        }
    }

    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    pub fn component(&self) -> IceCandidateComponent {
        self.component
    }

    pub fn state(&self) -> IceTransportState {
        self.state
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn receiving(&self) -> bool {
        self.receiving
    }

    pub fn ports(&self) -> &[UdpPort] {
        &self.ports
    }

    pub fn local_candidates(&self) -> &[Candidate] {
        &self.local_candidates
    }

    pub fn ice_params(&self) -> &IceParameters {
        &self.ice_params
    }

    pub fn take_events(&mut self) -> VecDeque<IceChannelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_ice_params(&mut self, ice_params: IceParameters) {
        info!(
            "{self}: set ICE params, ufrag: {}, pwd: {}",
            ice_params.ufrag, ice_params.pwd
        );
        self.ice_params = ice_params;
    }

    pub fn set_remote_ice_params(&mut self, ice_params: IceParameters, now: i64) {
        info!(
            "{self}: set remote ICE params, ufrag: {}, pwd: {}",
            ice_params.ufrag, ice_params.pwd
        );
        for conn in self.connections.values_mut() {
            conn.maybe_set_remote_ice_params(&ice_params);
        }
        self.remote_ice_params = Some(ice_params);
        self.sort_connections_and_update_state(now);
    }

    /// Binds one UDP port on the configured interface and turns it into the
    /// host candidate. Gathering failure leaves the candidate list empty;
    /// the caller decides whether to abort or retry.
    pub async fn gather_candidates(
        &mut self,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<()> {
        if self.ice_params.is_empty() {
            warn!("{self}: cannot gather candidates, ice ufrag or pwd is empty");
            return Err(crate::error::Error::ErrIceParamsUnset);
        }
        let port = UdpPort::create(
            &self.transport_name,
            self.component,
            self.ice_params.clone(),
            ip,
            min_port,
            max_port,
        )
        .await?;
        self.local_candidates.push(port.candidate().clone());
        self.ports.push(port);
        self.events.push_back(IceChannelEvent::CandidatesReady(
            self.local_candidates.clone(),
        ));
        Ok(())
    }

    /// Entry point for every datagram read off a port socket.
    pub fn on_read_packet(
        &mut self,
        port_idx: usize,
        buf: &[u8],
        addr: SocketAddr,
        ts: i64,
        now: i64,
    ) {
        if port_idx >= self.ports.len() {
            return;
        }
        match self.ports[port_idx].classify_stun(buf) {
            StunValidation::NotStun => {
                if let Some(&id) = self.conn_by_addr.get(&addr) {
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.on_data_received(now);
                    }
                    self.events
                        .push_back(IceChannelEvent::ReadPacket(buf.to_vec(), ts));
                } else {
                    self.dropped_packets += 1;
                }
            }
            StunValidation::Reject(id, code, reason) => {
                self.ports[port_idx].send_binding_error_response(id, addr, code, reason);
            }
            StunValidation::Ok(msg, remote_ufrag) => {
                self.on_stun_message(port_idx, &msg, remote_ufrag, addr, now);
            }
        }
        self.update_aggregate_states(now);
    }

    fn on_stun_message(
        &mut self,
        port_idx: usize,
        msg: &Message,
        remote_ufrag: String,
        addr: SocketAddr,
        now: i64,
    ) {
        match msg.typ {
            stun::BINDING_REQUEST => match self.conn_by_addr.get(&addr).copied() {
                Some(id) => {
                    let username_ok = self
                        .connections
                        .get(&id)
                        .map(|c| c.remote_candidate().username == remote_ufrag)
                        .unwrap_or(false);
                    if !username_ok {
                        warn!(
                            "{self}: received binding request with bad username={remote_ufrag}, id={}",
                            msg.transaction_id
                        );
                        self.ports[port_idx].send_binding_error_response(
                            msg.transaction_id,
                            addr,
                            stun::ERROR_UNAUTHORIZED,
                            stun::REASON_UNAUTHORIZED,
                        );
                        return;
                    }
                    if let Some(conn) = self.connections.get_mut(&id) {
                        conn.on_ping_received(now);
                    }
                    self.ports[port_idx].send_binding_response(msg, addr);
                }
                None => self.on_unknown_address(port_idx, msg, remote_ufrag, addr, now),
            },
            stun::BINDING_RESPONSE | stun::BINDING_ERROR_RESPONSE => {
                if let Some(&id) = self.conn_by_addr.get(&addr) {
                    let action = match self.connections.get_mut(&id) {
                        Some(conn) => conn.on_stun_response(msg, now),
                        None => ConnectionAction::None,
                    };
                    if action == ConnectionAction::Destroy {
                        self.remove_connection(id);
                    }
                }
            }
            _ => {}
        }
        self.sort_connections_and_update_state(now);
    }

    /// A binding request from an address we have never seen: learn it as a
    /// peer-reflexive candidate and build a connection around it.
    fn on_unknown_address(
        &mut self,
        port_idx: usize,
        msg: &Message,
        remote_ufrag: String,
        addr: SocketAddr,
        now: i64,
    ) {
        let priority = match msg.get_u32(ATTR_PRIORITY) {
            Some(p) => p,
            None => {
                warn!("{self}: priority not found in binding request, remote_addr: {addr}");
                self.ports[port_idx].send_binding_error_response(
                    msg.transaction_id,
                    addr,
                    stun::ERROR_BAD_REQUEST,
                    stun::REASON_BAD_REQUEST,
                );
                return;
            }
        };
        if self.connections.len() >= MAX_CONNECTIONS {
            warn!("{self}: create connection failed, remote_addr: {addr}");
            self.ports[port_idx].send_binding_error_response(
                msg.transaction_id,
                addr,
                stun::ERROR_SERVER_ERROR,
                stun::REASON_SERVER_ERROR,
            );
            return;
        }

        let port = &self.ports[port_idx];
        let remote_candidate = Candidate {
            component: self.component,
            protocol: "udp".to_owned(),
            address: addr,
            port: addr.port(),
            priority,
            username: remote_ufrag,
            password: self
                .remote_ice_params
                .as_ref()
                .map(|p| p.pwd.clone())
                .unwrap_or_default(),
            typ: PRFLX_PORT_TYPE.to_owned(),
            foundation: Candidate::compute_foundation("udp", "", &addr),
        };
        info!("{self}: create peer reflexive candidate: {remote_candidate}");

        let mut conn = IceConnection::new(
            port.socket(),
            port.candidate().clone(),
            self.ice_params.clone(),
            remote_candidate,
        );
        conn.on_ping_received(now);
        port.send_binding_response(msg, addr);

        let id = self.next_conn_id;
        self.next_conn_id += 1;
        self.connections.insert(id, conn);
        self.conn_by_addr.insert(addr, id);
        self.controller.add_connection(id);
        info!("{self}: create connection success, remote_addr: {addr}");
    }

    fn remove_connection(&mut self, id: u64) {
        if let Some(conn) = self.connections.remove(&id) {
            let addr = conn.remote_candidate().address;
            self.conn_by_addr.remove(&addr);
        }
        self.controller.on_connection_destroy(id);
    }

    fn sort_connections_and_update_state(&mut self, now: i64) {
        self.maybe_switch_selected_connection();
        self.maybe_start_pinging(now);
    }

    /// Highest pair priority among writable connections wins.
    fn maybe_switch_selected_connection(&mut self) {
        let best = self
            .connections
            .iter()
            .filter(|(_, c)| c.writable())
            .max_by_key(|(_, c)| c.priority())
            .map(|(&id, _)| id);
        if best != self.controller.selected_connection() {
            if let Some(old) = self.controller.selected_connection() {
                if let Some(conn) = self.connections.get_mut(&old) {
                    conn.set_selected(false);
                }
            }
            if let Some(new) = best {
                if let Some(conn) = self.connections.get_mut(&new) {
                    conn.set_selected(true);
                }
                if let Some(conn) = self.connections.get(&new) {
                    info!("{self}: selected connection switched to {conn}");
                }
            }
            self.controller.set_selected_connection(best);
        }
    }

    fn maybe_start_pinging(&mut self, _now: i64) {
        if self.start_pinging {
            return;
        }
        if self.controller.has_pingable_connection(&self.connections) {
            info!("{self}: have a pingable connection for the first time, starting to ping");
            self.start_pinging = true;
            self.events.push_back(IceChannelEvent::StartPinging);
        }
    }

    pub fn start_pinging(&self) -> bool {
        self.start_pinging
    }

    pub fn cur_ping_interval(&self) -> i64 {
        self.cur_ping_interval
    }

    /// One check-and-ping cycle. Returns the interval until the next cycle;
    /// the caller re-arms its timer with whatever comes back, which requeues
    /// automatically whenever the interval changes.
    pub fn on_check_and_ping(&mut self, now: i64) -> i64 {
        for conn in self.connections.values_mut() {
            conn.update_state(now);
        }

        let result = self.controller.select_connection_to_ping(
            &self.connections,
            self.last_ping_sent_ms - PING_INTERVAL_DIFF,
            now,
        );
        if let Some(id) = result.conn_id {
            if let Some(conn) = self.connections.get_mut(&id) {
                self.last_ping_sent_ms = now;
                conn.ping(now);
            }
        }
        if self.cur_ping_interval != result.ping_interval {
            self.cur_ping_interval = result.ping_interval;
        }
        self.sort_connections_and_update_state(now);
        self.update_aggregate_states(now);
        self.cur_ping_interval
    }

    /// Sends one opaque datagram toward the peer, preferring the selected
    /// connection, then any writable one.
    pub fn send_packet(&mut self, buf: &[u8]) -> usize {
        let conn = self
            .controller
            .selected_connection()
            .and_then(|id| self.connections.get(&id))
            .or_else(|| {
                self.connections
                    .values()
                    .filter(|c| c.writable())
                    .max_by_key(|c| c.priority())
            })
            .or_else(|| self.connections.values().next());
        match conn {
            Some(conn) => conn.send_data(buf),
            None => {
                warn!("{self}: no connection to send {} bytes", buf.len());
                0
            }
        }
    }

    pub fn close(&mut self) {
        self.set_state(IceTransportState::Closed);
    }

    fn update_aggregate_states(&mut self, _now: i64) {
        let any_writable = self.connections.values().any(|c| c.writable());
        let any_receiving = self.connections.values().any(|c| c.receiving());
        if any_writable {
            self.ever_writable = true;
        }

        if self.writable != any_writable {
            self.writable = any_writable;
            self.events
                .push_back(IceChannelEvent::WritableChanged(any_writable));
        }
        if self.receiving != any_receiving {
            self.receiving = any_receiving;
            self.events
                .push_back(IceChannelEvent::ReceivingChanged(any_receiving));
        }

        if self.state == IceTransportState::Closed {
            return;
        }
        let selected_writable = self
            .controller
            .selected_connection()
            .and_then(|id| self.connections.get(&id))
            .map(|c| c.writable())
            .unwrap_or(false);
        let all_timed_out = !self.connections.is_empty()
            && self
                .connections
                .values()
                .all(|c| c.write_state() == WriteState::Timeout);

        let next = if self.connections.is_empty() {
            if self.remote_ice_params.is_some() {
                IceTransportState::Checking
            } else {
                IceTransportState::New
            }
        } else if selected_writable {
            IceTransportState::Completed
        } else if any_writable {
            IceTransportState::Connected
        } else if all_timed_out {
            if self.ever_writable {
                IceTransportState::Disconnected
            } else {
                IceTransportState::Failed
            }
        } else {
            IceTransportState::Checking
        };
        self.set_state(next);
    }

    fn set_state(&mut self, state: IceTransportState) {
        if self.state != state {
            info!("{self}: state {} -> {state}", self.state);
            self.state = state;
            self.events.push_back(IceChannelEvent::StateChanged(state));
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Count of non-STUN datagrams from unknown senders, dropped silently.
    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    #[cfg(test)]
    pub(crate) fn connections(&self) -> &HashMap<u64, IceConnection> {
        &self.connections
    }
}

impl fmt::Display for IceTransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channel[{}:{:?}]",
            self.transport_name, self.component
        )
    }
}
