#[cfg(test)]
mod transport_controller_test;

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;

use dtls::crypto::Certificate;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::dtls_transport::{
    DtlsEvent, DtlsTransport, HandshakeOutcome, HandshakeRequest, IceEndpoint,
};
use crate::error::Result;
use crate::ice::{Candidate, IceAgent, IceCandidateComponent, IceChannelEvent, IceParameters};
use crate::rtcp::{RtpRtcp, RtpRtcpConfig};
use crate::rtp::{self, RtpPacketReceived, RtpPacketType};
use crate::srtp::SrtpTransport;
use crate::MediaType;

use super::state::{aggregate_peer_state, PeerState};
use super::RemoteDescription;

const AUDIO_CLOCK_RATE: u32 = 48_000;
const VIDEO_CLOCK_RATE: u32 = 90_000;
/// Sender SSRC of locally-built receiver reports (this endpoint never sends
/// media of its own).
const LOCAL_REPORT_SSRC: u32 = 1;

/// Outputs of the per-peer transport composition, drained by the peer after
/// every call into it.
pub enum TransportEvent {
    LocalCandidates(Vec<Candidate>),
    PeerState(PeerState),
    /// Unprotected RTP payload, routed by media type.
    RtpPacket(MediaType, Vec<u8>),
    /// Locally-built RTCP compound (pre-SRTP), for send-side metrics.
    LocalRtcpPacket(MediaType, Vec<u8>),
    /// The DTLS engine wants to start; spawn `run_handshake` with this.
    StartDtlsHandshake(HandshakeRequest),
    /// The first pingable connection exists; arm the check-and-ping timer.
    StartIcePinging,
}

/// Owns the per-peer composition of {ICE agent, DTLS transport, SRTP
/// transport, RTP/RTCP modules} and aggregates their states.
pub struct TransportController {
    transport_name: String,
    clock: Rc<dyn Clock>,

    agent: IceAgent,
    dtls: DtlsTransport,
    srtp: SrtpTransport,
    rtp_rtcp: HashMap<MediaType, RtpRtcp>,
    ssrc_to_media: HashMap<u32, MediaType>,

    dtls_outbound: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    pc_state: PeerState,
    closed: bool,
    events: VecDeque<TransportEvent>,
}

impl TransportController {
    pub fn new(
        transport_name: &str,
        audio: bool,
        video: bool,
        clock: Rc<dyn Clock>,
        rtcp_report_interval_ms: Option<u32>,
    ) -> Self {
        let mut agent = IceAgent::new();
        let channel = agent.create_channel(transport_name, IceCandidateComponent::Rtp);
        channel.set_ice_params(IceParameters::random());

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let placeholder = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let endpoint = Arc::new(IceEndpoint::new(outbound_tx, placeholder, placeholder));
        let dtls = DtlsTransport::new(endpoint);

        let mut rtp_rtcp = HashMap::new();
        if audio {
            rtp_rtcp.insert(
                MediaType::Audio,
                RtpRtcp::new(RtpRtcpConfig {
                    clock: Rc::clone(&clock),
                    audio: true,
                    local_media_ssrc: LOCAL_REPORT_SSRC,
                    rtcp_report_interval_ms,
                }),
            );
        }
        if video {
            rtp_rtcp.insert(
                MediaType::Video,
                RtpRtcp::new(RtpRtcpConfig {
                    clock: Rc::clone(&clock),
                    audio: false,
                    local_media_ssrc: LOCAL_REPORT_SSRC,
                    rtcp_report_interval_ms,
                }),
            );
        }

        TransportController {
            transport_name: transport_name.to_owned(),
            clock,
            agent,
            dtls,
            srtp: SrtpTransport::new(),
            rtp_rtcp,
            ssrc_to_media: HashMap::new(),
            dtls_outbound: Some(outbound_rx),
            pc_state: PeerState::New,
            closed: false,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> PeerState {
        self.pc_state
    }

    pub fn media_types(&self) -> Vec<MediaType> {
        self.rtp_rtcp.keys().copied().collect()
    }

    pub fn take_events(&mut self) -> VecDeque<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    /// The engine-write side of the DTLS adapter; the owner pumps it into
    /// [`TransportController::send_dtls_packet`].
    pub fn take_dtls_outbound(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.dtls_outbound.take()
    }

    pub fn ice_params(&mut self) -> IceParameters {
        self.channel()
            .map(|c| c.ice_params().clone())
            .unwrap_or_default()
    }

    pub fn local_candidates(&mut self) -> Vec<Candidate> {
        self.channel()
            .map(|c| c.local_candidates().to_vec())
            .unwrap_or_default()
    }

    pub fn port_sockets(&mut self) -> Vec<(usize, Rc<tokio::net::UdpSocket>)> {
        match self.channel() {
            Some(channel) => channel
                .ports()
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.socket()))
                .collect(),
            None => Vec::new(),
        }
    }

    fn channel(&mut self) -> Option<&mut crate::ice::IceTransportChannel> {
        self.agent
            .get_channel(&self.transport_name, IceCandidateComponent::Rtp)
    }

    pub fn set_local_certificate(&mut self, cert: Certificate) -> Result<()> {
        let result = self.dtls.set_local_certificate(cert);
        self.pump();
        result
    }

    pub async fn gather_candidates(
        &mut self,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<()> {
        let result = self.agent.gather_candidates(ip, min_port, max_port).await;
        self.pump();
        result
    }

    pub fn set_remote_description(&mut self, desc: &RemoteDescription, now: i64) -> Result<()> {
        self.agent.set_remote_ice_params(
            &self.transport_name,
            IceCandidateComponent::Rtp,
            IceParameters::new(desc.ice_ufrag.clone(), desc.ice_pwd.clone()),
            now,
        );

        if let Some(ssrc) = desc.audio_ssrc {
            self.ssrc_to_media.insert(ssrc, MediaType::Audio);
            if let Some(module) = self.rtp_rtcp.get_mut(&MediaType::Audio) {
                module.set_remote_ssrc(ssrc);
            }
        }
        if let Some(ssrc) = desc.video_ssrc {
            self.ssrc_to_media.insert(ssrc, MediaType::Video);
            if let Some(module) = self.rtp_rtcp.get_mut(&MediaType::Video) {
                module.set_remote_ssrc(ssrc);
            }
        }

        let result = self
            .dtls
            .set_remote_fingerprint(&desc.fingerprint_algorithm, &desc.fingerprint);
        self.pump();
        result
    }

    /// Entry point for every received datagram.
    pub fn on_udp_packet(
        &mut self,
        port_idx: usize,
        buf: &[u8],
        addr: SocketAddr,
        ts: i64,
        now: i64,
    ) {
        if self.closed {
            return;
        }
        if let Some(channel) = self.channel() {
            channel.on_read_packet(port_idx, buf, addr, ts, now);
        }
        self.pump();
    }

    /// Check-and-ping cycle; returns the interval to the next one.
    pub fn on_ping_timer(&mut self, now: i64) -> i64 {
        let interval = match self.channel() {
            Some(channel) => channel.on_check_and_ping(now),
            None => crate::ice::WEAK_PING_INTERVAL,
        };
        self.pump();
        interval
    }

    /// RTCP report cycle for one media stream; returns the next interval.
    pub fn on_rtcp_timer(&mut self, media_type: MediaType) -> i64 {
        let compound = match self.rtp_rtcp.get_mut(&media_type) {
            Some(module) => module.time_to_send_rtcp(),
            None => return 0,
        };
        if !compound.is_empty() {
            self.events
                .push_back(TransportEvent::LocalRtcpPacket(media_type, compound.clone()));
            if self.srtp.is_active() {
                match self.srtp.protect_rtcp(&compound) {
                    Ok(protected) => {
                        if let Some(channel) = self.channel() {
                            channel.send_packet(&protected);
                        }
                    }
                    Err(e) => warn!("failed to protect RTCP compound: {e}"),
                }
            }
        }
        self.pump();
        self.rtp_rtcp
            .get(&media_type)
            .map(|m| m.cur_report_interval_ms())
            .unwrap_or(0)
    }

    /// Current RTCP cadence for one media stream.
    pub fn rtcp_report_interval(&self, media_type: MediaType) -> i64 {
        self.rtp_rtcp
            .get(&media_type)
            .map(|m| m.cur_report_interval_ms())
            .unwrap_or(0)
    }

    /// Engine write path: DTLS flights go out through the ICE channel.
    pub fn send_dtls_packet(&mut self, buf: &[u8]) {
        if let Some(channel) = self.channel() {
            channel.send_packet(buf);
        }
    }

    pub fn on_dtls_handshake_result(&mut self, result: Result<HandshakeOutcome>) {
        self.dtls.on_handshake_result(result);
        self.pump();
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.agent.close();
        self.dtls.close();
        self.srtp.reset_params();
        self.pump();
        self.set_pc_state(PeerState::Closed);
    }

    /// Moves pending child events through the composition: ICE first (its
    /// packets feed DTLS), then DTLS (its packets feed SRTP and the RTP
    /// pipeline), then the aggregate state.
    fn pump(&mut self) {
        let ice_events = match self.channel() {
            Some(channel) => channel.take_events(),
            None => VecDeque::new(),
        };
        for event in ice_events {
            match event {
                IceChannelEvent::CandidatesReady(candidates) => {
                    self.events
                        .push_back(TransportEvent::LocalCandidates(candidates));
                }
                IceChannelEvent::ReadPacket(data, ts) => {
                    self.dtls.on_read_packet(&data, ts);
                }
                IceChannelEvent::WritableChanged(writable) => {
                    self.dtls.on_ice_writable_state(writable);
                }
                IceChannelEvent::ReceivingChanged(receiving) => {
                    self.dtls.on_ice_receiving_state(receiving);
                }
                IceChannelEvent::StateChanged(state) => {
                    info!("[{}] ice state changed: {state}", self.transport_name);
                }
                IceChannelEvent::StartPinging => {
                    self.events.push_back(TransportEvent::StartIcePinging);
                }
            }
        }

        for event in self.dtls.take_events() {
            match event {
                DtlsEvent::StateChanged(state) => {
                    info!("[{}] dtls state changed: {state}", self.transport_name);
                }
                DtlsEvent::WritableChanged(_) | DtlsEvent::ReceivingChanged(_) => {}
                DtlsEvent::SrtpKeysReady(keys) => {
                    if let Err(e) =
                        self.srtp
                            .set_rtp_params(keys.profile, &keys.send_key, &keys.recv_key)
                    {
                        warn!("failed to install SRTP keys: {e}");
                    }
                }
                DtlsEvent::ReadPacket(mut data, _ts) => {
                    self.on_protected_packet(&mut data);
                }
                DtlsEvent::StartHandshake(request) => {
                    self.events
                        .push_back(TransportEvent::StartDtlsHandshake(request));
                }
            }
        }

        self.update_pc_state();
    }

    /// Post-DTLS demux: SRTP-unprotect, then split RTP from RTCP by the
    /// reserved payload-type range.
    fn on_protected_packet(&mut self, data: &mut Vec<u8>) {
        match rtp::infer_rtp_packet_type(data) {
            RtpPacketType::Rtp => {
                let len = match self.srtp.unprotect_rtp(data) {
                    Some(len) => len,
                    None => return,
                };
                data.truncate(len);
                let media_type = self.media_type_for_ssrc(rtp::parse_rtp_ssrc(data));
                let frequency = match media_type {
                    MediaType::Audio => AUDIO_CLOCK_RATE,
                    MediaType::Video => VIDEO_CLOCK_RATE,
                };
                match RtpPacketReceived::new(data, frequency) {
                    Ok(packet) => {
                        if let Some(module) = self.rtp_rtcp.get_mut(&media_type) {
                            module.on_rtp_packet(&packet);
                        }
                        self.events
                            .push_back(TransportEvent::RtpPacket(media_type, data.clone()));
                    }
                    Err(e) => warn!("failed to parse unprotected RTP packet: {e}"),
                }
            }
            RtpPacketType::Rtcp => {
                let len = match self.srtp.unprotect_rtcp(data) {
                    Some(len) => len,
                    None => return,
                };
                data.truncate(len);
                // Each module filters on its own remote SSRC.
                for module in self.rtp_rtcp.values_mut() {
                    module.incoming_rtcp(data);
                }
            }
            RtpPacketType::Unknown => {}
        }
    }

    fn media_type_for_ssrc(&self, ssrc: u32) -> MediaType {
        if let Some(&media_type) = self.ssrc_to_media.get(&ssrc) {
            return media_type;
        }
        // Unannounced SSRC: with a single media section the answer is
        // obvious, otherwise assume video (audio SSRCs are signaled).
        if self.rtp_rtcp.len() == 1 {
            *self.rtp_rtcp.keys().next().expect("one media type")
        } else {
            MediaType::Video
        }
    }

    fn update_pc_state(&mut self) {
        if self.closed {
            return;
        }
        let pairs = [(self.agent.state(), self.dtls.state())];
        self.set_pc_state(aggregate_peer_state(&pairs));
    }

    fn set_pc_state(&mut self, state: PeerState) {
        if self.pc_state != state {
            info!(
                "[{}] peer state {} -> {state}",
                self.transport_name, self.pc_state
            );
            self.pc_state = state;
            self.events.push_back(TransportEvent::PeerState(state));
        }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }
}
