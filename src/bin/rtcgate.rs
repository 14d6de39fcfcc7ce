//! Demo binary: loads the YAML config, wires a logging observer and runs
//! the endpoint until interrupted. The real signaling server drives the
//! same [`rtcgate::server::RtcServer`] API over its own control channel.

use std::sync::Arc;

use log::info;

use rtcgate::config::ServerConfig;
use rtcgate::ice::Candidate;
use rtcgate::peer::PeerState;
use rtcgate::server::{RtcEventObserver, RtcServer};
use rtcgate::MediaType;

struct LogObserver;

impl RtcEventObserver for LogObserver {
    fn on_candidate(&self, uid: u64, stream_name: &str, candidate: &Candidate) {
        info!("[{uid}|{stream_name}] candidate gathered: {candidate}");
    }

    fn on_peer_state(&self, uid: u64, stream_name: &str, state: PeerState) {
        info!("[{uid}|{stream_name}] peer state: {state}");
    }

    fn on_rtp_packet(&self, uid: u64, stream_name: &str, media_type: MediaType, payload: &[u8]) {
        log::trace!(
            "[{uid}|{stream_name}] {media_type} rtp packet, {} bytes",
            payload.len()
        );
    }

    fn on_local_rtcp_packet(
        &self,
        uid: u64,
        stream_name: &str,
        media_type: MediaType,
        packet: &[u8],
    ) {
        log::trace!(
            "[{uid}|{stream_name}] local {media_type} rtcp packet, {} bytes",
            packet.len()
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let conf_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "conf/rtcgate.yaml".to_owned());
    let config = match ServerConfig::load(&conf_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {conf_file}: {e}, using defaults");
            ServerConfig::default()
        }
    };

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.log.level);
    if config.log.to_stderr {
        builder.target(env_logger::Target::Stderr);
    }
    builder.init();

    info!("starting rtcgate, workers: {}", config.worker_num);
    let mut server = RtcServer::new(config, Arc::new(LogObserver))?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.close();
    Ok(())
}
