
use std::fmt;

use crate::dtls_transport::DtlsTransportState;
use crate::ice::IceTransportState;

/// Connection state of a whole peer, aggregated over its transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Folds the per-transport (ICE, DTLS) state pairs into the peer state.
/// With BUNDLE there is one pair; the counting generalises to more.
pub fn aggregate_peer_state(pairs: &[(IceTransportState, DtlsTransportState)]) -> PeerState {
    let mut ice_connected = 0;
    let mut ice_checking = 0;
    let mut ice_disconnected = 0;
    let mut ice_completed = 0;
    let mut ice_new = 0;
    let mut ice_closed = 0;
    let mut ice_failed = 0;
    let mut dtls_connected = 0;
    let mut dtls_connecting = 0;
    let mut dtls_new = 0;
    let mut dtls_closed = 0;
    let mut dtls_failed = 0;

    for (ice, dtls) in pairs {
        match ice {
            IceTransportState::New => ice_new += 1,
            IceTransportState::Checking => ice_checking += 1,
            IceTransportState::Connected => ice_connected += 1,
            IceTransportState::Completed => ice_completed += 1,
            IceTransportState::Disconnected => ice_disconnected += 1,
            IceTransportState::Failed => ice_failed += 1,
            IceTransportState::Closed => ice_closed += 1,
        }
        match dtls {
            DtlsTransportState::New => dtls_new += 1,
            DtlsTransportState::Connecting => dtls_connecting += 1,
            DtlsTransportState::Connected => dtls_connected += 1,
            DtlsTransportState::Closed => dtls_closed += 1,
            DtlsTransportState::Failed => dtls_failed += 1,
        }
    }

    let total_transports = pairs.len() * 2;
    let total_connected = ice_connected + dtls_connected;
    let total_closed = ice_closed + dtls_closed;
    let total_failed = ice_failed + dtls_failed;
    let total_new = ice_new + dtls_new;

    if total_failed > 0 {
        PeerState::Failed
    } else if ice_disconnected > 0 {
        PeerState::Disconnected
    } else if total_new + total_closed == total_transports {
        PeerState::New
    } else if ice_checking + dtls_connecting + total_new > 0 {
        PeerState::Connecting
    } else if total_connected + total_closed + ice_completed == total_transports {
        PeerState::Connected
    } else {
        PeerState::New
    }
}
