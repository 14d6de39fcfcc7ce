
use std::collections::HashMap;

use log::warn;

use super::connection::IceConnection;
use super::{
    MIN_PINGS_AT_WEAK_PING_INTERVAL, STABILIZING_CONNECTION_PING_INTERVAL,
    STABLE_CONNECTION_PING_INTERVAL, STRONG_PING_INTERVAL, WEAK_PING_INTERVAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResult {
    pub conn_id: Option<u64>,
    pub ping_interval: i64,
}

/// Decides which connection to ping next and how often to wake up. The
/// controller holds only connection ids; the channel owns the connections
/// themselves and passes them in by reference.
#[derive(Default)]
pub struct IceController {
    connection_ids: Vec<u64>,
    selected_connection: Option<u64>,
}

impl IceController {
    pub fn new() -> Self {
        IceController::default()
    }

    pub fn connection_ids(&self) -> &[u64] {
        &self.connection_ids
    }

    pub fn add_connection(&mut self, id: u64) {
        self.connection_ids.push(id);
    }

    pub fn on_connection_destroy(&mut self, id: u64) {
        self.connection_ids.retain(|&c| c != id);
        if self.selected_connection == Some(id) {
            self.selected_connection = None;
        }
    }

    pub fn selected_connection(&self) -> Option<u64> {
        self.selected_connection
    }

    pub fn set_selected_connection(&mut self, id: Option<u64>) {
        self.selected_connection = id;
    }

    /// Weak while there is no selected connection, or the selected one is
    /// not both writable and receiving.
    fn weak(&self, conns: &HashMap<u64, IceConnection>) -> bool {
        match self.selected_connection.and_then(|id| conns.get(&id)) {
            Some(conn) => conn.weak(),
            None => true,
        }
    }

    fn is_pingable(&self, conn: &IceConnection, conns: &HashMap<u64, IceConnection>) -> bool {
        let remote = conn.remote_candidate();
        if remote.username.is_empty() || remote.password.is_empty() {
            warn!("remote ICE ufrag and pwd are empty, cannot ping");
            return false;
        }
        self.weak(conns)
    }

    pub fn has_pingable_connection(&self, conns: &HashMap<u64, IceConnection>) -> bool {
        self.connection_ids
            .iter()
            .filter_map(|id| conns.get(id))
            .any(|conn| self.is_pingable(conn, conns))
    }

    /// Pick the next connection to ping given the last channel-level ping
    /// time, and report the channel ping interval to wait before asking
    /// again.
    pub fn select_connection_to_ping(
        &self,
        conns: &HashMap<u64, IceConnection>,
        last_ping_sent_ms: i64,
        now: i64,
    ) -> PingResult {
        let need_more_pings_at_weak = self
            .connection_ids
            .iter()
            .filter_map(|id| conns.get(id))
            .any(|conn| conn.num_pings_sent() < MIN_PINGS_AT_WEAK_PING_INTERVAL);

        let ping_interval = if self.weak(conns) || need_more_pings_at_weak {
            WEAK_PING_INTERVAL
        } else {
            STRONG_PING_INTERVAL
        };

        let conn_id = if now >= last_ping_sent_ms + ping_interval {
            self.find_next_pingable_connection(conns, now)
        } else {
            None
        };
        PingResult {
            conn_id,
            ping_interval,
        }
    }

    /// The selected connection when it is writable and past its
    /// per-connection ping interval; otherwise the least-pinged candidate
    /// among the rest, so fresh connections get their first checks.
    fn find_next_pingable_connection(
        &self,
        conns: &HashMap<u64, IceConnection>,
        now: i64,
    ) -> Option<u64> {
        if let Some(conn) = self.selected_connection.and_then(|id| conns.get(&id)) {
            if conn.writable() && self.is_connection_past_ping_interval(conn, now) {
                return self.selected_connection;
            }
        }

        self.connection_ids
            .iter()
            .filter(|&&id| Some(id) != self.selected_connection)
            .filter_map(|&id| conns.get(&id).map(|conn| (id, conn)))
            .filter(|(_, conn)| {
                let remote = conn.remote_candidate();
                !remote.username.is_empty()
                    && !remote.password.is_empty()
                    && conn.active()
                    && self.is_connection_past_ping_interval(conn, now)
            })
            .min_by_key(|(_, conn)| (conn.num_pings_sent(), conn.last_ping_sent()))
            .map(|(id, _)| id)
    }

    fn is_connection_past_ping_interval(&self, conn: &IceConnection, now: i64) -> bool {
        let interval = self.get_connection_ping_interval(conn, now);
        now >= conn.last_ping_sent() + interval
    }

    /// Weak cadence until three pings are out; stabilizing until the RTT has
    /// converged with nothing overdue; stable after that.
    fn get_connection_ping_interval(&self, conn: &IceConnection, now: i64) -> i64 {
        if conn.num_pings_sent() < MIN_PINGS_AT_WEAK_PING_INTERVAL {
            return WEAK_PING_INTERVAL;
        }
        if !conn.stable(now) {
            return STABILIZING_CONNECTION_PING_INTERVAL;
        }
        STABLE_CONNECTION_PING_INTERVAL
    }
}
