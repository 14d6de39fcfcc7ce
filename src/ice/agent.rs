use std::collections::HashMap;
use std::net::IpAddr;

use log::warn;

use crate::error::Result;

use super::channel::IceTransportChannel;
use super::{IceCandidateComponent, IceParameters, IceTransportState};

/// Registry of ICE transport channels keyed by (transport_name, component).
/// With BUNDLE a peer has exactly one entry.
#[derive(Default)]
pub struct IceAgent {
    channels: HashMap<(String, IceCandidateComponent), IceTransportChannel>,
}

impl IceAgent {
    pub fn new() -> Self {
        IceAgent::default()
    }

    pub fn create_channel(
        &mut self,
        transport_name: &str,
        component: IceCandidateComponent,
    ) -> &mut IceTransportChannel {
        let key = (transport_name.to_owned(), component);
        self.channels
            .entry(key)
            .or_insert_with(|| IceTransportChannel::new(transport_name, component))
    }

    pub fn get_channel(
        &mut self,
        transport_name: &str,
        component: IceCandidateComponent,
    ) -> Option<&mut IceTransportChannel> {
        self.channels
            .get_mut(&(transport_name.to_owned(), component))
    }

    pub fn set_ice_params(
        &mut self,
        transport_name: &str,
        component: IceCandidateComponent,
        ice_params: IceParameters,
    ) {
        match self.get_channel(transport_name, component) {
            Some(channel) => channel.set_ice_params(ice_params),
            None => warn!("no channel for transport {transport_name}"),
        }
    }

    pub fn set_remote_ice_params(
        &mut self,
        transport_name: &str,
        component: IceCandidateComponent,
        ice_params: IceParameters,
        now: i64,
    ) {
        match self.get_channel(transport_name, component) {
            Some(channel) => channel.set_remote_ice_params(ice_params, now),
            None => warn!("no channel for transport {transport_name}"),
        }
    }

    pub async fn gather_candidates(
        &mut self,
        ip: IpAddr,
        min_port: u16,
        max_port: u16,
    ) -> Result<()> {
        for channel in self.channels.values_mut() {
            channel.gather_candidates(ip, min_port, max_port).await?;
        }
        Ok(())
    }

    pub fn channels_mut(
        &mut self,
    ) -> impl Iterator<Item = &mut IceTransportChannel> {
        self.channels.values_mut()
    }

    pub fn state(&self) -> IceTransportState {
        self.channels
            .values()
            .next()
            .map(|c| c.state())
            .unwrap_or(IceTransportState::New)
    }

    pub fn close(&mut self) {
        for channel in self.channels.values_mut() {
            channel.close();
        }
    }
}
