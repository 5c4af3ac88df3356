//! Node configuration.

use crate::ConfigError;
use layerswitch_types::{time, Endpoint};
use serde::Deserialize;
use std::time::Duration;

/// Per-node configuration.
///
/// Covers both transport flavours: the stream fields (`connect_*`,
/// `request_length`, ...) are ignored by datagram nodes and the datagram
/// fields (`dest_*`, `message_length`, `send_interval`) by stream nodes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// When the node starts generating transport traffic.
    #[serde(deserialize_with = "time::deserialize")]
    pub start_time: Duration,

    /// When it stops. `None` runs until the end of the simulation.
    #[serde(deserialize_with = "time::option::deserialize")]
    pub stop_time: Option<Duration>,

    /// Bytes per request.
    pub request_length: u32,

    /// Bytes the server should send back per request.
    pub reply_length: u32,

    /// Round trips per connection before it is closed.
    pub num_requests_per_session: u32,

    /// Requests kept outstanding on a connection at once.
    pub pipeline_depth: u32,

    /// Pause between a reply and the next request.
    #[serde(deserialize_with = "time::deserialize")]
    pub think_time: Duration,

    /// Pause between a closed session and the next connect.
    #[serde(deserialize_with = "time::deserialize")]
    pub idle_interval: Duration,

    /// Pause before reconnecting after a failure.
    #[serde(deserialize_with = "time::deserialize")]
    pub reconnect_interval: Duration,

    /// Interval between datagrams.
    #[serde(deserialize_with = "time::deserialize")]
    pub send_interval: Duration,

    /// Bytes per datagram.
    pub message_length: u32,

    /// Server-side delay before answering a request.
    #[serde(deserialize_with = "time::deserialize")]
    pub reply_delay: Duration,

    /// Queue the first request together with the connect instead of
    /// waiting for the connection to be established.
    pub early_send: bool,

    /// Simulated link latency on the direct path.
    #[serde(deserialize_with = "time::deserialize")]
    pub propagation_delay: Duration,

    /// Interval between direct-path sends.
    #[serde(deserialize_with = "time::deserialize")]
    pub frequency: Duration,

    /// This node's address.
    pub local_address: String,

    /// Port to listen or bind on. Stream nodes without a port don't serve.
    pub local_port: Option<u16>,

    /// Address of the server this node connects to.
    pub connect_address: Option<String>,

    /// Port of the server this node connects to.
    pub connect_port: u16,

    /// Datagram destinations; one is picked at random per send.
    pub dest_addresses: Vec<String>,

    /// Datagram destination port.
    pub dest_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            start_time: Duration::from_secs(1),
            stop_time: None,
            request_length: 200,
            reply_length: 1000,
            num_requests_per_session: 1,
            pipeline_depth: 1,
            think_time: Duration::from_secs(1),
            idle_interval: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(30),
            send_interval: Duration::from_secs(1),
            message_length: 100,
            reply_delay: Duration::ZERO,
            early_send: false,
            propagation_delay: Duration::from_millis(100),
            frequency: Duration::from_secs(2),
            local_address: String::new(),
            local_port: None,
            connect_address: None,
            connect_port: 1000,
            dest_addresses: Vec::new(),
            dest_port: 1000,
        }
    }
}

impl NodeConfig {
    /// Create a new node configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this node's address and listening port.
    pub fn with_local(mut self, address: impl Into<String>, port: Option<u16>) -> Self {
        self.local_address = address.into();
        self.local_port = port;
        self
    }

    /// Set the server this node connects to.
    pub fn with_connect(mut self, address: impl Into<String>, port: u16) -> Self {
        self.connect_address = Some(address.into());
        self.connect_port = port;
        self
    }

    /// Set the datagram destinations.
    pub fn with_destinations(mut self, addresses: Vec<String>, port: u16) -> Self {
        self.dest_addresses = addresses;
        self.dest_port = port;
        self
    }

    /// Set the traffic window.
    pub fn with_window(mut self, start: Duration, stop: Option<Duration>) -> Self {
        self.start_time = start;
        self.stop_time = stop;
        self
    }

    /// Set request and reply sizes.
    pub fn with_lengths(mut self, request: u32, reply: u32) -> Self {
        self.request_length = request;
        self.reply_length = reply;
        self
    }

    /// Set the number of round trips per session.
    pub fn with_requests_per_session(mut self, count: u32) -> Self {
        self.num_requests_per_session = count;
        self
    }

    /// Set the number of requests kept outstanding.
    pub fn with_pipeline_depth(mut self, depth: u32) -> Self {
        self.pipeline_depth = depth;
        self
    }

    /// Set the pause between a reply and the next request.
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    /// Set the direct-path propagation delay and send interval.
    pub fn with_direct_timing(mut self, propagation_delay: Duration, frequency: Duration) -> Self {
        self.propagation_delay = propagation_delay;
        self.frequency = frequency;
        self
    }

    /// Set the server reply delay.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Set the datagram interval.
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Enable sending the first request with the connect.
    pub fn with_early_send(mut self, early_send: bool) -> Self {
        self.early_send = early_send;
        self
    }

    /// Endpoint this node listens or binds on, if any.
    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local_port
            .map(|port| Endpoint::new(self.local_address.clone(), port))
    }

    /// Endpoint of the server this node connects to, if any.
    pub fn connect_endpoint(&self) -> Option<Endpoint> {
        self.connect_address
            .as_ref()
            .map(|address| Endpoint::new(address.clone(), self.connect_port))
    }

    /// Datagram destinations.
    pub fn destinations(&self) -> Vec<Endpoint> {
        self.dest_addresses
            .iter()
            .map(|address| Endpoint::new(address.clone(), self.dest_port))
            .collect()
    }

    /// Check the traffic window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.stop_time {
            Some(stop) if stop < self.start_time => Err(ConfigError::InvalidStartStop {
                start: self.start_time,
                stop,
            }),
            _ => Ok(()),
        }
    }
}
