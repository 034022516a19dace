//! Peer connection configuration

use std::time::Duration;

/// Stream transport protocol (RFC 6733 Section 2.1; UDP is not permitted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Sctp,
}

/// Configuration for a Diameter peer connection
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// DiameterIdentity of the local node (FQDN)
    pub local_identity: String,

    /// Realm of the local node
    pub local_realm: String,

    /// Product-Name advertised in CER/CEA
    pub product_name: String,

    /// Address of the remote peer for initiated connections
    pub server_addr: String,

    /// Transport protocol
    pub protocol: Protocol,

    /// Dial timeout for initiated connections
    pub connection_timeout: Duration,

    /// Watchdog interval (Tw); RFC 6733 recommends 30s
    pub watchdog_ttl: Duration,

    /// Capacity of the peer command/event queue
    pub event_buffer_size: usize,

    /// Capacity of the inbound application message queue
    pub message_queue_size: usize,

    /// Application IDs advertised as Auth-Application-Id in CER/CEA
    pub supported_applications: Vec<u32>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            local_identity: String::new(),
            local_realm: String::new(),
            product_name: "diameter-rs".to_string(),
            server_addr: format!("localhost:{}", crate::DIAMETER_PORT),
            protocol: Protocol::Tcp,
            connection_timeout: Duration::from_secs(5),
            watchdog_ttl: Duration::from_secs(10),
            event_buffer_size: 10,
            message_queue_size: 10,
            supported_applications: Vec::new(),
        }
    }
}

impl PeerConfig {
    /// Configuration with the local identity and realm set
    pub fn new(local_identity: impl Into<String>, local_realm: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            local_realm: local_realm.into(),
            ..Default::default()
        }
    }

    /// Set the remote peer address
    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }

    /// Use TCP transport
    pub fn with_tcp(mut self) -> Self {
        self.protocol = Protocol::Tcp;
        self
    }

    /// Use SCTP transport
    pub fn with_sctp(mut self) -> Self {
        self.protocol = Protocol::Sctp;
        self
    }

    /// Set the dial timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the watchdog interval
    pub fn with_watchdog_ttl(mut self, ttl: Duration) -> Self {
        self.watchdog_ttl = ttl;
        self
    }

    /// Set the command/event queue capacity
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set the inbound message queue capacity
    pub fn with_message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = size;
        self
    }

    /// Advertise the given application IDs
    pub fn with_supported_applications(mut self, apps: Vec<u32>) -> Self {
        self.supported_applications = apps;
        self
    }

    /// Set the advertised Product-Name
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }
}
