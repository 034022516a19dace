//! Diameter Base Protocol Library
//!
//! This crate implements the Diameter base protocol per RFC 6733:
//! - Byte-exact message and AVP encoding/decoding (Section 3 and 4)
//! - The fourteen AVP data-type formats, including Grouped recursion
//! - An AVP dictionary driving typed decoding of known codes
//! - The peer state machine (Section 5.6) with capabilities exchange
//!   (CER/CEA), device watchdog (DWR/DWA), and disconnect (DPR/DPA)
//!   handshakes for both the initiator and responder roles
//!
//! Transport is TCP (SCTP is reserved in the configuration surface and
//! supplied by an external transport). UDP is not used.

pub mod avp;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod fsm;
pub mod message;
pub mod peer;
pub mod transport;


pub use avp::{Avp, AvpData};
pub use config::{PeerConfig, Protocol};
pub use error::{DiameterError, DiameterResult, ResultCode};
pub use fsm::{Action, Fsm, PeerEvent, PeerState};
pub use message::{DiameterHeader, DiameterMessage};
pub use peer::{DisconnectCause, Peer, PeerHandle, PeerNotification, PeerRole, PeerTable};
pub use transport::{DiameterListener, DiameterTransport};

/// Diameter protocol version
pub const DIAMETER_VERSION: u8 = 1;

/// Default Diameter port
pub const DIAMETER_PORT: u16 = 3868;

/// Default Diameter TLS port
pub const DIAMETER_TLS_PORT: u16 = 5658;
