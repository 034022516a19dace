//! Diameter error types and the RFC 6733 Result-Code space

use thiserror::Error;

use crate::fsm::{PeerEvent, PeerState};

/// Diameter error type
#[derive(Error, Debug)]
pub enum DiameterError {
    // Framing
    #[error("Short buffer: need {needed}, have {available}")]
    ShortBuffer { needed: usize, available: usize },

    #[error("Unsupported Diameter version: {0}")]
    InvalidVersion(u8),

    #[error("Invalid message length: {0}")]
    InvalidMessageLength(u32),

    #[error("Invalid header length: {0}")]
    InvalidHeaderLength(usize),

    // AVP
    #[error("Invalid AVP length: {0}")]
    InvalidAvpLength(u32),

    #[error("Unsupported AVP code: {0}")]
    UnsupportedAvpCode(u32),

    #[error("AVP data type mismatch: expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Vendor-ID is required for a vendor-specific AVP")]
    VendorIdRequired,

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Invalid address for the indicated family")]
    InvalidAddress,

    #[error("Invalid address length: {0}")]
    InvalidAddressLength(usize),

    #[error("Unknown address family: {0}")]
    UnknownAddressFamily(u16),

    // Semantic
    #[error("Invalid command code: {0}")]
    InvalidCommandCode(u32),

    #[error("Result-Code AVP not found")]
    ResultCodeMissing,

    #[error("Request failed with Result-Code {code} ({name})")]
    ResultCodeFailure { code: u32, name: &'static str },

    #[error("Missing mandatory AVP: {0}")]
    MissingAvp(&'static str),

    // FSM
    #[error("No transition for event {event:?} in state {state:?}")]
    NoTransitionFromState { state: PeerState, event: PeerEvent },

    #[error("Action {name} failed: {source}")]
    ActionFailed {
        name: &'static str,
        #[source]
        source: Box<DiameterError>,
    },

    // Transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Accept timeout reached")]
    AcceptTimeout,

    #[error("Unsupported transport protocol")]
    UnsupportedProtocol,

    #[error("Peer queue closed")]
    QueueClosed,
}

/// Diameter result type
pub type DiameterResult<T> = Result<T, DiameterError>;

/// Diameter Result-Code values (RFC 6733 Section 7.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    // Informational (1xxx)
    MultiRoundAuth = 1001,

    // Success (2xxx)
    Success = 2001,
    LimitedSuccess = 2002,

    // Protocol Errors (3xxx)
    CommandUnsupported = 3001,
    UnableToDeliver = 3002,
    RealmNotServed = 3003,
    TooBusy = 3004,
    LoopDetected = 3005,
    RedirectIndication = 3006,
    ApplicationUnsupported = 3007,
    InvalidHdrBits = 3008,
    InvalidAvpBits = 3009,
    UnknownPeer = 3010,

    // Transient Failures (4xxx)
    AuthenticationRejected = 4001,
    OutOfSpace = 4002,
    ElectionLost = 4003,

    // Permanent Failures (5xxx)
    AvpUnsupported = 5001,
    UnknownSessionId = 5002,
    AuthorizationRejected = 5003,
    InvalidAvpValue = 5004,
    MissingAvp = 5005,
    ResourcesExceeded = 5006,
    ContradictingAvps = 5007,
    AvpNotAllowed = 5008,
    AvpOccursTooManyTimes = 5009,
    NoCommonApplication = 5010,
    UnsupportedVersion = 5011,
    UnableToComply = 5012,
    InvalidBitInHeader = 5013,
    InvalidAvpLength = 5014,
    InvalidMessageLength = 5015,
    InvalidAvpBitCombo = 5016,
    NoCommonSecurity = 5017,
}

impl ResultCode {
    /// Check if result code indicates success (2xxx)
    pub fn is_success(&self) -> bool {
        (2000..3000).contains(&(*self as u32))
    }

    /// Check if result code indicates a protocol error (3xxx)
    pub fn is_protocol_error(&self) -> bool {
        (3000..4000).contains(&(*self as u32))
    }

    /// Check if result code indicates a transient failure (4xxx)
    pub fn is_transient_failure(&self) -> bool {
        (4000..5000).contains(&(*self as u32))
    }

    /// Check if result code indicates a permanent failure (5xxx)
    pub fn is_permanent_failure(&self) -> bool {
        (5000..6000).contains(&(*self as u32))
    }

    /// Canonical RFC 6733 name for this result code
    pub fn name(&self) -> &'static str {
        match self {
            ResultCode::MultiRoundAuth => "DIAMETER_MULTI_ROUND_AUTH",
            ResultCode::Success => "DIAMETER_SUCCESS",
            ResultCode::LimitedSuccess => "DIAMETER_LIMITED_SUCCESS",
            ResultCode::CommandUnsupported => "DIAMETER_COMMAND_UNSUPPORTED",
            ResultCode::UnableToDeliver => "DIAMETER_UNABLE_TO_DELIVER",
            ResultCode::RealmNotServed => "DIAMETER_REALM_NOT_SERVED",
            ResultCode::TooBusy => "DIAMETER_TOO_BUSY",
            ResultCode::LoopDetected => "DIAMETER_LOOP_DETECTED",
            ResultCode::RedirectIndication => "DIAMETER_REDIRECT_INDICATION",
            ResultCode::ApplicationUnsupported => "DIAMETER_APPLICATION_UNSUPPORTED",
            ResultCode::InvalidHdrBits => "DIAMETER_INVALID_HDR_BITS",
            ResultCode::InvalidAvpBits => "DIAMETER_INVALID_AVP_BITS",
            ResultCode::UnknownPeer => "DIAMETER_UNKNOWN_PEER",
            ResultCode::AuthenticationRejected => "DIAMETER_AUTHENTICATION_REJECTED",
            ResultCode::OutOfSpace => "DIAMETER_OUT_OF_SPACE",
            ResultCode::ElectionLost => "DIAMETER_ELECTION_LOST",
            ResultCode::AvpUnsupported => "DIAMETER_AVP_UNSUPPORTED",
            ResultCode::UnknownSessionId => "DIAMETER_UNKNOWN_SESSION_ID",
            ResultCode::AuthorizationRejected => "DIAMETER_AUTHORIZATION_REJECTED",
            ResultCode::InvalidAvpValue => "DIAMETER_INVALID_AVP_VALUE",
            ResultCode::MissingAvp => "DIAMETER_MISSING_AVP",
            ResultCode::ResourcesExceeded => "DIAMETER_RESOURCES_EXCEEDED",
            ResultCode::ContradictingAvps => "DIAMETER_CONTRADICTING_AVPS",
            ResultCode::AvpNotAllowed => "DIAMETER_AVP_NOT_ALLOWED",
            ResultCode::AvpOccursTooManyTimes => "DIAMETER_AVP_OCCURS_TOO_MANY_TIMES",
            ResultCode::NoCommonApplication => "DIAMETER_NO_COMMON_APPLICATION",
            ResultCode::UnsupportedVersion => "DIAMETER_UNSUPPORTED_VERSION",
            ResultCode::UnableToComply => "DIAMETER_UNABLE_TO_COMPLY",
            ResultCode::InvalidBitInHeader => "DIAMETER_INVALID_BIT_IN_HEADER",
            ResultCode::InvalidAvpLength => "DIAMETER_INVALID_AVP_LENGTH",
            ResultCode::InvalidMessageLength => "DIAMETER_INVALID_MESSAGE_LENGTH",
            ResultCode::InvalidAvpBitCombo => "DIAMETER_INVALID_AVP_BIT_COMBO",
            ResultCode::NoCommonSecurity => "DIAMETER_NO_COMMON_SECURITY",
        }
    }
}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        match value {
            1001 => ResultCode::MultiRoundAuth,
            2001 => ResultCode::Success,
            2002 => ResultCode::LimitedSuccess,
            3001 => ResultCode::CommandUnsupported,
            3002 => ResultCode::UnableToDeliver,
            3003 => ResultCode::RealmNotServed,
            3004 => ResultCode::TooBusy,
            3005 => ResultCode::LoopDetected,
            3006 => ResultCode::RedirectIndication,
            3007 => ResultCode::ApplicationUnsupported,
            3008 => ResultCode::InvalidHdrBits,
            3009 => ResultCode::InvalidAvpBits,
            3010 => ResultCode::UnknownPeer,
            4001 => ResultCode::AuthenticationRejected,
            4002 => ResultCode::OutOfSpace,
            4003 => ResultCode::ElectionLost,
            5001 => ResultCode::AvpUnsupported,
            5002 => ResultCode::UnknownSessionId,
            5003 => ResultCode::AuthorizationRejected,
            5004 => ResultCode::InvalidAvpValue,
            5005 => ResultCode::MissingAvp,
            5006 => ResultCode::ResourcesExceeded,
            5007 => ResultCode::ContradictingAvps,
            5008 => ResultCode::AvpNotAllowed,
            5009 => ResultCode::AvpOccursTooManyTimes,
            5010 => ResultCode::NoCommonApplication,
            5011 => ResultCode::UnsupportedVersion,
            5013 => ResultCode::InvalidBitInHeader,
            5014 => ResultCode::InvalidAvpLength,
            5015 => ResultCode::InvalidMessageLength,
            5016 => ResultCode::InvalidAvpBitCombo,
            5017 => ResultCode::NoCommonSecurity,
            _ => ResultCode::UnableToComply,
        }
    }
}
