//! AVP dictionary: code to data-type mapping for the RFC 6733 base set
//!
//! Decoding is polymorphic: the payload of an incoming AVP is interpreted
//! according to the kind registered for its code. Codes that are not in the
//! dictionary decode as raw OctetString so unknown application AVPs
//! round-trip unmodified.

/// Base protocol AVP codes (RFC 6733)
pub mod avp_code {
    pub const USER_NAME: u32 = 1;
    pub const CLASS: u32 = 25;
    pub const SESSION_TIMEOUT: u32 = 27;
    pub const PROXY_STATE: u32 = 33;
    pub const ACCOUNTING_SESSION_ID: u32 = 44;
    pub const ACCT_MULTI_SESSION_ID: u32 = 50;
    pub const EVENT_TIMESTAMP: u32 = 55;
    pub const ACCT_INTERIM_INTERVAL: u32 = 85;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const ACCT_APPLICATION_ID: u32 = 259;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const REDIRECT_HOST_USAGE: u32 = 261;
    pub const REDIRECT_MAX_CACHE_TIME: u32 = 262;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const FIRMWARE_REVISION: u32 = 267;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const SESSION_BINDING: u32 = 270;
    pub const SESSION_SERVER_FAILOVER: u32 = 271;
    pub const MULTI_ROUND_TIME_OUT: u32 = 272;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const AUTH_REQUEST_TYPE: u32 = 274;
    pub const AUTH_GRACE_PERIOD: u32 = 276;
    pub const AUTH_SESSION_STATE: u32 = 277;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const FAILED_AVP: u32 = 279;
    pub const PROXY_HOST: u32 = 280;
    pub const ERROR_MESSAGE: u32 = 281;
    pub const ROUTE_RECORD: u32 = 282;
    pub const DESTINATION_REALM: u32 = 283;
    pub const PROXY_INFO: u32 = 284;
    pub const RE_AUTH_REQUEST_TYPE: u32 = 285;
    pub const AUTHORIZATION_LIFETIME: u32 = 291;
    pub const REDIRECT_HOST: u32 = 292;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ERROR_REPORTING_HOST: u32 = 294;
    pub const TERMINATION_CAUSE: u32 = 295;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
    pub const INBAND_SECURITY_ID: u32 = 299;
    pub const ACCOUNTING_RECORD_TYPE: u32 = 480;
    pub const ACCOUNTING_REALTIME_REQUIRED: u32 = 483;
    pub const ACCOUNTING_RECORD_NUMBER: u32 = 485;
}

/// IANA enterprise numbers seen in Diameter deployments
pub mod vendor_id {
    pub const NONE: u32 = 0;
    pub const HEWLETT_PACKARD: u32 = 11;
    pub const SUN_MICROSYSTEMS: u32 = 42;
    pub const MERIT_NETWORKS: u32 = 61;
    pub const NOKIA: u32 = 94;
    pub const ERICSSON: u32 = 193;
    pub const US_ROBOTICS: u32 = 429;
    pub const ALU_NETWORK: u32 = 637;
    pub const LUCENT_TECHNOLOGIES: u32 = 1751;
    pub const HUAWEI: u32 = 2011;
    pub const DEUTSCHE_TELEKOM: u32 = 2937;
    pub const THREEGPP2: u32 = 5535;
    pub const CISCO: u32 = 5771;
    pub const SK_TELECOM: u32 = 5806;
    pub const THREEGPP: u32 = 10415;
    pub const VODAFONE: u32 = 12645;
    pub const VERIZON_WIRELESS: u32 = 12951;
    pub const ETSI: u32 = 13019;
    pub const NOKIA_SIEMENS_NETWORKS: u32 = 28458;
}

/// Wire format kind of an AVP payload
///
/// The OctetString-derived kinds (Address, UTF8String, Time,
/// DiameterIdentity, DiameterURI, IPFilterRule) take trailing padding at the
/// AVP layer; the fixed-width kinds are already 4-octet aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpKind {
    OctetString,
    Integer32,
    Integer64,
    Unsigned32,
    Unsigned64,
    Float32,
    Float64,
    Address,
    Utf8String,
    Time,
    DiameterIdentity,
    DiameterUri,
    Enumerated,
    IpFilterRule,
    Grouped,
    AppId,
    VendorId,
}

/// Dictionary entry for a known AVP code
#[derive(Debug, Clone, Copy)]
pub struct AvpDef {
    pub code: u32,
    pub name: &'static str,
    pub kind: AvpKind,
}

const BASE_DICTIONARY: &[AvpDef] = &[
    AvpDef { code: avp_code::USER_NAME, name: "User-Name", kind: AvpKind::Utf8String },
    AvpDef { code: avp_code::CLASS, name: "Class", kind: AvpKind::OctetString },
    AvpDef { code: avp_code::SESSION_TIMEOUT, name: "Session-Timeout", kind: AvpKind::Unsigned32 },
    AvpDef { code: avp_code::PROXY_STATE, name: "Proxy-State", kind: AvpKind::OctetString },
    AvpDef {
        code: avp_code::ACCOUNTING_SESSION_ID,
        name: "Accounting-Session-Id",
        kind: AvpKind::OctetString,
    },
    AvpDef {
        code: avp_code::ACCT_MULTI_SESSION_ID,
        name: "Acct-Multi-Session-Id",
        kind: AvpKind::Utf8String,
    },
    AvpDef { code: avp_code::EVENT_TIMESTAMP, name: "Event-Timestamp", kind: AvpKind::Time },
    AvpDef {
        code: avp_code::ACCT_INTERIM_INTERVAL,
        name: "Acct-Interim-Interval",
        kind: AvpKind::Unsigned32,
    },
    AvpDef { code: avp_code::HOST_IP_ADDRESS, name: "Host-IP-Address", kind: AvpKind::Address },
    AvpDef { code: avp_code::AUTH_APPLICATION_ID, name: "Auth-Application-Id", kind: AvpKind::AppId },
    AvpDef { code: avp_code::ACCT_APPLICATION_ID, name: "Acct-Application-Id", kind: AvpKind::AppId },
    AvpDef {
        code: avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
        name: "Vendor-Specific-Application-Id",
        kind: AvpKind::Grouped,
    },
    AvpDef {
        code: avp_code::REDIRECT_HOST_USAGE,
        name: "Redirect-Host-Usage",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::REDIRECT_MAX_CACHE_TIME,
        name: "Redirect-Max-Cache-Time",
        kind: AvpKind::Unsigned32,
    },
    AvpDef { code: avp_code::SESSION_ID, name: "Session-Id", kind: AvpKind::Utf8String },
    AvpDef { code: avp_code::ORIGIN_HOST, name: "Origin-Host", kind: AvpKind::DiameterIdentity },
    AvpDef { code: avp_code::SUPPORTED_VENDOR_ID, name: "Supported-Vendor-Id", kind: AvpKind::VendorId },
    AvpDef { code: avp_code::VENDOR_ID, name: "Vendor-Id", kind: AvpKind::VendorId },
    AvpDef { code: avp_code::FIRMWARE_REVISION, name: "Firmware-Revision", kind: AvpKind::Unsigned32 },
    AvpDef { code: avp_code::RESULT_CODE, name: "Result-Code", kind: AvpKind::Unsigned32 },
    AvpDef { code: avp_code::PRODUCT_NAME, name: "Product-Name", kind: AvpKind::Utf8String },
    AvpDef { code: avp_code::SESSION_BINDING, name: "Session-Binding", kind: AvpKind::Unsigned32 },
    AvpDef {
        code: avp_code::SESSION_SERVER_FAILOVER,
        name: "Session-Server-Failover",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::MULTI_ROUND_TIME_OUT,
        name: "Multi-Round-Time-Out",
        kind: AvpKind::Unsigned32,
    },
    AvpDef { code: avp_code::DISCONNECT_CAUSE, name: "Disconnect-Cause", kind: AvpKind::Enumerated },
    AvpDef {
        code: avp_code::AUTH_REQUEST_TYPE,
        name: "Auth-Request-Type",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::AUTH_GRACE_PERIOD,
        name: "Auth-Grace-Period",
        kind: AvpKind::Unsigned32,
    },
    AvpDef {
        code: avp_code::AUTH_SESSION_STATE,
        name: "Auth-Session-State",
        kind: AvpKind::Enumerated,
    },
    AvpDef { code: avp_code::ORIGIN_STATE_ID, name: "Origin-State-Id", kind: AvpKind::Unsigned32 },
    AvpDef { code: avp_code::FAILED_AVP, name: "Failed-AVP", kind: AvpKind::Grouped },
    AvpDef { code: avp_code::PROXY_HOST, name: "Proxy-Host", kind: AvpKind::DiameterIdentity },
    AvpDef { code: avp_code::ERROR_MESSAGE, name: "Error-Message", kind: AvpKind::Utf8String },
    AvpDef { code: avp_code::ROUTE_RECORD, name: "Route-Record", kind: AvpKind::DiameterIdentity },
    AvpDef {
        code: avp_code::DESTINATION_REALM,
        name: "Destination-Realm",
        kind: AvpKind::DiameterIdentity,
    },
    AvpDef { code: avp_code::PROXY_INFO, name: "Proxy-Info", kind: AvpKind::Grouped },
    AvpDef {
        code: avp_code::RE_AUTH_REQUEST_TYPE,
        name: "Re-Auth-Request-Type",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::AUTHORIZATION_LIFETIME,
        name: "Authorization-Lifetime",
        kind: AvpKind::Unsigned32,
    },
    AvpDef { code: avp_code::REDIRECT_HOST, name: "Redirect-Host", kind: AvpKind::DiameterUri },
    AvpDef {
        code: avp_code::DESTINATION_HOST,
        name: "Destination-Host",
        kind: AvpKind::DiameterIdentity,
    },
    AvpDef {
        code: avp_code::ERROR_REPORTING_HOST,
        name: "Error-Reporting-Host",
        kind: AvpKind::DiameterIdentity,
    },
    AvpDef {
        code: avp_code::TERMINATION_CAUSE,
        name: "Termination-Cause",
        kind: AvpKind::Enumerated,
    },
    AvpDef { code: avp_code::ORIGIN_REALM, name: "Origin-Realm", kind: AvpKind::DiameterIdentity },
    AvpDef { code: avp_code::EXPERIMENTAL_RESULT, name: "Experimental-Result", kind: AvpKind::Grouped },
    AvpDef {
        code: avp_code::EXPERIMENTAL_RESULT_CODE,
        name: "Experimental-Result-Code",
        kind: AvpKind::Unsigned32,
    },
    AvpDef { code: avp_code::INBAND_SECURITY_ID, name: "Inband-Security-Id", kind: AvpKind::Unsigned32 },
    AvpDef {
        code: avp_code::ACCOUNTING_RECORD_TYPE,
        name: "Accounting-Record-Type",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::ACCOUNTING_REALTIME_REQUIRED,
        name: "Accounting-Realtime-Required",
        kind: AvpKind::Enumerated,
    },
    AvpDef {
        code: avp_code::ACCOUNTING_RECORD_NUMBER,
        name: "Accounting-Record-Number",
        kind: AvpKind::Unsigned32,
    },
];

/// Look up the dictionary entry for an AVP code
pub fn lookup(code: u32) -> Option<&'static AvpDef> {
    BASE_DICTIONARY.iter().find(|def| def.code == code)
}

/// Look up an AVP code by its dictionary name
pub fn code_for_name(name: &str) -> Option<u32> {
    BASE_DICTIONARY
        .iter()
        .find(|def| def.name == name)
        .map(|def| def.code)
}

/// Display name for an AVP code, if registered
pub fn avp_name(code: u32) -> Option<&'static str> {
    lookup(code).map(|def| def.name)
}

/// Display name for a base protocol command code
pub fn command_name(code: u32, is_request: bool) -> Option<&'static str> {
    match (code, is_request) {
        (257, true) => Some("Capabilities-Exchange-Request"),
        (257, false) => Some("Capabilities-Exchange-Answer"),
        (280, true) => Some("Device-Watchdog-Request"),
        (280, false) => Some("Device-Watchdog-Answer"),
        (282, true) => Some("Disconnect-Peer-Request"),
        (282, false) => Some("Disconnect-Peer-Answer"),
        _ => None,
    }
}
