//! Diameter message header and base message types
//!
//! Message format (RFC 6733):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |                 Message Length                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | command flags |                  Command-Code                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Application-ID                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Hop-by-Hop Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      End-to-End Identifier                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  AVPs ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-
//! ```
//!
//! All multi-octet integers are network byte order. Message Length covers
//! the header and every AVP including inter-AVP padding, and is always
//! recomputed from the serialized size at encode time.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::avp::{self, Avp};
use crate::dictionary::avp_code;
use crate::error::{DiameterError, DiameterResult, ResultCode};
use crate::DIAMETER_VERSION;

/// Diameter message header size
pub const DIAMETER_HEADER_SIZE: usize = 20;

/// Largest value a 24-bit length field can carry
const MAX_24BIT: u32 = (1 << 24) - 1;

/// Command flags
pub mod cmd_flags {
    /// Request bit
    pub const REQUEST: u8 = 0x80;
    /// Proxiable bit
    pub const PROXIABLE: u8 = 0x40;
    /// Error bit
    pub const ERROR: u8 = 0x20;
    /// Potentially re-transmitted bit
    pub const RETRANSMIT: u8 = 0x10;
}

/// Base Diameter command codes (RFC 6733)
pub mod base_cmd {
    /// Capabilities-Exchange-Request/Answer
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    /// Device-Watchdog-Request/Answer
    pub const DEVICE_WATCHDOG: u32 = 280;
    /// Disconnect-Peer-Request/Answer
    pub const DISCONNECT_PEER: u32 = 282;
}

/// Base Diameter application ID
pub const BASE_APPLICATION_ID: u32 = 0;

/// Diameter message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterHeader {
    /// Protocol version (always 1)
    pub version: u8,
    /// Message length including header; authoritative value is written
    /// during encode
    pub length: u32,
    /// Command flags
    pub flags: u8,
    /// Command code
    pub command_code: u32,
    /// Application ID
    pub application_id: u32,
    /// Hop-by-Hop identifier
    pub hop_by_hop_id: u32,
    /// End-to-End identifier
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    /// Create a request header with fresh random identifiers
    pub fn new_request(command_code: u32, application_id: u32) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: DIAMETER_HEADER_SIZE as u32,
            flags: cmd_flags::REQUEST,
            command_code,
            application_id,
            hop_by_hop_id: rand::random::<u32>(),
            end_to_end_id: rand::random::<u32>(),
        }
    }

    /// Create an answer header from a request
    ///
    /// Command-Code, Application-ID, Hop-by-Hop and End-to-End identifiers
    /// are copied verbatim; the R and T bits are cleared and P is kept.
    pub fn new_answer(request: &DiameterHeader) -> Self {
        Self {
            version: DIAMETER_VERSION,
            length: DIAMETER_HEADER_SIZE as u32,
            flags: request.flags & !(cmd_flags::REQUEST | cmd_flags::RETRANSMIT),
            command_code: request.command_code,
            application_id: request.application_id,
            hop_by_hop_id: request.hop_by_hop_id,
            end_to_end_id: request.end_to_end_id,
        }
    }

    /// Check if this is a request
    pub fn is_request(&self) -> bool {
        self.flags & cmd_flags::REQUEST != 0
    }

    /// Check if this is an answer
    pub fn is_answer(&self) -> bool {
        !self.is_request()
    }

    /// Check if this is proxiable
    pub fn is_proxiable(&self) -> bool {
        self.flags & cmd_flags::PROXIABLE != 0
    }

    /// Check if the error bit is set
    pub fn is_error(&self) -> bool {
        self.flags & cmd_flags::ERROR != 0
    }

    /// Set the error bit
    pub fn set_error(&mut self) {
        self.flags |= cmd_flags::ERROR;
    }

    /// Set the potentially-retransmitted bit
    pub fn set_retransmit(&mut self) {
        self.flags |= cmd_flags::RETRANSMIT;
    }

    /// Encode the 20-octet header
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(((self.length >> 16) & 0xFF) as u8);
        buf.put_u16((self.length & 0xFFFF) as u16);
        buf.put_u8(self.flags);
        buf.put_u8(((self.command_code >> 16) & 0xFF) as u8);
        buf.put_u16((self.command_code & 0xFFFF) as u16);
        buf.put_u32(self.application_id);
        buf.put_u32(self.hop_by_hop_id);
        buf.put_u32(self.end_to_end_id);
    }

    /// Decode the 20-octet header
    pub fn decode(buf: &mut Bytes) -> DiameterResult<Self> {
        if buf.remaining() < DIAMETER_HEADER_SIZE {
            return Err(DiameterError::ShortBuffer {
                needed: DIAMETER_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let version = buf.get_u8();
        if version != DIAMETER_VERSION {
            return Err(DiameterError::InvalidVersion(version));
        }

        let len_high = buf.get_u8() as u32;
        let len_low = buf.get_u16() as u32;
        let length = (len_high << 16) | len_low;

        let flags = buf.get_u8();
        let cmd_high = buf.get_u8() as u32;
        let cmd_low = buf.get_u16() as u32;
        let command_code = (cmd_high << 16) | cmd_low;

        let application_id = buf.get_u32();
        let hop_by_hop_id = buf.get_u32();
        let end_to_end_id = buf.get_u32();

        Ok(Self {
            version,
            length,
            flags,
            command_code,
            application_id,
            hop_by_hop_id,
            end_to_end_id,
        })
    }
}

/// Diameter message: a header plus an ordered list of top-level AVPs
///
/// AVP order is preserved exactly across encode/decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DiameterMessage {
    /// Message header
    pub header: DiameterHeader,
    /// AVPs in wire order
    pub avps: Vec<Avp>,
}

impl DiameterMessage {
    /// Create a message from parts
    pub fn new(header: DiameterHeader, avps: Vec<Avp>) -> Self {
        Self { header, avps }
    }

    /// Create a request for the base protocol application
    pub fn new_request(command_code: u32, avps: Vec<Avp>) -> Self {
        Self {
            header: DiameterHeader::new_request(command_code, BASE_APPLICATION_ID),
            avps,
        }
    }

    /// Create a request for a specific application
    pub fn new_app_request(command_code: u32, application_id: u32, avps: Vec<Avp>) -> Self {
        Self {
            header: DiameterHeader::new_request(command_code, application_id),
            avps,
        }
    }

    /// Create an answer from a request, copying the correlation identifiers
    pub fn new_answer(request: &DiameterMessage, avps: Vec<Avp>) -> Self {
        Self {
            header: DiameterHeader::new_answer(&request.header),
            avps,
        }
    }

    /// Create a Capabilities-Exchange-Request (command 257)
    pub fn new_cer(avps: Vec<Avp>) -> Self {
        Self::new_request(base_cmd::CAPABILITIES_EXCHANGE, avps)
    }

    /// Create a Capabilities-Exchange-Answer from a CER
    pub fn new_cea(cer: &DiameterMessage, avps: Vec<Avp>) -> Self {
        Self::new_answer(cer, avps)
    }

    /// Create a Device-Watchdog-Request (command 280)
    pub fn new_dwr(avps: Vec<Avp>) -> Self {
        Self::new_request(base_cmd::DEVICE_WATCHDOG, avps)
    }

    /// Create a Device-Watchdog-Answer from a DWR
    pub fn new_dwa(dwr: &DiameterMessage, avps: Vec<Avp>) -> Self {
        Self::new_answer(dwr, avps)
    }

    /// Create a Disconnect-Peer-Request (command 282)
    pub fn new_dpr(avps: Vec<Avp>) -> Self {
        Self::new_request(base_cmd::DISCONNECT_PEER, avps)
    }

    /// Create a Disconnect-Peer-Answer from a DPR
    pub fn new_dpa(dpr: &DiameterMessage, avps: Vec<Avp>) -> Self {
        Self::new_answer(dpr, avps)
    }

    /// Append an AVP
    pub fn add_avp(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// Find the first top-level AVP with the given code
    pub fn find_avp(&self, code: u32) -> Option<&Avp> {
        avp::find_avp(&self.avps, code)
    }

    /// Find the first top-level AVP by its dictionary name
    pub fn find_avp_by_name(&self, name: &str) -> Option<&Avp> {
        let code = crate::dictionary::code_for_name(name)?;
        self.find_avp(code)
    }

    /// Find the first top-level AVP with the given code and vendor ID
    pub fn find_vendor_avp(&self, code: u32, vendor_id: u32) -> Option<&Avp> {
        avp::find_vendor_avp(&self.avps, code, vendor_id)
    }

    /// Total serialized size: header plus every AVP with its padding
    pub fn calculate_length(&self) -> u32 {
        let avp_len: usize = self.avps.iter().map(|a| a.encoded_len()).sum();
        (DIAMETER_HEADER_SIZE + avp_len) as u32
    }

    /// Encode the message, writing the recomputed Message Length
    pub fn encode(&self) -> DiameterResult<BytesMut> {
        let length = self.calculate_length();
        if length > MAX_24BIT {
            return Err(DiameterError::InvalidMessageLength(length));
        }

        let mut buf = BytesMut::with_capacity(length as usize);
        let mut header = self.header.clone();
        header.length = length;
        header.encode(&mut buf);

        for avp in &self.avps {
            avp.encode(&mut buf);
        }

        Ok(buf)
    }

    /// Decode a message, consuming exactly Message Length octets
    ///
    /// Trailing bytes beyond Message Length are left in the buffer.
    pub fn decode(buf: &mut Bytes) -> DiameterResult<Self> {
        let header = DiameterHeader::decode(buf)?;

        if (header.length as usize) < DIAMETER_HEADER_SIZE {
            return Err(DiameterError::InvalidHeaderLength(header.length as usize));
        }

        let avp_len = header.length as usize - DIAMETER_HEADER_SIZE;
        if buf.remaining() < avp_len {
            return Err(DiameterError::InvalidMessageLength(header.length));
        }

        let mut avp_buf = buf.copy_to_bytes(avp_len);
        let mut avps = Vec::new();
        while avp_buf.has_remaining() {
            avps.push(Avp::decode(&mut avp_buf)?);
        }

        Ok(Self { header, avps })
    }

    /// Session-Id AVP value
    pub fn session_id(&self) -> Option<&str> {
        self.find_avp(avp_code::SESSION_ID)?.as_str()
    }

    /// Origin-Host AVP value
    pub fn origin_host(&self) -> Option<&str> {
        self.find_avp(avp_code::ORIGIN_HOST)?.as_str()
    }

    /// Origin-Realm AVP value
    pub fn origin_realm(&self) -> Option<&str> {
        self.find_avp(avp_code::ORIGIN_REALM)?.as_str()
    }

    /// Result-Code AVP value
    pub fn result_code(&self) -> Option<u32> {
        self.find_avp(avp_code::RESULT_CODE)?.as_u32()
    }
}

/// Extract the Result-Code AVP with its canonical name
pub fn get_result_code(msg: &DiameterMessage) -> DiameterResult<(ResultCode, &'static str)> {
    let code = msg.result_code().ok_or(DiameterError::ResultCodeMissing)?;
    let rc = ResultCode::from(code);
    Ok((rc, rc.name()))
}

/// Validate a Capabilities-Exchange-Answer and return its AVPs
///
/// A CEA is an answer (R flag clear) with command code 257. Fails with
/// `ResultCodeFailure` unless Result-Code is DIAMETER_SUCCESS.
pub fn read_cea(cea: &DiameterMessage) -> DiameterResult<&[Avp]> {
    if cea.header.command_code != base_cmd::CAPABILITIES_EXCHANGE || cea.header.is_request() {
        return Err(DiameterError::InvalidCommandCode(cea.header.command_code));
    }

    let code = cea.result_code().ok_or(DiameterError::ResultCodeMissing)?;
    let rc = ResultCode::from(code);
    if rc != ResultCode::Success {
        return Err(DiameterError::ResultCodeFailure {
            code,
            name: rc.name(),
        });
    }
    Ok(&cea.avps)
}

/// Build a Session-Id value per RFC 6733 Section 8.8:
/// `<DiameterIdentity>;<high 32 bits>;<low 32 bits>`
pub fn new_session_id(identity: &str) -> String {
    format!(
        "{};{};{}",
        identity,
        rand::random::<u32>(),
        rand::random::<u32>()
    )
}
