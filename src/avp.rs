//! Diameter AVP (Attribute-Value Pair) encoding and decoding
//!
//! AVP format (RFC 6733):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           AVP Code                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V M P r r r r r|                  AVP Length                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Vendor-ID (opt)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Data ...
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! The Length field covers the header and data but not the trailing
//! padding; AVP values that are not a multiple of 4 octets are followed by
//! zero padding so the next AVP starts on a 32-bit boundary.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::dictionary::{self, AvpKind};
use crate::error::{DiameterError, DiameterResult};

/// AVP flags
pub mod avp_flags {
    /// Vendor-Specific bit
    pub const VENDOR: u8 = 0x80;
    /// Mandatory bit
    pub const MANDATORY: u8 = 0x40;
    /// Protected bit (end-to-end security)
    pub const PROTECTED: u8 = 0x20;
}

/// AVP header size without vendor ID
pub const AVP_HEADER_SIZE: usize = 8;
/// AVP header size with vendor ID
pub const AVP_HEADER_SIZE_VENDOR: usize = 12;

/// Address family numbers (IANAADFAM)
const ADDRESS_FAMILY_IPV4: u16 = 1;
const ADDRESS_FAMILY_IPV6: u16 = 2;

/// Padding needed after `length` octets to reach a 4-octet boundary
#[inline]
pub(crate) fn padding_for(length: usize) -> usize {
    (4 - (length % 4)) % 4
}

/// Diameter AVP
#[derive(Debug, Clone, PartialEq)]
pub struct Avp {
    /// AVP code
    pub code: u32,
    /// AVP flags
    pub flags: u8,
    /// Vendor ID, present iff the V flag is set
    pub vendor_id: Option<u32>,
    /// Typed AVP data
    pub data: AvpData,
}

/// AVP data types (RFC 6733 Section 4.2 and 4.3)
///
/// Unregistered codes decode as `OctetString` carrying the raw payload, so
/// arbitrary application AVPs survive a decode/encode round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum AvpData {
    /// Arbitrary bytes
    OctetString(Bytes),
    /// 32-bit signed, network byte order
    Integer32(i32),
    /// 64-bit signed, network byte order
    Integer64(i64),
    /// 32-bit unsigned, network byte order
    Unsigned32(u32),
    /// 64-bit unsigned, network byte order
    Unsigned64(u64),
    /// IEEE 754 single precision
    Float32(f32),
    /// IEEE 754 double precision
    Float64(f64),
    /// 2-octet address family followed by an IPv4 or IPv6 address
    Address(IpAddr),
    /// Validated UTF-8 text
    Utf8String(String),
    /// NTP seconds since 1 January 1900 UTC
    Time(u32),
    /// ASCII FQDN or realm
    DiameterIdentity(String),
    /// "aaa://" URI
    DiameterUri(String),
    /// Enumerated value (Integer32 derived)
    Enumerated(i32),
    /// ipfw-style filter rule text, opaque at this layer
    IpFilterRule(String),
    /// Ordered sequence of nested AVPs
    Grouped(Vec<Avp>),
    /// Application identifier (Unsigned32 derived)
    AppId(u32),
    /// IANA enterprise number (Unsigned32 derived)
    VendorId(u32),
}

impl Avp {
    /// Create an AVP from already-typed data
    pub fn new(code: u32, flags: u8, vendor_id: Option<u32>, data: AvpData) -> Self {
        Self {
            code,
            flags,
            vendor_id,
            data,
        }
    }

    /// Create a mandatory AVP
    pub fn mandatory(code: u32, data: AvpData) -> Self {
        Self::new(code, avp_flags::MANDATORY, None, data)
    }

    /// Create a vendor-specific mandatory AVP
    pub fn vendor_mandatory(code: u32, vendor_id: u32, data: AvpData) -> Self {
        Self::new(
            code,
            avp_flags::VENDOR | avp_flags::MANDATORY,
            Some(vendor_id),
            data,
        )
    }

    /// Check if AVP is vendor-specific
    pub fn is_vendor_specific(&self) -> bool {
        self.flags & avp_flags::VENDOR != 0
    }

    /// Check if AVP is mandatory
    pub fn is_mandatory(&self) -> bool {
        self.flags & avp_flags::MANDATORY != 0
    }

    /// Check if AVP is protected
    pub fn is_protected(&self) -> bool {
        self.flags & avp_flags::PROTECTED != 0
    }

    fn header_len(&self) -> usize {
        if self.is_vendor_specific() {
            AVP_HEADER_SIZE_VENDOR
        } else {
            AVP_HEADER_SIZE
        }
    }

    /// Value of the on-wire Length field: header plus data, pre-padding
    pub fn length(&self) -> u32 {
        (self.header_len() + self.data.encoded_len()) as u32
    }

    /// Total wire size of this AVP including trailing padding
    pub fn encoded_len(&self) -> usize {
        let total = self.header_len() + self.data.encoded_len();
        total + padding_for(total)
    }

    /// Encode the AVP, writing zero padding up to the next 4-octet boundary
    pub fn encode(&self, buf: &mut BytesMut) {
        let data_len = self.data.encoded_len();
        let avp_len = self.header_len() + data_len;

        buf.put_u32(self.code);
        buf.put_u8(self.flags);
        buf.put_u8(((avp_len >> 16) & 0xFF) as u8);
        buf.put_u16((avp_len & 0xFFFF) as u16);

        if self.is_vendor_specific() {
            buf.put_u32(self.vendor_id.unwrap_or(0));
        }

        self.data.encode(buf);

        for _ in 0..padding_for(data_len) {
            buf.put_u8(0);
        }
    }

    /// Decode one AVP from the buffer, consuming its padding
    ///
    /// The payload is interpreted according to the dictionary entry for the
    /// AVP code; unknown codes yield `AvpData::OctetString`.
    pub fn decode(buf: &mut Bytes) -> DiameterResult<Self> {
        if buf.remaining() < AVP_HEADER_SIZE {
            return Err(DiameterError::ShortBuffer {
                needed: AVP_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let code = buf.get_u32();
        let flags = buf.get_u8();
        let len_high = buf.get_u8() as u32;
        let len_low = buf.get_u16() as u32;
        let avp_len = (len_high << 16) | len_low;

        let is_vendor = flags & avp_flags::VENDOR != 0;
        let header_len = if is_vendor {
            AVP_HEADER_SIZE_VENDOR
        } else {
            AVP_HEADER_SIZE
        };

        if (avp_len as usize) < header_len {
            return Err(DiameterError::InvalidAvpLength(avp_len));
        }

        let vendor_id = if is_vendor {
            if buf.remaining() < 4 {
                return Err(DiameterError::ShortBuffer {
                    needed: 4,
                    available: buf.remaining(),
                });
            }
            Some(buf.get_u32())
        } else {
            None
        };

        let data_len = avp_len as usize - header_len;
        if buf.remaining() < data_len {
            return Err(DiameterError::ShortBuffer {
                needed: data_len,
                available: buf.remaining(),
            });
        }

        let data_bytes = buf.copy_to_bytes(data_len);
        let data = match dictionary::lookup(code) {
            Some(def) => AvpData::decode(def.kind, data_bytes)?,
            None => AvpData::OctetString(data_bytes),
        };

        let padding = padding_for(data_len);
        buf.advance(padding.min(buf.remaining()));

        Ok(Self {
            code,
            flags,
            vendor_id,
            data,
        })
    }

    /// Get data as raw bytes
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.data {
            AvpData::OctetString(b) => Some(b),
            _ => None,
        }
    }

    /// Get data as Unsigned32
    pub fn as_u32(&self) -> Option<u32> {
        match &self.data {
            AvpData::Unsigned32(v) | AvpData::AppId(v) | AvpData::VendorId(v) | AvpData::Time(v) => {
                Some(*v)
            }
            AvpData::Enumerated(v) => Some(*v as u32),
            AvpData::OctetString(b) if b.len() == 4 => {
                Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            _ => None,
        }
    }

    /// Get data as Unsigned64
    pub fn as_u64(&self) -> Option<u64> {
        match &self.data {
            AvpData::Unsigned64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get data as Integer32
    pub fn as_i32(&self) -> Option<i32> {
        match &self.data {
            AvpData::Integer32(v) | AvpData::Enumerated(v) => Some(*v),
            _ => None,
        }
    }

    /// Get data as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            AvpData::Utf8String(s)
            | AvpData::DiameterIdentity(s)
            | AvpData::DiameterUri(s)
            | AvpData::IpFilterRule(s) => Some(s),
            AvpData::OctetString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get data as an IP address
    pub fn as_address(&self) -> Option<IpAddr> {
        match &self.data {
            AvpData::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Get data as nested AVPs
    pub fn as_grouped(&self) -> Option<&[Avp]> {
        match &self.data {
            AvpData::Grouped(avps) => Some(avps),
            _ => None,
        }
    }
}

impl AvpData {
    /// Wire length of the data, excluding padding
    pub fn encoded_len(&self) -> usize {
        match self {
            AvpData::OctetString(b) => b.len(),
            AvpData::Integer32(_)
            | AvpData::Unsigned32(_)
            | AvpData::Enumerated(_)
            | AvpData::AppId(_)
            | AvpData::VendorId(_)
            | AvpData::Float32(_)
            | AvpData::Time(_) => 4,
            AvpData::Integer64(_) | AvpData::Unsigned64(_) | AvpData::Float64(_) => 8,
            AvpData::Address(addr) => match addr {
                IpAddr::V4(_) => 6,
                IpAddr::V6(_) => 18,
            },
            AvpData::Utf8String(s)
            | AvpData::DiameterIdentity(s)
            | AvpData::DiameterUri(s)
            | AvpData::IpFilterRule(s) => s.len(),
            AvpData::Grouped(avps) => avps.iter().map(|a| a.encoded_len()).sum(),
        }
    }

    /// Encode the data in network byte order
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AvpData::OctetString(b) => buf.put_slice(b),
            AvpData::Integer32(v) | AvpData::Enumerated(v) => buf.put_i32(*v),
            AvpData::Integer64(v) => buf.put_i64(*v),
            AvpData::Unsigned32(v) | AvpData::AppId(v) | AvpData::VendorId(v) | AvpData::Time(v) => {
                buf.put_u32(*v)
            }
            AvpData::Unsigned64(v) => buf.put_u64(*v),
            AvpData::Float32(v) => buf.put_f32(*v),
            AvpData::Float64(v) => buf.put_f64(*v),
            AvpData::Address(addr) => match addr {
                IpAddr::V4(v4) => {
                    buf.put_u16(ADDRESS_FAMILY_IPV4);
                    buf.put_slice(&v4.octets());
                }
                IpAddr::V6(v6) => {
                    buf.put_u16(ADDRESS_FAMILY_IPV6);
                    buf.put_slice(&v6.octets());
                }
            },
            AvpData::Utf8String(s)
            | AvpData::DiameterIdentity(s)
            | AvpData::DiameterUri(s)
            | AvpData::IpFilterRule(s) => buf.put_slice(s.as_bytes()),
            AvpData::Grouped(avps) => {
                for avp in avps {
                    avp.encode(buf);
                }
            }
        }
    }

    /// Decode data of a known kind
    pub fn decode(kind: AvpKind, data: Bytes) -> DiameterResult<Self> {
        match kind {
            AvpKind::OctetString => Ok(AvpData::OctetString(data)),
            AvpKind::Integer32 => Ok(AvpData::Integer32(decode_i32(&data)?)),
            AvpKind::Enumerated => Ok(AvpData::Enumerated(decode_i32(&data)?)),
            AvpKind::Integer64 => Ok(AvpData::Integer64(decode_u64(&data)? as i64)),
            AvpKind::Unsigned32 => Ok(AvpData::Unsigned32(decode_u32(&data)?)),
            AvpKind::AppId => Ok(AvpData::AppId(decode_u32(&data)?)),
            AvpKind::VendorId => Ok(AvpData::VendorId(decode_u32(&data)?)),
            AvpKind::Unsigned64 => Ok(AvpData::Unsigned64(decode_u64(&data)?)),
            AvpKind::Float32 => Ok(AvpData::Float32(f32::from_bits(decode_u32(&data)?))),
            AvpKind::Float64 => Ok(AvpData::Float64(f64::from_bits(decode_u64(&data)?))),
            AvpKind::Time => Ok(AvpData::Time(decode_u32(&data)?)),
            AvpKind::Address => decode_address(&data),
            AvpKind::Utf8String => Ok(AvpData::Utf8String(decode_utf8(data)?)),
            AvpKind::DiameterIdentity => Ok(AvpData::DiameterIdentity(decode_utf8(data)?)),
            AvpKind::DiameterUri => Ok(AvpData::DiameterUri(decode_utf8(data)?)),
            AvpKind::IpFilterRule => Ok(AvpData::IpFilterRule(decode_utf8(data)?)),
            AvpKind::Grouped => {
                let mut avps = Vec::new();
                let mut buf = data;
                while buf.has_remaining() {
                    avps.push(Avp::decode(&mut buf)?);
                }
                Ok(AvpData::Grouped(avps))
            }
        }
    }

    /// The dictionary kind this data satisfies
    pub fn kind(&self) -> AvpKind {
        match self {
            AvpData::OctetString(_) => AvpKind::OctetString,
            AvpData::Integer32(_) => AvpKind::Integer32,
            AvpData::Integer64(_) => AvpKind::Integer64,
            AvpData::Unsigned32(_) => AvpKind::Unsigned32,
            AvpData::Unsigned64(_) => AvpKind::Unsigned64,
            AvpData::Float32(_) => AvpKind::Float32,
            AvpData::Float64(_) => AvpKind::Float64,
            AvpData::Address(_) => AvpKind::Address,
            AvpData::Utf8String(_) => AvpKind::Utf8String,
            AvpData::Time(_) => AvpKind::Time,
            AvpData::DiameterIdentity(_) => AvpKind::DiameterIdentity,
            AvpData::DiameterUri(_) => AvpKind::DiameterUri,
            AvpData::Enumerated(_) => AvpKind::Enumerated,
            AvpData::IpFilterRule(_) => AvpKind::IpFilterRule,
            AvpData::Grouped(_) => AvpKind::Grouped,
            AvpData::AppId(_) => AvpKind::AppId,
            AvpData::VendorId(_) => AvpKind::VendorId,
        }
    }
}

fn decode_u32(data: &Bytes) -> DiameterResult<u32> {
    if data.len() != 4 {
        return Err(DiameterError::InvalidAvpLength(data.len() as u32));
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

fn decode_i32(data: &Bytes) -> DiameterResult<i32> {
    decode_u32(data).map(|v| v as i32)
}

fn decode_u64(data: &Bytes) -> DiameterResult<u64> {
    if data.len() != 8 {
        return Err(DiameterError::InvalidAvpLength(data.len() as u32));
    }
    let mut octets = [0u8; 8];
    octets.copy_from_slice(data);
    Ok(u64::from_be_bytes(octets))
}

fn decode_utf8(data: Bytes) -> DiameterResult<String> {
    let s = std::str::from_utf8(&data).map_err(|_| DiameterError::InvalidUtf8)?;
    // Code points are restricted to 0x00000001..=0x7FFFFFFF
    if s.contains('\0') {
        return Err(DiameterError::InvalidUtf8);
    }
    Ok(s.to_string())
}

fn decode_address(data: &Bytes) -> DiameterResult<AvpData> {
    if data.len() < 2 {
        return Err(DiameterError::InvalidAddressLength(data.len()));
    }
    let family = u16::from_be_bytes([data[0], data[1]]);
    match family {
        ADDRESS_FAMILY_IPV4 => {
            if data.len() != 2 + 4 {
                return Err(DiameterError::InvalidAddressLength(data.len()));
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&data[2..6]);
            Ok(AvpData::Address(IpAddr::V4(Ipv4Addr::from(octets))))
        }
        ADDRESS_FAMILY_IPV6 => {
            if data.len() != 2 + 16 {
                return Err(DiameterError::InvalidAddressLength(data.len()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[2..18]);
            Ok(AvpData::Address(IpAddr::V6(Ipv6Addr::from(octets))))
        }
        other => Err(DiameterError::UnknownAddressFamily(other)),
    }
}

/// Build an AVP through the dictionary, coercing `value` to the kind
/// registered for `code`
///
/// Fails with `UnsupportedAvpCode` for unregistered codes, `TypeMismatch`
/// when the value cannot satisfy the registered kind, and
/// `VendorIdRequired` when the V flag is set without a vendor ID.
pub fn new_avp(
    code: u32,
    value: AvpData,
    flags: u8,
    vendor_id: Option<u32>,
) -> DiameterResult<Avp> {
    let def = dictionary::lookup(code).ok_or(DiameterError::UnsupportedAvpCode(code))?;

    if flags & avp_flags::VENDOR != 0 && vendor_id.is_none() {
        return Err(DiameterError::VendorIdRequired);
    }

    let data = coerce(value, def.kind)?;
    Ok(Avp::new(code, flags, vendor_id, data))
}

/// Coerce typed data into the registered kind, allowing conversions between
/// a base kind and its derived kinds
fn coerce(value: AvpData, kind: AvpKind) -> DiameterResult<AvpData> {
    if value.kind() == kind {
        return Ok(value);
    }
    let coerced = match (value, kind) {
        (AvpData::Utf8String(s), AvpKind::DiameterIdentity) => AvpData::DiameterIdentity(s),
        (AvpData::Utf8String(s), AvpKind::DiameterUri) => AvpData::DiameterUri(s),
        (AvpData::Utf8String(s), AvpKind::IpFilterRule) => AvpData::IpFilterRule(s),
        (AvpData::DiameterIdentity(s), AvpKind::Utf8String) => AvpData::Utf8String(s),
        (AvpData::Unsigned32(v), AvpKind::AppId) => AvpData::AppId(v),
        (AvpData::Unsigned32(v), AvpKind::VendorId) => AvpData::VendorId(v),
        (AvpData::Unsigned32(v), AvpKind::Time) => AvpData::Time(v),
        (AvpData::Unsigned32(v), AvpKind::Enumerated) => AvpData::Enumerated(v as i32),
        (AvpData::Integer32(v), AvpKind::Enumerated) => AvpData::Enumerated(v),
        (AvpData::Enumerated(v), AvpKind::Integer32) => AvpData::Integer32(v),
        (AvpData::OctetString(b), AvpKind::Utf8String) => AvpData::Utf8String(decode_utf8(b)?),
        (_, kind) => {
            return Err(DiameterError::TypeMismatch {
                expected: kind_name(kind),
            })
        }
    };
    Ok(coerced)
}

fn kind_name(kind: AvpKind) -> &'static str {
    match kind {
        AvpKind::OctetString => "OctetString",
        AvpKind::Integer32 => "Integer32",
        AvpKind::Integer64 => "Integer64",
        AvpKind::Unsigned32 => "Unsigned32",
        AvpKind::Unsigned64 => "Unsigned64",
        AvpKind::Float32 => "Float32",
        AvpKind::Float64 => "Float64",
        AvpKind::Address => "Address",
        AvpKind::Utf8String => "UTF8String",
        AvpKind::Time => "Time",
        AvpKind::DiameterIdentity => "DiameterIdentity",
        AvpKind::DiameterUri => "DiameterURI",
        AvpKind::Enumerated => "Enumerated",
        AvpKind::IpFilterRule => "IPFilterRule",
        AvpKind::Grouped => "Grouped",
        AvpKind::AppId => "AppId",
        AvpKind::VendorId => "VendorId",
    }
}

/// Find the first AVP with the given code
pub fn find_avp(avps: &[Avp], code: u32) -> Option<&Avp> {
    avps.iter().find(|a| a.code == code)
}

/// Find the first AVP with the given code and vendor ID
pub fn find_vendor_avp(avps: &[Avp], code: u32, vendor_id: u32) -> Option<&Avp> {
    avps.iter()
        .find(|a| a.code == code && a.vendor_id == Some(vendor_id))
}

/// Find all AVPs with the given code
pub fn find_all_avps(avps: &[Avp], code: u32) -> Vec<&Avp> {
    avps.iter().filter(|a| a.code == code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::avp_code;

    fn round_trip(avp: &Avp) -> Avp {
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        assert_eq!(buf.len(), avp.encoded_len());
        let mut bytes = buf.freeze();
        let decoded = Avp::decode(&mut bytes).unwrap();
        assert_eq!(bytes.remaining(), 0, "decode must consume padding");
        decoded
    }

    #[test]
    fn test_unsigned32_wire_format() {
        // Result-Code 2001, mandatory: 12 bytes, no padding
        let avp = Avp::mandatory(avp_code::RESULT_CODE, AvpData::Unsigned32(2001));
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[0x00, 0x00, 0x01, 0x0C, 0x40, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x07, 0xD1]
        );
    }

    #[test]
    fn test_octet_string_padding() {
        // 4 data octets: length 12, already aligned
        let avp = Avp::mandatory(avp_code::ORIGIN_HOST, AvpData::DiameterIdentity("test".into()));
        assert_eq!(avp.length(), 12);
        assert_eq!(avp.encoded_len(), 12);

        // 5 data octets: length 13, three zero padding octets
        let avp = Avp::mandatory(avp_code::ORIGIN_HOST, AvpData::DiameterIdentity("tests".into()));
        assert_eq!(avp.length(), 13);
        assert_eq!(avp.encoded_len(), 16);

        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[13..], &[0, 0, 0]);
    }

    #[test]
    fn test_address_ipv4_wire_format() {
        let data = AvpData::Address("192.168.1.1".parse().unwrap());
        let mut buf = BytesMut::new();
        data.encode(&mut buf);
        assert_eq!(&buf[..], &[0x00, 0x01, 0xC0, 0xA8, 0x01, 0x01]);

        let decoded = AvpData::decode(AvpKind::Address, buf.freeze()).unwrap();
        assert_eq!(decoded, AvpData::Address("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_address_rejects_bad_lengths() {
        // Family says IPv4 but only 3 address octets follow
        let bad = Bytes::from_static(&[0x00, 0x01, 0xC0, 0xA8, 0x01]);
        assert!(matches!(
            AvpData::decode(AvpKind::Address, bad),
            Err(DiameterError::InvalidAddressLength(5))
        ));

        let short = Bytes::from_static(&[0x00]);
        assert!(matches!(
            AvpData::decode(AvpKind::Address, short),
            Err(DiameterError::InvalidAddressLength(1))
        ));

        let unknown = Bytes::from_static(&[0x00, 0x07, 1, 2, 3, 4]);
        assert!(matches!(
            AvpData::decode(AvpKind::Address, unknown),
            Err(DiameterError::UnknownAddressFamily(7))
        ));
    }

    #[test]
    fn test_address_ipv6_round_trip() {
        let avp = Avp::mandatory(
            avp_code::HOST_IP_ADDRESS,
            AvpData::Address("2001:db8::1".parse().unwrap()),
        );
        assert_eq!(avp.length(), 8 + 18);
        assert_eq!(round_trip(&avp), avp);
    }

    #[test]
    fn test_utf8_validation() {
        let invalid = Bytes::from_static(&[0xFF, 0xFE, 0x00]);
        assert!(matches!(
            AvpData::decode(AvpKind::Utf8String, invalid),
            Err(DiameterError::InvalidUtf8)
        ));

        let nul = Bytes::from_static(b"ab\0cd");
        assert!(matches!(
            AvpData::decode(AvpKind::Utf8String, nul),
            Err(DiameterError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_vendor_specific_round_trip() {
        let avp = Avp::vendor_mandatory(
            avp_code::SUPPORTED_VENDOR_ID,
            crate::dictionary::vendor_id::THREEGPP,
            AvpData::VendorId(crate::dictionary::vendor_id::THREEGPP),
        );
        assert_eq!(avp.length(), 12 + 4);
        let decoded = round_trip(&avp);
        assert_eq!(decoded.vendor_id, Some(10415));
        assert!(decoded.is_vendor_specific());
        assert_eq!(decoded, avp);
    }

    #[test]
    fn test_vendor_header_too_short() {
        // V flag set but length claims a vendor-less header
        let bytes = Bytes::from_static(&[
            0x00, 0x00, 0x01, 0x0A, // code 266
            0x80, 0x00, 0x00, 0x0B, // V set, length 11 < 12
            0x00, 0x00, 0x28,
        ]);
        let mut buf = bytes;
        assert!(matches!(
            Avp::decode(&mut buf),
            Err(DiameterError::InvalidAvpLength(11))
        ));
    }

    #[test]
    fn test_length_below_header_rejected() {
        let bytes = Bytes::from_static(&[
            0x00, 0x00, 0x01, 0x0C, // code 268
            0x40, 0x00, 0x00, 0x07, // length 7 < 8
        ]);
        let mut buf = bytes;
        assert!(matches!(
            Avp::decode(&mut buf),
            Err(DiameterError::InvalidAvpLength(7))
        ));
    }

    #[test]
    fn test_truncated_data_rejected() {
        let bytes = Bytes::from_static(&[
            0x00, 0x00, 0x01, 0x0C, // code 268
            0x40, 0x00, 0x00, 0x0C, // length 12: 4 data octets
            0x00, 0x00, // only 2 present
        ]);
        let mut buf = bytes;
        assert!(matches!(
            Avp::decode(&mut buf),
            Err(DiameterError::ShortBuffer { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_unknown_code_decodes_raw() {
        let avp = Avp::mandatory(77777, AvpData::OctetString(Bytes::from_static(b"opaque!")));
        let decoded = round_trip(&avp);
        assert_eq!(decoded.data, AvpData::OctetString(Bytes::from_static(b"opaque!")));

        // Unknown AVPs re-encode byte-identically
        let mut first = BytesMut::new();
        avp.encode(&mut first);
        let mut second = BytesMut::new();
        decoded.encode(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_grouped_round_trip() {
        let inner = vec![
            Avp::mandatory(avp_code::RESULT_CODE, AvpData::Unsigned32(5012)),
            Avp::mandatory(avp_code::ERROR_MESSAGE, AvpData::Utf8String("rejected".into())),
        ];
        let avp = Avp::mandatory(avp_code::FAILED_AVP, AvpData::Grouped(inner));
        // Grouped payload is a sum of padded inner AVPs, so the outer
        // length is always a multiple of 4
        assert_eq!(avp.length() % 4, 0);
        let decoded = round_trip(&avp);
        assert_eq!(decoded, avp);
        assert_eq!(decoded.as_grouped().unwrap().len(), 2);
    }

    #[test]
    fn test_nested_grouped() {
        let leaf = Avp::mandatory(avp_code::RESULT_CODE, AvpData::Unsigned32(2001));
        let mid = Avp::mandatory(avp_code::EXPERIMENTAL_RESULT, AvpData::Grouped(vec![leaf]));
        let outer = Avp::mandatory(avp_code::FAILED_AVP, AvpData::Grouped(vec![mid]));
        assert_eq!(round_trip(&outer), outer);
    }

    #[test]
    fn test_new_avp_dictionary_checks() {
        let avp = new_avp(
            avp_code::ORIGIN_HOST,
            AvpData::Utf8String("peer.example.com".into()),
            avp_flags::MANDATORY,
            None,
        )
        .unwrap();
        assert_eq!(avp.data, AvpData::DiameterIdentity("peer.example.com".into()));

        assert!(matches!(
            new_avp(99999, AvpData::Unsigned32(1), avp_flags::MANDATORY, None),
            Err(DiameterError::UnsupportedAvpCode(99999))
        ));

        assert!(matches!(
            new_avp(
                avp_code::RESULT_CODE,
                AvpData::Utf8String("not a number".into()),
                avp_flags::MANDATORY,
                None
            ),
            Err(DiameterError::TypeMismatch { .. })
        ));

        assert!(matches!(
            new_avp(
                avp_code::VENDOR_ID,
                AvpData::Unsigned32(10415),
                avp_flags::VENDOR | avp_flags::MANDATORY,
                None
            ),
            Err(DiameterError::VendorIdRequired)
        ));
    }

    #[test]
    fn test_find_helpers() {
        let avps = vec![
            Avp::mandatory(avp_code::RESULT_CODE, AvpData::Unsigned32(2001)),
            Avp::vendor_mandatory(avp_code::SUPPORTED_VENDOR_ID, 10415, AvpData::VendorId(10415)),
            Avp::mandatory(avp_code::SUPPORTED_VENDOR_ID, AvpData::VendorId(193)),
        ];
        assert_eq!(find_avp(&avps, avp_code::RESULT_CODE).unwrap().as_u32(), Some(2001));
        assert!(find_avp(&avps, avp_code::SESSION_ID).is_none());
        assert_eq!(
            find_vendor_avp(&avps, avp_code::SUPPORTED_VENDOR_ID, 10415)
                .unwrap()
                .as_u32(),
            Some(10415)
        );
        assert_eq!(find_all_avps(&avps, avp_code::SUPPORTED_VENDOR_ID).len(), 2);
    }
}
