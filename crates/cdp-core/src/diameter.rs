use crate::error::{CdpError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use cdp_dict::data_type::{encode_address, parse_address};
use cdp_dict::{avp, avp_defaults, AvpDataType, AvpValue, DictionaryManager};
use std::fmt::Write as _;
use std::net::IpAddr;

/// Diameter protocol version
pub const DIAMETER_VERSION: u8 = 1;
/// Fixed header size
pub const HEADER_LEN: usize = 20;
/// AVP header without / with Vendor-Id
pub const AVP_HEADER_LEN: usize = 8;
pub const AVP_VENDOR_HEADER_LEN: usize = 12;
/// Largest value of the 24-bit AVP and message length fields
pub const MAX_LENGTH_FIELD: usize = 0x00FF_FFFF;

// Header flags
pub const FLAG_REQUEST: u8 = 0x80;
pub const FLAG_PROXIABLE: u8 = 0x40;
pub const FLAG_ERROR: u8 = 0x20;
pub const FLAG_RETRANSMIT: u8 = 0x10;

// AVP flags
pub use cdp_dict::standard::{AVP_FLAG_MANDATORY, AVP_FLAG_PROTECTED, AVP_FLAG_VENDOR};

/// Pad a payload length to the next 4-byte boundary
pub fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

fn read_u24(data: &[u8]) -> u32 {
    u32::from_be_bytes([0, data[0], data[1], data[2]])
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Diameter packet header (20 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterHeader {
    pub version: u8,
    pub length: u32,
    pub flags: u8,
    pub command_code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    /// Decode the fixed header from the start of `data`
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(CdpError::MalformedMessage(format!(
                "header needs {HEADER_LEN} bytes, got {}",
                data.len()
            )));
        }

        let version = data[0];
        if version != DIAMETER_VERSION {
            return Err(CdpError::MalformedMessage(format!("invalid version: {version}")));
        }

        Ok(Self {
            version,
            length: read_u24(&data[1..4]),
            flags: data[4],
            command_code: read_u24(&data[5..8]),
            application_id: read_u32(&data[8..12]),
            hop_by_hop_id: read_u32(&data[12..16]),
            end_to_end_id: read_u32(&data[16..20]),
        })
    }

    /// Append the header to `buf` using `length` as the total message length
    pub fn encode_into(&self, length: u32, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_uint(u64::from(length), 3);
        buf.put_u8(self.flags);
        buf.put_uint(u64::from(self.command_code), 3);
        buf.put_u32(self.application_id);
        buf.put_u32(self.hop_by_hop_id);
        buf.put_u32(self.end_to_end_id);
    }

    /// Check if this is a request
    pub fn is_request(&self) -> bool {
        (self.flags & FLAG_REQUEST) != 0
    }

    /// Check if this is an answer
    pub fn is_answer(&self) -> bool {
        !self.is_request()
    }

    pub fn is_proxiable(&self) -> bool {
        (self.flags & FLAG_PROXIABLE) != 0
    }

    pub fn is_error(&self) -> bool {
        (self.flags & FLAG_ERROR) != 0
    }

    pub fn is_retransmit(&self) -> bool {
        (self.flags & FLAG_RETRANSMIT) != 0
    }
}

/// Diameter AVP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterAvp {
    pub code: u32,
    pub flags: u8,
    pub vendor_id: Option<u32>,
    pub data: Bytes,
}

impl DiameterAvp {
    /// Build an AVP with exactly the given flags. The vendor bit follows
    /// `vendor_id`.
    pub fn new(code: u32, flags: u8, vendor_id: Option<u32>, data: impl Into<Bytes>) -> Self {
        let flags = match vendor_id {
            Some(_) => flags | AVP_FLAG_VENDOR,
            None => flags & !AVP_FLAG_VENDOR,
        };
        Self {
            code,
            flags,
            vendor_id,
            data: data.into(),
        }
    }

    /// Build an AVP the way the stack does for its own messages: flags of
    /// well-known codes are forced by the dictionary table, unknown codes
    /// keep the caller's flags. A zero vendor means no vendor.
    pub fn create(code: u32, flags: u8, vendor_id: u32, data: impl Into<Bytes>) -> Self {
        let vendor = (vendor_id != 0).then_some(vendor_id);
        let flags = if vendor.is_some() {
            flags
        } else {
            avp_defaults(code).flag_rule.apply(flags)
        };
        Self::new(code, flags, vendor, data)
    }

    pub fn from_u32(code: u32, flags: u8, vendor_id: u32, value: u32) -> Self {
        Self::create(code, flags, vendor_id, value.to_be_bytes().to_vec())
    }

    pub fn from_i32(code: u32, flags: u8, vendor_id: u32, value: i32) -> Self {
        Self::create(code, flags, vendor_id, value.to_be_bytes().to_vec())
    }

    pub fn from_u64(code: u32, flags: u8, vendor_id: u32, value: u64) -> Self {
        Self::create(code, flags, vendor_id, value.to_be_bytes().to_vec())
    }

    pub fn from_i64(code: u32, flags: u8, vendor_id: u32, value: i64) -> Self {
        Self::create(code, flags, vendor_id, value.to_be_bytes().to_vec())
    }

    pub fn from_str(code: u32, flags: u8, vendor_id: u32, value: &str) -> Self {
        Self::create(code, flags, vendor_id, Bytes::copy_from_slice(value.as_bytes()))
    }

    pub fn from_address(code: u32, flags: u8, vendor_id: u32, addr: &IpAddr) -> Self {
        Self::create(code, flags, vendor_id, encode_address(addr))
    }

    /// Grouped AVP whose payload is the encoding of `children`
    pub fn grouped(code: u32, flags: u8, vendor_id: u32, children: &[DiameterAvp]) -> Self {
        Self::create(code, flags, vendor_id, group_avps(children))
    }

    /// Length on the wire without padding (header + payload)
    pub fn length(&self) -> usize {
        self.header_len() + self.data.len()
    }

    /// Length on the wire including padding
    pub fn encoded_len(&self) -> usize {
        padded(self.length())
    }

    fn header_len(&self) -> usize {
        if self.vendor_id.is_some() {
            AVP_VENDOR_HEADER_LEN
        } else {
            AVP_HEADER_LEN
        }
    }

    /// Fails when the AVP does not fit its 24-bit length field
    pub fn check_length(&self) -> Result<()> {
        if self.length() > MAX_LENGTH_FIELD {
            return Err(CdpError::InvalidAvpValue {
                code: self.code,
                reason: format!("length {} overflows the AVP length field", self.length()),
            });
        }
        Ok(())
    }

    pub fn is_mandatory(&self) -> bool {
        (self.flags & AVP_FLAG_MANDATORY) != 0
    }

    pub fn is_vendor_specific(&self) -> bool {
        self.vendor_id.is_some()
    }

    pub fn is_protected(&self) -> bool {
        (self.flags & AVP_FLAG_PROTECTED) != 0
    }

    /// Decode one AVP from the start of `buf`. Returns the AVP and the
    /// number of bytes consumed including padding.
    pub fn decode(buf: &Bytes) -> Result<(Self, usize)> {
        if buf.len() < AVP_HEADER_LEN {
            return Err(CdpError::MalformedMessage(format!(
                "AVP header needs {AVP_HEADER_LEN} bytes, {} left",
                buf.len()
            )));
        }

        let code = read_u32(&buf[0..4]);
        let flags = buf[4];
        let length = read_u24(&buf[5..8]) as usize;

        let (vendor_id, header_len) = if (flags & AVP_FLAG_VENDOR) != 0 {
            if buf.len() < AVP_VENDOR_HEADER_LEN {
                return Err(CdpError::MalformedMessage(format!(
                    "vendor AVP {code} header truncated"
                )));
            }
            (Some(read_u32(&buf[8..12])), AVP_VENDOR_HEADER_LEN)
        } else {
            (None, AVP_HEADER_LEN)
        };

        if length < header_len {
            return Err(CdpError::MalformedMessage(format!(
                "AVP {code} declares length {length} below header size {header_len}"
            )));
        }
        if length > buf.len() {
            return Err(CdpError::MalformedMessage(format!(
                "AVP {code} declares length {length}, only {} bytes left",
                buf.len()
            )));
        }

        let avp = Self {
            code,
            flags,
            vendor_id,
            data: buf.slice(header_len..length),
        };
        Ok((avp, padded(length).min(buf.len())))
    }

    /// Append the padded encoding to `buf`. The length must have passed
    /// [`check_length`](Self::check_length).
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let flags = match self.vendor_id {
            Some(_) => self.flags | AVP_FLAG_VENDOR,
            None => self.flags & !AVP_FLAG_VENDOR,
        };
        buf.put_u32(self.code);
        buf.put_u8(flags);
        buf.put_uint(self.length() as u64, 3);
        if let Some(vendor) = self.vendor_id {
            buf.put_u32(vendor);
        }
        buf.put_slice(&self.data);
        buf.put_bytes(0, self.encoded_len() - self.length());
    }

    /// Standalone padded encoding
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn as_u32(&self) -> Result<u32> {
        let bytes: [u8; 4] = self.data[..].try_into().map_err(|_| self.bad_len(4))?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn as_i32(&self) -> Result<i32> {
        let bytes: [u8; 4] = self.data[..].try_into().map_err(|_| self.bad_len(4))?;
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn as_u64(&self) -> Result<u64> {
        let bytes: [u8; 8] = self.data[..].try_into().map_err(|_| self.bad_len(8))?;
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn as_i64(&self) -> Result<i64> {
        let bytes: [u8; 8] = self.data[..].try_into().map_err(|_| self.bad_len(8))?;
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.data).map_err(|_| CdpError::InvalidAvpValue {
            code: self.code,
            reason: "not UTF-8".to_string(),
        })
    }

    /// Lossy string view for logging and identities
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn as_address(&self) -> Result<IpAddr> {
        parse_address(&self.data).map_err(|e| CdpError::InvalidAvpValue {
            code: self.code,
            reason: e.to_string(),
        })
    }

    /// Decode the payload as a list of AVPs
    pub fn ungroup(&self) -> Result<Vec<DiameterAvp>> {
        ungroup_avps(&self.data)
    }

    /// Semantic type from the built-in table
    pub fn data_type(&self) -> AvpDataType {
        match self.vendor_id {
            Some(_) => AvpDataType::OctetString,
            None => avp_defaults(self.code).data_type,
        }
    }

    /// Typed value according to the dictionary
    pub fn value(&self, dict: &DictionaryManager) -> Result<AvpValue> {
        let data_type = dict
            .lookup_vendor(self.code, self.vendor_id)
            .map(|i| i.data_type)
            .unwrap_or(AvpDataType::OctetString);
        data_type
            .parse(&self.data)
            .map_err(|e| CdpError::InvalidAvpValue {
                code: self.code,
                reason: e.to_string(),
            })
    }

    fn bad_len(&self, expected: usize) -> CdpError {
        CdpError::InvalidAvpValue {
            code: self.code,
            reason: format!("expected {expected} bytes, got {}", self.data.len()),
        }
    }
}

/// Encode a list of AVPs as a grouped payload
pub fn group_avps(avps: &[DiameterAvp]) -> Bytes {
    let len = avps.iter().map(DiameterAvp::encoded_len).sum();
    let mut buf = BytesMut::with_capacity(len);
    for avp in avps {
        avp.encode_into(&mut buf);
    }
    buf.freeze()
}

/// Decode a grouped payload into its AVPs, preserving order
pub fn ungroup_avps(data: &[u8]) -> Result<Vec<DiameterAvp>> {
    decode_avp_list(Bytes::copy_from_slice(data))
}

fn decode_avp_list(mut rest: Bytes) -> Result<Vec<DiameterAvp>> {
    let mut avps = Vec::new();
    while !rest.is_empty() {
        let (avp, consumed) = DiameterAvp::decode(&rest)?;
        avps.push(avp);
        let _ = rest.split_to(consumed);
    }
    Ok(avps)
}

/// Complete Diameter message
#[derive(Debug, Clone)]
pub struct DiameterMessage {
    pub header: DiameterHeader,
    pub avps: Vec<DiameterAvp>,
    /// Bytes this message was decoded from; cleared by the mutating helpers
    pub raw: Option<Bytes>,
    /// FQDN of the peer the message was received from
    pub origin_peer: Option<String>,
}

impl PartialEq for DiameterMessage {
    fn eq(&self, other: &Self) -> bool {
        self.header.flags == other.header.flags
            && self.header.command_code == other.header.command_code
            && self.header.application_id == other.header.application_id
            && self.header.hop_by_hop_id == other.header.hop_by_hop_id
            && self.header.end_to_end_id == other.header.end_to_end_id
            && self.avps == other.avps
    }
}

impl DiameterMessage {
    /// Empty message with the given header fields
    pub fn new(
        command_code: u32,
        application_id: u32,
        flags: u8,
        hop_by_hop_id: u32,
        end_to_end_id: u32,
    ) -> Self {
        Self {
            header: DiameterHeader {
                version: DIAMETER_VERSION,
                length: HEADER_LEN as u32,
                flags,
                command_code,
                application_id,
                hop_by_hop_id,
                end_to_end_id,
            },
            avps: Vec::new(),
            raw: None,
            origin_peer: None,
        }
    }

    /// Empty request
    pub fn new_request(
        command_code: u32,
        application_id: u32,
        hop_by_hop_id: u32,
        end_to_end_id: u32,
    ) -> Self {
        Self::new(
            command_code,
            application_id,
            FLAG_REQUEST | FLAG_PROXIABLE,
            hop_by_hop_id,
            end_to_end_id,
        )
    }

    /// Answer skeleton for `request`: same command, application and
    /// identifiers, request bit cleared, Session-Id copied.
    pub fn answer_to(request: &DiameterMessage) -> Self {
        let mut answer = Self::new(
            request.header.command_code,
            request.header.application_id,
            request.header.flags & FLAG_PROXIABLE,
            request.header.hop_by_hop_id,
            request.header.end_to_end_id,
        );
        if let Some(session) = request.find_avp(avp::SESSION_ID) {
            answer.avps.push(session.clone());
        }
        answer
    }

    /// Decode a complete message from a byte slice
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_bytes(Bytes::copy_from_slice(data))
    }

    /// Decode a complete message; AVP payloads share the buffer
    pub fn decode_bytes(buf: Bytes) -> Result<Self> {
        let header = DiameterHeader::decode(&buf)?;
        let length = header.length as usize;

        if length < HEADER_LEN {
            return Err(CdpError::MalformedMessage(format!(
                "declared length {length} below header size"
            )));
        }
        if length > buf.len() {
            return Err(CdpError::MalformedMessage(format!(
                "declared length {length} exceeds buffer of {} bytes",
                buf.len()
            )));
        }

        let raw = buf.slice(..length);
        let avps = decode_avp_list(raw.slice(HEADER_LEN..))?;

        Ok(Self {
            header,
            avps,
            raw: Some(raw),
            origin_peer: None,
        })
    }

    /// Total encoded length
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.avps.iter().map(DiameterAvp::encoded_len).sum::<usize>()
    }

    /// Fails when an AVP or the whole message overflows its length field
    pub fn check_lengths(&self) -> Result<()> {
        for avp in &self.avps {
            avp.check_length()?;
        }
        let len = self.encoded_len();
        if len > MAX_LENGTH_FIELD {
            return Err(CdpError::MalformedMessage(format!(
                "message of {len} bytes overflows the length field"
            )));
        }
        Ok(())
    }

    /// Encode the message; the length field is recomputed from the AVPs.
    /// Callers on the send path run [`check_lengths`](Self::check_lengths)
    /// first.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(self.encoded_len() as u32, buf);
        for avp in &self.avps {
            avp.encode_into(buf);
        }
    }

    pub fn command_code(&self) -> u32 {
        self.header.command_code
    }

    pub fn application_id(&self) -> u32 {
        self.header.application_id
    }

    pub fn is_request(&self) -> bool {
        self.header.is_request()
    }

    pub fn is_answer(&self) -> bool {
        self.header.is_answer()
    }

    /// Append an AVP
    pub fn add_avp(&mut self, avp: DiameterAvp) {
        self.raw = None;
        self.avps.push(avp);
    }

    /// Insert an AVP at `index` (clamped to the end)
    pub fn insert_avp(&mut self, index: usize, avp: DiameterAvp) {
        self.raw = None;
        let index = index.min(self.avps.len());
        self.avps.insert(index, avp);
    }

    /// Remove every AVP with `code`; returns how many were removed
    pub fn remove_avps(&mut self, code: u32) -> usize {
        let before = self.avps.len();
        self.avps.retain(|a| a.code != code);
        let removed = before - self.avps.len();
        if removed > 0 {
            self.raw = None;
        }
        removed
    }

    /// Find AVP by code
    pub fn find_avp(&self, code: u32) -> Option<&DiameterAvp> {
        self.avps.iter().find(|avp| avp.code == code)
    }

    /// Find AVP by code and vendor
    pub fn find_vendor_avp(&self, code: u32, vendor_id: u32) -> Option<&DiameterAvp> {
        let vendor = (vendor_id != 0).then_some(vendor_id);
        self.avps
            .iter()
            .find(|avp| avp.code == code && avp.vendor_id == vendor)
    }

    /// Get all AVPs with specific code
    pub fn find_avps(&self, code: u32) -> impl Iterator<Item = &DiameterAvp> {
        self.avps.iter().filter(move |avp| avp.code == code)
    }

    pub fn get_u32(&self, code: u32) -> Option<u32> {
        self.find_avp(code).and_then(|a| a.as_u32().ok())
    }

    pub fn get_string(&self, code: u32) -> Option<String> {
        self.find_avp(code).map(DiameterAvp::as_string)
    }

    pub fn session_id(&self) -> Option<String> {
        self.get_string(avp::SESSION_ID)
    }

    pub fn origin_host(&self) -> Option<String> {
        self.get_string(avp::ORIGIN_HOST)
    }

    pub fn origin_realm(&self) -> Option<String> {
        self.get_string(avp::ORIGIN_REALM)
    }

    pub fn destination_host(&self) -> Option<String> {
        self.get_string(avp::DESTINATION_HOST)
    }

    pub fn destination_realm(&self) -> Option<String> {
        self.get_string(avp::DESTINATION_REALM)
    }

    pub fn result_code(&self) -> Option<u32> {
        self.get_u32(avp::RESULT_CODE)
    }

    /// Application and vendor the message belongs to. The vendor comes from
    /// a Vendor-Specific-Application-Id group when present.
    pub fn application_vendor(&self) -> (u32, u32) {
        let vendor = self
            .find_avp(avp::VENDOR_SPECIFIC_APPLICATION_ID)
            .and_then(|group| group.ungroup().ok())
            .and_then(|children| {
                children
                    .iter()
                    .find(|c| c.code == avp::VENDOR_ID)
                    .and_then(|c| c.as_u32().ok())
            })
            .unwrap_or(0);
        (self.header.application_id, vendor)
    }

    /// Multi-line dump of the message for debug logs
    pub fn dump(&self, dict: &DictionaryManager) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} app={} flags=0x{:02x} hbh=0x{:08x} e2e=0x{:08x}",
            cdp_dict::command::name(self.header.command_code),
            if self.is_request() { "Request" } else { "Answer" },
            self.header.application_id,
            self.header.flags,
            self.header.hop_by_hop_id,
            self.header.end_to_end_id,
        );
        for avp in &self.avps {
            dump_avp(&mut out, avp, dict, 1);
        }
        out
    }
}

fn dump_avp(out: &mut String, avp: &DiameterAvp, dict: &DictionaryManager, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = dict.avp_name(avp.code, avp.vendor_id);
    match avp.value(dict) {
        Ok(AvpValue::Grouped(_)) => {
            let _ = writeln!(out, "{indent}{name} ({}) flags=0x{:02x}", avp.code, avp.flags);
            match avp.ungroup() {
                Ok(children) => {
                    for child in &children {
                        dump_avp(out, child, dict, depth + 1);
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "{indent}  <{e}>");
                }
            }
        }
        Ok(value) => {
            let _ = writeln!(out, "{indent}{name} ({}) = {value}", avp.code);
        }
        Err(_) => {
            let _ = writeln!(out, "{indent}{name} ({}) = <{} bytes>", avp.code, avp.data.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_dict::command;

    fn sample_request() -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(command::CREDIT_CONTROL, 4, 0x1111, 0x2222);
        msg.add_avp(DiameterAvp::from_str(avp::SESSION_ID, 0, 0, "pcscf.ims.test;1;2"));
        msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "pcscf.ims.test"));
        msg.add_avp(DiameterAvp::from_u32(avp::CC_REQUEST_TYPE, 0x40, 0, 1));
        msg.add_avp(DiameterAvp::new(1234, 0x40, Some(10415), Bytes::from_static(b"abcde")));
        msg
    }

    #[test]
    fn test_header_decode_encode() {
        let data = vec![
            1, 0, 0, 20, // Version, Length (20)
            0x80, 0, 1, 1, // Flags (Request), Command Code (257)
            0, 0, 0, 0, // Application ID
            0, 0, 0, 1, // Hop-by-Hop ID
            0, 0, 0, 2, // End-to-End ID
        ];

        let header = DiameterHeader::decode(&data).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.length, 20);
        assert_eq!(header.command_code, 257);
        assert!(header.is_request());
        assert!(!header.is_proxiable());

        let mut buf = BytesMut::new();
        header.encode_into(20, &mut buf);
        assert_eq!(&buf[..], &data[..]);
    }

    #[test]
    fn test_avp_decode_strips_padding() {
        let data = Bytes::from(vec![
            0, 0, 1, 8, // Code (264)
            0x40, 0, 0, 13, // Flags (Mandatory), Length (13)
            b'h', b'o', b's', b't', b'x', 0, 0, 0, // "hostx" + padding
        ]);

        let (avp, consumed) = DiameterAvp::decode(&data).unwrap();
        assert_eq!(avp.code, 264);
        assert_eq!(avp.flags, 0x40);
        assert_eq!(&avp.data[..], b"hostx");
        assert_eq!(avp.length(), 13);
        assert_eq!(consumed, 16);
        assert_eq!(avp.encode(), data);
    }

    #[test]
    fn test_vendor_flag_follows_vendor_id() {
        let avp = DiameterAvp::new(500, 0x40, Some(10415), Bytes::from_static(&[0, 0, 0, 1]));
        assert!(avp.flags & AVP_FLAG_VENDOR != 0);
        assert_eq!(avp.length(), 16);

        let plain = DiameterAvp::new(500, 0xC0, None, Bytes::from_static(&[0, 0, 0, 1]));
        assert_eq!(plain.flags, 0x40);
    }

    #[test]
    fn test_create_applies_flag_table() {
        let product = DiameterAvp::from_str(avp::PRODUCT_NAME, 0x40, 0, "cdp");
        assert_eq!(product.flags, 0);

        let origin = DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "a.test");
        assert!(origin.is_mandatory());

        let unknown = DiameterAvp::from_u32(60000, 0x20, 0, 7);
        assert_eq!(unknown.flags, 0x20);
    }

    #[test]
    fn test_message_round_trip() {
        let msg = sample_request();
        let encoded = msg.encode();
        assert_eq!(encoded.len() % 4, 0);
        assert_eq!(encoded.len(), msg.encoded_len());

        let decoded = DiameterMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.header.length as usize, encoded.len());
        assert_eq!(decoded.raw.as_ref().unwrap(), &encoded);
        // re-encoding a decoded message is byte identical
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn test_decode_twice_is_equal() {
        let encoded = sample_request().encode();
        let a = DiameterMessage::decode(&encoded).unwrap();
        let b = DiameterMessage::decode(&encoded).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_declared_length_exceeds_buffer() {
        let mut encoded = sample_request().encode().to_vec();
        encoded.truncate(encoded.len() - 4);
        let result = DiameterMessage::decode(&encoded);
        assert!(matches!(result, Err(CdpError::MalformedMessage(_))));
    }

    #[test]
    fn test_avp_length_below_header() {
        let mut msg = DiameterMessage::new_request(command::DEVICE_WATCHDOG, 0, 1, 1);
        msg.add_avp(DiameterAvp::from_u32(avp::ORIGIN_STATE_ID, 0, 0, 5));
        let mut encoded = msg.encode().to_vec();
        // corrupt AVP length to 4
        encoded[HEADER_LEN + 7] = 4;
        assert!(matches!(
            DiameterMessage::decode(&encoded),
            Err(CdpError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_truncated_input_never_panics() {
        let encoded = sample_request().encode();
        for cut in 0..encoded.len() {
            assert!(DiameterMessage::decode(&encoded[..cut]).is_err());
        }
    }

    #[test]
    fn test_bad_version() {
        let mut encoded = sample_request().encode().to_vec();
        encoded[0] = 2;
        assert!(DiameterMessage::decode(&encoded).is_err());
    }

    #[test]
    fn test_group_ungroup_preserves_order() {
        let children = vec![
            DiameterAvp::from_u32(avp::VENDOR_ID, 0, 0, 10415),
            DiameterAvp::new(777, 0x20, Some(13019), Bytes::from_static(b"x")),
            DiameterAvp::from_u32(avp::AUTH_APPLICATION_ID, 0, 0, 16_777_216),
        ];
        let group = DiameterAvp::grouped(avp::VENDOR_SPECIFIC_APPLICATION_ID, 0x40, 0, &children);
        assert_eq!(group.ungroup().unwrap(), children);
        assert!(ungroup_avps(&group_avps(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_application_vendor() {
        let mut msg = DiameterMessage::new_request(command::USER_AUTHORIZATION, 16_777_216, 1, 1);
        assert_eq!(msg.application_vendor(), (16_777_216, 0));

        msg.add_avp(DiameterAvp::grouped(
            avp::VENDOR_SPECIFIC_APPLICATION_ID,
            0x40,
            0,
            &[
                DiameterAvp::from_u32(avp::VENDOR_ID, 0, 0, 10415),
                DiameterAvp::from_u32(avp::AUTH_APPLICATION_ID, 0, 0, 16_777_216),
            ],
        ));
        assert_eq!(msg.application_vendor(), (16_777_216, 10415));
    }

    #[test]
    fn test_answer_to_copies_ids() {
        let req = sample_request();
        let ans = DiameterMessage::answer_to(&req);
        assert!(ans.is_answer());
        assert!(ans.header.is_proxiable());
        assert_eq!(ans.header.hop_by_hop_id, 0x1111);
        assert_eq!(ans.header.end_to_end_id, 0x2222);
        assert_eq!(ans.session_id(), req.session_id());
    }

    #[test]
    fn test_typed_accessors() {
        let addr: IpAddr = "192.0.2.1".parse().unwrap();
        let a = DiameterAvp::from_address(avp::HOST_IP_ADDRESS, 0, 0, &addr);
        assert_eq!(a.as_address().unwrap(), addr);

        let n = DiameterAvp::from_u64(9999, 0, 0, u64::MAX - 1);
        assert_eq!(n.as_u64().unwrap(), u64::MAX - 1);
        assert!(n.as_u32().is_err());

        let i = DiameterAvp::from_i32(9998, 0, 0, -5);
        assert_eq!(i.as_i32().unwrap(), -5);
    }

    #[test]
    fn test_mutation_clears_raw() {
        let encoded = sample_request().encode();
        let mut msg = DiameterMessage::decode(&encoded).unwrap();
        assert!(msg.raw.is_some());
        assert_eq!(msg.remove_avps(avp::CC_REQUEST_TYPE), 1);
        assert!(msg.raw.is_none());
        assert!(msg.find_avp(avp::CC_REQUEST_TYPE).is_none());
    }

    #[test]
    fn test_dump_uses_names() {
        let dict = DictionaryManager::new();
        let text = sample_request().dump(&dict);
        assert!(text.starts_with("Credit-Control Request"));
        assert!(text.contains("Origin-Host (264) = \"pcscf.ims.test\""));
        assert!(text.contains("CC-Request-Type (416) = 1"));
    }

    #[test]
    fn test_length_field_overflow() {
        let fits = DiameterAvp::new(4242, 0, None, vec![0u8; MAX_LENGTH_FIELD - AVP_HEADER_LEN]);
        assert!(fits.check_length().is_ok());

        // one byte more, or the vendor header on top, no longer fits
        let over = DiameterAvp::new(4242, 0, None, vec![0u8; MAX_LENGTH_FIELD - AVP_HEADER_LEN + 1]);
        assert!(over.check_length().is_err());
        let vendor = DiameterAvp::new(4242, 0, Some(10415), fits.data.clone());
        assert!(vendor.check_length().is_err());

        let mut msg = sample_request();
        assert!(msg.check_lengths().is_ok());
        msg.add_avp(fits);
        assert!(matches!(msg.check_lengths(), Err(CdpError::MalformedMessage(_))));
    }
}
