use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Address family numbers used in Address AVPs (IANA)
pub const ADDRESS_FAMILY_IPV4: u16 = 1;
pub const ADDRESS_FAMILY_IPV6: u16 = 2;

/// AVP data type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpDataType {
    OctetString,
    Utf8String,
    DiameterIdentity,
    DiameterUri,
    Unsigned32,
    Unsigned64,
    Integer32,
    Integer64,
    Float32,
    Float64,
    Grouped,
    Enumerated,
    Time,
    Address,
}

/// AVP value after parsing
#[derive(Debug, Clone, PartialEq)]
pub enum AvpValue {
    OctetString(Vec<u8>),
    Utf8String(String),
    DiameterIdentity(String),
    DiameterUri(String),
    Unsigned32(u32),
    Unsigned64(u64),
    Integer32(i32),
    Integer64(i64),
    Float32(f32),
    Float64(f64),
    Grouped(Vec<u8>), // Raw grouped AVP data
    Enumerated(i32),
    Time(u32),
    Address(IpAddr),
}

/// Parse errors
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Invalid length for data type")]
    InvalidLength,

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Unsupported address family: {0}")]
    UnsupportedFamily(u16),

    #[error("Unknown AVP code: {0}")]
    UnknownAvpCode(u32),

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], ParseError> {
    data.try_into().map_err(|_| ParseError::InvalidLength)
}

fn utf8(data: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(data.to_vec()).map_err(|_| ParseError::InvalidUtf8)
}

/// Decode an Address payload: 2-byte family followed by the raw address
pub fn parse_address(data: &[u8]) -> Result<IpAddr, ParseError> {
    if data.len() < 2 {
        return Err(ParseError::InvalidLength);
    }
    let family = u16::from_be_bytes([data[0], data[1]]);
    match family {
        ADDRESS_FAMILY_IPV4 => Ok(IpAddr::V4(Ipv4Addr::from(fixed::<4>(&data[2..])?))),
        ADDRESS_FAMILY_IPV6 => Ok(IpAddr::V6(Ipv6Addr::from(fixed::<16>(&data[2..])?))),
        other => Err(ParseError::UnsupportedFamily(other)),
    }
}

/// Encode an IP address as an Address payload
pub fn encode_address(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => {
            let mut out = ADDRESS_FAMILY_IPV4.to_be_bytes().to_vec();
            out.extend_from_slice(&v4.octets());
            out
        }
        IpAddr::V6(v6) => {
            let mut out = ADDRESS_FAMILY_IPV6.to_be_bytes().to_vec();
            out.extend_from_slice(&v6.octets());
            out
        }
    }
}

impl AvpDataType {
    /// Type names as they appear in XML dictionaries
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        let t = match name {
            "OctetString" => Self::OctetString,
            "UTF8String" | "Utf8String" => Self::Utf8String,
            "DiameterIdentity" => Self::DiameterIdentity,
            "DiameterURI" | "DiameterUri" => Self::DiameterUri,
            "Unsigned32" => Self::Unsigned32,
            "Unsigned64" => Self::Unsigned64,
            "Integer32" => Self::Integer32,
            "Integer64" => Self::Integer64,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            "Grouped" => Self::Grouped,
            "Enumerated" => Self::Enumerated,
            "Time" => Self::Time,
            "Address" => Self::Address,
            other => return Err(ParseError::UnknownDataType(other.to_string())),
        };
        Ok(t)
    }

    /// Parse raw bytes into AvpValue according to data type
    pub fn parse(&self, data: &[u8]) -> Result<AvpValue, ParseError> {
        let value = match self {
            Self::OctetString => AvpValue::OctetString(data.to_vec()),
            Self::Utf8String => AvpValue::Utf8String(utf8(data)?),
            Self::DiameterIdentity => AvpValue::DiameterIdentity(utf8(data)?),
            Self::DiameterUri => AvpValue::DiameterUri(utf8(data)?),
            Self::Unsigned32 => AvpValue::Unsigned32(u32::from_be_bytes(fixed(data)?)),
            Self::Unsigned64 => AvpValue::Unsigned64(u64::from_be_bytes(fixed(data)?)),
            Self::Integer32 => AvpValue::Integer32(i32::from_be_bytes(fixed(data)?)),
            Self::Integer64 => AvpValue::Integer64(i64::from_be_bytes(fixed(data)?)),
            Self::Float32 => AvpValue::Float32(f32::from_be_bytes(fixed(data)?)),
            Self::Float64 => AvpValue::Float64(f64::from_be_bytes(fixed(data)?)),
            Self::Grouped => AvpValue::Grouped(data.to_vec()),
            Self::Enumerated => AvpValue::Enumerated(i32::from_be_bytes(fixed(data)?)),
            Self::Time => AvpValue::Time(u32::from_be_bytes(fixed(data)?)),
            Self::Address => AvpValue::Address(parse_address(data)?),
        };
        Ok(value)
    }
}

impl std::fmt::Display for AvpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8String(s) | Self::DiameterIdentity(s) | Self::DiameterUri(s) => {
                write!(f, "\"{s}\"")
            }
            Self::Unsigned32(v) => write!(f, "{v}"),
            Self::Unsigned64(v) => write!(f, "{v}"),
            Self::Integer32(v) | Self::Enumerated(v) => write!(f, "{v}"),
            Self::Integer64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "time({v})"),
            Self::Address(a) => write!(f, "{a}"),
            Self::OctetString(b) | Self::Grouped(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unsigned32() {
        let data = vec![0x00, 0x00, 0x07, 0xD1]; // 2001
        let result = AvpDataType::Unsigned32.parse(&data).unwrap();
        assert_eq!(result, AvpValue::Unsigned32(2001));
    }

    #[test]
    fn test_parse_identity() {
        let result = AvpDataType::DiameterIdentity.parse(b"hss.ims.test").unwrap();
        assert_eq!(result, AvpValue::DiameterIdentity("hss.ims.test".to_string()));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let invalid_utf8 = vec![0xFF, 0xFE, 0xFD];
        assert_eq!(
            AvpDataType::Utf8String.parse(&invalid_utf8),
            Err(ParseError::InvalidUtf8)
        );
    }

    #[test]
    fn test_parse_invalid_length() {
        let data = vec![0x00, 0x01]; // Too short for Unsigned32
        assert_eq!(AvpDataType::Unsigned32.parse(&data), Err(ParseError::InvalidLength));
    }

    #[test]
    fn test_address_v4_and_v6() {
        let v4: IpAddr = "10.0.0.7".parse().unwrap();
        let encoded = encode_address(&v4);
        assert_eq!(encoded, vec![0, 1, 10, 0, 0, 7]);
        assert_eq!(AvpDataType::Address.parse(&encoded).unwrap(), AvpValue::Address(v4));

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let encoded = encode_address(&v6);
        assert_eq!(encoded.len(), 18);
        assert_eq!(parse_address(&encoded).unwrap(), v6);
    }

    #[test]
    fn test_address_bad_family() {
        assert_eq!(parse_address(&[0, 9, 1, 2, 3, 4]), Err(ParseError::UnsupportedFamily(9)));
        assert_eq!(parse_address(&[0, 1, 1, 2]), Err(ParseError::InvalidLength));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(AvpDataType::from_name("UTF8String").unwrap(), AvpDataType::Utf8String);
        assert_eq!(AvpDataType::from_name("Grouped").unwrap(), AvpDataType::Grouped);
        assert!(AvpDataType::from_name("Blob").is_err());
    }
}
