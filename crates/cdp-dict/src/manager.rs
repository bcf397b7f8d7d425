use crate::data_type::{AvpDataType, AvpValue, ParseError};
use crate::standard::StandardAvpCode;
use parking_lot::RwLock;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

/// AVP information
#[derive(Debug, Clone, PartialEq)]
pub struct AvpInfo {
    pub code: u32,
    pub name: String,
    pub data_type: AvpDataType,
    pub vendor_id: Option<u32>,
}

/// Dictionary loading errors
#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid <avp> element: {0}")]
    InvalidEntry(String),

    #[error("Failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
}

/// Dictionary manager for AVP lookup and parsing.
///
/// Holds the built-in base/credit-control table plus entries loaded at
/// runtime from XML documents of the form:
///
/// ```xml
/// <dictionary>
///   <avp name="Abort-Cause" code="500" vendor-id="10415" type="Enumerated"/>
/// </dictionary>
/// ```
pub struct DictionaryManager {
    dynamic: RwLock<HashMap<(u32, u32), AvpInfo>>,
}

impl DictionaryManager {
    /// Create new dictionary manager
    pub fn new() -> Self {
        Self {
            dynamic: RwLock::new(HashMap::new()),
        }
    }

    /// Lookup AVP information by code (no vendor)
    pub fn lookup(&self, code: u32) -> Option<AvpInfo> {
        self.lookup_vendor(code, None)
    }

    /// Lookup AVP information by code and vendor
    pub fn lookup_vendor(&self, code: u32, vendor_id: Option<u32>) -> Option<AvpInfo> {
        if let Some(info) = self.dynamic.read().get(&(code, vendor_id.unwrap_or(0))) {
            return Some(info.clone());
        }

        if vendor_id.unwrap_or(0) != 0 {
            return None;
        }

        StandardAvpCode::from_u32(code).map(|std_code| AvpInfo {
            code,
            name: std_code.name().to_string(),
            data_type: std_code.data_type(),
            vendor_id: None,
        })
    }

    /// Parse AVP data
    pub fn parse_avp(&self, code: u32, data: &[u8]) -> Result<AvpValue, ParseError> {
        let info = self.lookup(code).ok_or(ParseError::UnknownAvpCode(code))?;
        info.data_type.parse(data)
    }

    /// Display name for an AVP, falling back to its numeric code
    pub fn avp_name(&self, code: u32, vendor_id: Option<u32>) -> String {
        self.lookup_vendor(code, vendor_id)
            .map(|i| i.name)
            .unwrap_or_else(|| format!("AVP-{code}"))
    }

    /// Number of entries loaded at runtime
    pub fn dynamic_len(&self) -> usize {
        self.dynamic.read().len()
    }

    /// Load additional AVP definitions from a file
    pub fn load_file(&self, path: &str) -> Result<usize, DictionaryError> {
        let xml = std::fs::read_to_string(path)?;
        self.load_dynamic_dictionary(&xml)
    }

    /// Load additional AVP definitions from an XML document. Returns the
    /// number of entries added or replaced.
    pub fn load_dynamic_dictionary(&self, xml: &str) -> Result<usize, DictionaryError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut parsed = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"avp" => {
                    parsed.push(parse_avp_element(&e)?);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(DictionaryError::Xml(e.to_string())),
            }
        }

        let count = parsed.len();
        let mut dynamic = self.dynamic.write();
        for info in parsed {
            dynamic.insert((info.code, info.vendor_id.unwrap_or(0)), info);
        }
        Ok(count)
    }
}

fn parse_avp_element(e: &BytesStart<'_>) -> Result<AvpInfo, DictionaryError> {
    let mut name = None;
    let mut code = None;
    let mut vendor_id = None;
    let mut data_type = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| DictionaryError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| DictionaryError::Xml(e.to_string()))?
            .to_string();
        match attr.key.as_ref() {
            b"name" => name = Some(value),
            b"code" => {
                code = Some(value.parse::<u32>().map_err(|_| {
                    DictionaryError::InvalidEntry(format!("code '{value}'"))
                })?)
            }
            b"vendor-id" => {
                let v = value.parse::<u32>().map_err(|_| {
                    DictionaryError::InvalidEntry(format!("vendor-id '{value}'"))
                })?;
                vendor_id = (v != 0).then_some(v);
            }
            b"type" => {
                data_type = Some(
                    AvpDataType::from_name(&value)
                        .map_err(|e| DictionaryError::InvalidEntry(e.to_string()))?,
                )
            }
            _ => {}
        }
    }

    let code = code.ok_or_else(|| DictionaryError::InvalidEntry("missing code".into()))?;
    Ok(AvpInfo {
        code,
        name: name.unwrap_or_else(|| format!("AVP-{code}")),
        data_type: data_type.unwrap_or(AvpDataType::OctetString),
        vendor_id,
    })
}

impl Default for DictionaryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_standard_avp() {
        let manager = DictionaryManager::new();
        let info = manager.lookup(264).unwrap(); // Origin-Host

        assert_eq!(info.code, 264);
        assert_eq!(info.name, "Origin-Host");
        assert_eq!(info.data_type, AvpDataType::DiameterIdentity);
        assert_eq!(info.vendor_id, None);
    }

    #[test]
    fn test_lookup_unknown_avp() {
        let manager = DictionaryManager::new();
        assert!(manager.lookup(99999).is_none());
        assert_eq!(manager.avp_name(99999, None), "AVP-99999");
    }

    #[test]
    fn test_parse_avp() {
        let manager = DictionaryManager::new();
        let data = vec![0x00, 0x00, 0x07, 0xD1]; // 2001
        let result = manager.parse_avp(268, &data).unwrap(); // Result-Code
        assert_eq!(result, AvpValue::Unsigned32(2001));
    }

    #[test]
    fn test_load_dynamic_dictionary() {
        let manager = DictionaryManager::new();
        let xml = r#"
            <dictionary>
              <vendor id="10415" name="3GPP"/>
              <avp name="Abort-Cause" code="500" vendor-id="10415" type="Enumerated"/>
              <avp name="Local-Thing" code="60001" type="UTF8String"></avp>
            </dictionary>
        "#;

        assert_eq!(manager.load_dynamic_dictionary(xml).unwrap(), 2);
        assert_eq!(manager.dynamic_len(), 2);

        let abort = manager.lookup_vendor(500, Some(10415)).unwrap();
        assert_eq!(abort.name, "Abort-Cause");
        assert_eq!(abort.data_type, AvpDataType::Enumerated);
        assert!(manager.lookup(500).is_none());

        let local = manager.lookup(60001).unwrap();
        assert_eq!(local.data_type, AvpDataType::Utf8String);
    }

    #[test]
    fn test_load_rejects_bad_code() {
        let manager = DictionaryManager::new();
        let xml = r#"<dictionary><avp name="X" code="abc" type="Unsigned32"/></dictionary>"#;
        assert!(matches!(
            manager.load_dynamic_dictionary(xml),
            Err(DictionaryError::InvalidEntry(_))
        ));
        assert_eq!(manager.dynamic_len(), 0);
    }
}
