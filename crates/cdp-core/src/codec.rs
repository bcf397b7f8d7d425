use crate::diameter::{DiameterMessage, DIAMETER_VERSION, HEADER_LEN};
use crate::error::CdpError;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound for a single message on the wire
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 65_536;

/// Stream framing for Diameter over TCP.
///
/// The decoder yields whole frames (header + AVPs) without decoding the
/// AVPs, so a malformed AVP only costs the one message. A bad version byte
/// or an impossible length is fatal for the stream.
#[derive(Debug, Clone)]
pub struct DiameterCodec {
    max_length: usize,
}

impl DiameterCodec {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for DiameterCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LENGTH)
    }
}

impl Decoder for DiameterCodec {
    type Item = Bytes;
    type Error = CdpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] != DIAMETER_VERSION {
            return Err(CdpError::MalformedMessage(format!(
                "unsupported version byte {}",
                src[0]
            )));
        }
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([0, src[1], src[2], src[3]]) as usize;
        if length < HEADER_LEN || length > self.max_length {
            return Err(CdpError::MalformedMessage(format!(
                "frame length {length} outside {HEADER_LEN}..={}",
                self.max_length
            )));
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<DiameterMessage> for DiameterCodec {
    type Error = CdpError;

    fn encode(&mut self, item: DiameterMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.check_lengths()?;
        let len = item.encoded_len();
        if len > self.max_length {
            return Err(CdpError::OutOfResources(format!(
                "message of {len} bytes exceeds limit {}",
                self.max_length
            )));
        }
        dst.reserve(len);
        item.encode_into(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diameter::DiameterAvp;
    use cdp_dict::{avp, command};

    fn watchdog() -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(command::DEVICE_WATCHDOG, 0, 7, 9);
        msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "a.test"));
        msg
    }

    #[test]
    fn test_frames_across_partial_reads() {
        let mut codec = DiameterCodec::default();
        let wire = watchdog().encode();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[3..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[10..]);
        buf.extend_from_slice(&wire[..5]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, wire);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_rejects_bad_version_and_length() {
        let mut codec = DiameterCodec::new(64);
        let mut buf = BytesMut::from(&[2u8, 0, 0, 20][..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&[1u8, 0, 1, 0][..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&[1u8, 0, 0, 8][..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encoder_writes_wire_format() {
        let mut codec = DiameterCodec::default();
        let msg = watchdog();
        let mut dst = BytesMut::new();
        codec.encode(msg.clone(), &mut dst).unwrap();
        assert_eq!(dst.freeze(), msg.encode());
    }

    #[test]
    fn test_encoder_rejects_oversized_avp() {
        let mut codec = DiameterCodec::new(usize::MAX);
        let mut msg = watchdog();
        msg.add_avp(DiameterAvp::new(4242, 0, None, vec![0u8; 0x00FF_FFFF]));
        let mut dst = BytesMut::new();

        let err = codec.encode(msg, &mut dst).unwrap_err();
        assert!(matches!(err, CdpError::InvalidAvpValue { code: 4242, .. }));
        assert!(dst.is_empty());
    }
}
