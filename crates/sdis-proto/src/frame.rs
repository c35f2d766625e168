//! The 56-byte frame header and full `Frame` (header + payload).
//!
//! `magic(4) | version(1) | type(1) | flags(2) | sequence(4) |
//! timestamp_ms(8) | payload_len(4) | mac(32)`, all multi-byte integers
//! big-endian, followed by `payload_len` bytes of payload. The header is
//! built and parsed field-by-field rather than cast from raw bytes: the
//! layout packs awkwardly (a 32-byte MAC sandwiched before a
//! variable-length payload), so a manual `to_bytes`/`from_bytes` pair is
//! clearer than a `#[repr(C)]` struct here.

use crate::error::{ProtoError, Result};

pub const MAGIC: [u8; 4] = *b"SDIS";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 56;
pub const MAC_LEN: usize = 32;

/// Maximum payload size accepted from the wire (16 MiB); chunked transfer
/// keeps individual frames well under this, it exists only to bound
/// allocation for a corrupt or hostile length field.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Frame type byte. Handshake types are also `FrameType`s so the whole
/// protocol shares one framing layer (spec §4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    ClientHello = 0x01,
    ServerHello = 0x02,
    ClientFinished = 0x03,
    ServerFinished = 0x04,
    Request = 0x10,
    Response = 0x11,
    Heartbeat = 0x12,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::ClientHello),
            0x02 => Ok(Self::ServerHello),
            0x03 => Ok(Self::ClientFinished),
            0x04 => Ok(Self::ServerFinished),
            0x10 => Ok(Self::Request),
            0x11 => Ok(Self::Response),
            0x12 => Ok(Self::Heartbeat),
            other => Err(ProtoError::UnknownFrameType(other)),
        }
    }
}

/// Frame flag bits. Only `ENCRYPTED` is interpreted today; the rest are
/// reserved for compression/fragmentation (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u16);

impl Flags {
    pub const ENCRYPTED: u16 = 0b0000_0001;

    pub fn encrypted() -> Self {
        Self(Self::ENCRYPTED)
    }

    pub fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }
}

/// A fully parsed frame: header fields plus payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: Flags,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub mac: [u8; MAC_LEN],
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with a zeroed MAC; callers that need a real MAC
    /// (anything past the handshake) compute it over the serialized bytes
    /// and patch it in with [`Frame::with_mac`].
    pub fn new(frame_type: FrameType, flags: Flags, sequence: u32, timestamp_ms: u64, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            flags,
            sequence,
            timestamp_ms,
            mac: [0u8; MAC_LEN],
            payload,
        }
    }

    pub fn with_mac(mut self, mac: [u8; MAC_LEN]) -> Self {
        self.mac = mac;
        self
    }

    /// Serialize header (with current MAC) and payload to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        self.write_header_and_payload(&mut out);
        out
    }

    /// Serialize everything except the MAC, the bytes the MAC itself
    /// covers (`header_without_mac ‖ payload`, spec §4.2).
    pub fn mac_input(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN - MAC_LEN + self.payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.frame_type as u8);
        out.extend_from_slice(&self.flags.0.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    fn write_header_and_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.frame_type as u8);
        out.extend_from_slice(&self.flags.0.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.mac);
        out.extend_from_slice(&self.payload);
    }

    /// Parse the fixed header out of a buffer, returning the header
    /// fields plus the declared payload length. Does not consume or
    /// require the payload to be present yet; callers use `payload_len`
    /// to decide how many more bytes to buffer before calling
    /// [`Frame::from_bytes`] (spec §4.2: "must tolerate arbitrary
    /// trailing bytes ... stream framing").
    pub fn peek_payload_len(buf: &[u8]) -> Result<u32> {
        if buf.len() < HEADER_LEN {
            return Err(ProtoError::FrameTooShort {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }
        validate_prefix(buf)?;
        let payload_len = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtoError::PayloadTooLarge {
                size: payload_len as usize,
                max: MAX_PAYLOAD_LEN as usize,
            });
        }
        Ok(payload_len)
    }

    /// Parse a complete frame (header + exactly `payload_len` payload
    /// bytes) from `buf`. `buf` must be exactly `HEADER_LEN + payload_len`
    /// bytes; trailing-byte tolerance is the caller's job (buffering),
    /// not this function's.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(ProtoError::FrameTooShort {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }
        validate_prefix(buf)?;

        let frame_type = FrameType::from_byte(buf[5])?;
        let flags = Flags(u16::from_be_bytes(buf[6..8].try_into().unwrap()));
        let sequence = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        let timestamp_ms = u64::from_be_bytes(buf[12..20].try_into().unwrap());
        let payload_len = u32::from_be_bytes(buf[20..24].try_into().unwrap()) as usize;
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&buf[24..24 + MAC_LEN]);

        if buf.len() < HEADER_LEN + payload_len {
            return Err(ProtoError::FrameTooShort {
                expected: HEADER_LEN + payload_len,
                actual: buf.len(),
            });
        }
        let payload = buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec();

        Ok(Self {
            frame_type,
            flags,
            sequence,
            timestamp_ms,
            mac,
            payload,
        })
    }
}

fn validate_prefix(buf: &[u8]) -> Result<()> {
    if buf[0..4] != MAGIC {
        return Err(ProtoError::InvalidMagic);
    }
    if buf[4] != VERSION {
        return Err(ProtoError::UnsupportedVersion(buf[4]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payload: Vec<u8>) -> Frame {
        Frame::new(FrameType::Request, Flags::encrypted(), 7, 1_700_000_000_000, payload)
            .with_mac([0xAB; MAC_LEN])
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let frame = sample(b"hello world".to_vec());
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 11);
        let parsed = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.frame_type, FrameType::Request);
        assert!(parsed.flags.is_encrypted());
        assert_eq!(parsed.sequence, 7);
        assert_eq!(parsed.timestamp_ms, 1_700_000_000_000);
        assert_eq!(parsed.mac, [0xAB; MAC_LEN]);
        assert_eq!(parsed.payload, b"hello world");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample(vec![]).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(Frame::from_bytes(&bytes), Err(ProtoError::InvalidMagic)));
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = sample(vec![]).to_bytes();
        bytes[4] = 9;
        assert!(matches!(
            Frame::from_bytes(&bytes),
            Err(ProtoError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn tolerates_trailing_bytes_after_one_frame() {
        let frame = sample(b"payload".to_vec());
        let mut bytes = frame.to_bytes();
        bytes.extend_from_slice(b"next frame starts here");
        let payload_len = Frame::peek_payload_len(&bytes).unwrap() as usize;
        let parsed = Frame::from_bytes(&bytes[..HEADER_LEN + payload_len]).unwrap();
        assert_eq!(parsed.payload, b"payload");
    }

    #[test]
    fn peek_rejects_oversized_payload_len() {
        let mut bytes = sample(vec![]).to_bytes();
        bytes[20..24].copy_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        assert!(matches!(
            Frame::peek_payload_len(&bytes),
            Err(ProtoError::PayloadTooLarge { .. })
        ));
    }
}
