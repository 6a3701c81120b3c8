//! Wire-format definitions for protocol frames.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated input or unknown type tags.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |                 Payload ...                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 5 bytes (seq(4) + type(1)).
//!
//! There is no length-prefixed payload field: the payload length is exactly
//! `datagram length − HEADER_LEN`.  The datagram is the framing unit.

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 5;

const OFF_SEQ: usize = 0;
const OFF_TYPE: usize = 4;

/// The four frame types the protocol speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Payload-carrying frame; `seq` is the frame index within one transfer.
    Data = 0,
    /// Cumulative acknowledgement; `seq` is the highest accepted frame index.
    Ack = 1,
    /// Session establishment (handshake, and mid-session peer migration).
    Syn = 2,
    /// Session / transfer teardown.
    Fin = 3,
}

impl PacketType {
    /// Map a wire tag back to a [`PacketType`].  Unknown tags are a decode
    /// error; the caller drops the frame.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PacketType::Data),
            1 => Some(PacketType::Ack),
            2 => Some(PacketType::Syn),
            3 => Some(PacketType::Fin),
            _ => None,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            PacketType::Data => "DATA",
            PacketType::Ack => "ACK",
            PacketType::Syn => "SYN",
            PacketType::Fin => "FIN",
        };
        write!(f, "{tag}")
    }
}

/// A complete protocol frame: header + payload bytes.
///
/// Sequence numbers are per-direction and count from 0 for each logical
/// transfer (one message, or one file stream) — they are not global across
/// the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u32,
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a DATA frame.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            kind: PacketType::Data,
            payload,
        }
    }

    /// Build a payload-less control frame (ACK / SYN / FIN).
    pub fn control(kind: PacketType, seq: u32) -> Self {
        Self {
            seq,
            kind,
            payload: Vec::new(),
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_TYPE] = self.kind as u8;
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if `buf` is shorter than [`HEADER_LEN`] or the type
    /// tag is not one of the four known values.  Both conditions are routine
    /// datagram noise: callers drop the frame and keep their loop running,
    /// they never surface the error to the application.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::TooShort(buf.len()));
        }
        let seq = u32::from_be_bytes(buf[OFF_SEQ..OFF_SEQ + 4].try_into().unwrap());
        let kind =
            PacketType::from_u8(buf[OFF_TYPE]).ok_or(FrameError::UnknownType(buf[OFF_TYPE]))?;
        Ok(Packet {
            seq,
            kind,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Datagram shorter than the fixed header size.
    #[error("datagram too short for a header ({0} bytes)")]
    TooShort(usize),
    /// Type tag is not DATA/ACK/SYN/FIN.
    #[error("unknown frame type tag {0}")]
    UnknownType(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::data(42, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.seq, 42);
        assert_eq!(decoded.kind, PacketType::Data);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn header_len_constant_is_correct() {
        // seq(4) + type(1) = 5
        assert_eq!(HEADER_LEN, 5);
        assert_eq!(Packet::control(PacketType::Ack, 7).encode().len(), 5);
    }

    #[test]
    fn seq_big_endian_on_wire() {
        let bytes = Packet::data(0x0102_0304, vec![]).encode();
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn type_tags_match_wire_values() {
        assert_eq!(Packet::data(0, vec![]).encode()[OFF_TYPE], 0);
        assert_eq!(Packet::control(PacketType::Ack, 0).encode()[OFF_TYPE], 1);
        assert_eq!(Packet::control(PacketType::Syn, 0).encode()[OFF_TYPE], 2);
        assert_eq!(Packet::control(PacketType::Fin, 0).encode()[OFF_TYPE], 3);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(FrameError::TooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(FrameError::TooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn decode_unknown_type_returns_error() {
        let mut bytes = Packet::data(1, b"x".to_vec()).encode();
        bytes[OFF_TYPE] = 9;
        assert_eq!(Packet::decode(&bytes), Err(FrameError::UnknownType(9)));
    }

    #[test]
    fn payload_length_is_datagram_minus_header() {
        let bytes = Packet::data(0, vec![7u8; 12]).encode();
        assert_eq!(bytes.len(), HEADER_LEN + 12);
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload.len(), 12);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let pkt = Packet::control(PacketType::Fin, 1000);
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.kind, PacketType::Fin);
        assert_eq!(decoded.seq, 1000);
    }
}
