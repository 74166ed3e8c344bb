//! The binary framing used between trip generators and the server.
//!
//! Every frame is a 4-byte little-endian size (covering the whole
//! frame, header included), a 4-byte little-endian type code, and a
//! type-dependent payload of little-endian ints and IEEE-754 floats.

use std::io::{self, ErrorKind, Read, Write};

use crate::error::ProtocolError;

pub const SIZE_FIELD_LEN: usize = 4;
pub const TYPE_FIELD_LEN: usize = 4;
pub const HEADER_LEN: usize = SIZE_FIELD_LEN + TYPE_FIELD_LEN;

/// The largest frame any message type can produce (END: header + id +
/// lng + lat + cents). A session's ingest accumulator need not be any
/// bigger than this.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + 4 + 4 + 4 + 4;

const TYPE_BEGIN: u32 = 0;
const TYPE_ID: u32 = 1;
const TYPE_UPDATE: u32 = 2;
const TYPE_END: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Begin { lng: f32, lat: f32 },
    Id { id: i32 },
    Update { id: i32, lng: f32, lat: f32 },
    End { id: i32, lng: f32, lat: f32, cents: i32 },
}

/// Reads just the declared frame size out of a buffer that holds at
/// least `HEADER_LEN` bytes. The reassembler uses this to decide
/// whether a whole frame has arrived yet: the full 32-bit size is read
/// here rather than the reference reader's 16-bit truncation
/// (documented open question, resolved in DESIGN.md).
pub fn peek_frame_size(buf: &[u8]) -> usize {
    debug_assert!(buf.len() >= SIZE_FIELD_LEN);
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
}

/// Decodes one complete frame. `buf` must hold exactly `declared_size`
/// bytes (the reassembler is responsible for slicing that much out of
/// its accumulator before calling this).
pub fn decode_frame(buf: &[u8]) -> Result<Frame, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            declared: HEADER_LEN,
            available: buf.len(),
        });
    }
    let type_code = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let payload = &buf[HEADER_LEN..];

    match type_code {
        TYPE_BEGIN => {
            let (lng, lat) = read_lng_lat(payload)?;
            Ok(Frame::Begin { lng, lat })
        }
        TYPE_ID => {
            let id = read_i32(payload, 0)?;
            Ok(Frame::Id { id })
        }
        TYPE_UPDATE => {
            let id = read_i32(payload, 0)?;
            let (lng, lat) = read_lng_lat(&payload[4..])?;
            Ok(Frame::Update { id, lng, lat })
        }
        TYPE_END => {
            let id = read_i32(payload, 0)?;
            let (lng, lat) = read_lng_lat(&payload[4..])?;
            let cents = read_i32(payload, 12)?;
            Ok(Frame::End { id, lng, lat, cents })
        }
        other => Err(ProtocolError::UnknownType(other)),
    }
}

fn read_i32(payload: &[u8], offset: usize) -> Result<i32, ProtocolError> {
    payload
        .get(offset..offset + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ProtocolError::Truncated {
            declared: offset + 4 + HEADER_LEN,
            available: payload.len() + HEADER_LEN,
        })
}

fn read_lng_lat(payload: &[u8]) -> Result<(f32, f32), ProtocolError> {
    if payload.len() < 8 {
        return Err(ProtocolError::Truncated {
            declared: HEADER_LEN + 8,
            available: payload.len() + HEADER_LEN,
        });
    }
    let lng = f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let lat = f32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    Ok((lng, lat))
}

fn header(size: usize, type_code: u32) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0..4].copy_from_slice(&(size as u32).to_le_bytes());
    out[4..8].copy_from_slice(&type_code.to_le_bytes());
    out
}

pub fn encode_begin(lng: f32, lat: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 8);
    out.extend_from_slice(&header(HEADER_LEN + 8, TYPE_BEGIN));
    out.extend_from_slice(&lng.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out
}

pub fn encode_id(id: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4);
    out.extend_from_slice(&header(HEADER_LEN + 4, TYPE_ID));
    out.extend_from_slice(&id.to_le_bytes());
    out
}

pub fn encode_update(id: i32, lng: f32, lat: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 12);
    out.extend_from_slice(&header(HEADER_LEN + 12, TYPE_UPDATE));
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&lng.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out
}

pub fn encode_end(id: i32, lng: f32, lat: f32, cents: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 16);
    out.extend_from_slice(&header(HEADER_LEN + 16, TYPE_END));
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&lng.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out.extend_from_slice(&cents.to_le_bytes());
    out
}

/// Sends the entire buffer, retrying on short writes.
pub fn write_all_retry<W: Write>(w: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match w.write(buf) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "write returned 0")),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads exactly `buf.len()` bytes, retrying on short reads. Used by
/// the generator client to wait for its assigned trip id.
pub fn read_exact_retry<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "peer closed")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_round_trips() {
        let bytes = encode_begin(-122.27, 37.45);
        assert_eq!(peek_frame_size(&bytes), bytes.len());
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame, Frame::Begin { lng: -122.27, lat: 37.45 });
    }

    #[test]
    fn end_round_trips() {
        let bytes = encode_end(7, -122.26, 37.46, 1200);
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(
            frame,
            Frame::End { id: 7, lng: -122.26, lat: 37.46, cents: 1200 }
        );
    }

    #[test]
    fn id_reply_round_trips() {
        let bytes = encode_id(42);
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(decode_frame(&bytes).unwrap(), Frame::Id { id: 42 });
    }

    #[test]
    fn unknown_type_is_malformed() {
        let mut bytes = encode_begin(0.0, 0.0);
        bytes[4] = 99;
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::UnknownType(99))
        ));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let bytes = encode_end(1, 0.0, 0.0, 0);
        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode_frame(short),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn max_frame_len_fits_end() {
        let bytes = encode_end(i32::MAX, 1.0, 1.0, i32::MAX);
        assert_eq!(bytes.len(), MAX_FRAME_LEN);
    }
}
