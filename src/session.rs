//! Per-connection session state and the byte-accumulator reassembler.
//! A `Session` carries its role (ingest vs. query) directly in its
//! variant, standing in for the reference implementation's
//! per-connection C function pointer.

use std::io::{self, ErrorKind, Read};

use mio::net::TcpStream;

use crate::codec;
use crate::ids::TripIdAllocator;
use crate::store::Store;
use crate::{ingest, query};

/// Largest possible ingestion frame; the accumulator need never grow.
pub const INGEST_BUF_CAP: usize = codec::MAX_FRAME_LEN;
/// Comfortably larger than any realistic pipelined query line.
pub const QUERY_BUF_CAP: usize = 2048;

pub enum Role {
    Ingest { buf: [u8; INGEST_BUF_CAP], len: usize },
    Query { buf: Vec<u8>, len: usize },
}

pub struct Connection {
    pub stream: TcpStream,
    pub role: Role,
}

impl Connection {
    pub fn ingest(stream: TcpStream) -> Self {
        Self {
            stream,
            role: Role::Ingest { buf: [0u8; INGEST_BUF_CAP], len: 0 },
        }
    }

    pub fn query(stream: TcpStream) -> Self {
        Self {
            stream,
            role: Role::Query { buf: vec![0u8; QUERY_BUF_CAP], len: 0 },
        }
    }

    /// Drains every complete unit currently available. Returns
    /// `Ok(false)` when the peer closed (read returned 0) or the read
    /// failed terminally — the caller tears the session down in
    /// either case. `Ok(true)` means keep the session registered.
    pub fn readable(&mut self, store: &Store, ids: &mut TripIdAllocator) -> io::Result<bool> {
        match self.role {
            Role::Ingest { .. } => self.drain_ingest(store, ids),
            Role::Query { .. } => self.drain_query(store),
        }
    }

    fn drain_ingest(&mut self, store: &Store, ids: &mut TripIdAllocator) -> io::Result<bool> {
        let Connection { stream, role } = self;
        let (buf, len) = match role {
            Role::Ingest { buf, len } => (buf, len),
            Role::Query { .. } => unreachable!(),
        };

        loop {
            loop {
                if *len < codec::HEADER_LEN {
                    break;
                }
                let declared = codec::peek_frame_size(&buf[..*len]);
                if declared > buf.len() {
                    log::warn!(
                        "malformed frame: declared size {declared} exceeds the {}-byte accumulator; closing",
                        buf.len()
                    );
                    return Ok(false);
                }
                if *len < declared {
                    break;
                }

                match codec::decode_frame(&buf[..declared]) {
                    Ok(frame) => {
                        if let Err(e) = ingest::handle_frame(frame, stream, store, ids) {
                            log::warn!("Failed to update tripdata: {e}");
                        }
                    }
                    Err(e) => log::warn!("{e}"),
                }

                buf.copy_within(declared..*len, 0);
                *len -= declared;
            }

            match stream.read(&mut buf[*len..]) {
                Ok(0) => return Ok(false),
                Ok(n) => *len += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Ok(false),
            }
        }
    }

    fn drain_query(&mut self, store: &Store) -> io::Result<bool> {
        let Connection { stream, role } = self;
        let (buf, len) = match role {
            Role::Query { buf, len } => (buf, len),
            Role::Ingest { .. } => unreachable!(),
        };

        loop {
            loop {
                let Some(nl) = buf[..*len].iter().position(|&b| b == b'\n') else {
                    break;
                };
                let line = String::from_utf8_lossy(&buf[..nl]).into_owned();
                let mut reply = Vec::new();
                query::dispatch(store, line.trim_end_matches('\r'), &mut reply);
                if let Err(e) = codec::write_all_retry(stream, &reply) {
                    log::debug!("query reply write failed: {e}");
                }

                let consumed = nl + 1;
                buf.copy_within(consumed..*len, 0);
                *len -= consumed;
            }

            if *len == buf.len() {
                log::warn!("query line exceeds {}-byte buffer; closing", buf.len());
                return Ok(false);
            }

            match stream.read(&mut buf[*len..]) {
                Ok(0) => return Ok(false),
                Ok(n) => *len += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Ok(false),
            }
        }
    }
}
