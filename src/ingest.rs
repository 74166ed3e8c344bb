//! Turns a decoded frame into store operations and, for BEGIN, an ID
//! reply.

use mio::net::TcpStream;

use crate::codec::{self, Frame};
use crate::error::StoreError;
use crate::ids::TripIdAllocator;
use crate::store::{EventKind, Store};

pub fn handle_frame(
    frame: Frame,
    stream: &mut TcpStream,
    store: &Store,
    ids: &mut TripIdAllocator,
) -> Result<(), StoreError> {
    match frame {
        Frame::Begin { lng, lat } => {
            let id = ids.allocate();
            let reply = codec::encode_id(id);
            if let Err(e) = codec::write_all_retry(stream, &reply) {
                log::warn!("failed to send id reply for trip {id}: {e}");
            }
            store.add_tripdata(id, lng, lat, EventKind::Begin, 0)
        }
        Frame::Update { id, lng, lat } => store.add_tripdata(id, lng, lat, EventKind::Transit, 0),
        Frame::End { id, lng, lat, cents } => store.add_tripdata(id, lng, lat, EventKind::End, cents),
        Frame::Id { id } => {
            log::warn!("ingestion port received an ID frame (id {id}); discarding");
            Ok(())
        }
    }
}
