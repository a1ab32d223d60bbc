//! Framed length-prefixed packet transport for the relay-mediated file
//! transfer client: the packet codec, the partial-packet reassembler, the
//! event pipe, and the network endpoint that ties them together over a TCP
//! socket. See spec §2 for the component breakdown (C1-C4); the transfer
//! controller (C5) lives in the `parcel-client` binary crate.

pub mod endpoint;
pub mod error;
pub mod packet;
pub mod partial;
pub mod pipe;

pub use endpoint::{NetworkCommunication, BUFFER_SIZE, OUTGOING_SOFT_CAP};
pub use error::{Error, Result};
pub use packet::{Header, Packet};
pub use partial::{Reassembler, DEFAULT_MAX_FRAME_SIZE};
pub use pipe::EventPipe;
