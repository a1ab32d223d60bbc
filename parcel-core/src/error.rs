use std::io;

/// Errors produced by the packet codec, the packet reassembler and the
/// network endpoint. See spec §7 for the full taxonomy; the remaining
/// error kinds (`ProtocolError`, `IOError`, `ParameterError`, `PeerRefused`,
/// `ChunkWriteError`) live one layer up in `parcel-client`, since they
/// describe transfer-controller failures rather than transport failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
