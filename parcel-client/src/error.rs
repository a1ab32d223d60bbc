use std::io;

/// Error taxonomy for the transfer controller. See spec §7.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing parameter: {0}")]
    Parameter(&'static str),

    #[error("peer refused the transfer")]
    PeerRefused,

    #[error("chunk write failed: {0}")]
    ChunkWrite(io::Error),

    #[error(transparent)]
    Core(#[from] parcel_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
