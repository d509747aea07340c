//! Error types.

use thiserror::Error;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No registered codec recognized the header.
    #[error("unknown header format")]
    UnknownHeader,

    /// A codec matched but could not read the header.
    #[error("bad header format")]
    MalformedHeader,

    /// The header declares a format revision the codec does not handle.
    #[error("unsupported header format version")]
    UnsupportedVersion,

    /// Sample width or encoding outside 16/24-bit LPCM and 32/64-bit float.
    #[error("unsupported sample format")]
    UnsupportedSampleFormat,

    /// After onset and loop parameters are applied, no data can be streamed.
    #[error("the sound file has 0 frames")]
    Empty,

    /// Anchor lookup by name failed.
    #[error("{0}: no such time anchor")]
    NoSuchAnchor(String),

    /// A control message carried arguments that do not parse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
