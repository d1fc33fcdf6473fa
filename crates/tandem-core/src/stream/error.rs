//! Stream error types

use std::io;

use thiserror::Error;

use crate::types::Half;

/// Errors raised while reading a track header
#[derive(Error, Debug)]
pub enum TrackFormatError {
    /// Failed to read the source
    #[error("Failed to read track: {0}")]
    Io(#[from] io::Error),

    /// Neither the container tag nor an MPEG frame was found
    #[error("Not an MP3 track: no container tag and no frame header in the first {searched} bytes")]
    NoFrameFound { searched: usize },

    /// Container header is present but shorter than its fixed size
    #[error("Track header truncated: {len} of {expected} bytes")]
    TruncatedHeader { len: usize, expected: usize },

    /// Channel mode byte outside 0-3
    #[error("Invalid channel mode byte: {0}")]
    InvalidChannelMode(u8),

    /// Sample rate not used by any MPEG version
    #[error("Unsupported sample rate: {0}Hz")]
    UnsupportedSampleRate(u32),

    /// Frame-size upper bound of zero
    #[error("Track declares a zero frame-size bound")]
    ZeroDelta,
}

/// Errors raised while supplying encoded bytes to the shared buffer
#[derive(Error, Debug)]
pub enum SupplyError {
    /// Reading the track failed while refilling a half
    #[error("Read error while refilling the {half} half: {source}")]
    Read {
        half: Half,
        #[source]
        source: io::Error,
    },

    /// Rewinding or seeking the track failed
    #[error("Failed to position track at byte {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

/// Geometry that cannot be used for a buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// Δ must be non-zero and strictly smaller than the half size
    #[error("Frame-size bound {delta} does not fit half size {half_size}")]
    DeltaTooLarge { delta: usize, half_size: usize },

    /// Too large to travel in a Play message
    #[error("Geometry {half_size}/{delta} cannot be packed into a message word")]
    Unpackable { half_size: usize, delta: usize },
}

/// Result type for supply operations
pub type SupplyResult<T> = Result<T, SupplyError>;
