//! Decode error types

use thiserror::Error;

/// Faults raised while locating or decoding one frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// No valid frame header in the readable bytes
    #[error("sync word not found in {searched} bytes")]
    SyncWordNotFound { searched: usize },

    /// A header was found but the frame runs past the readable bytes
    #[error("truncated frame: needs {needed} bytes, {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    /// The bit reservoir holds fewer bytes than the frame back-references
    #[error("bit reservoir underflow: frame needs {needed} bytes, reservoir holds {available}")]
    BitReservoirUnderflow { needed: usize, available: usize },

    /// A free-format frame whose successor header could not be found
    #[error("free-format frame without a following sync word")]
    FreeBitrateSyncMissing,

    /// The frame decoder rejected a well-framed frame
    #[error("frame decoder failed: {0}")]
    Decoder(String),
}

impl DecodeError {
    /// Whether this error can be caused by the readable window ending early
    ///
    /// Such errors mean "not enough data yet" unless the window already
    /// reaches the end of the bytes that will ever be available.
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            DecodeError::SyncWordNotFound { .. }
                | DecodeError::TruncatedFrame { .. }
                | DecodeError::FreeBitrateSyncMissing
        )
    }
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
