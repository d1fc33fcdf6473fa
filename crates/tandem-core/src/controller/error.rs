//! Controller error types

use thiserror::Error;

use crate::channel::ChannelError;
use crate::stream::{GeometryError, SupplyError, TrackFormatError};

use super::slots::TrackId;

/// Errors returned synchronously by the playback controller
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Playback was requested before streaming was enabled
    #[error("Streaming is not enabled")]
    NoActiveStreamingSupport,

    /// The handle does not name a loaded track
    #[error("Unknown {0}")]
    UnknownTrack(TrackId),

    /// Seek was requested with nothing playing
    #[error("No track is playing")]
    NothingPlaying,

    /// The track has no constant bitrate to derive a byte offset from
    #[error("{0} has a variable bitrate and cannot be seeked")]
    SeekUnsupported(TrackId),

    #[error(transparent)]
    Format(#[from] TrackFormatError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Supply(#[from] SupplyError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Result type for controller operations
pub type ControllerResult<T> = Result<T, ControllerError>;
