//! Events delivered to the application

use crate::playback::StatusCode;
use crate::types::{Half, PlayCount};

use super::slots::TrackId;

/// What happened to the current track
///
/// Delivered over a crossbeam channel; see `PlaybackController::events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A Play was sent for the track
    Started { track: TrackId, session: u32 },

    /// A half was refilled with encoded bytes
    BufferRefilled {
        track: TrackId,
        half: Half,
        bytes: usize,
        end_of_stream: bool,
    },

    /// The track finished one play and starts again
    Repeating { track: TrackId, remaining: PlayCount },

    /// No output channel could be allocated for the track
    NoChannelAvailable { track: TrackId },

    /// The track was aborted by a fault
    Failed { track: TrackId, status: StatusCode },

    /// The track retired; nothing is current any more
    Ended { track: TrackId },
}
