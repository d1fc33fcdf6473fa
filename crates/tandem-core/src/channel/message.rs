//! Messages exchanged between the two sides
//!
//! Commands flow main → sound, notifications flow sound → main. Both enums
//! stay small so the ring buffers remain cache friendly; the only large
//! payload (the encoded buffer) travels as a reference-counted handle.

use std::sync::Arc;

use crate::stream::EncodedDoubleBuffer;
use crate::types::Half;

/// Largest half size that fits in a packed geometry word (20 bits)
pub const MAX_PACKED_HALF_SIZE: usize = (1 << 20) - 1;

/// Largest frame-size upper bound that fits in a packed geometry word (12 bits)
pub const MAX_PACKED_DELTA: usize = (1 << 12) - 1;

/// Half size and Δ packed into one 32-bit word
///
/// Layout: `[half size: 20 bits][Δ: 12 bits]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedGeometry(u32);

impl PackedGeometry {
    /// Pack a geometry, or `None` if either field does not fit
    pub fn pack(half_size: usize, delta: usize) -> Option<Self> {
        if half_size > MAX_PACKED_HALF_SIZE || delta > MAX_PACKED_DELTA {
            return None;
        }
        Some(Self(((half_size as u32) << 12) | delta as u32))
    }

    pub fn half_size(self) -> usize {
        (self.0 >> 12) as usize
    }

    pub fn delta(self) -> usize {
        (self.0 & 0xFFF) as usize
    }

    /// The raw message word
    pub fn word(self) -> u32 {
        self.0
    }
}

/// Commands sent from the main side to the sound side
#[derive(Debug)]
pub enum Command {
    /// Start streaming a track from the shared buffer
    ///
    /// The first half has already been published when this arrives.
    /// `session` is stamped on every half published for this track.
    /// `mid_stream` is set when the first byte is not the start of the track.
    Play {
        start_half: Half,
        buffer: Arc<EncodedDoubleBuffer>,
        geometry: PackedGeometry,
        session: u32,
        mid_stream: bool,
    },
    /// Ramp volume up from zero over the given duration
    FadeIn { duration_ms: u32 },
    /// Ramp volume down to zero over the given duration, then stop
    FadeOut { duration_ms: u32 },
    /// Stop playback; always answered by one PlaybackEnded if a track was active
    Stop,
    Pause,
    Unpause,
    /// Set the hardware channel volume (0-127)
    SetVolume(u8),
    /// The most recently published half holds the last bytes of the file
    EndOfStreamReached,
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play { .. } => "Play",
            Command::FadeIn { .. } => "FadeIn",
            Command::FadeOut { .. } => "FadeOut",
            Command::Stop => "Stop",
            Command::Pause => "Pause",
            Command::Unpause => "Unpause",
            Command::SetVolume(_) => "SetVolume",
            Command::EndOfStreamReached => "EndOfStreamReached",
        }
    }
}

/// Notifications sent from the sound side to the main side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The given half has been vacated and should be refilled
    RefillRequest(Half),
    /// The active track stopped (naturally, by command, by fade-out or by fault)
    PlaybackEnded,
    /// The hardware output could not be started for the track
    NoChannelAvailable,
    /// Diagnostic report for one decoded frame
    FrameInfo {
        output_samples: u16,
        bytes_consumed: u16,
    },
}
