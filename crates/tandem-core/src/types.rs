//! Common types for Tandem
//!
//! Fundamental values shared by both sides of the pipeline: buffer halves,
//! play counts, volume limits and the PCM format reported by the decoder.

use std::fmt;
use std::num::NonZeroU32;

/// Sample rate assumed before the first frame of a stream has been decoded
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Samples per channel in one MPEG-1 Layer III frame, assumed until a frame is decoded
pub const DEFAULT_FRAME_LENGTH: u32 = 1152;

/// Largest number of interleaved samples one decoded frame can produce (1152 × stereo)
pub const MAX_SAMPLES_PER_FRAME: usize = 1152 * 2;

/// Maximum hardware channel volume
pub const MAX_VOLUME: u8 = 127;

/// Centre pan position for the hardware channel
pub const PAN_CENTER: u8 = 64;

/// Bit depth of the PCM produced by the decode engine
pub const PCM_BIT_DEPTH: u16 = 16;

/// One of the two partitions of a double buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Half {
    First = 0,
    Second = 1,
}

impl Half {
    /// Both halves in fill order
    pub const BOTH: [Half; 2] = [Half::First, Half::Second];

    /// The other half
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Half::First => Half::Second,
            Half::Second => Half::First,
        }
    }

    /// Index into two-element arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Half::First => "first",
            Half::Second => "second",
        }
    }
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How many times a track should be played back-to-back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCount {
    /// Play a fixed number of times, then retire
    Times(NonZeroU32),
    /// Repeat until explicitly stopped
    Loop,
}

impl PlayCount {
    /// Play exactly once
    pub const ONCE: PlayCount = PlayCount::Times(NonZeroU32::MIN);

    /// Build a finite count, `0` meaning "loop forever"
    pub fn from_count(count: u32) -> Self {
        match NonZeroU32::new(count) {
            Some(n) => PlayCount::Times(n),
            None => PlayCount::Loop,
        }
    }

    /// Count left after one playback finished, or `None` when exhausted
    pub fn after_one_play(self) -> Option<Self> {
        match self {
            PlayCount::Loop => Some(PlayCount::Loop),
            PlayCount::Times(n) => NonZeroU32::new(n.get() - 1).map(PlayCount::Times),
        }
    }
}

impl Default for PlayCount {
    fn default() -> Self {
        PlayCount::ONCE
    }
}

/// PCM layout of decoded frames, as reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: PCM_BIT_DEPTH,
        }
    }
}
