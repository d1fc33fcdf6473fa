//! Playback clock
//!
//! Stands in for the hardware timer cascade: elapsed wall time is converted
//! into sample ticks at the stream's sample rate, sample ticks into
//! half-frame ticks, and every second half-frame tick is a whole-frame tick.
//! Each whole-frame tick is one decode.

use std::time::Duration;

use crate::types::{DEFAULT_FRAME_LENGTH, DEFAULT_SAMPLE_RATE};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    sample_rate: u32,
    frame_len: u32,
    /// Sub-sample remainder, in nanoseconds × sample rate
    carry: u128,
    /// Samples counted towards the next half-frame tick
    samples_in_half: u64,
    /// Half-frame ticks counted towards the next whole-frame tick
    half_phase: u64,
    total_samples: u64,
    half_frame_ticks: u64,
}

impl PlaybackClock {
    pub fn new(sample_rate: u32, frame_len: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame_len: frame_len.max(2),
            carry: 0,
            samples_in_half: 0,
            half_phase: 0,
            total_samples: 0,
            half_frame_ticks: 0,
        }
    }

    /// Adopt the rate and frame length of the most recently decoded frame
    ///
    /// Phase is kept; a change only affects ticks from now on.
    pub fn retune(&mut self, sample_rate: u32, frame_len: u32) {
        let sample_rate = sample_rate.max(1);
        if sample_rate != self.sample_rate {
            // Rescale the remainder so no partial sample is lost or invented
            self.carry = self.carry * sample_rate as u128 / self.sample_rate as u128;
            self.sample_rate = sample_rate;
        }
        self.frame_len = frame_len.max(2);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_len(&self) -> u32 {
        self.frame_len
    }

    /// Samples between half-frame ticks
    pub fn half_frame_samples(&self) -> u64 {
        (self.frame_len / 2) as u64
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn half_frame_ticks(&self) -> u64 {
        self.half_frame_ticks
    }

    /// Advance by `elapsed` and return the number of whole-frame ticks due
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let scaled = self.carry + elapsed.as_nanos() * self.sample_rate as u128;
        let samples = (scaled / NANOS_PER_SECOND) as u64;
        self.carry = scaled % NANOS_PER_SECOND;
        self.total_samples += samples;

        let half = self.half_frame_samples();
        self.samples_in_half += samples;
        let half_ticks = self.samples_in_half / half;
        self.samples_in_half %= half;
        self.half_frame_ticks += half_ticks;

        self.half_phase += half_ticks;
        let whole = self.half_phase / 2;
        self.half_phase %= 2;
        whole.min(u32::MAX as u64) as u32
    }

    /// Duration of one whole frame at the current rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(self.frame_len as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_FRAME_LENGTH)
    }
}
