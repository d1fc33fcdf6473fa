//! Volume ramps applied once per decoded frame

use crate::types::MAX_VOLUME;

/// Number of whole frames a fade of `duration_ms` spans
///
/// Uses the last decoded sample rate and frame length (or the defaults before
/// the first decode).
pub fn fade_frames(duration_ms: u32, sample_rate: u32, frame_len: u32) -> u32 {
    let denom = 1000u64 * frame_len.max(1) as u64;
    (duration_ms as u64 * sample_rate as u64 / denom).min(u32::MAX as u64) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Result of one fade step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeStep {
    /// Ramp continues at this volume
    Ramping(u8),
    /// Fade-in reached its target
    Finished(u8),
    /// Fade-out reached zero; the track must stop
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeRamp {
    direction: FadeDirection,
    step: u8,
    current: u8,
    target: u8,
}

impl FadeRamp {
    /// Ramp from silence up to `target` over `frames` frames
    pub fn fade_in(frames: u32, target: u8) -> Self {
        let target = target.min(MAX_VOLUME);
        let step = if frames == 0 {
            target.max(1)
        } else {
            (MAX_VOLUME as u32 / frames).max(1) as u8
        };
        Self {
            direction: FadeDirection::In,
            step,
            current: 0,
            target,
        }
    }

    /// Ramp from `current` down to silence over `frames` frames
    pub fn fade_out(frames: u32, current: u8) -> Self {
        let step = if frames == 0 {
            current.max(1)
        } else {
            (current as u32 / frames).max(1) as u8
        };
        Self {
            direction: FadeDirection::Out,
            step,
            current,
            target: 0,
        }
    }

    pub fn direction(&self) -> FadeDirection {
        self.direction
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Advance by one frame
    pub fn tick(&mut self) -> FadeStep {
        match self.direction {
            FadeDirection::In => {
                self.current = self.current.saturating_add(self.step).min(self.target);
                if self.current >= self.target {
                    FadeStep::Finished(self.current)
                } else {
                    FadeStep::Ramping(self.current)
                }
            }
            FadeDirection::Out => {
                self.current = self.current.saturating_sub(self.step);
                if self.current == 0 {
                    FadeStep::Silent
                } else {
                    FadeStep::Ramping(self.current)
                }
            }
        }
    }
}
