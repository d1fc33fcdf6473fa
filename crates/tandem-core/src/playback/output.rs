//! Hardware PCM channel seam
//!
//! The sound processor feeds decoded frames to a [`SoundChannel`]. The
//! in-memory channel records what it was given and is what runs when no
//! audio hardware backend is compiled in.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::types::{PcmFormat, MAX_VOLUME};

/// Errors raised by an output channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// No output channel could be allocated
    #[error("No output channel available: {0}")]
    Unavailable(String),

    /// The device rejected the requested PCM format
    #[error("Unsupported output format {rate}Hz x {channels}: {reason}")]
    UnsupportedFormat {
        rate: u32,
        channels: u16,
        reason: String,
    },

    /// Starting the output failed
    #[error("Failed to start output: {0}")]
    Start(String),
}

pub type OutputResult<T> = Result<T, OutputError>;

/// A PCM output channel fed one decoded frame at a time
pub trait SoundChannel {
    /// Claim the channel and start output at `format`
    fn start(&mut self, format: PcmFormat, volume: u8, pan: u8) -> OutputResult<()>;

    /// Queue one frame of interleaved samples
    fn queue(&mut self, samples: &[i16]);

    fn set_volume(&mut self, volume: u8);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Stop output and release the channel
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

impl<C: SoundChannel + ?Sized> SoundChannel for Box<C> {
    fn start(&mut self, format: PcmFormat, volume: u8, pan: u8) -> OutputResult<()> {
        (**self).start(format, volume, pan)
    }

    fn queue(&mut self, samples: &[i16]) {
        (**self).queue(samples)
    }

    fn set_volume(&mut self, volume: u8) {
        (**self).set_volume(volume)
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

/// What a [`MemoryChannel`] has been fed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub starts: u32,
    pub stops: u32,
    pub frames: u64,
    /// Frames queued while paused
    pub paused_frames: u64,
    pub samples: u64,
    /// Largest absolute sample value after volume scaling
    pub peak: u16,
    pub format: Option<PcmFormat>,
    pub volume: u8,
    /// Every distinct volume the channel was set to, in order
    pub volume_history: Vec<u8>,
    pub running: bool,
    pub paused: bool,
}

/// Shared view of a [`MemoryChannel`]'s capture
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    stats: Arc<Mutex<CaptureStats>>,
}

impl CaptureHandle {
    pub fn snapshot(&self) -> CaptureStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Output channel that counts frames instead of playing them
#[derive(Debug, Default)]
pub struct MemoryChannel {
    capture: CaptureHandle,
    refuse_start: bool,
}

impl MemoryChannel {
    pub fn new() -> (Self, CaptureHandle) {
        let channel = Self::default();
        let handle = channel.capture.clone();
        (channel, handle)
    }

    /// A channel whose `start` always fails, as when every hardware channel is busy
    pub fn unavailable() -> (Self, CaptureHandle) {
        let (mut channel, handle) = Self::new();
        channel.refuse_start = true;
        (channel, handle)
    }

    fn with_stats(&self, f: impl FnOnce(&mut CaptureStats)) {
        let mut stats = match self.capture.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut stats);
    }
}

fn record_volume(stats: &mut CaptureStats, volume: u8) {
    stats.volume = volume;
    if stats.volume_history.last() != Some(&volume) {
        stats.volume_history.push(volume);
    }
}

impl SoundChannel for MemoryChannel {
    fn start(&mut self, format: PcmFormat, volume: u8, _pan: u8) -> OutputResult<()> {
        if self.refuse_start {
            return Err(OutputError::Unavailable("all channels busy".to_string()));
        }
        self.with_stats(|stats| {
            stats.starts += 1;
            stats.format = Some(format);
            stats.running = true;
            stats.paused = false;
            record_volume(stats, volume.min(MAX_VOLUME));
        });
        Ok(())
    }

    fn queue(&mut self, samples: &[i16]) {
        self.with_stats(|stats| {
            if stats.paused {
                stats.paused_frames += 1;
                return;
            }
            stats.frames += 1;
            stats.samples += samples.len() as u64;
            let volume = stats.volume as i32;
            let peak = samples
                .iter()
                .map(|s| ((*s as i32).abs() * volume / MAX_VOLUME as i32) as u16)
                .max()
                .unwrap_or(0);
            stats.peak = stats.peak.max(peak);
        });
    }

    fn set_volume(&mut self, volume: u8) {
        self.with_stats(|stats| record_volume(stats, volume.min(MAX_VOLUME)));
    }

    fn pause(&mut self) {
        self.with_stats(|stats| stats.paused = true);
    }

    fn resume(&mut self) {
        self.with_stats(|stats| stats.paused = false);
    }

    fn stop(&mut self) {
        self.with_stats(|stats| {
            if stats.running {
                stats.stops += 1;
            }
            stats.running = false;
            stats.paused = false;
        });
    }

    fn is_running(&self) -> bool {
        self.capture.snapshot().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_channel_counts_frames() {
        let (mut channel, capture) = MemoryChannel::new();
        channel.start(PcmFormat::new(44100, 2), 100, 64).unwrap();
        channel.queue(&[0; 2304]);
        channel.queue(&[127, -127]);
        channel.stop();

        let stats = capture.snapshot();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.samples, 2306);
        assert_eq!(stats.peak, 100);
        assert_eq!(stats.stops, 1);
        assert!(!stats.running);
    }

    #[test]
    fn test_paused_frames_are_not_played() {
        let (mut channel, capture) = MemoryChannel::new();
        channel.start(PcmFormat::new(44100, 2), 127, 64).unwrap();
        channel.pause();
        channel.queue(&[0; 4]);
        channel.resume();
        channel.queue(&[0; 4]);

        let stats = capture.snapshot();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.paused_frames, 1);
    }

    #[test]
    fn test_volume_history_skips_repeats() {
        let (mut channel, capture) = MemoryChannel::new();
        channel.start(PcmFormat::new(44100, 2), 0, 64).unwrap();
        channel.set_volume(0);
        channel.set_volume(50);
        channel.set_volume(200);
        assert_eq!(capture.snapshot().volume_history, vec![0, 50, 127]);
    }

    #[test]
    fn test_unavailable_channel_refuses_start() {
        let (mut channel, capture) = MemoryChannel::unavailable();
        assert!(matches!(
            channel.start(PcmFormat::new(44100, 2), 127, 64),
            Err(OutputError::Unavailable(_))
        ));
        assert_eq!(capture.snapshot().starts, 0);
    }
}
