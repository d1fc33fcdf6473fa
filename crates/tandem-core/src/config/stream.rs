//! Streaming pipeline configuration
//!
//! Controls the size of the encoded double buffer, the message queues and the
//! cadence at which the sound side is serviced.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::MAX_VOLUME;

/// Streaming pipeline configuration
///
/// Loaded from `stream.yaml`; every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Size of one half of the encoded double buffer, in bytes
    /// Must exceed the largest frame of any track that will be played.
    /// Default: 16384 (about one second of 128 kbps audio per half)
    pub half_size: usize,

    /// Capacity of each message queue direction, in messages
    /// Default: 64
    pub queue_capacity: usize,

    /// Attempts made to enqueue into a full queue before it counts as a fault
    /// Default: 200
    pub send_retry_budget: u32,

    /// Back-off between enqueue attempts, in microseconds
    /// Default: 250
    pub retry_backoff_us: u64,

    /// Upper bound on how long the sound side sleeps between services, in ms
    /// The doorbell wakes it earlier whenever a message arrives.
    /// Default: 5
    pub service_interval_ms: u64,

    /// Hardware channel volume at the start of each track (0-127)
    /// Default: 127
    pub initial_volume: u8,

    /// Send a FrameInfo notification for every decoded frame
    /// Default: false
    pub frame_diagnostics: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            half_size: 16384,
            queue_capacity: 64,
            send_retry_budget: 200,
            retry_backoff_us: 250,
            service_interval_ms: 5,
            initial_volume: MAX_VOLUME,
            frame_diagnostics: false,
        }
    }
}

impl StreamConfig {
    /// Service interval as a `Duration`
    pub fn service_interval(&self) -> Duration {
        Duration::from_millis(self.service_interval_ms.max(1))
    }

    /// Back-off between enqueue attempts as a `Duration`
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_micros(self.retry_backoff_us)
    }

    /// Initial volume clamped to the hardware range
    pub fn clamped_initial_volume(&self) -> u8 {
        self.initial_volume.min(MAX_VOLUME)
    }
}
