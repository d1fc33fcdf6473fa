//! Sound side of the pipeline
//!
//! ```text
//! ┌────────────┐ whole-frame ticks ┌────────────────┐  decode_next  ┌──────────────┐
//! │PlaybackClock│────────────────►│ SoundProcessor │──────────────►│StreamManager │
//! └────────────┘                   │  fade ramp     │               │ + DecodeEngine│
//!                                  │  status reg    │               └──────────────┘
//!                                  └───────┬────────┘
//!                                          │ queue(pcm)
//!                                          ▼
//!                                  ┌────────────────┐
//!                                  │  SoundChannel  │  MemoryChannel / CpalChannel
//!                                  └────────────────┘
//! ```

mod clock;
#[cfg(feature = "cpal-output")]
mod cpal_output;
mod fade;
mod output;
mod processor;
mod status;
mod thread;

pub use clock::PlaybackClock;
#[cfg(feature = "cpal-output")]
pub use cpal_output::CpalChannel;
pub use fade::{fade_frames, FadeDirection, FadeRamp, FadeStep};
pub use output::{CaptureHandle, CaptureStats, MemoryChannel, OutputError, OutputResult, SoundChannel};
pub use processor::SoundProcessor;
pub use status::{StatusCode, StatusRegister};
pub use thread::{spawn_sound_processor, SoundProcessorHandle};
