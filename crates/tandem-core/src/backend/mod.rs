//! Music backends
//!
//! One interface over two ways of playing a track:
//! - **StreamingBackend**: the two-sided pipeline (controller, shared
//!   double buffer, sound processor thread)
//! - **NativeMixerBackend**: in-process symphonia decoding straight into the
//!   output, with no encoded buffer in between
//!
//! `DefaultBackend` is selected at build time by the `native-mixer` feature.
//!
//! # Example Usage
//!
//! ```ignore
//! use tandem_core::backend::{DefaultBackend, MusicBackend};
//! use tandem_core::PlayCount;
//!
//! let mut backend = DefaultBackend::new(&config)?;
//! let track = backend.load(Path::new("theme.mp3"))?;
//! backend.play(track, PlayCount::Loop)?;
//! loop {
//!     backend.update(Duration::from_millis(20))?;
//! }
//! ```

mod error;
mod native;
mod streaming;

use std::path::Path;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::controller::{PlaybackEvent, TrackId};
use crate::playback::{OutputResult, StatusCode};
use crate::types::PlayCount;

pub use error::{BackendError, BackendResult};
pub use native::NativeMixerBackend;
pub use streaming::StreamingBackend;

#[cfg(feature = "native-mixer")]
pub type DefaultBackend = NativeMixerBackend;

#[cfg(not(feature = "native-mixer"))]
pub type DefaultBackend = StreamingBackend;

/// Application-facing music playback
pub trait MusicBackend {
    fn load(&mut self, path: &Path) -> BackendResult<TrackId>;

    fn unload(&mut self, track: TrackId) -> BackendResult<()>;

    /// Play `track` `count` times, replacing whatever is current
    fn play(&mut self, track: TrackId, count: PlayCount) -> BackendResult<()>;

    fn play_with_fade_in(
        &mut self,
        track: TrackId,
        duration: Duration,
        count: PlayCount,
    ) -> BackendResult<()>;

    fn stop(&mut self) -> BackendResult<()>;

    fn pause(&mut self) -> BackendResult<()>;

    fn unpause(&mut self) -> BackendResult<()>;

    fn fade_in(&mut self, duration: Duration) -> BackendResult<()>;

    /// Fade to silence, then stop
    fn fade_out(&mut self, duration: Duration) -> BackendResult<()>;

    /// Set the output volume (0-127)
    fn set_volume(&mut self, volume: u8) -> BackendResult<()>;

    fn seek(&mut self, position: Duration) -> BackendResult<()>;

    /// Wait up to `timeout` for playback progress and handle it
    fn update(&mut self, timeout: Duration) -> BackendResult<()>;

    fn current_track(&self) -> Option<TrackId>;

    fn is_playing(&self) -> bool {
        self.current_track().is_some()
    }

    fn status(&self) -> StatusCode;

    fn clear_status(&mut self) -> StatusCode;

    fn events(&self) -> Receiver<PlaybackEvent>;
}

/// Hardware output when compiled in
#[cfg(feature = "cpal-output")]
pub(crate) fn default_channel() -> OutputResult<crate::playback::CpalChannel> {
    crate::playback::CpalChannel::open_default()
}

/// In-memory output when no hardware backend is compiled in
#[cfg(not(feature = "cpal-output"))]
pub(crate) fn default_channel() -> OutputResult<crate::playback::MemoryChannel> {
    log::warn!("default_channel: built without cpal-output, audio is discarded");
    Ok(crate::playback::MemoryChannel::new().0)
}
