//! Two-sided pipeline backend: controller on the caller's thread, sound
//! processor on its own

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::channel::ChannelHub;
use crate::config::StreamConfig;
use crate::controller::{PlaybackController, PlaybackEvent, TrackId};
use crate::decode::SymphoniaFrameDecoder;
use crate::playback::{
    spawn_sound_processor, OutputResult, SoundChannel, SoundProcessorHandle, StatusCode,
    StatusRegister,
};
use crate::types::PlayCount;

use super::error::{BackendError, BackendResult};
use super::MusicBackend;

pub struct StreamingBackend {
    controller: PlaybackController,
    processor: SoundProcessorHandle,
}

impl StreamingBackend {
    /// Start the pipeline on the default output
    pub fn new(config: &StreamConfig) -> BackendResult<Self> {
        Self::with_channel(config, super::default_channel)
    }

    /// Start the pipeline; `make_channel` builds the output on the sound thread
    pub fn with_channel<C, F>(config: &StreamConfig, make_channel: F) -> BackendResult<Self>
    where
        C: SoundChannel + 'static,
        F: FnOnce() -> OutputResult<C> + Send + 'static,
    {
        let mut hub = ChannelHub::new(config);
        let main = hub.register_main()?;
        let sound = hub.register_sound()?;
        let status = Arc::new(StatusRegister::new());

        let decoder = SymphoniaFrameDecoder::new()?;
        let processor = spawn_sound_processor(sound, config, status.clone(), decoder, make_channel)
            .map_err(|source| BackendError::Spawn {
                name: "sound",
                source,
            })?;

        let mut controller = PlaybackController::new(main, status, config);
        controller.enable_streaming();
        log::info!("StreamingBackend::with_channel: pipeline ready");
        Ok(Self {
            controller,
            processor,
        })
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    fn check_alive(&self) -> BackendResult<()> {
        if self.processor.is_alive() {
            Ok(())
        } else {
            Err(BackendError::Disconnected)
        }
    }
}

impl MusicBackend for StreamingBackend {
    fn load(&mut self, path: &Path) -> BackendResult<TrackId> {
        Ok(self.controller.load(path)?)
    }

    fn unload(&mut self, track: TrackId) -> BackendResult<()> {
        Ok(self.controller.unload(track)?)
    }

    fn play(&mut self, track: TrackId, count: PlayCount) -> BackendResult<()> {
        self.check_alive()?;
        Ok(self.controller.play(track, count)?)
    }

    fn play_with_fade_in(
        &mut self,
        track: TrackId,
        duration: Duration,
        count: PlayCount,
    ) -> BackendResult<()> {
        self.check_alive()?;
        Ok(self.controller.play_with_fade_in(track, duration, count)?)
    }

    fn stop(&mut self) -> BackendResult<()> {
        Ok(self.controller.stop()?)
    }

    fn pause(&mut self) -> BackendResult<()> {
        Ok(self.controller.pause()?)
    }

    fn unpause(&mut self) -> BackendResult<()> {
        Ok(self.controller.unpause()?)
    }

    fn fade_in(&mut self, duration: Duration) -> BackendResult<()> {
        Ok(self.controller.fade_in(duration)?)
    }

    fn fade_out(&mut self, duration: Duration) -> BackendResult<()> {
        Ok(self.controller.fade_out(duration)?)
    }

    fn set_volume(&mut self, volume: u8) -> BackendResult<()> {
        Ok(self.controller.set_volume(volume)?)
    }

    fn seek(&mut self, position: Duration) -> BackendResult<()> {
        Ok(self.controller.seek(position)?)
    }

    fn update(&mut self, timeout: Duration) -> BackendResult<()> {
        self.controller.pump(timeout);
        self.check_alive()
    }

    fn current_track(&self) -> Option<TrackId> {
        self.controller.current_track()
    }

    fn status(&self) -> StatusCode {
        self.controller.status()
    }

    fn clear_status(&mut self) -> StatusCode {
        self.controller.clear_status()
    }

    fn events(&self) -> Receiver<PlaybackEvent> {
        self.controller.events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::MemoryChannel;
    use crate::test_support::{tagged_track, FrameSpec};
    use std::time::Instant;

    #[test]
    fn test_streaming_backend_plays_file_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.smp3");
        // Header-only frames: symphonia decodes them as silence
        std::fs::write(&path, tagged_track(&FrameSpec::mpeg1_128k(), 12)).unwrap();

        let config = StreamConfig {
            half_size: 4096,
            service_interval_ms: 1,
            ..StreamConfig::default()
        };
        let (channel, capture) = MemoryChannel::new();
        let mut backend = StreamingBackend::with_channel(&config, move || Ok(channel)).unwrap();
        let events = backend.events();
        let track = backend.load(&path).unwrap();
        backend.play(track, PlayCount::ONCE).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while backend.is_playing() && Instant::now() < deadline {
            backend.update(Duration::from_millis(20)).unwrap();
        }
        assert!(!backend.is_playing());
        assert!(events.try_iter().any(|e| e == PlaybackEvent::Ended { track }));
        assert!(capture.snapshot().frames > 0);
    }
}
