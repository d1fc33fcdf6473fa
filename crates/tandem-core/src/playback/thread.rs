//! Sound processor thread
//!
//! The processor runs on its own thread and sleeps on its doorbell between
//! services. The output channel is built on that thread because hardware
//! streams are generally not `Send`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::channel::{Doorbell, SoundEndpoint};
use crate::config::StreamConfig;
use crate::decode::FrameDecoder;

use super::output::{OutputResult, SoundChannel};
use super::processor::SoundProcessor;
use super::status::StatusRegister;

/// Owner of a running sound processor thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct SoundProcessorHandle {
    shutdown: Arc<AtomicBool>,
    doorbell: Arc<Doorbell>,
    thread: Option<JoinHandle<()>>,
}

impl SoundProcessorHandle {
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the thread to stop and wait for it
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.doorbell.ring();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("SoundProcessorHandle::shutdown: sound thread panicked");
            }
        }
    }
}

impl Drop for SoundProcessorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the sound side on a dedicated thread
///
/// `make_channel` runs on the new thread. If it fails the processor still
/// runs and answers every Play with NoChannelAvailable.
pub fn spawn_sound_processor<D, C, F>(
    endpoint: SoundEndpoint,
    config: &StreamConfig,
    status: Arc<StatusRegister>,
    decoder: D,
    make_channel: F,
) -> io::Result<SoundProcessorHandle>
where
    D: FrameDecoder + 'static,
    C: SoundChannel + 'static,
    F: FnOnce() -> OutputResult<C> + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let doorbell = endpoint.doorbell();
    let config = config.clone();
    let thread_shutdown = shutdown.clone();

    let thread = thread::Builder::new()
        .name("tandem-sound".into())
        .spawn(move || {
            let channel = match make_channel() {
                Ok(channel) => Some(channel),
                Err(e) => {
                    log::warn!("sound thread: no output channel: {}", e);
                    None
                }
            };
            let processor = SoundProcessor::new(endpoint, decoder, channel, status, &config);
            run(processor, &config, &thread_shutdown);
        })?;

    log::info!("spawn_sound_processor: sound thread started");
    Ok(SoundProcessorHandle {
        shutdown,
        doorbell,
        thread: Some(thread),
    })
}

fn run<D: FrameDecoder, C: SoundChannel>(
    mut processor: SoundProcessor<D, C>,
    config: &StreamConfig,
    shutdown: &AtomicBool,
) {
    let doorbell = processor.doorbell();
    let interval = config.service_interval();
    let mut last = Instant::now();

    loop {
        doorbell.wait(interval);
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        processor.service(now.duration_since(last));
        last = now;

        if processor.is_peer_gone() {
            log::info!("sound thread: main side gone");
            break;
        }
    }

    processor.shutdown();
    log::info!(
        "sound thread stopped after {} frames, {} underruns",
        processor.frames_decoded(),
        processor.underruns()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{message_channel, Command, Notification};
    use crate::playback::output::MemoryChannel;
    use crate::stream::{StreamSupplier, TrackSource};
    use crate::test_support::{tagged_track, FrameSpec, SilenceDecoder};
    use crate::types::Half;
    use std::io::Cursor;
    use std::time::Duration;

    fn config() -> StreamConfig {
        StreamConfig {
            half_size: 4096,
            service_interval_ms: 1,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn test_thread_stops_on_drop() {
        let config = config();
        let (_main, sound) = message_channel(&config);
        let mut handle = spawn_sound_processor(
            sound,
            &config,
            Arc::new(StatusRegister::new()),
            SilenceDecoder::default(),
            || Ok(MemoryChannel::new().0),
        )
        .unwrap();
        assert!(handle.is_alive());
        handle.shutdown();
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_thread_exits_when_main_side_drops() {
        let config = config();
        let (main, sound) = message_channel(&config);
        let handle = spawn_sound_processor(
            sound,
            &config,
            Arc::new(StatusRegister::new()),
            SilenceDecoder::default(),
            || Ok(MemoryChannel::new().0),
        )
        .unwrap();
        drop(main);

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_short_track_plays_to_the_end_in_real_time() {
        let config = config();
        let (mut main, sound) = message_channel(&config);
        let (channel, capture) = MemoryChannel::new();
        let _handle = spawn_sound_processor(
            sound,
            &config,
            Arc::new(StatusRegister::new()),
            SilenceDecoder::default(),
            move || Ok(channel),
        )
        .unwrap();

        // Six frames fit in the first half, so the whole track is published up front
        let supplier = StreamSupplier::new(config.half_size);
        let mut source = TrackSource::from_reader(
            Cursor::new(tagged_track(&FrameSpec::mpeg1_128k(), 6)),
            "short",
        )
        .unwrap();
        let geometry = supplier.settings().geometry(source.info().delta).unwrap();
        let session = supplier.begin_session();
        let outcome = supplier
            .refill_half(Half::First, session, &geometry, &mut source)
            .unwrap();
        assert!(outcome.end_of_stream);
        main.send(Command::Play {
            start_half: Half::First,
            buffer: supplier.buffer().clone(),
            geometry: geometry.packed(),
            session,
            mid_stream: false,
        })
        .unwrap();
        main.send(Command::EndOfStreamReached).unwrap();

        let mut ended = false;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !ended && Instant::now() < deadline {
            ended = main.recv_timeout(Duration::from_millis(50)) == Some(Notification::PlaybackEnded);
        }
        assert!(ended);
        assert_eq!(capture.snapshot().frames, 6);
    }
}
