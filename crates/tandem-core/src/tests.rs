//! End-to-end pipeline runs
//!
//! Controller and sound processor wired through a real message channel and
//! shared buffer, stepped alternately on one thread so every run is
//! deterministic.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::message_channel;
use crate::config::StreamConfig;
use crate::controller::{PlaybackController, PlaybackEvent, TrackId};
use crate::playback::{CaptureHandle, MemoryChannel, SoundProcessor, StatusCode, StatusRegister};
use crate::test_support::{tagged_track, FrameSpec, SilenceDecoder};
use crate::types::{PlayCount, MAX_VOLUME};

/// A little over one 1152-sample frame at 44.1 kHz
const FRAME: Duration = Duration::from_micros(26_123);

struct Pipeline {
    controller: PlaybackController,
    processor: SoundProcessor<SilenceDecoder, MemoryChannel>,
    capture: CaptureHandle,
    events: crossbeam::channel::Receiver<PlaybackEvent>,
    seen: Vec<PlaybackEvent>,
}

fn config() -> StreamConfig {
    StreamConfig {
        half_size: 4096,
        retry_backoff_us: 0,
        ..StreamConfig::default()
    }
}

impl Pipeline {
    fn new() -> Self {
        Self::build(SilenceDecoder::default(), MemoryChannel::new(), config())
    }

    fn build(
        decoder: SilenceDecoder,
        (channel, capture): (MemoryChannel, CaptureHandle),
        config: StreamConfig,
    ) -> Self {
        let (main, sound) = message_channel(&config);
        let status = Arc::new(StatusRegister::new());
        let processor = SoundProcessor::new(sound, decoder, Some(channel), status.clone(), &config);
        let mut controller = PlaybackController::new(main, status, &config);
        controller.enable_streaming();
        let events = controller.events();
        Self {
            controller,
            processor,
            capture,
            events,
            seen: Vec::new(),
        }
    }

    fn load(&mut self, spec: &FrameSpec, frames: usize) -> TrackId {
        self.controller
            .load_from_reader(Cursor::new(tagged_track(spec, frames)), "pipeline")
            .unwrap()
    }

    fn step(&mut self) {
        self.processor.service(FRAME);
        self.controller.process_notifications();
        self.seen.extend(self.events.try_iter());
    }

    fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    fn run_until_idle(&mut self, limit: usize) {
        for _ in 0..limit {
            self.step();
            if !self.controller.is_playing() {
                return;
            }
        }
        panic!("pipeline still playing after {} steps", limit);
    }

    fn count(&self, pred: impl Fn(&PlaybackEvent) -> bool) -> usize {
        self.seen.iter().filter(|e| pred(e)).count()
    }

    fn frames(&self) -> u64 {
        self.capture.snapshot().frames
    }
}

fn ended(e: &PlaybackEvent) -> bool {
    matches!(e, PlaybackEvent::Ended { .. })
}

fn started(e: &PlaybackEvent) -> bool {
    matches!(e, PlaybackEvent::Started { .. })
}

#[test]
fn test_every_frame_is_played_exactly_once() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 137);
    pipeline.controller.play(track, PlayCount::ONCE).unwrap();
    pipeline.run_until_idle(1000);

    assert_eq!(pipeline.frames(), 137);
    assert_eq!(pipeline.count(ended), 1);
    assert_eq!(pipeline.controller.status(), StatusCode::Ok);
}

#[test]
fn test_small_frames_survive_many_relocations() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_32k_mono(), 400);
    pipeline.controller.play(track, PlayCount::ONCE).unwrap();
    pipeline.run_until_idle(5000);

    assert_eq!(pipeline.frames(), 400);
    assert_eq!(pipeline.controller.status(), StatusCode::Ok);
}

#[test]
fn test_track_shorter_than_one_half() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 5);
    pipeline.controller.play(track, PlayCount::ONCE).unwrap();
    pipeline.run_until_idle(100);

    assert_eq!(pipeline.frames(), 5);
    assert_eq!(pipeline.count(ended), 1);
}

#[test]
fn test_play_count_three_plays_three_times() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 40);
    pipeline.controller.play(track, PlayCount::from_count(3)).unwrap();
    pipeline.run_until_idle(1000);

    assert_eq!(pipeline.frames(), 120);
    assert_eq!(pipeline.count(started), 3);
    assert_eq!(pipeline.count(|e| matches!(e, PlaybackEvent::Repeating { .. })), 2);
    assert_eq!(pipeline.count(ended), 1);
}

#[test]
fn test_loop_never_retires_until_stopped() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 20);
    pipeline.controller.play(track, PlayCount::Loop).unwrap();
    pipeline.run(200);

    assert!(pipeline.controller.is_playing());
    assert!(pipeline.count(started) >= 4);
    assert_eq!(pipeline.count(ended), 0);

    pipeline.controller.stop().unwrap();
    pipeline.run_until_idle(10);
    assert_eq!(pipeline.count(ended), 1);
}

#[test]
fn test_stop_twice_ends_once() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 300);
    pipeline.controller.play(track, PlayCount::ONCE).unwrap();
    pipeline.run(10);

    pipeline.controller.stop().unwrap();
    pipeline.controller.stop().unwrap();
    pipeline.run(10);
    pipeline.controller.stop().unwrap();
    pipeline.run(10);

    assert_eq!(pipeline.count(ended), 1);
    assert!(!pipeline.controller.is_playing());
    assert!(pipeline.frames() < 300);
}

#[test]
fn test_fade_out_is_monotonic_and_stops() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 500);
    pipeline.controller.play(track, PlayCount::Loop).unwrap();
    pipeline.run(5);
    pipeline.controller.fade_out(Duration::from_millis(500)).unwrap();
    pipeline.run_until_idle(100);

    let history = pipeline.capture.snapshot().volume_history;
    assert_eq!(history[0], MAX_VOLUME);
    assert!(history.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(history.last(), Some(&0));
    assert_eq!(pipeline.count(ended), 1);
}

#[test]
fn test_fade_out_cuts_remaining_plays() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 40);
    pipeline.controller.play(track, PlayCount::from_count(3)).unwrap();
    pipeline.run(5);
    pipeline.controller.fade_out(Duration::from_millis(200)).unwrap();
    pipeline.run_until_idle(60);

    assert_eq!(pipeline.count(|e| matches!(e, PlaybackEvent::Repeating { .. })), 0);
    assert_eq!(pipeline.count(started), 1);
    assert_eq!(pipeline.count(ended), 1);
    assert!(pipeline.frames() < 40);
    let history = pipeline.capture.snapshot().volume_history;
    assert_eq!(history.last(), Some(&0));

    // Still quiet a while later
    pipeline.run(60);
    assert!(!pipeline.controller.is_playing());
    assert_eq!(pipeline.count(started), 1);
}

#[test]
fn test_volume_after_fade_out_keeps_the_track() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 40);
    pipeline.controller.play(track, PlayCount::from_count(2)).unwrap();
    pipeline.run(2);
    pipeline.controller.fade_out(Duration::from_millis(5000)).unwrap();
    pipeline.run(2);
    pipeline.controller.set_volume(100).unwrap();
    pipeline.run_until_idle(500);

    assert_eq!(pipeline.frames(), 80);
    assert_eq!(pipeline.count(|e| matches!(e, PlaybackEvent::Repeating { .. })), 1);
}

#[test]
fn test_play_with_fade_in_rises_to_max() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 200);
    pipeline
        .controller
        .play_with_fade_in(track, Duration::from_millis(1000), PlayCount::ONCE)
        .unwrap();
    pipeline.run(60);

    let history = pipeline.capture.snapshot().volume_history;
    assert_eq!(history[0], 0);
    assert!(history.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(history.last(), Some(&MAX_VOLUME));
}

#[test]
fn test_no_channel_ends_without_replaying() {
    let mut pipeline = Pipeline::build(SilenceDecoder::default(), MemoryChannel::unavailable(), config());
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 50);
    pipeline.controller.play(track, PlayCount::Loop).unwrap();
    pipeline.run_until_idle(20);

    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::NoChannelAvailable { track }), 1);
    assert_eq!(pipeline.count(started), 1);
    assert_eq!(pipeline.frames(), 0);
}

#[test]
fn test_decode_fault_aborts_and_is_reported() {
    let mut pipeline = Pipeline::build(SilenceDecoder::failing_after(30), MemoryChannel::new(), config());
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 100);
    pipeline.controller.play(track, PlayCount::Loop).unwrap();
    pipeline.run_until_idle(200);

    assert_eq!(pipeline.controller.status(), StatusCode::DecodeError);
    assert_eq!(
        pipeline.count(|e| *e == PlaybackEvent::Failed {
            track,
            status: StatusCode::DecodeError
        }),
        1
    );
    assert_eq!(pipeline.frames(), 30);

    // Cleared register re-arms
    assert_eq!(pipeline.controller.clear_status(), StatusCode::DecodeError);
    assert_eq!(pipeline.controller.status(), StatusCode::Ok);
}

#[test]
fn test_seek_skips_ahead() {
    let mut pipeline = Pipeline::new();
    let track = pipeline.load(&FrameSpec::mpeg1_128k(), 300);
    pipeline.controller.play(track, PlayCount::ONCE).unwrap();
    pipeline.run(10);
    let before = pipeline.frames();

    // 5 s at 128 kbps is 80000 bytes, about 192 frames in
    pipeline.controller.seek(Duration::from_secs(5)).unwrap();
    pipeline.run_until_idle(1000);

    let after_seek = pipeline.frames() - before;
    assert!((100..=112).contains(&after_seek), "played {} frames after seek", after_seek);
    assert_eq!(pipeline.controller.status(), StatusCode::Ok);
}

#[test]
fn test_new_track_replaces_current() {
    let mut pipeline = Pipeline::new();
    let first = pipeline.load(&FrameSpec::mpeg1_128k(), 300);
    let second = pipeline.load(&FrameSpec::mpeg1_128k(), 25);
    pipeline.controller.play(first, PlayCount::Loop).unwrap();
    pipeline.run(20);
    pipeline.controller.play(second, PlayCount::ONCE).unwrap();
    pipeline.run_until_idle(500);

    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::Ended { track: first }), 1);
    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::Ended { track: second }), 1);
    assert!(pipeline.frames() >= 25);
}

/// Reader that fails every read once armed
struct FlakyReader {
    inner: Cursor<Vec<u8>>,
    broken: Arc<AtomicBool>,
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::Other, "medium removed"));
        }
        self.inner.read(buf)
    }
}

impl Seek for FlakyReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn test_read_error_stops_the_track() {
    let mut pipeline = Pipeline::new();
    let broken = Arc::new(AtomicBool::new(false));
    let reader = FlakyReader {
        inner: Cursor::new(tagged_track(&FrameSpec::mpeg1_128k(), 300)),
        broken: broken.clone(),
    };
    let track = pipeline.controller.load_from_reader(reader, "flaky").unwrap();
    pipeline.controller.play(track, PlayCount::Loop).unwrap();
    pipeline.run(5);

    broken.store(true, Ordering::Relaxed);
    pipeline.run_until_idle(200);

    assert_eq!(pipeline.controller.status(), StatusCode::ReadError);
    assert_eq!(
        pipeline.count(|e| *e == PlaybackEvent::Failed {
            track,
            status: StatusCode::ReadError
        }),
        1
    );
    assert_eq!(pipeline.count(ended), 1);
}

#[test]
fn test_channel_reset_fails_current_track_and_recovers() {
    let tight = StreamConfig {
        queue_capacity: 2,
        send_retry_budget: 1,
        ..config()
    };
    let mut pipeline = Pipeline::build(SilenceDecoder::default(), MemoryChannel::new(), tight);
    let first = pipeline.load(&FrameSpec::mpeg1_128k(), 300);
    let second = pipeline.load(&FrameSpec::mpeg1_128k(), 30);
    pipeline.controller.play(first, PlayCount::Loop).unwrap();
    pipeline.run(10);

    // Nothing drains the command queue in between, so the third send overflows it
    pipeline.controller.pause().unwrap();
    pipeline.controller.unpause().unwrap();
    assert!(pipeline.controller.pause().is_err());

    assert!(!pipeline.controller.is_playing());
    pipeline.seen.extend(pipeline.events.try_iter());
    assert_eq!(
        pipeline.count(|e| *e == PlaybackEvent::Failed {
            track: first,
            status: StatusCode::ChannelFault
        }),
        1
    );
    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::Ended { track: first }), 1);
    assert_eq!(pipeline.controller.clear_status(), StatusCode::ChannelFault);

    // The sound side drops the track without answering
    let frames = pipeline.frames();
    pipeline.run(5);
    assert_eq!(pipeline.frames(), frames);
    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::Ended { track: first }), 1);

    pipeline.controller.play(second, PlayCount::ONCE).unwrap();
    pipeline.run_until_idle(200);
    assert_eq!(pipeline.frames(), frames + 30);
    assert_eq!(pipeline.count(|e| *e == PlaybackEvent::Ended { track: second }), 1);
    assert_eq!(pipeline.controller.status(), StatusCode::Ok);
}
