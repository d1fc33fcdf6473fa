//! Native mixer backend
//!
//! Plays tracks in-process without the encoded double buffer: the whole
//! frame region is loaded into memory, symphonia demuxes and decodes it, and a
//! mixer thread paces one frame per clock tick into the output channel.
//!
//! ```text
//!   NativeMixerBackend ──MixerCommand──► mixer thread ──queue()──► SoundChannel
//!          ▲                               │
//!          └──────── PlaybackEvent ────────┘
//! ```

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::config::StreamConfig;
use crate::controller::{ControllerError, PlaybackEvent, TrackId, TrackSlots};
use crate::playback::{
    fade_frames, FadeRamp, FadeStep, OutputResult, PlaybackClock, SoundChannel, StatusCode,
    StatusRegister,
};
use crate::stream::{TrackInfo, TrackSource};
use crate::types::{PcmFormat, PlayCount, MAX_VOLUME, PAN_CENTER};

use super::error::{BackendError, BackendResult};
use super::MusicBackend;

/// A track loaded for the mixer: its frame bytes and header summary
struct NativeTrack {
    data: Arc<[u8]>,
    info: TrackInfo,
}

enum MixerCommand {
    Play {
        track: TrackId,
        data: Arc<[u8]>,
        count: PlayCount,
        fade_in_ms: Option<u32>,
    },
    Seek { position_ms: u64 },
    Stop,
    Pause,
    Unpause,
    FadeIn { duration_ms: u32 },
    FadeOut { duration_ms: u32 },
    SetVolume(u8),
}

pub struct NativeMixerBackend {
    tracks: TrackSlots<NativeTrack>,
    commands: Option<Sender<MixerCommand>>,
    /// Events from the mixer thread, read by `update`
    reports: Receiver<PlaybackEvent>,
    event_tx: Sender<PlaybackEvent>,
    event_rx: Receiver<PlaybackEvent>,
    current: Option<TrackId>,
    status: Arc<StatusRegister>,
    thread: Option<JoinHandle<()>>,
}

impl NativeMixerBackend {
    pub fn new(config: &StreamConfig) -> BackendResult<Self> {
        Self::with_channel(config, super::default_channel)
    }

    /// Start the mixer thread; `make_channel` builds the output on that thread
    pub fn with_channel<C, F>(config: &StreamConfig, make_channel: F) -> BackendResult<Self>
    where
        C: SoundChannel + 'static,
        F: FnOnce() -> OutputResult<C> + Send + 'static,
    {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let (report_tx, report_rx) = crossbeam::channel::unbounded();
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let status = Arc::new(StatusRegister::new());

        let thread_status = status.clone();
        let config = config.clone();
        let thread = thread::Builder::new()
            .name("tandem-mixer".into())
            .spawn(move || {
                let channel = match make_channel() {
                    Ok(channel) => Some(channel),
                    Err(e) => {
                        log::warn!("mixer thread: no output channel: {}", e);
                        None
                    }
                };
                NativeMixer::new(command_rx, report_tx, channel, thread_status, &config).run();
            })
            .map_err(|source| BackendError::Spawn {
                name: "mixer",
                source,
            })?;

        Ok(Self {
            tracks: TrackSlots::new(),
            commands: Some(command_tx),
            reports: report_rx,
            event_tx,
            event_rx,
            current: None,
            status,
            thread: Some(thread),
        })
    }

    pub fn track_info(&self, track: TrackId) -> Option<&TrackInfo> {
        self.tracks.get(track).map(|t| &t.info)
    }

    fn send(&self, command: MixerCommand) -> BackendResult<()> {
        self.commands
            .as_ref()
            .ok_or(BackendError::Disconnected)?
            .send(command)
            .map_err(|_| BackendError::Disconnected)
    }

    /// Forward a command that only applies while something plays
    fn forward(&self, command: MixerCommand) -> BackendResult<()> {
        if self.current.is_none() {
            log::info!("forward: nothing playing");
            return Ok(());
        }
        self.send(command)
    }

    fn start(&mut self, track: TrackId, count: PlayCount, fade_in_ms: Option<u32>) -> BackendResult<()> {
        let data = self
            .tracks
            .get(track)
            .ok_or(ControllerError::UnknownTrack(track))?
            .data
            .clone();
        self.send(MixerCommand::Play {
            track,
            data,
            count,
            fade_in_ms,
        })?;
        self.current = Some(track);
        Ok(())
    }
}

impl Drop for NativeMixerBackend {
    fn drop(&mut self) {
        // Closing the command channel ends the mixer loop
        self.commands = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("NativeMixerBackend: mixer thread panicked");
            }
        }
    }
}

impl MusicBackend for NativeMixerBackend {
    fn load(&mut self, path: &Path) -> BackendResult<TrackId> {
        let mut source = TrackSource::open(path).map_err(ControllerError::from)?;
        let mut data = vec![0u8; source.remaining() as usize];
        let mut filled = 0;
        while filled < data.len() {
            match source.read_data(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ControllerError::Format(e.into()).into()),
            }
        }
        data.truncate(filled);

        let info = source.info().clone();
        let id = self.tracks.insert(NativeTrack {
            data: data.into(),
            info,
        });
        log::info!("NativeMixerBackend::load: '{}' loaded as {}", source.name(), id);
        Ok(id)
    }

    fn unload(&mut self, track: TrackId) -> BackendResult<()> {
        if self.current == Some(track) {
            self.send(MixerCommand::Stop)?;
            self.current = None;
        }
        self.tracks
            .remove(track)
            .map(|_| ())
            .ok_or_else(|| ControllerError::UnknownTrack(track).into())
    }

    fn play(&mut self, track: TrackId, count: PlayCount) -> BackendResult<()> {
        self.start(track, count, None)
    }

    fn play_with_fade_in(
        &mut self,
        track: TrackId,
        duration: Duration,
        count: PlayCount,
    ) -> BackendResult<()> {
        self.start(track, count, Some(duration.as_millis().min(u32::MAX as u128) as u32))
    }

    fn stop(&mut self) -> BackendResult<()> {
        self.forward(MixerCommand::Stop)
    }

    fn pause(&mut self) -> BackendResult<()> {
        self.forward(MixerCommand::Pause)
    }

    fn unpause(&mut self) -> BackendResult<()> {
        self.forward(MixerCommand::Unpause)
    }

    fn fade_in(&mut self, duration: Duration) -> BackendResult<()> {
        self.forward(MixerCommand::FadeIn {
            duration_ms: duration.as_millis().min(u32::MAX as u128) as u32,
        })
    }

    fn fade_out(&mut self, duration: Duration) -> BackendResult<()> {
        self.forward(MixerCommand::FadeOut {
            duration_ms: duration.as_millis().min(u32::MAX as u128) as u32,
        })
    }

    fn set_volume(&mut self, volume: u8) -> BackendResult<()> {
        self.forward(MixerCommand::SetVolume(volume))
    }

    fn seek(&mut self, position: Duration) -> BackendResult<()> {
        if self.current.is_none() {
            return Err(ControllerError::NothingPlaying.into());
        }
        self.send(MixerCommand::Seek {
            position_ms: position.as_millis().min(u64::MAX as u128) as u64,
        })
    }

    fn update(&mut self, timeout: Duration) -> BackendResult<()> {
        let first = match self.reports.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => return Err(BackendError::Disconnected),
        };
        for event in first.into_iter().chain(self.reports.try_iter().collect::<Vec<_>>()) {
            match event {
                PlaybackEvent::Started { track, .. } => self.current = Some(track),
                PlaybackEvent::Ended { track } if self.current == Some(track) => self.current = None,
                _ => {}
            }
            let _ = self.event_tx.send(event);
        }
        Ok(())
    }

    fn current_track(&self) -> Option<TrackId> {
        self.current
    }

    fn status(&self) -> StatusCode {
        self.status.get()
    }

    fn clear_status(&mut self) -> StatusCode {
        self.status.clear()
    }

    fn events(&self) -> Receiver<PlaybackEvent> {
        self.event_rx.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mixer thread
// ─────────────────────────────────────────────────────────────────────────────

/// Demuxer and decoder over one track's frame bytes
struct PacketStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<i16>>,
}

enum PacketOutcome {
    Frame { format: PcmFormat, frame_len: u32 },
    /// A packet the decoder rejected; playback continues with the next one
    Skipped,
    Finished,
    Fault(String),
}

impl PacketStream {
    fn open(data: &Arc<[u8]>, position_ms: u64) -> Result<Self, String> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data.clone())), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("Failed to probe track: {}", e))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| "No audio track found".to_string())?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        if position_ms > 0 {
            format
                .seek(
                    SeekMode::Coarse,
                    SeekTo::Time {
                        time: Time::from(position_ms as f64 / 1000.0),
                        track_id: Some(track_id),
                    },
                )
                .map_err(|e| format!("Failed to seek to {}ms: {}", position_ms, e))?;
        }

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_buf: None,
        })
    }

    fn next_frame(&mut self) -> PacketOutcome {
        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return PacketOutcome::Finished;
            }
            Err(SymphoniaError::ResetRequired) => return PacketOutcome::Finished,
            Err(e) => return PacketOutcome::Fault(e.to_string()),
        };
        if packet.track_id() != self.track_id {
            return PacketOutcome::Skipped;
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frame_len = decoded.frames() as u32;
                let needs_buffer = self
                    .sample_buf
                    .as_ref()
                    .map_or(true, |b| b.capacity() < decoded.capacity() * spec.channels.count());
                if needs_buffer {
                    self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = self.sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                }
                PacketOutcome::Frame {
                    format: PcmFormat::new(spec.rate, spec.channels.count() as u16),
                    frame_len,
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("PacketStream: skipping undecodable packet: {}", e);
                PacketOutcome::Skipped
            }
            Err(e) => PacketOutcome::Fault(e.to_string()),
        }
    }

    fn samples(&self) -> &[i16] {
        self.sample_buf.as_ref().map(|b| b.samples()).unwrap_or(&[])
    }
}

struct Voice {
    track: TrackId,
    data: Arc<[u8]>,
    stream: PacketStream,
    remaining: PlayCount,
    /// Output started with the first decoded frame
    started: bool,
    paused: bool,
}

struct NativeMixer<C> {
    commands: Receiver<MixerCommand>,
    reports: Sender<PlaybackEvent>,
    channel: Option<C>,
    status: Arc<StatusRegister>,
    voice: Option<Voice>,
    clock: PlaybackClock,
    fade: Option<FadeRamp>,
    volume: u8,
    initial_volume: u8,
    interval: Duration,
    session: u32,
}

impl<C: SoundChannel> NativeMixer<C> {
    fn new(
        commands: Receiver<MixerCommand>,
        reports: Sender<PlaybackEvent>,
        channel: Option<C>,
        status: Arc<StatusRegister>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            commands,
            reports,
            channel,
            status,
            voice: None,
            clock: PlaybackClock::default(),
            fade: None,
            volume: config.clamped_initial_volume(),
            initial_volume: config.clamped_initial_volume(),
            interval: config.service_interval(),
            session: 0,
        }
    }

    fn run(mut self) {
        log::info!("NativeMixer started");
        let mut last = Instant::now();
        loop {
            match self.commands.recv_timeout(self.interval) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            while let Ok(command) = self.commands.try_recv() {
                self.handle(command);
            }

            let now = Instant::now();
            self.service(now.duration_since(last));
            last = now;
        }
        self.end_voice();
        log::info!("NativeMixer stopped");
    }

    fn handle(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::Play {
                track,
                data,
                count,
                fade_in_ms,
            } => {
                self.end_voice();
                if self.channel.is_none() {
                    self.report(PlaybackEvent::NoChannelAvailable { track });
                    self.report(PlaybackEvent::Ended { track });
                    return;
                }
                let stream = match PacketStream::open(&data, 0) {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::error!("NativeMixer: {} cannot be played: {}", track, e);
                        self.fail(track);
                        return;
                    }
                };
                self.session = self.session.wrapping_add(1);
                self.voice = Some(Voice {
                    track,
                    data,
                    stream,
                    remaining: count,
                    started: false,
                    paused: false,
                });
                self.volume = self.initial_volume;
                self.fade = fade_in_ms.map(|ms| FadeRamp::fade_in(self.fade_frames(ms), MAX_VOLUME));
                self.report(PlaybackEvent::Started {
                    track,
                    session: self.session,
                });
            }
            MixerCommand::Seek { position_ms } => {
                let Some(voice) = self.voice.as_mut() else {
                    return;
                };
                match PacketStream::open(&voice.data, position_ms) {
                    Ok(stream) => voice.stream = stream,
                    Err(e) => log::warn!("NativeMixer: seek ignored: {}", e),
                }
            }
            MixerCommand::Stop => self.end_voice(),
            MixerCommand::Pause => self.set_paused(true),
            MixerCommand::Unpause => self.set_paused(false),
            MixerCommand::FadeIn { duration_ms } => {
                if self.voice.is_some() {
                    self.fade = Some(FadeRamp::fade_in(self.fade_frames(duration_ms), MAX_VOLUME));
                    self.apply_volume(0);
                }
            }
            MixerCommand::FadeOut { duration_ms } => {
                if self.voice.is_some() {
                    self.fade = Some(FadeRamp::fade_out(self.fade_frames(duration_ms), self.volume));
                }
            }
            MixerCommand::SetVolume(volume) => {
                self.fade = None;
                self.apply_volume(volume.min(MAX_VOLUME));
            }
        }
    }

    fn fade_frames(&self, duration_ms: u32) -> u32 {
        fade_frames(duration_ms, self.clock.sample_rate(), self.clock.frame_len())
    }

    fn set_paused(&mut self, paused: bool) {
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        voice.paused = paused;
        if !voice.started {
            return;
        }
        if let Some(channel) = self.channel.as_mut() {
            if paused {
                channel.pause();
            } else {
                channel.resume();
            }
        }
    }

    fn apply_volume(&mut self, volume: u8) {
        self.volume = volume;
        if let Some(channel) = self.channel.as_mut() {
            if channel.is_running() {
                channel.set_volume(volume);
            }
        }
    }

    fn service(&mut self, elapsed: Duration) {
        let Some((started, paused)) = self.voice.as_ref().map(|v| (v.started, v.paused)) else {
            return;
        };
        if !started {
            // Two frames ahead before the clock runs
            for _ in 0..2 {
                if !self.advance_frame() {
                    return;
                }
            }
            return;
        }
        if paused {
            return;
        }
        for _ in 0..self.clock.advance(elapsed) {
            if !self.advance_frame() {
                break;
            }
        }
    }

    /// Decode and queue one frame. Returns `false` once the voice has ended.
    fn advance_frame(&mut self) -> bool {
        let Some(mut voice) = self.voice.take() else {
            return false;
        };
        loop {
            match voice.stream.next_frame() {
                PacketOutcome::Frame { format, frame_len } => {
                    if !voice.started {
                        if !self.start_output(&voice, format) {
                            return false;
                        }
                        voice.started = true;
                        self.clock = PlaybackClock::new(format.sample_rate, frame_len);
                    } else {
                        self.clock.retune(format.sample_rate, frame_len);
                    }
                    if let Some(channel) = self.channel.as_mut() {
                        channel.queue(voice.stream.samples());
                    }
                    self.voice = Some(voice);
                    return self.step_fade();
                }
                PacketOutcome::Skipped => continue,
                PacketOutcome::Finished => {
                    let Some(next) = voice.remaining.after_one_play() else {
                        self.voice = Some(voice);
                        self.end_voice();
                        return false;
                    };
                    match PacketStream::open(&voice.data, 0) {
                        Ok(stream) => voice.stream = stream,
                        Err(e) => {
                            log::error!("NativeMixer: replay of {} failed: {}", voice.track, e);
                            self.voice = Some(voice);
                            self.fail_voice();
                            return false;
                        }
                    }
                    voice.remaining = next;
                    self.report(PlaybackEvent::Repeating {
                        track: voice.track,
                        remaining: next,
                    });
                }
                PacketOutcome::Fault(e) => {
                    log::error!("NativeMixer: {} aborted: {}", voice.track, e);
                    self.voice = Some(voice);
                    self.fail_voice();
                    return false;
                }
            }
        }
    }

    fn start_output(&mut self, voice: &Voice, format: PcmFormat) -> bool {
        let initial = self.fade.map_or(self.volume, |ramp| ramp.current());
        let started = match self.channel.as_mut() {
            Some(channel) => channel.start(format, initial, PAN_CENTER),
            None => return false,
        };
        match started {
            Ok(()) => {
                self.volume = initial;
                if voice.paused {
                    if let Some(channel) = self.channel.as_mut() {
                        channel.pause();
                    }
                }
                true
            }
            Err(e) => {
                log::warn!("NativeMixer: {}", e);
                self.fade = None;
                self.report(PlaybackEvent::NoChannelAvailable { track: voice.track });
                self.report(PlaybackEvent::Ended { track: voice.track });
                false
            }
        }
    }

    fn step_fade(&mut self) -> bool {
        let Some(ramp) = self.fade.as_mut() else {
            return true;
        };
        match ramp.tick() {
            FadeStep::Ramping(volume) => self.apply_volume(volume),
            FadeStep::Finished(volume) => {
                self.fade = None;
                self.apply_volume(volume);
            }
            FadeStep::Silent => {
                self.apply_volume(0);
                self.end_voice();
                return false;
            }
        }
        true
    }

    fn fail_voice(&mut self) {
        if let Some(voice) = self.voice.take() {
            self.halt_output();
            self.fail(voice.track);
        }
    }

    fn fail(&mut self, track: TrackId) {
        self.status.record(StatusCode::DecodeError);
        self.report(PlaybackEvent::Failed {
            track,
            status: StatusCode::DecodeError,
        });
        self.report(PlaybackEvent::Ended { track });
    }

    fn end_voice(&mut self) {
        if let Some(voice) = self.voice.take() {
            self.halt_output();
            self.report(PlaybackEvent::Ended { track: voice.track });
        }
    }

    fn halt_output(&mut self) {
        self.fade = None;
        if let Some(channel) = self.channel.as_mut() {
            if channel.is_running() {
                channel.stop();
            }
        }
    }

    fn report(&self, event: PlaybackEvent) {
        let _ = self.reports.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::MemoryChannel;

    fn config() -> StreamConfig {
        StreamConfig {
            service_interval_ms: 1,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn test_unknown_track_is_rejected() {
        let mut backend =
            NativeMixerBackend::with_channel(&config(), || Ok(MemoryChannel::new().0)).unwrap();
        let mut slots: TrackSlots<()> = TrackSlots::new();
        let stale = slots.insert(());
        assert!(matches!(
            backend.play(stale, PlayCount::ONCE),
            Err(BackendError::Controller(ControllerError::UnknownTrack(_)))
        ));
        assert!(backend.seek(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_garbage_track_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, vec![0x55u8; 8192]).unwrap();

        let mut backend =
            NativeMixerBackend::with_channel(&config(), || Ok(MemoryChannel::new().0)).unwrap();
        assert!(backend.load(&path).is_err());
    }

    #[test]
    fn test_drop_joins_mixer_thread() {
        let backend =
            NativeMixerBackend::with_channel(&config(), || Ok(MemoryChannel::new().0)).unwrap();
        drop(backend);
    }
}
