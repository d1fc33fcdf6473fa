//! Sound processor: the whole sound side of the pipeline
//!
//! Each service call drains pending commands, turns the elapsed time into
//! whole-frame ticks, decodes one frame per tick into the output channel and
//! forwards refill requests to the main side.
//!
//! ```text
//!   Play ──► Priming ──(2 frames decoded)──► Playing ──(completed / stop /
//!              │                                         fade-out / fault)──► PlaybackEnded
//!              └─ no output channel ──► NoChannelAvailable, PlaybackEnded
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ChannelError, Command, Doorbell, Notification, SoundEndpoint};
use crate::config::StreamConfig;
use crate::decode::{DecodeEngine, FrameDecoder, FrameReport};
use crate::stream::{EncodedDoubleBuffer, ManagerState, StreamGeometry, StreamManager, StreamStep};
use crate::types::{Half, PcmFormat, MAX_VOLUME, PAN_CENTER};

use super::clock::PlaybackClock;
use super::fade::{fade_frames, FadeRamp, FadeStep};
use super::output::{OutputError, SoundChannel};
use super::status::{StatusCode, StatusRegister};

/// Frames decoded before output is enabled
const PRIMING_FRAMES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Priming { decoded: usize },
    Playing,
}

#[derive(Debug)]
struct ActiveTrack {
    session: u32,
    phase: Phase,
    paused: bool,
}

pub struct SoundProcessor<D, C> {
    endpoint: SoundEndpoint,
    engine: DecodeEngine<D>,
    manager: StreamManager,
    /// `None` when no output channel could be allocated
    channel: Option<C>,
    clock: PlaybackClock,
    fade: Option<FadeRamp>,
    status: Arc<StatusRegister>,
    track: Option<ActiveTrack>,
    volume: u8,
    initial_volume: u8,
    frame_diagnostics: bool,
    underruns: u64,
}

impl<D: FrameDecoder, C: SoundChannel> SoundProcessor<D, C> {
    pub fn new(
        endpoint: SoundEndpoint,
        decoder: D,
        channel: Option<C>,
        status: Arc<StatusRegister>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            endpoint,
            engine: DecodeEngine::new(decoder),
            manager: StreamManager::new(),
            channel,
            clock: PlaybackClock::default(),
            fade: None,
            status,
            track: None,
            volume: config.clamped_initial_volume(),
            initial_volume: config.clamped_initial_volume(),
            frame_diagnostics: config.frame_diagnostics,
            underruns: 0,
        }
    }

    /// Run one service: commands, due decodes, refill requests
    ///
    /// `elapsed` is the time since the previous service.
    pub fn service(&mut self, elapsed: Duration) {
        self.resync();
        while let Some(command) = self.endpoint.try_recv() {
            self.handle_command(command);
        }

        match self.track.as_ref().map(|t| (t.phase, t.paused)) {
            Some((Phase::Priming { .. }, _)) => self.prime(),
            Some((Phase::Playing, false)) => {
                let ticks = self.clock.advance(elapsed);
                for _ in 0..ticks {
                    if !self.decode_tick() {
                        break;
                    }
                }
            }
            _ => {}
        }

        self.flush_refill_requests();
    }

    pub fn is_playing(&self) -> bool {
        self.track.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.track.as_ref().is_some_and(|t| t.paused)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn session(&self) -> Option<u32> {
        self.track.as_ref().map(|t| t.session)
    }

    pub fn stream_state(&self) -> ManagerState {
        self.manager.state()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.engine.frames_decoded()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Whether the main side has dropped its endpoint
    pub fn is_peer_gone(&self) -> bool {
        self.endpoint.is_peer_gone()
    }

    pub fn doorbell(&self) -> Arc<Doorbell> {
        self.endpoint.doorbell()
    }

    /// Release the output channel
    pub fn shutdown(&mut self) {
        if self.track.is_some() {
            log::info!("SoundProcessor::shutdown: stopping active track");
        }
        self.halt_output();
        self.track = None;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        log::debug!("handle_command: {}", command.name());
        match command {
            Command::Play {
                start_half,
                buffer,
                geometry,
                session,
                mid_stream,
            } => match StreamGeometry::from_packed(geometry) {
                Ok(geometry) => self.start_track(buffer, geometry, start_half, session, mid_stream),
                Err(e) => {
                    log::error!("handle_command: rejecting Play with bad geometry: {}", e);
                    self.end_track("invalid geometry");
                    self.notify(Notification::PlaybackEnded);
                }
            },
            Command::FadeIn { duration_ms } => {
                if self.track.is_some() {
                    let frames = self.fade_frames(duration_ms);
                    self.fade = Some(FadeRamp::fade_in(frames, MAX_VOLUME));
                    self.apply_volume(0);
                }
            }
            Command::FadeOut { duration_ms } => {
                if self.track.is_some() {
                    let frames = self.fade_frames(duration_ms);
                    self.fade = Some(FadeRamp::fade_out(frames, self.volume));
                }
            }
            Command::Stop => self.end_track("stop requested"),
            Command::Pause => self.set_paused(true),
            Command::Unpause => self.set_paused(false),
            Command::SetVolume(volume) => {
                self.fade = None;
                self.apply_volume(volume.min(MAX_VOLUME));
            }
            Command::EndOfStreamReached => self.manager.signal_end_of_stream(),
        }
    }

    fn start_track(
        &mut self,
        buffer: Arc<EncodedDoubleBuffer>,
        geometry: StreamGeometry,
        start_half: Half,
        session: u32,
        mid_stream: bool,
    ) {
        // A Play while another track is active ends the old one first
        self.end_track("replaced by a new track");

        if self.channel.is_none() {
            log::warn!("start_track: no output channel for session {}", session);
            self.notify(Notification::NoChannelAvailable);
            self.notify(Notification::PlaybackEnded);
            return;
        }

        self.engine.begin_stream(mid_stream);
        self.manager.start(buffer, geometry, start_half, session);
        self.fade = None;
        self.volume = self.initial_volume;
        self.track = Some(ActiveTrack {
            session,
            phase: Phase::Priming { decoded: 0 },
            paused: false,
        });
        log::info!("start_track: session {} priming", session);
    }

    fn set_paused(&mut self, paused: bool) {
        let Some(track) = self.track.as_mut() else {
            return;
        };
        if track.paused == paused {
            return;
        }
        track.paused = paused;
        let playing = track.phase == Phase::Playing;
        if let Some(channel) = self.channel.as_mut().filter(|_| playing) {
            if paused {
                channel.pause();
            } else {
                channel.resume();
            }
        }
    }

    fn fade_frames(&self, duration_ms: u32) -> u32 {
        fade_frames(duration_ms, self.engine.sample_rate(), self.engine.frame_len())
    }

    fn apply_volume(&mut self, volume: u8) {
        self.volume = volume;
        let playing = self.track.as_ref().is_some_and(|t| t.phase == Phase::Playing);
        if let Some(channel) = self.channel.as_mut().filter(|_| playing) {
            channel.set_volume(volume);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Decoding
    // ─────────────────────────────────────────────────────────────────────

    /// Decode up to the priming depth, then enable output
    fn prime(&mut self) {
        loop {
            let Some(Phase::Priming { decoded }) = self.track.as_ref().map(|t| t.phase) else {
                return;
            };
            if decoded >= PRIMING_FRAMES {
                self.enable_output(decoded);
                return;
            }

            match self.manager.decode_next(&mut self.engine) {
                Ok(StreamStep::Decoded(report)) => {
                    self.report_frame(&report);
                    if let Some(track) = self.track.as_mut() {
                        track.phase = Phase::Priming { decoded: decoded + 1 };
                    }
                }
                Ok(StreamStep::Underrun) => {
                    self.underruns += 1;
                    return;
                }
                Ok(StreamStep::Completed) => {
                    // Shorter than the priming depth: play what there is, then end
                    if decoded == 0 || self.enable_output(decoded) {
                        self.end_track("stream completed");
                    }
                    return;
                }
                Err(e) => {
                    self.fault(StatusCode::from(&e), &e.to_string());
                    return;
                }
            }
        }
    }

    /// Start the output channel and queue the primed frames
    fn enable_output(&mut self, primed: usize) -> bool {
        let format = self
            .engine
            .format()
            .unwrap_or_else(|| PcmFormat::new(self.engine.sample_rate(), 2));
        let initial = match self.fade {
            Some(ramp) => ramp.current(),
            None => self.volume,
        };

        let started = match self.channel.as_mut() {
            Some(channel) => channel.start(format, initial, PAN_CENTER),
            None => Err(OutputError::Unavailable("no channel".to_string())),
        };
        if let Err(e) = started {
            log::warn!("enable_output: {}", e);
            self.manager.stop();
            self.track = None;
            self.fade = None;
            self.notify(Notification::NoChannelAvailable);
            self.notify(Notification::PlaybackEnded);
            return false;
        }

        if let Some(channel) = self.channel.as_mut() {
            // The first decode of a stream always lands in the first PCM half
            for half in Half::BOTH.iter().take(primed) {
                channel.queue(self.engine.pcm().samples(*half));
            }
        }

        self.volume = initial;
        self.clock = PlaybackClock::new(self.engine.sample_rate(), self.engine.frame_len());
        if let Some(track) = self.track.as_mut() {
            track.phase = Phase::Playing;
            if track.paused {
                if let Some(channel) = self.channel.as_mut() {
                    channel.pause();
                }
            }
        }
        log::info!(
            "enable_output: {}Hz x {} channels, {} frames primed",
            format.sample_rate,
            format.channels,
            primed
        );
        true
    }

    /// One whole-frame tick. Returns `false` once the track has ended.
    fn decode_tick(&mut self) -> bool {
        match self.manager.decode_next(&mut self.engine) {
            Ok(StreamStep::Decoded(report)) => {
                self.clock.retune(report.format.sample_rate, report.frame_len);
                if let Some(channel) = self.channel.as_mut() {
                    channel.queue(self.engine.pcm().samples(report.pcm_half));
                }
                self.report_frame(&report);
                self.step_fade()
            }
            Ok(StreamStep::Underrun) => {
                self.underruns += 1;
                log::debug!("decode_tick: underrun at cursor {}", self.manager.cursor());
                true
            }
            Ok(StreamStep::Completed) => {
                self.end_track("stream completed");
                false
            }
            Err(e) => {
                self.fault(StatusCode::from(&e), &e.to_string());
                false
            }
        }
    }

    fn step_fade(&mut self) -> bool {
        let Some(ramp) = self.fade.as_mut() else {
            return true;
        };
        match ramp.tick() {
            FadeStep::Ramping(volume) => {
                self.apply_volume(volume);
                true
            }
            FadeStep::Finished(volume) => {
                self.fade = None;
                self.apply_volume(volume);
                true
            }
            FadeStep::Silent => {
                self.fade = None;
                self.apply_volume(0);
                self.end_track("faded out");
                false
            }
        }
    }

    fn report_frame(&mut self, report: &FrameReport) {
        if !self.frame_diagnostics {
            return;
        }
        self.notify(Notification::FrameInfo {
            output_samples: report.output_samples.min(u16::MAX as usize) as u16,
            bytes_consumed: report.bytes_consumed.min(u16::MAX as usize) as u16,
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown and notifications
    // ─────────────────────────────────────────────────────────────────────

    fn fault(&mut self, code: StatusCode, detail: &str) {
        log::error!("SoundProcessor: aborting track: {}", detail);
        self.status.record(code);
        self.end_track("fault");
    }

    /// Stop the active track, if any, and report it ended
    fn end_track(&mut self, reason: &str) {
        let Some(track) = self.track.take() else {
            return;
        };
        log::info!(
            "end_track: session {} ended ({}), {} frames decoded",
            track.session,
            reason,
            self.engine.frames_decoded()
        );
        self.halt_output();
        self.notify(Notification::PlaybackEnded);
    }

    fn halt_output(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            if channel.is_running() {
                channel.stop();
            }
        }
        self.manager.stop();
        self.fade = None;
    }

    fn flush_refill_requests(&mut self) {
        while let Some(half) = self.manager.next_refill_request() {
            self.notify(Notification::RefillRequest(half));
        }
    }

    /// Drop the active track after a channel reset. The main side has
    /// written it off already, so no PlaybackEnded is sent.
    fn resync(&mut self) {
        if !self.endpoint.take_reset() {
            return;
        }
        if let Some(track) = self.track.take() {
            log::warn!("resync: session {} dropped after channel reset", track.session);
            self.halt_output();
        }
    }

    fn notify(&mut self, notification: Notification) {
        match self.endpoint.send(notification) {
            Ok(()) => {}
            // Stale anyway; the next service resynchronises
            Err(ChannelError::ResetPending { .. }) => {
                log::debug!("notify: {:?} dropped, reset pending", notification);
            }
            Err(e) => {
                log::error!("notify: {:?} lost: {}", notification, e);
                self.status.record(StatusCode::ChannelFault);
            }
        }
    }
}
