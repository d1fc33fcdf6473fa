//! Playback controller (main side)
//!
//! Application entry point. Owns the loaded tracks, the stream supplier and
//! the main-side endpoint; turns play/stop/fade/seek intents into commands
//! and answers the sound side's notifications.
//!
//! ```text
//!   play(track, count)
//!        │
//!        ▼
//!   begin session ─► refill first half ─► Play ─► [FadeIn] ─► refill second half
//!                                                               │
//!                      EndOfStreamReached ◄── short read ───────┘
//!
//!   RefillRequest(half) ──► refill_half ──► [EndOfStreamReached]
//!   PlaybackEnded ──► retire, or replay while plays remain
//! ```
//!
//! Every Play is answered by exactly one PlaybackEnded. Endings are matched to
//! Plays in order; an ending for a session that is no longer current was
//! superseded (new track, seek, unload) and is ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};

use crate::channel::{Command, MainEndpoint, Notification};
use crate::config::StreamConfig;
use crate::playback::{StatusCode, StatusRegister};
use crate::stream::{StreamGeometry, StreamSupplier, TrackInfo, TrackReader, TrackSource};
use crate::types::{Half, PlayCount};

use super::error::{ControllerError, ControllerResult};
use super::events::PlaybackEvent;
use super::slots::{TrackId, TrackSlots, TrackState};

/// Book-keeping for the session currently on the sound side
#[derive(Debug, Clone, Copy)]
struct NowPlaying {
    track: TrackId,
    session: u32,
    /// The last bytes of the track have been published
    reached_eos: bool,
    /// Stop was sent; the ending retires the track instead of replaying it
    stop_requested: bool,
    /// A fade-out is running; it ends the track for good
    fading_out: bool,
    /// The sound side had no output channel
    no_channel: bool,
    /// The status register was clear when the session started
    status_armed: bool,
    paused: bool,
}

pub struct PlaybackController {
    config: StreamConfig,
    endpoint: MainEndpoint,
    supplier: Option<StreamSupplier>,
    tracks: TrackSlots,
    now_playing: Option<NowPlaying>,
    /// Sessions whose PlaybackEnded has not arrived yet, oldest first
    awaiting_end: VecDeque<u32>,
    status: Arc<StatusRegister>,
    event_tx: Sender<PlaybackEvent>,
    event_rx: Receiver<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(endpoint: MainEndpoint, status: Arc<StatusRegister>, config: &StreamConfig) -> Self {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        Self {
            config: config.clone(),
            endpoint,
            supplier: None,
            tracks: TrackSlots::new(),
            now_playing: None,
            awaiting_end: VecDeque::new(),
            status,
            event_tx,
            event_rx,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Streaming support
    // ─────────────────────────────────────────────────────────────────────

    /// Allocate the shared buffer. Calling it again is a no-op.
    pub fn enable_streaming(&mut self) {
        if self.supplier.is_some() {
            log::debug!("enable_streaming: already enabled");
            return;
        }
        self.supplier = Some(StreamSupplier::new(self.config.half_size));
    }

    /// Stop playback and free the shared buffer
    pub fn disable_streaming(&mut self) -> ControllerResult<()> {
        if self.supplier.is_none() {
            return Ok(());
        }
        let stopped = self.abandon_current();
        self.supplier = None;
        log::info!("disable_streaming: buffer released");
        stopped
    }

    pub fn is_streaming_enabled(&self) -> bool {
        self.supplier.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tracks
    // ─────────────────────────────────────────────────────────────────────

    /// Open a track file
    pub fn load(&mut self, path: impl AsRef<std::path::Path>) -> ControllerResult<TrackId> {
        let source = TrackSource::open(path)?;
        self.add_track(source)
    }

    /// Open a track from any seekable reader
    pub fn load_from_reader(
        &mut self,
        reader: impl TrackReader + 'static,
        name: impl Into<String>,
    ) -> ControllerResult<TrackId> {
        let source = TrackSource::from_reader(reader, name)?;
        self.add_track(source)
    }

    fn add_track(&mut self, source: TrackSource) -> ControllerResult<TrackId> {
        // Δ < H is checked here, not at play time
        let geometry = StreamGeometry::new(self.config.half_size, source.info().delta)?;
        let name = source.name().to_string();
        let id = self.tracks.insert(TrackState::new(source, geometry));
        log::info!("load: '{}' loaded as {}", name, id);
        Ok(id)
    }

    /// Forget a track, stopping it first if it is playing
    pub fn unload(&mut self, id: TrackId) -> ControllerResult<()> {
        if self.current_track() == Some(id) {
            self.abandon_current()?;
        }
        if self.tracks.remove(id).is_none() {
            return Err(ControllerError::UnknownTrack(id));
        }
        log::info!("unload: {} unloaded", id);
        Ok(())
    }

    pub fn track_info(&self, id: TrackId) -> Option<&TrackInfo> {
        self.tracks.get(id).map(TrackState::info)
    }

    /// Plays left for a track, including the one in progress
    pub fn play_count(&self, id: TrackId) -> Option<PlayCount> {
        self.tracks.get(id).map(|t| t.play_count)
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.now_playing.map(|p| p.track)
    }

    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.now_playing.is_some_and(|p| p.paused)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    /// Play a track `count` times, replacing whatever is current
    pub fn play(&mut self, id: TrackId, count: PlayCount) -> ControllerResult<()> {
        self.play_inner(id, count, None)
    }

    /// Play a track, ramping its volume up from silence
    pub fn play_with_fade_in(
        &mut self,
        id: TrackId,
        duration: Duration,
        count: PlayCount,
    ) -> ControllerResult<()> {
        self.play_inner(id, count, Some(duration_ms(duration)))
    }

    fn play_inner(&mut self, id: TrackId, count: PlayCount, fade_in_ms: Option<u32>) -> ControllerResult<()> {
        if self.supplier.is_none() {
            return Err(ControllerError::NoActiveStreamingSupport);
        }
        let track = self.tracks.get_mut(id).ok_or(ControllerError::UnknownTrack(id))?;
        track.play_count = count;

        // The sound side ends the old session itself when the new Play arrives
        let superseded = self.supersede_current();
        if let Err(e) = self.start_session(id, 0, fade_in_ms) {
            if superseded {
                if let Err(stop) = self.send(Command::Stop) {
                    log::error!("play: rollback Stop failed: {}", stop);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop the current track. Idempotent.
    pub fn stop(&mut self) -> ControllerResult<()> {
        match self.now_playing {
            Some(now) if now.stop_requested => {
                log::debug!("stop: already stopping {}", now.track);
                Ok(())
            }
            Some(_) => self.request_stop(),
            None => {
                log::info!("stop: nothing playing");
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) -> ControllerResult<()> {
        self.set_paused(true)
    }

    pub fn unpause(&mut self) -> ControllerResult<()> {
        self.set_paused(false)
    }

    fn set_paused(&mut self, paused: bool) -> ControllerResult<()> {
        let Some(now) = self.now_playing.as_mut() else {
            log::info!("set_paused: nothing playing");
            return Ok(());
        };
        if now.paused == paused {
            return Ok(());
        }
        now.paused = paused;
        self.send(if paused { Command::Pause } else { Command::Unpause })
    }

    /// Ramp up from silence. Cancels a running fade-out.
    pub fn fade_in(&mut self, duration: Duration) -> ControllerResult<()> {
        self.set_fading_out(false);
        self.forward(Command::FadeIn {
            duration_ms: duration_ms(duration),
        })
    }

    /// Ramp the current track down to silence; it stops when the ramp ends,
    /// whatever plays it had left
    pub fn fade_out(&mut self, duration: Duration) -> ControllerResult<()> {
        self.set_fading_out(true);
        self.forward(Command::FadeOut {
            duration_ms: duration_ms(duration),
        })
    }

    /// Set the volume at once. Cancels a running fade.
    pub fn set_volume(&mut self, volume: u8) -> ControllerResult<()> {
        self.set_fading_out(false);
        self.forward(Command::SetVolume(volume))
    }

    fn set_fading_out(&mut self, fading_out: bool) {
        if let Some(now) = self.now_playing.as_mut() {
            now.fading_out = fading_out;
        }
    }

    /// Restart the current track at `position`
    ///
    /// The byte offset is estimated from the constant bitrate; the remaining
    /// play count is kept.
    pub fn seek(&mut self, position: Duration) -> ControllerResult<()> {
        let now = self.now_playing.ok_or(ControllerError::NothingPlaying)?;
        let id = now.track;
        let info = self.track_info(id).ok_or(ControllerError::UnknownTrack(id))?;
        let position_ms = position.as_millis().min(u64::MAX as u128) as u64;
        let offset = info
            .byte_offset_for_ms(position_ms)
            .ok_or(ControllerError::SeekUnsupported(id))?;

        log::info!("seek: {} to {}ms (byte {})", id, position_ms, offset);
        self.now_playing = None;
        if let Err(e) = self.start_session(id, offset, None) {
            if let Err(stop) = self.send(Command::Stop) {
                log::error!("seek: rollback Stop failed: {}", stop);
            }
            self.emit(PlaybackEvent::Ended { track: id });
            return Err(e);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────

    /// Handle every notification already queued. Returns how many there were.
    pub fn process_notifications(&mut self) -> usize {
        self.resync();
        let mut handled = 0;
        while let Some(notification) = self.endpoint.try_recv() {
            self.handle_notification(notification);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for the sound side, then handle what arrived
    pub fn pump(&mut self, timeout: Duration) -> usize {
        if self.endpoint.pending() == 0 {
            self.endpoint.wait(timeout);
        }
        self.process_notifications()
    }

    fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::RefillRequest(half) => self.on_buffer_refill_requested(half),
            Notification::PlaybackEnded => self.on_playback_ended(),
            Notification::NoChannelAvailable => {
                if let Some(now) = self.now_playing.as_mut() {
                    now.no_channel = true;
                    let track = now.track;
                    log::warn!("NoChannelAvailable: {} cannot be played", track);
                    self.emit(PlaybackEvent::NoChannelAvailable { track });
                }
            }
            Notification::FrameInfo {
                output_samples,
                bytes_consumed,
            } => {
                log::trace!(
                    "FrameInfo: {} samples from {} bytes",
                    output_samples,
                    bytes_consumed
                );
            }
        }
    }

    /// Refill `half` for the current session
    pub fn on_buffer_refill_requested(&mut self, half: Half) {
        let Some(now) = self.now_playing else {
            log::debug!("on_buffer_refill_requested: {} half, nothing playing", half);
            return;
        };
        if now.reached_eos || now.stop_requested {
            log::debug!("on_buffer_refill_requested: {} half ignored after end of track", half);
            return;
        }
        self.fill(now, half);
    }

    /// The sound side has been told about the end of the track
    pub fn on_end_of_stream_acknowledged(&mut self) {
        if let Some(now) = self.now_playing.as_mut() {
            now.reached_eos = true;
        }
    }

    /// One Play has been answered
    pub fn on_playback_ended(&mut self) {
        let Some(session) = self.awaiting_end.pop_front() else {
            log::warn!("on_playback_ended: no Play outstanding");
            return;
        };
        let Some(now) = self.now_playing.filter(|p| p.session == session) else {
            log::debug!("on_playback_ended: session {} was superseded", session);
            return;
        };

        let status = self.status.get();
        if now.status_armed && !status.is_ok() {
            log::error!("on_playback_ended: {} aborted: {}", now.track, status);
            self.emit(PlaybackEvent::Failed {
                track: now.track,
                status,
            });
            self.retire(now.track);
            return;
        }
        if now.stop_requested || now.fading_out || now.no_channel {
            self.retire(now.track);
            return;
        }

        let next = self
            .tracks
            .get(now.track)
            .and_then(|t| t.play_count.after_one_play());
        let Some(remaining) = next else {
            self.retire(now.track);
            return;
        };

        if let Some(track) = self.tracks.get_mut(now.track) {
            track.play_count = remaining;
        }
        log::info!("on_playback_ended: {} repeating, {:?} left", now.track, remaining);
        self.emit(PlaybackEvent::Repeating {
            track: now.track,
            remaining,
        });
        self.now_playing = None;
        if let Err(e) = self.start_session(now.track, 0, None) {
            log::error!("on_playback_ended: replay of {} failed: {}", now.track, e);
            self.emit(PlaybackEvent::Ended { track: now.track });
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Status and events
    // ─────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode {
        self.status.get()
    }

    /// Clear the status register, returning what it held
    pub fn clear_status(&self) -> StatusCode {
        self.status.clear()
    }

    /// Receiver for playback events
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.event_rx.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Publish the start of a track and send Play
    fn start_session(&mut self, id: TrackId, offset: u64, fade_in_ms: Option<u32>) -> ControllerResult<()> {
        let supplier = self
            .supplier
            .as_ref()
            .ok_or(ControllerError::NoActiveStreamingSupport)?;
        let track = self.tracks.get_mut(id).ok_or(ControllerError::UnknownTrack(id))?;

        track.source.seek_data(offset)?;
        // A re-enabled buffer restarts its numbering; skip sessions still awaiting their ending
        let mut session = supplier.begin_session();
        while self.awaiting_end.contains(&session) {
            session = supplier.begin_session();
        }
        let geometry = track.geometry;
        let first = supplier
            .refill_half(Half::First, session, &geometry, &mut track.source)
            .inspect_err(|_| {
                self.status.record(StatusCode::ReadError);
            })?;
        let buffer = supplier.buffer().clone();
        let status_armed = self.status.get().is_ok();

        self.send(Command::Play {
            start_half: Half::First,
            buffer,
            geometry: geometry.packed(),
            session,
            mid_stream: offset > 0,
        })?;
        self.awaiting_end.push_back(session);
        let now = NowPlaying {
            track: id,
            session,
            reached_eos: false,
            stop_requested: false,
            fading_out: false,
            no_channel: false,
            status_armed,
            paused: false,
        };
        self.now_playing = Some(now);
        log::info!("start_session: {} playing as session {}", id, session);
        self.emit(PlaybackEvent::Started { track: id, session });
        self.emit(PlaybackEvent::BufferRefilled {
            track: id,
            half: Half::First,
            bytes: first.bytes_read,
            end_of_stream: first.end_of_stream,
        });

        if let Some(duration_ms) = fade_in_ms {
            self.send(Command::FadeIn { duration_ms })?;
        }
        if first.end_of_stream {
            self.signal_end_of_stream()
        } else {
            self.fill(now, Half::Second);
            Ok(())
        }
    }

    /// Refill one half for `now`; a read error stops the track
    fn fill(&mut self, now: NowPlaying, half: Half) {
        let Some(supplier) = self.supplier.as_ref() else {
            return;
        };
        // A half still published for this session was never vacated: the
        // request predates the session
        if supplier.buffer().is_published(half, now.session) {
            log::debug!("fill: stale request for the {} half", half);
            return;
        }
        let Some(track) = self.tracks.get_mut(now.track) else {
            return;
        };
        let geometry = track.geometry;
        let result = supplier.refill_half(half, now.session, &geometry, &mut track.source);

        match result {
            Ok(outcome) => {
                self.emit(PlaybackEvent::BufferRefilled {
                    track: now.track,
                    half,
                    bytes: outcome.bytes_read,
                    end_of_stream: outcome.end_of_stream,
                });
                if outcome.end_of_stream {
                    if let Err(e) = self.signal_end_of_stream() {
                        log::error!("fill: {}", e);
                    }
                }
            }
            Err(e) => {
                log::error!("fill: {} stopped: {}", now.track, e);
                self.status.record(StatusCode::ReadError);
                if let Err(e) = self.request_stop() {
                    log::error!("fill: {}", e);
                }
            }
        }
    }

    fn signal_end_of_stream(&mut self) -> ControllerResult<()> {
        self.send(Command::EndOfStreamReached)?;
        self.on_end_of_stream_acknowledged();
        Ok(())
    }

    fn request_stop(&mut self) -> ControllerResult<()> {
        if let Some(now) = self.now_playing.as_mut() {
            now.stop_requested = true;
            log::info!("request_stop: stopping {}", now.track);
        }
        self.send(Command::Stop)
    }

    /// Forward a command that only applies to a playing track
    fn forward(&mut self, command: Command) -> ControllerResult<()> {
        if self.now_playing.is_none() {
            log::info!("forward: {} ignored, nothing playing", command.name());
            return Ok(());
        }
        self.send(command)
    }

    /// Retire the current track without stopping the sound side.
    /// Returns whether a track was current.
    fn supersede_current(&mut self) -> bool {
        match self.now_playing.take() {
            Some(now) => {
                log::info!("supersede_current: {} replaced", now.track);
                self.emit(PlaybackEvent::Ended { track: now.track });
                true
            }
            None => false,
        }
    }

    /// Stop the sound side and retire the current track immediately
    fn abandon_current(&mut self) -> ControllerResult<()> {
        let Some(now) = self.now_playing else {
            return Ok(());
        };
        let stopped = if now.stop_requested {
            Ok(())
        } else {
            self.send(Command::Stop)
        };
        self.retire(now.track);
        stopped
    }

    fn retire(&mut self, track: TrackId) {
        self.now_playing = None;
        log::info!("retire: {} is no longer current", track);
        self.emit(PlaybackEvent::Ended { track });
    }

    fn send(&mut self, command: Command) -> ControllerResult<()> {
        self.resync();
        let name = command.name();
        self.endpoint.send(command).map_err(|e| {
            log::error!("send: {} failed: {}", name, e);
            self.status.record(StatusCode::ChannelFault);
            self.resync();
            ControllerError::Channel(e)
        })
    }

    /// Recover from a channel reset
    ///
    /// Every Play and PlaybackEnded in flight was discarded, and the sound
    /// side drops its track without answering, so the current track fails
    /// with a channel fault and nothing is awaited any more.
    fn resync(&mut self) {
        if !self.endpoint.take_reset() {
            return;
        }
        self.awaiting_end.clear();
        self.status.record(StatusCode::ChannelFault);
        if let Some(now) = self.now_playing {
            log::error!("resync: {} lost to a channel reset", now.track);
            self.emit(PlaybackEvent::Failed {
                track: now.track,
                status: StatusCode::ChannelFault,
            });
            self.retire(now.track);
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn duration_ms(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{message_channel, SoundEndpoint};
    use crate::test_support::{tagged_track, FrameSpec};
    use std::io::Cursor;

    fn config() -> StreamConfig {
        StreamConfig {
            half_size: 4096,
            retry_backoff_us: 0,
            send_retry_budget: 2,
            ..StreamConfig::default()
        }
    }

    fn controller() -> (PlaybackController, SoundEndpoint) {
        let config = config();
        let (main, sound) = message_channel(&config);
        let controller = PlaybackController::new(main, Arc::new(StatusRegister::new()), &config);
        (controller, sound)
    }

    fn load(controller: &mut PlaybackController, frames: usize) -> TrackId {
        controller
            .load_from_reader(Cursor::new(tagged_track(&FrameSpec::mpeg1_128k(), frames)), "test")
            .unwrap()
    }

    fn drain(sound: &mut SoundEndpoint) -> Vec<&'static str> {
        std::iter::from_fn(|| sound.try_recv()).map(|c| c.name()).collect()
    }

    #[test]
    fn test_play_requires_streaming() {
        let (mut controller, _sound) = controller();
        let id = load(&mut controller, 10);
        assert!(matches!(
            controller.play(id, PlayCount::ONCE),
            Err(ControllerError::NoActiveStreamingSupport)
        ));
        assert!(matches!(
            controller.play_with_fade_in(id, Duration::from_secs(1), PlayCount::ONCE),
            Err(ControllerError::NoActiveStreamingSupport)
        ));
    }

    #[test]
    fn test_disable_streaming_stops_current_track() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::Loop).unwrap();
        drain(&mut sound);

        controller.disable_streaming().unwrap();
        assert!(!controller.is_streaming_enabled());
        assert_eq!(controller.current_track(), None);
        assert_eq!(drain(&mut sound), vec!["Stop"]);

        // Disabling twice is harmless, and the track stays loaded
        controller.disable_streaming().unwrap();
        controller.enable_streaming();
        assert!(controller.play(id, PlayCount::ONCE).is_ok());
    }

    #[test]
    fn test_play_publishes_both_halves() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::ONCE).unwrap();

        assert_eq!(drain(&mut sound), vec!["Play"]);
        assert_eq!(controller.current_track(), Some(id));
        let refills: Vec<_> = controller
            .events()
            .try_iter()
            .filter_map(|e| match e {
                PlaybackEvent::BufferRefilled { half, bytes, .. } => Some((half, bytes)),
                _ => None,
            })
            .collect();
        assert_eq!(refills, vec![(Half::First, 4096 - 1045), (Half::Second, 4096)]);
    }

    #[test]
    fn test_short_track_signals_end_of_stream_at_once() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 3);
        controller
            .play_with_fade_in(id, Duration::from_millis(500), PlayCount::ONCE)
            .unwrap();
        assert_eq!(drain(&mut sound), vec!["Play", "FadeIn", "EndOfStreamReached"]);

        // No more refills once the end is published
        let before = controller.events().try_iter().count();
        controller.on_buffer_refill_requested(Half::Second);
        assert_eq!(controller.events().try_iter().count(), 0);
        assert!(before > 0);
    }

    #[test]
    fn test_transport_without_track_is_a_no_op() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        controller.stop().unwrap();
        controller.pause().unwrap();
        controller.unpause().unwrap();
        controller.fade_out(Duration::from_secs(1)).unwrap();
        controller.set_volume(10).unwrap();
        assert!(drain(&mut sound).is_empty());
    }

    #[test]
    fn test_stop_is_sent_once() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::Loop).unwrap();
        controller.stop().unwrap();
        controller.stop().unwrap();
        assert_eq!(drain(&mut sound), vec!["Play", "Stop"]);

        sound.send(Notification::PlaybackEnded).unwrap();
        controller.process_notifications();
        assert!(!controller.is_playing());
        assert!(controller
            .events()
            .try_iter()
            .any(|e| e == PlaybackEvent::Ended { track: id }));
    }

    #[test]
    fn test_count_replays_then_retires() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::from_count(2)).unwrap();

        sound.send(Notification::PlaybackEnded).unwrap();
        controller.process_notifications();
        assert!(controller.is_playing());
        assert_eq!(controller.play_count(id), Some(PlayCount::ONCE));

        sound.send(Notification::PlaybackEnded).unwrap();
        controller.process_notifications();
        assert!(!controller.is_playing());
        assert_eq!(drain(&mut sound), vec!["Play", "Play"]);
    }

    #[test]
    fn test_superseded_ending_is_ignored() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let first = load(&mut controller, 100);
        let second = load(&mut controller, 100);
        controller.play(first, PlayCount::ONCE).unwrap();
        controller.play(second, PlayCount::ONCE).unwrap();

        // The ending of the first Play does not retire the second
        sound.send(Notification::PlaybackEnded).unwrap();
        controller.process_notifications();
        assert_eq!(controller.current_track(), Some(second));
    }

    #[test]
    fn test_stale_refill_request_is_ignored() {
        let (mut controller, _sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::ONCE).unwrap();
        let _ = controller.events().try_iter().count();

        // Both halves are still published: nothing was vacated
        controller.on_buffer_refill_requested(Half::First);
        assert_eq!(controller.events().try_iter().count(), 0);
    }

    #[test]
    fn test_no_channel_retires_looping_track() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::Loop).unwrap();
        sound.send(Notification::NoChannelAvailable).unwrap();
        sound.send(Notification::PlaybackEnded).unwrap();
        controller.process_notifications();

        assert!(!controller.is_playing());
        let events: Vec<_> = controller.events().try_iter().collect();
        assert!(events.contains(&PlaybackEvent::NoChannelAvailable { track: id }));
        assert!(events.contains(&PlaybackEvent::Ended { track: id }));
    }

    #[test]
    fn test_seek_restarts_mid_stream() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 200);
        controller.play(id, PlayCount::from_count(3)).unwrap();
        controller.seek(Duration::from_millis(1000)).unwrap();

        let plays: Vec<bool> = std::iter::from_fn(|| sound.try_recv())
            .filter_map(|c| match c {
                Command::Play { mid_stream, .. } => Some(mid_stream),
                _ => None,
            })
            .collect();
        assert_eq!(plays, vec![false, true]);
        assert_eq!(controller.play_count(id), Some(PlayCount::from_count(3)));
    }

    #[test]
    fn test_unload_current_stops_it() {
        let (mut controller, mut sound) = controller();
        controller.enable_streaming();
        let id = load(&mut controller, 100);
        controller.play(id, PlayCount::ONCE).unwrap();
        controller.unload(id).unwrap();

        assert!(!controller.is_playing());
        assert_eq!(drain(&mut sound), vec!["Play", "Stop"]);
        assert!(matches!(controller.unload(id), Err(ControllerError::UnknownTrack(_))));
    }

    #[test]
    fn test_oversized_frames_are_rejected_at_load() {
        let config = StreamConfig {
            half_size: 1024,
            ..config()
        };
        let (main, _sound) = message_channel(&config);
        let mut controller = PlaybackController::new(main, Arc::new(StatusRegister::new()), &config);
        let result = controller.load_from_reader(
            Cursor::new(tagged_track(&FrameSpec::mpeg1_128k(), 4)),
            "big",
        );
        assert!(matches!(result, Err(ControllerError::Geometry(_))));
    }

    #[test]
    fn test_missing_file() {
        let (mut controller, _sound) = controller();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            controller.load(dir.path().join("missing.mp3")),
            Err(ControllerError::Format(_))
        ));
    }
}
