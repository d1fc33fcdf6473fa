//! Channel endpoints with bounded-retry sends and the reset handshake
//!
//! Every message travels stamped with the reset epoch its sender had
//! acknowledged. Running out of send budget bumps the shared epoch: from then
//! on everything stamped with an older epoch is discarded on receipt, and
//! neither endpoint sends or receives again until its owner has called
//! [`Endpoint::take_reset`] and dropped whatever state depended on the lost
//! messages.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::StreamConfig;

use super::doorbell::Doorbell;
use super::error::{ChannelError, ChannelResult, Side};
use super::message::{Command, Notification};

/// Reset epoch shared by both endpoints
#[derive(Debug, Default)]
struct ResetLine {
    epoch: AtomicU32,
}

impl ResetLine {
    fn current(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidate every message in flight
    fn raise(&self) -> u32 {
        self.epoch.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}

/// One side of the message channel
///
/// Owns the producer of its outbound queue and the consumer of its inbound
/// queue. Not `Clone`: each queue has exactly one producer and one consumer.
pub struct Endpoint<Out, In> {
    side: Side,
    tx: rtrb::Producer<(u32, Out)>,
    rx: rtrb::Consumer<(u32, In)>,
    own_bell: Arc<Doorbell>,
    peer_bell: Arc<Doorbell>,
    reset: Arc<ResetLine>,
    /// Last reset epoch this side's owner acknowledged
    epoch: u32,
    retry_budget: u32,
    backoff: Duration,
}

/// Endpoint held by the main side
pub type MainEndpoint = Endpoint<Command, Notification>;

/// Endpoint held by the sound side
pub type SoundEndpoint = Endpoint<Notification, Command>;

impl<Out, In> Endpoint<Out, In> {
    pub fn side(&self) -> Side {
        self.side
    }

    /// Doorbell rung by the peer whenever it sends to this endpoint
    pub fn doorbell(&self) -> Arc<Doorbell> {
        self.own_bell.clone()
    }

    /// Whether a reset happened that this side has not acknowledged yet
    pub fn reset_pending(&self) -> bool {
        self.reset.current() != self.epoch
    }

    /// Acknowledge a reset. Returns `true` if one was pending; the caller
    /// must then forget every message it was still expecting from the peer.
    pub fn take_reset(&mut self) -> bool {
        let current = self.reset.current();
        if current == self.epoch {
            return false;
        }
        log::warn!("take_reset: {} side resynchronising after channel reset", self.side);
        self.epoch = current;
        true
    }

    /// Enqueue without blocking. Returns the message if the queue is full.
    pub fn try_send(&mut self, msg: Out) -> Result<(), Out> {
        match self.tx.push((self.epoch, msg)) {
            Ok(()) => {
                self.peer_bell.ring();
                Ok(())
            }
            Err(rtrb::PushError::Full((_, msg))) => Err(msg),
        }
    }

    /// Enqueue, retrying while the queue is full
    ///
    /// When the retry budget runs out the channel is reset: the message is
    /// dropped along with everything else in flight in both directions, the
    /// peer is woken, and the send fails with [`ChannelError::Timeout`].
    pub fn send(&mut self, msg: Out) -> ChannelResult<()> {
        let peer = self.side.peer();
        if self.tx.is_abandoned() {
            return Err(ChannelError::Disconnected { peer });
        }
        if self.reset_pending() {
            return Err(ChannelError::ResetPending { side: self.side });
        }

        let mut msg = msg;
        for attempt in 0..=self.retry_budget {
            match self.try_send(msg) {
                Ok(()) => return Ok(()),
                Err(returned) => msg = returned,
            }
            if attempt < self.retry_budget && !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }
        drop(msg);

        let epoch = self.reset.raise();
        log::error!(
            "send: queue to {} side full after {} attempts, channel reset (epoch {})",
            peer,
            self.retry_budget + 1,
            epoch
        );
        self.peer_bell.ring();
        Err(ChannelError::Timeout {
            peer,
            attempts: self.retry_budget + 1,
        })
    }

    /// Dequeue one message without blocking
    ///
    /// Nothing is delivered while a reset is unacknowledged. Messages stamped
    /// before the last reset are discarded.
    pub fn try_recv(&mut self) -> Option<In> {
        if self.reset_pending() {
            return None;
        }
        let mut discarded = 0usize;
        let received = loop {
            match self.rx.pop() {
                Ok((stamp, msg)) if stamp == self.epoch => break Some(msg),
                Ok(_) => discarded += 1,
                Err(_) => break None,
            }
        };
        if discarded > 0 {
            log::warn!(
                "try_recv: discarded {} stale messages from the {} side",
                discarded,
                self.side.peer()
            );
            self.peer_bell.ring();
        }
        received
    }

    /// Dequeue one message, waiting up to `timeout` for the peer to send
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<In> {
        if let Some(msg) = self.try_recv() {
            return Some(msg);
        }
        self.own_bell.wait(timeout);
        self.try_recv()
    }

    /// Wait for the doorbell without dequeuing anything
    pub fn wait(&self, timeout: Duration) -> bool {
        self.own_bell.wait(timeout)
    }

    /// Number of messages waiting in the inbound queue
    pub fn pending(&self) -> usize {
        self.rx.slots()
    }

    /// Whether the peer endpoint has been dropped
    pub fn is_peer_gone(&self) -> bool {
        self.tx.is_abandoned()
    }
}

/// Create a connected pair of endpoints
pub fn message_channel(config: &StreamConfig) -> (MainEndpoint, SoundEndpoint) {
    let capacity = config.queue_capacity.max(1);
    let (command_tx, command_rx) = rtrb::RingBuffer::<(u32, Command)>::new(capacity);
    let (notify_tx, notify_rx) = rtrb::RingBuffer::<(u32, Notification)>::new(capacity);

    let main_bell = Arc::new(Doorbell::new());
    let sound_bell = Arc::new(Doorbell::new());
    let reset = Arc::new(ResetLine::default());

    let main = Endpoint {
        side: Side::Main,
        tx: command_tx,
        rx: notify_rx,
        own_bell: main_bell.clone(),
        peer_bell: sound_bell.clone(),
        reset: reset.clone(),
        epoch: 0,
        retry_budget: config.send_retry_budget,
        backoff: config.retry_backoff(),
    };
    let sound = Endpoint {
        side: Side::Sound,
        tx: notify_tx,
        rx: command_rx,
        own_bell: sound_bell,
        peer_bell: main_bell,
        reset,
        epoch: 0,
        retry_budget: config.send_retry_budget,
        backoff: config.retry_backoff(),
    };
    (main, sound)
}

/// Hands out the two endpoints of one channel, each exactly once
pub struct ChannelHub {
    main: Option<MainEndpoint>,
    sound: Option<SoundEndpoint>,
}

impl ChannelHub {
    pub fn new(config: &StreamConfig) -> Self {
        let (main, sound) = message_channel(config);
        Self {
            main: Some(main),
            sound: Some(sound),
        }
    }

    /// Claim the main-side endpoint
    pub fn register_main(&mut self) -> ChannelResult<MainEndpoint> {
        self.main.take().ok_or(ChannelError::AlreadyRegistered(Side::Main))
    }

    /// Claim the sound-side endpoint
    pub fn register_sound(&mut self) -> ChannelResult<SoundEndpoint> {
        self.sound.take().ok_or(ChannelError::AlreadyRegistered(Side::Sound))
    }
}
