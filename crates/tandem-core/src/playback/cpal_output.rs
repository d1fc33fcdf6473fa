//! CPAL-backed output channel
//!
//! ```text
//! ┌──────────────────┐  queue()  ┌─────────────────────┐  pop()  ┌─────────────────┐
//! │ Sound processor  │──────────►│  PCM sample queue   │────────►│ CPAL callback   │
//! │ (one frame/tick) │           │  (lock-free SPSC)   │         │ (device thread) │
//! └──────────────────┘           └─────────────────────┘         └─────────────────┘
//!          │ volume / pause                                               ▲
//!          └────────────────────── Relaxed atomics ───────────────────────┘
//! ```
//!
//! `cpal::Stream` is not `Send`, so a `CpalChannel` must be created on the
//! thread that drives it (see `spawn_sound_processor`).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use crate::types::{PcmFormat, MAX_SAMPLES_PER_FRAME, MAX_VOLUME};

use super::output::{OutputError, OutputResult, SoundChannel};

/// Decoded frames buffered between the processor and the device
const QUEUED_FRAMES: usize = 8;

#[derive(Debug)]
struct ChannelControls {
    volume: AtomicU8,
    paused: AtomicBool,
}

pub struct CpalChannel {
    device: cpal::Device,
    stream: Option<Stream>,
    producer: Option<rtrb::Producer<i16>>,
    controls: Arc<ChannelControls>,
    dropped_samples: u64,
}

impl CpalChannel {
    /// Open the host's default output device
    pub fn open_default() -> OutputResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| OutputError::Unavailable("no default output device".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("CpalChannel::open_default: using audio device: {}", name);

        Ok(Self {
            device,
            stream: None,
            producer: None,
            controls: Arc::new(ChannelControls {
                volume: AtomicU8::new(MAX_VOLUME),
                paused: AtomicBool::new(false),
            }),
            dropped_samples: 0,
        })
    }
}

impl SoundChannel for CpalChannel {
    fn start(&mut self, format: PcmFormat, volume: u8, _pan: u8) -> OutputResult<()> {
        self.stop();

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };
        let (producer, mut consumer) = rtrb::RingBuffer::<i16>::new(MAX_SAMPLES_PER_FRAME * QUEUED_FRAMES);
        self.controls.volume.store(volume.min(MAX_VOLUME), Ordering::Relaxed);
        self.controls.paused.store(false, Ordering::Relaxed);
        let controls = self.controls.clone();

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    if controls.paused.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let gain = controls.volume.load(Ordering::Relaxed) as f32 / MAX_VOLUME as f32;
                    for out in data.iter_mut() {
                        // Underrun plays silence
                        *out = match consumer.pop() {
                            Ok(sample) => sample as f32 / 32768.0 * gain,
                            Err(_) => 0.0,
                        };
                    }
                },
                move |err| {
                    log::error!("CpalChannel: output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| OutputError::UnsupportedFormat {
                rate: format.sample_rate,
                channels: format.channels,
                reason: e.to_string(),
            })?;
        stream.play().map_err(|e| OutputError::Start(e.to_string()))?;

        log::info!(
            "CpalChannel::start: {}Hz x {} channels, volume {}",
            format.sample_rate,
            format.channels,
            volume
        );
        self.stream = Some(stream);
        self.producer = Some(producer);
        self.dropped_samples = 0;
        Ok(())
    }

    fn queue(&mut self, samples: &[i16]) {
        let Some(producer) = self.producer.as_mut() else {
            return;
        };
        for sample in samples {
            if producer.push(*sample).is_err() {
                self.dropped_samples += 1;
            }
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.controls.volume.store(volume.min(MAX_VOLUME), Ordering::Relaxed);
    }

    fn pause(&mut self) {
        self.controls.paused.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("CpalChannel::pause: {}", e);
            }
        }
    }

    fn resume(&mut self) {
        self.controls.paused.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.play() {
                log::warn!("CpalChannel::resume: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            if self.dropped_samples > 0 {
                log::warn!(
                    "CpalChannel::stop: {} samples dropped on a full queue",
                    self.dropped_samples
                );
            }
            log::debug!("CpalChannel::stop: stream released");
        }
        self.producer = None;
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}
