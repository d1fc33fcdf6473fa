//! Decode engine: one frame from the read cursor into the PCM double buffer
//!
//! ```text
//!   encoded window (from cursor)            PCM double buffer
//!   ┌──────┬────────────────┬─────┐         ┌──────────┬──────────┐
//!   │ junk │ frame n        │ ... │  ───►   │ active   │ playing  │
//!   └──────┴────────────────┴─────┘         └──────────┴──────────┘
//!    skip    header + side info + main data    toggled after each decode
//! ```
//!
//! Framing (sync search, frame length, truncation, reservoir accounting) is
//! done here so that a frame which does not fit the readable window is
//! rejected before the decoder sees it. The caller owns the read cursor and
//! advances it by [`FrameReport::bytes_consumed`].

use crate::types::{PcmFormat, DEFAULT_FRAME_LENGTH, DEFAULT_SAMPLE_RATE};

use super::decoder::FrameDecoder;
use super::error::{DecodeError, DecodeResult};
use super::header::{find_next_in_stream, find_sync, FrameHeader, Layer};
use super::pcm::{FrameReport, PcmDoubleBuffer};

pub struct DecodeEngine<D> {
    decoder: D,
    pcm: PcmDoubleBuffer,
    /// Main-data bytes a Layer III frame may back-reference
    reservoir: usize,
    /// Tolerate back-references into data before the stream start
    joined_mid_stream: bool,
    last_format: Option<PcmFormat>,
    last_frame_len: Option<u32>,
    frames_decoded: u64,
}

impl<D: FrameDecoder> DecodeEngine<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            pcm: PcmDoubleBuffer::new(),
            reservoir: 0,
            joined_mid_stream: false,
            last_format: None,
            last_frame_len: None,
            frames_decoded: 0,
        }
    }

    /// Prepare for a new stream
    ///
    /// `mid_stream` is set when playback starts at an arbitrary frame (after a
    /// seek): the first frames may reference reservoir bytes that were never
    /// read, and are rendered as silence instead of faulting.
    pub fn begin_stream(&mut self, mid_stream: bool) {
        self.decoder.reset();
        self.pcm.clear();
        self.reservoir = 0;
        self.joined_mid_stream = mid_stream;
        self.last_format = None;
        self.last_frame_len = None;
        self.frames_decoded = 0;
    }

    /// Decode the first frame found in `region`
    ///
    /// `region` starts at the read cursor and ends at the last readable byte;
    /// the sync search never looks past it.
    pub fn decode_one_frame(&mut self, region: &[u8]) -> DecodeResult<FrameReport> {
        let (skip, header) = find_sync(region).ok_or(DecodeError::SyncWordNotFound {
            searched: region.len(),
        })?;
        if skip > 0 {
            log::debug!("decode_one_frame: skipped {} bytes before sync word", skip);
        }

        let frame_region = &region[skip..];
        let frame_len = match header.frame_len() {
            Some(len) => len,
            None => find_next_in_stream(frame_region, &header)
                .ok_or(DecodeError::FreeBitrateSyncMissing)?,
        };
        if frame_len > frame_region.len() {
            return Err(DecodeError::TruncatedFrame {
                needed: frame_len,
                available: frame_region.len(),
            });
        }
        let frame = &frame_region[..frame_len];

        let samples = match self.account_reservoir(&header, frame)? {
            true => self.decode_into_pcm(frame, &header)?,
            false => self.silence_into_pcm(frame, &header),
        };

        let pcm_half = self.pcm.commit(samples);
        let format = self.last_format.unwrap_or_else(|| {
            PcmFormat::new(header.sample_rate, header.channels())
        });
        let frame_len_samples = header.samples_per_frame();
        self.last_frame_len = Some(frame_len_samples);
        self.frames_decoded += 1;

        Ok(FrameReport {
            format,
            frame_len: frame_len_samples,
            output_samples: samples,
            bytes_consumed: skip + frame_len,
            pcm_half,
        })
    }

    /// Track the Layer III bit reservoir across frames
    ///
    /// Returns `false` when the frame must be rendered as silence because it
    /// references data from before a mid-stream start.
    fn account_reservoir(&mut self, header: &FrameHeader, frame: &[u8]) -> DecodeResult<bool> {
        if header.layer != Layer::Layer3 {
            return Ok(true);
        }

        let begin = header.main_data_begin(frame).unwrap_or(0);
        let decodable = if begin > self.reservoir {
            if !self.joined_mid_stream {
                return Err(DecodeError::BitReservoirUnderflow {
                    needed: begin,
                    available: self.reservoir,
                });
            }
            false
        } else {
            self.joined_mid_stream = false;
            true
        };

        self.reservoir = (self.reservoir + header.main_data_len(frame.len())).min(header.max_reservoir());
        Ok(decodable)
    }

    fn decode_into_pcm(&mut self, frame: &[u8], header: &FrameHeader) -> DecodeResult<usize> {
        let decoded = self.decoder.decode_frame(frame, header, self.pcm.active_mut())?;
        self.last_format = Some(PcmFormat::new(decoded.sample_rate, decoded.channels));
        Ok(decoded.samples)
    }

    fn silence_into_pcm(&mut self, frame: &[u8], header: &FrameHeader) -> usize {
        // The decoder still sees the frame so its own reservoir fills up
        if let Err(e) = self.decoder.decode_frame(frame, header, self.pcm.active_mut()) {
            log::debug!("silence_into_pcm: decoder rejected mid-stream frame: {}", e);
        }
        let samples = (header.samples_per_frame() as usize * header.channels() as usize)
            .min(self.pcm.active_mut().len());
        self.pcm.active_mut()[..samples].fill(0);
        samples
    }

    /// PCM double buffer holding decoded frames
    pub fn pcm(&self) -> &PcmDoubleBuffer {
        &self.pcm
    }

    /// Sample rate of the last decoded frame, or the default before the first
    pub fn sample_rate(&self) -> u32 {
        self.last_format.map_or(DEFAULT_SAMPLE_RATE, |f| f.sample_rate)
    }

    /// Channel count of the last decoded frame
    pub fn channels(&self) -> Option<u16> {
        self.last_format.map(|f| f.channels)
    }

    /// Samples per channel of the last decoded frame, or the default before the first
    pub fn frame_len(&self) -> u32 {
        self.last_frame_len.unwrap_or(DEFAULT_FRAME_LENGTH)
    }

    pub fn format(&self) -> Option<PcmFormat> {
        self.last_format
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}
