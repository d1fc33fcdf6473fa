//! Frame decoder seam
//!
//! The engine does all framing itself and hands exactly one complete frame
//! (header included) to a [`FrameDecoder`]. The production decoder is
//! symphonia's MPEG audio decoder, fed one packet per frame; its bit
//! reservoir carries over between calls until [`FrameDecoder::reset`].

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::formats::Packet;

use super::error::{DecodeError, DecodeResult};
use super::header::FrameHeader;

/// What one decoded frame produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Interleaved samples written to the destination
    pub samples: usize,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Decodes single MPEG audio frames into interleaved 16-bit PCM
pub trait FrameDecoder: Send {
    /// Decode `frame` (a complete frame starting at its sync word) into `pcm`
    fn decode_frame(
        &mut self,
        frame: &[u8],
        header: &FrameHeader,
        pcm: &mut [i16],
    ) -> DecodeResult<DecodedFrame>;

    /// Forget all inter-frame state (bit reservoir, overlap buffers)
    fn reset(&mut self);
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn decode_frame(
        &mut self,
        frame: &[u8],
        header: &FrameHeader,
        pcm: &mut [i16],
    ) -> DecodeResult<DecodedFrame> {
        (**self).decode_frame(frame, header, pcm)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// [`FrameDecoder`] backed by symphonia
pub struct SymphoniaFrameDecoder {
    decoder: Box<dyn Decoder>,
    sample_buf: Option<SampleBuffer<i16>>,
    ts: u64,
}

impl SymphoniaFrameDecoder {
    pub fn new() -> DecodeResult<Self> {
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_MP3);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Decoder(e.to_string()))?;

        Ok(Self {
            decoder,
            sample_buf: None,
            ts: 0,
        })
    }
}

impl FrameDecoder for SymphoniaFrameDecoder {
    fn decode_frame(
        &mut self,
        frame: &[u8],
        header: &FrameHeader,
        pcm: &mut [i16],
    ) -> DecodeResult<DecodedFrame> {
        let duration = header.samples_per_frame() as u64;
        let packet = Packet::new_from_slice(0, self.ts, duration, frame);
        self.ts += duration;

        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| DecodeError::Decoder(e.to_string()))?;

        let spec = *decoded.spec();
        // Sized on the first decode; the MPEG decoder's capacity never changes
        if self.sample_buf.is_none() {
            self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        let Some(buf) = self.sample_buf.as_mut() else {
            return Err(DecodeError::Decoder("sample buffer unavailable".to_string()));
        };
        buf.copy_interleaved_ref(decoded);

        let samples = buf.samples();
        let written = samples.len().min(pcm.len());
        pcm[..written].copy_from_slice(&samples[..written]);

        Ok(DecodedFrame {
            samples: written,
            channels: spec.channels.count() as u16,
            sample_rate: spec.rate,
        })
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.ts = 0;
    }
}
