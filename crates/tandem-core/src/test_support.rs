//! Synthetic MPEG streams and a stub frame decoder for tests

use crate::decode::header::{max_frame_len, FrameHeader};
use crate::decode::{DecodeError, DecodeResult, DecodedFrame, FrameDecoder};
use crate::stream::{TRACK_HEADER_LEN, TRACK_TAG};

/// Header bytes and length of the frames a synthetic stream is made of
#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
    pub header: [u8; 4],
    pub len: usize,
}

impl FrameSpec {
    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, joint stereo, 417-byte frames
    pub fn mpeg1_128k() -> Self {
        Self {
            header: [0xFF, 0xFB, 0x90, 0x40],
            len: 417,
        }
    }

    /// MPEG-1 Layer III, 32 kbps, 32 kHz, mono, 144-byte frames
    pub fn mpeg1_32k_mono() -> Self {
        Self {
            header: [0xFF, 0xFB, 0x18, 0xC0],
            len: 144,
        }
    }

    /// Free-format MPEG-1 Layer III frames of `len` bytes
    pub fn free_format(len: usize) -> Self {
        Self {
            header: [0xFF, 0xFB, 0x00, 0x40],
            len,
        }
    }

    pub fn parsed(&self) -> FrameHeader {
        FrameHeader::parse(&self.header).expect("synthetic header must parse")
    }
}

/// One frame: header, side info carrying `main_data_begin`, zero main data
pub fn build_frame(spec: &FrameSpec, main_data_begin: u16) -> Vec<u8> {
    let mut frame = vec![0u8; spec.len];
    frame[..4].copy_from_slice(&spec.header);
    frame[4] = (main_data_begin >> 1) as u8;
    frame[5] = ((main_data_begin & 1) as u8) << 7;
    frame
}

/// `count` back-to-back frames that never reference the bit reservoir
pub fn build_stream(spec: &FrameSpec, count: usize) -> Vec<u8> {
    (0..count).flat_map(|_| build_frame(spec, 0)).collect()
}

/// Tagged container header for a stream of `spec` frames
pub fn tagged_header(spec: &FrameSpec) -> Vec<u8> {
    let header = spec.parsed();
    let mut bytes = TRACK_TAG.to_vec();
    bytes.extend_from_slice(&header.sample_rate.to_le_bytes());
    bytes.push(header.channel_mode.bits());
    bytes.push(header.bitrate_kbps.map_or(0, |kbps| (kbps / 8) as u8));
    bytes.extend_from_slice(&(max_frame_len(&header) as u16).to_le_bytes());
    debug_assert_eq!(bytes.len(), TRACK_HEADER_LEN);
    bytes
}

/// A complete tagged track of `count` frames
pub fn tagged_track(spec: &FrameSpec, count: usize) -> Vec<u8> {
    let mut bytes = tagged_header(spec);
    bytes.extend(build_stream(spec, count));
    bytes
}

/// A tagged track whose payload is `payload` verbatim, with Δ forced to `delta`
pub fn tagged_payload(payload: &[u8], delta: u16) -> Vec<u8> {
    let mut bytes = tagged_header(&FrameSpec::mpeg1_128k());
    bytes[10..12].copy_from_slice(&delta.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Frame decoder that emits silence, optionally failing after some frames
#[derive(Debug, Default)]
pub struct SilenceDecoder {
    pub calls: usize,
    pub resets: usize,
    fail_after: Option<usize>,
}

impl SilenceDecoder {
    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }
}

impl FrameDecoder for SilenceDecoder {
    fn decode_frame(
        &mut self,
        _frame: &[u8],
        header: &FrameHeader,
        pcm: &mut [i16],
    ) -> DecodeResult<DecodedFrame> {
        if self.fail_after.is_some_and(|limit| self.calls >= limit) {
            return Err(DecodeError::Decoder("synthetic fault".to_string()));
        }
        self.calls += 1;

        let samples = header.samples_per_frame() as usize * header.channels() as usize;
        let samples = samples.min(pcm.len());
        pcm[..samples].fill(0);
        Ok(DecodedFrame {
            samples,
            channels: header.channels(),
            sample_rate: header.sample_rate,
        })
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}
