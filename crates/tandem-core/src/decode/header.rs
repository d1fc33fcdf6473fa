//! MPEG audio frame header parsing and sync word search
//!
//! Only what the pipeline needs to find frame boundaries and classify
//! faults before handing a frame to the decoder: version, layer, bitrate,
//! sample rate, padding, channel mode and the Layer III `main_data_begin`
//! back-pointer into the bit reservoir.

/// Size of the fixed frame header in bytes
pub const HEADER_LEN: usize = 4;

/// Size of the optional CRC that follows the header
const CRC_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Layer1,
    Layer2,
    Layer3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            ChannelMode::Stereo => 0,
            ChannelMode::JointStereo => 1,
            ChannelMode::DualChannel => 2,
            ChannelMode::Mono => 3,
        }
    }

    pub fn channel_count(self) -> u16 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

const BITRATES_V1_L1: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const BITRATES_V1_L2: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L1: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATES_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_V2: [u32; 3] = [22050, 24000, 16000];
const SAMPLE_RATES_V25: [u32; 3] = [11025, 12000, 8000];

/// A parsed 4-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub has_crc: bool,
    /// Bitrate in kbps, `None` for free-format streams
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
}

impl FrameHeader {
    /// Parse a header, or `None` if the bytes are not a valid sync + header
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0b11 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };
        let layer = match (bytes[1] >> 1) & 0b11 {
            1 => Layer::Layer3,
            2 => Layer::Layer2,
            3 => Layer::Layer1,
            _ => return None,
        };
        let has_crc = bytes[1] & 1 == 0;

        let bitrate_index = (bytes[2] >> 4) as usize;
        let rate_index = ((bytes[2] >> 2) & 0b11) as usize;
        if bitrate_index == 15 || rate_index == 3 {
            return None;
        }

        let table = match (version, layer) {
            (MpegVersion::Mpeg1, Layer::Layer1) => &BITRATES_V1_L1,
            (MpegVersion::Mpeg1, Layer::Layer2) => &BITRATES_V1_L2,
            (MpegVersion::Mpeg1, Layer::Layer3) => &BITRATES_V1_L3,
            (_, Layer::Layer1) => &BITRATES_V2_L1,
            (_, _) => &BITRATES_V2_L23,
        };
        let bitrate_kbps = match table[bitrate_index] {
            0 => None,
            kbps => Some(kbps),
        };

        let sample_rate = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES_V1[rate_index],
            MpegVersion::Mpeg2 => SAMPLE_RATES_V2[rate_index],
            MpegVersion::Mpeg25 => SAMPLE_RATES_V25[rate_index],
        };

        Some(Self {
            version,
            layer,
            has_crc,
            bitrate_kbps,
            sample_rate,
            padding: (bytes[2] >> 1) & 1 == 1,
            channel_mode: ChannelMode::from_bits(bytes[3] >> 6),
        })
    }

    /// Samples per channel produced by one frame
    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (Layer::Layer1, _) => 384,
            (Layer::Layer2, _) => 1152,
            (Layer::Layer3, MpegVersion::Mpeg1) => 1152,
            (Layer::Layer3, _) => 576,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channel_mode.channel_count()
    }

    /// Total frame length in bytes, `None` for free-format frames
    pub fn frame_len(&self) -> Option<usize> {
        self.bitrate_kbps
            .map(|kbps| frame_len_for(self.layer, self.samples_per_frame(), kbps, self.sample_rate, self.padding))
    }

    /// Whether `other` could be the next frame of the same stream
    pub fn same_stream(&self, other: &FrameHeader) -> bool {
        self.version == other.version
            && self.layer == other.layer
            && self.sample_rate == other.sample_rate
            && self.bitrate_kbps.is_none() == other.bitrate_kbps.is_none()
    }

    /// Size of the Layer III side information block
    pub fn side_info_len(&self) -> usize {
        match (self.version, self.channel_mode) {
            (MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, ChannelMode::Mono) => 9,
            (_, _) => 17,
        }
    }

    /// Offset of the side information from the start of the frame
    pub fn side_info_offset(&self) -> usize {
        HEADER_LEN + if self.has_crc { CRC_LEN } else { 0 }
    }

    /// Bytes of the frame left for main data once header, CRC and side info are taken
    pub fn main_data_len(&self, frame_len: usize) -> usize {
        frame_len.saturating_sub(self.side_info_offset() + self.side_info_len())
    }

    /// Largest `main_data_begin` the bit reservoir can address
    pub fn max_reservoir(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 511,
            _ => 255,
        }
    }

    /// Layer III `main_data_begin`, read from the side information of `frame`
    pub fn main_data_begin(&self, frame: &[u8]) -> Option<usize> {
        if self.layer != Layer::Layer3 {
            return None;
        }
        let offset = self.side_info_offset();
        match self.version {
            MpegVersion::Mpeg1 => {
                let hi = *frame.get(offset)? as usize;
                let lo = *frame.get(offset + 1)? as usize;
                Some((hi << 1) | (lo >> 7))
            }
            _ => frame.get(offset).map(|b| *b as usize),
        }
    }
}

fn frame_len_for(layer: Layer, samples: u32, kbps: u32, sample_rate: u32, padding: bool) -> usize {
    let bits_per_second = kbps as u64 * 1000;
    match layer {
        Layer::Layer1 => ((12 * bits_per_second / sample_rate as u64) as usize + padding as usize) * 4,
        _ => {
            let slot_bytes = samples as u64 / 8;
            (slot_bytes * bits_per_second / sample_rate as u64) as usize + padding as usize
        }
    }
}

/// Largest frame a stream with this header's version/layer/rate can contain
///
/// Used as the frame-size upper bound (Δ) for sources without a container
/// header.
pub fn max_frame_len(header: &FrameHeader) -> usize {
    let top_kbps = match (header.version, header.layer) {
        (MpegVersion::Mpeg1, Layer::Layer1) => BITRATES_V1_L1[14],
        (MpegVersion::Mpeg1, Layer::Layer2) => BITRATES_V1_L2[14],
        (MpegVersion::Mpeg1, Layer::Layer3) => BITRATES_V1_L3[14],
        (_, Layer::Layer1) => BITRATES_V2_L1[14],
        (_, _) => BITRATES_V2_L23[14],
    };
    frame_len_for(header.layer, header.samples_per_frame(), top_kbps, header.sample_rate, true)
}

/// Find the first valid frame header in `bytes`
///
/// Returns the offset of the sync word and the parsed header.
pub fn find_sync(bytes: &[u8]) -> Option<(usize, FrameHeader)> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    (0..=bytes.len() - HEADER_LEN).find_map(|pos| {
        if bytes[pos] != 0xFF {
            return None;
        }
        FrameHeader::parse(&bytes[pos..]).map(|header| (pos, header))
    })
}

/// Find the next header of the same stream after a free-format frame
///
/// The free-format frame length is the distance to that header.
pub fn find_next_in_stream(bytes: &[u8], first: &FrameHeader) -> Option<usize> {
    let mut pos = HEADER_LEN;
    while let Some((offset, header)) = find_sync(&bytes[pos.min(bytes.len())..]) {
        let candidate = pos + offset;
        if first.same_stream(&header) {
            return Some(candidate);
        }
        pos = candidate + 1;
    }
    None
}

/// Skip an ID3v2 tag at the start of `bytes`, returning its total size
pub fn id3v2_len(bytes: &[u8]) -> usize {
    if bytes.len() < 10 || &bytes[0..3] != b"ID3" {
        return 0;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b & 0x7F) as usize);
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    10 + size + footer
}
