//! Track sources: tagged container or raw MPEG audio
//!
//! Tagged container layout (all little-endian):
//!
//! ```text
//!   0      4            8      9        10       12
//!   ├──────┼────────────┼──────┼────────┼────────┼──────── ...
//!   │ SMP3 │ sample rate│ mode │ bitrate│   Δ    │ raw MPEG frames
//!   └──────┴────────────┴──────┴────────┴────────┴──────── ...
//! ```
//!
//! The bitrate byte is `kbps / 8` for constant-bitrate tracks and `0` for
//! variable bitrate. Anything without the tag is probed as a plain `.mp3`
//! (an ID3v2 tag at the front and an ID3v1 tag at the back are skipped).

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::decode::header::{find_sync, id3v2_len, max_frame_len, FrameHeader};
use crate::decode::ChannelMode;
use crate::stream::error::{SupplyError, SupplyResult, TrackFormatError};

/// Format tag at the start of a tagged track
pub const TRACK_TAG: [u8; 4] = *b"SMP3";

/// Size of the tagged container header
pub const TRACK_HEADER_LEN: usize = 12;

/// Bytes read from the front of a source while probing its format
const PROBE_LEN: usize = 64 * 1024;

const ID3V1_LEN: u64 = 128;

const VALID_SAMPLE_RATES: [u32; 9] = [8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000];

/// Byte source a track can be streamed from
pub trait TrackReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> TrackReader for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitrate {
    Constant { kbps: u32 },
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Tagged,
    RawMpeg,
}

/// Stream parameters read when a track is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub container: Container,
    pub sample_rate: u32,
    pub channel_mode: ChannelMode,
    pub bitrate: Bitrate,
    /// Upper bound on the size of one frame (Δ)
    pub delta: usize,
    /// Offset of the first frame byte in the source
    pub data_offset: u64,
    /// Number of frame bytes
    pub data_len: u64,
}

impl TrackInfo {
    pub fn channels(&self) -> u16 {
        self.channel_mode.channel_count()
    }

    /// Byte offset into the frame data for a playback position
    ///
    /// Only constant-bitrate tracks can be positioned without an index.
    pub fn byte_offset_for_ms(&self, position_ms: u64) -> Option<u64> {
        match self.bitrate {
            Bitrate::Constant { kbps } => {
                // kbps * 1000 / 8 bytes per second
                let offset = position_ms * kbps as u64 / 8;
                Some(offset.min(self.data_len))
            }
            Bitrate::Variable => None,
        }
    }

    /// Playing time, if the bitrate is constant
    pub fn duration_ms(&self) -> Option<u64> {
        match self.bitrate {
            Bitrate::Constant { kbps } if kbps > 0 => Some(self.data_len * 8 / kbps as u64),
            _ => None,
        }
    }
}

/// An opened track: its reader and the parameters from its header
pub struct TrackSource {
    name: String,
    reader: Box<dyn TrackReader>,
    info: TrackInfo,
    /// Read position relative to `info.data_offset`
    position: u64,
}

impl std::fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSource")
            .field("name", &self.name)
            .field("info", &self.info)
            .field("position", &self.position)
            .finish()
    }
}

impl TrackSource {
    /// Open a track file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackFormatError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(BufReader::new(file), name)
    }

    /// Open a track from any seekable reader
    pub fn from_reader(
        mut reader: impl TrackReader + 'static,
        name: impl Into<String>,
    ) -> Result<Self, TrackFormatError> {
        let name = name.into();
        let total_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut probe = Vec::with_capacity(PROBE_LEN.min(total_len as usize));
        (&mut reader).take(PROBE_LEN as u64).read_to_end(&mut probe)?;

        let info = if probe.starts_with(&TRACK_TAG) {
            parse_tagged(&probe, total_len)?
        } else {
            let mut info = parse_raw(&probe, total_len)?;
            if has_id3v1(&mut reader, total_len)? {
                info.data_len = info.data_len.saturating_sub(ID3V1_LEN);
            }
            info
        };

        reader.seek(SeekFrom::Start(info.data_offset))?;
        log::info!(
            "TrackSource::from_reader: '{}' {:?} {}Hz {:?} {:?} delta={} data={} bytes",
            name,
            info.container,
            info.sample_rate,
            info.channel_mode,
            info.bitrate,
            info.delta,
            info.data_len
        );

        Ok(Self {
            name,
            reader: Box::new(reader),
            info,
            position: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    /// Frame bytes not yet read
    pub fn remaining(&self) -> u64 {
        self.info.data_len.saturating_sub(self.position)
    }

    /// Position the reader `offset` bytes into the frame data
    pub fn seek_data(&mut self, offset: u64) -> SupplyResult<()> {
        let offset = offset.min(self.info.data_len);
        let absolute = self.info.data_offset + offset;
        self.reader
            .seek(SeekFrom::Start(absolute))
            .map_err(|source| SupplyError::Seek {
                offset: absolute,
                source,
            })?;
        self.position = offset;
        Ok(())
    }

    pub fn rewind(&mut self) -> SupplyResult<()> {
        self.seek_data(0)
    }

    /// Read frame bytes, never past the end of the frame data
    pub fn read_data(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = self.remaining().min(buf.len() as u64) as usize;
        if limit == 0 {
            return Ok(0);
        }
        let n = self.reader.read(&mut buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }
}

fn parse_tagged(probe: &[u8], total_len: u64) -> Result<TrackInfo, TrackFormatError> {
    if probe.len() < TRACK_HEADER_LEN {
        return Err(TrackFormatError::TruncatedHeader {
            len: probe.len(),
            expected: TRACK_HEADER_LEN,
        });
    }

    let sample_rate = u32::from_le_bytes([probe[4], probe[5], probe[6], probe[7]]);
    if !VALID_SAMPLE_RATES.contains(&sample_rate) {
        return Err(TrackFormatError::UnsupportedSampleRate(sample_rate));
    }
    let mode = probe[8];
    if mode > 3 {
        return Err(TrackFormatError::InvalidChannelMode(mode));
    }
    let bitrate = match probe[9] {
        0 => Bitrate::Variable,
        units => Bitrate::Constant {
            kbps: units as u32 * 8,
        },
    };
    let delta = u16::from_le_bytes([probe[10], probe[11]]) as usize;
    if delta == 0 {
        return Err(TrackFormatError::ZeroDelta);
    }

    Ok(TrackInfo {
        container: Container::Tagged,
        sample_rate,
        channel_mode: ChannelMode::from_bits(mode),
        bitrate,
        delta,
        data_offset: TRACK_HEADER_LEN as u64,
        data_len: total_len - TRACK_HEADER_LEN as u64,
    })
}

fn parse_raw(probe: &[u8], total_len: u64) -> Result<TrackInfo, TrackFormatError> {
    let skip = id3v2_len(probe);
    let search = probe.get(skip..).unwrap_or(&[]);
    let (pos, header): (usize, FrameHeader) = find_sync(search).ok_or(TrackFormatError::NoFrameFound {
        searched: probe.len(),
    })?;

    let data_offset = (skip + pos) as u64;
    Ok(TrackInfo {
        container: Container::RawMpeg,
        sample_rate: header.sample_rate,
        channel_mode: header.channel_mode,
        bitrate: match header.bitrate_kbps {
            Some(kbps) => Bitrate::Constant { kbps },
            None => Bitrate::Variable,
        },
        delta: max_frame_len(&header),
        data_offset,
        data_len: total_len.saturating_sub(data_offset),
    })
}

fn has_id3v1(reader: &mut impl TrackReader, total_len: u64) -> io::Result<bool> {
    if total_len < ID3V1_LEN {
        return Ok(false);
    }
    reader.seek(SeekFrom::Start(total_len - ID3V1_LEN))?;
    let mut tag = [0u8; 3];
    reader.read_exact(&mut tag)?;
    Ok(&tag == b"TAG")
}
