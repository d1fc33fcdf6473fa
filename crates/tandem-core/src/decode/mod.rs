//! MPEG audio decode engine
//!
//! Sits on the sound side. The stream manager hands it the readable bytes
//! from the read cursor; it frames one MP3 frame, decodes it through a
//! [`FrameDecoder`] into the PCM double buffer and reports how far the cursor
//! should advance.

mod decoder;
mod engine;
mod error;
pub mod header;
mod pcm;

pub use decoder::{DecodedFrame, FrameDecoder, SymphoniaFrameDecoder};
pub use engine::DecodeEngine;
pub use error::{DecodeError, DecodeResult};
pub use header::{ChannelMode, FrameHeader, Layer, MpegVersion};
pub use pcm::{FrameReport, PcmDoubleBuffer};
