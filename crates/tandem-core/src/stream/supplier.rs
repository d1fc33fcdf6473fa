//! Stream supplier (main side)
//!
//! Owns the shared buffer and fills one half per refill request straight
//! from the track reader.

use std::io;
use std::sync::Arc;

use crate::types::Half;

use super::buffer::{EncodedDoubleBuffer, StreamGeometry, StreamSettings};
use super::error::{SupplyError, SupplyResult};
use super::source::TrackSource;

/// Result of filling one half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillOutcome {
    pub bytes_read: usize,
    /// The half holds the last bytes of the track
    pub end_of_stream: bool,
}

pub struct StreamSupplier {
    settings: StreamSettings,
}

impl StreamSupplier {
    pub fn new(half_size: usize) -> Self {
        log::info!("StreamSupplier::new: allocating 2 x {} byte halves", half_size);
        Self {
            settings: StreamSettings::allocate(half_size),
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &Arc<EncodedDoubleBuffer> {
        self.settings.buffer()
    }

    /// Start a new session for the next Play
    pub fn begin_session(&self) -> u32 {
        self.buffer().begin_session()
    }

    /// Fill `half` from `source` and publish it
    ///
    /// A short read zero-fills the rest of the window. The half is published
    /// before this returns, so the caller may acknowledge immediately. On a
    /// read error nothing is published.
    pub fn refill_half(
        &self,
        half: Half,
        session: u32,
        geometry: &StreamGeometry,
        source: &mut TrackSource,
    ) -> SupplyResult<RefillOutcome> {
        let buffer = self.buffer();
        let filled = {
            let mut slot = buffer.lock_for_write(half, session);
            let window = &mut slot[geometry.slot_range(half)];

            let mut filled = 0;
            while filled < window.len() {
                match source.read_data(&mut window[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(source) => return Err(SupplyError::Read { half, source }),
                }
            }
            window[filled..].fill(0);
            filled
        };

        let end_of_stream = source.remaining() == 0;
        buffer.publish(half, session, end_of_stream);
        log::debug!(
            "refill_half: {} half <- {} bytes (session {}, eos={})",
            half,
            filled,
            session,
            end_of_stream
        );

        Ok(RefillOutcome {
            bytes_read: filled,
            end_of_stream,
        })
    }
}
