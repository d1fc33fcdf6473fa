//! Encoded double-buffer manager (sound side)
//!
//! Keeps a private contiguous window of `2H` bytes. Published halves are
//! copied into it; the read cursor walks through it frame by frame.
//!
//! ```text
//!            cursor ≥ H                       cursor > 2H−Δ
//!   Reading(First) ─────────► Reading(Second) ──────────────► Reading(First)
//!        │  refill First requested      │  tail moved to [cursor−(2H−Δ), Δ)
//!        │                              │  refill Second requested
//!        ▼ First is final               ▼ Second is final
//!   Draining(First)                Draining(Second)
//!        │  cursor ≥ H / no frame       │  cursor ≥ 2H / no frame
//!        └──────────► Completed ◄───────┘
//! ```
//!
//! A decode that fails only because the next half has not arrived yet is an
//! underrun, not a fault: the same frame is retried on the next service.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::decode::{DecodeEngine, DecodeError, FrameDecoder, FrameReport};
use crate::types::Half;

use super::buffer::{EncodedDoubleBuffer, StreamGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Reading(Half),
    Draining(Half),
    Completed,
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStep {
    Decoded(FrameReport),
    /// Waiting for a half to be refilled
    Underrun,
    /// The final half has been consumed
    Completed,
}

/// Per-stream view of the shared buffer
struct ActiveStream {
    buffer: Arc<EncodedDoubleBuffer>,
    geometry: StreamGeometry,
    session: u32,
}

pub struct StreamManager {
    stream: Option<ActiveStream>,
    window: Vec<u8>,
    cursor: usize,
    state: ManagerState,
    /// Whether each half's current contents have been copied into the window
    acquired: [bool; 2],
    /// Half holding the last bytes of the track, once known
    final_half: Option<Half>,
    /// The main side reported that the track has been read to its end
    eos_signaled: bool,
    refill_requests: VecDeque<Half>,
    relocations: u64,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            stream: None,
            window: Vec::new(),
            cursor: 0,
            state: ManagerState::Idle,
            acquired: [false; 2],
            final_half: None,
            eos_signaled: false,
            refill_requests: VecDeque::with_capacity(2),
            relocations: 0,
        }
    }

    /// Attach to a freshly published stream
    pub fn start(
        &mut self,
        buffer: Arc<EncodedDoubleBuffer>,
        geometry: StreamGeometry,
        start_half: Half,
        session: u32,
    ) {
        self.window.clear();
        self.window.resize(geometry.window_len(), 0);
        self.cursor = geometry.start_cursor(start_half);
        self.state = ManagerState::Reading(start_half);
        self.acquired = [false; 2];
        self.final_half = None;
        self.eos_signaled = false;
        self.refill_requests.clear();
        self.relocations = 0;
        self.stream = Some(ActiveStream {
            buffer,
            geometry,
            session,
        });
        log::debug!(
            "StreamManager::start: session {} from {} half, H={} delta={}",
            session,
            start_half,
            geometry.half_size(),
            geometry.delta()
        );
        self.poll_halves();
    }

    /// Detach from the stream
    pub fn stop(&mut self) {
        self.stream = None;
        self.state = ManagerState::Idle;
        self.refill_requests.clear();
    }

    /// The main side has read the track to its end
    pub fn signal_end_of_stream(&mut self) {
        self.eos_signaled = true;
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn relocations(&self) -> u64 {
        self.relocations
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ManagerState::Reading(_) | ManagerState::Draining(_))
    }

    /// Next half the main side should refill
    pub fn next_refill_request(&mut self) -> Option<Half> {
        self.refill_requests.pop_front()
    }

    /// Copy any newly published halves into the window
    pub fn poll_halves(&mut self) {
        let Some(stream) = &self.stream else {
            return;
        };

        for half in Half::BOTH {
            if self.acquired[half.index()] {
                continue;
            }
            let dest = &mut self.window[stream.geometry.write_window(half)];
            let range = stream.geometry.slot_range(half);
            if let Some(end_of_stream) = stream.buffer.acquire(half, stream.session, range, dest) {
                self.acquired[half.index()] = true;
                if end_of_stream {
                    self.final_half = Some(half);
                }
                log::trace!("poll_halves: acquired {} half (eos={})", half, end_of_stream);
            }
        }

        if let ManagerState::Reading(half) = self.state {
            if self.final_half == Some(half) {
                self.state = ManagerState::Draining(half);
            }
        }
    }

    /// Last window offset that may be read right now
    fn readable_end(&self, geometry: &StreamGeometry) -> usize {
        let h = geometry.half_size();
        let [first, second] = self.acquired;
        match self.state {
            ManagerState::Reading(Half::First) if !first => geometry.delta(),
            ManagerState::Reading(Half::First) if second => geometry.window_len(),
            ManagerState::Reading(Half::First) => h,
            ManagerState::Reading(Half::Second) if !second => h,
            ManagerState::Reading(Half::Second) => geometry.window_len(),
            ManagerState::Draining(Half::First) => h,
            ManagerState::Draining(Half::Second) => geometry.window_len(),
            ManagerState::Idle | ManagerState::Completed => self.cursor,
        }
    }

    /// Decode the frame at the read cursor
    pub fn decode_next<D: FrameDecoder>(
        &mut self,
        engine: &mut DecodeEngine<D>,
    ) -> Result<StreamStep, DecodeError> {
        self.poll_halves();
        let Some(geometry) = self.stream.as_ref().map(|s| s.geometry) else {
            return Ok(StreamStep::Completed);
        };

        match self.state {
            ManagerState::Idle | ManagerState::Completed => return Ok(StreamStep::Completed),
            ManagerState::Draining(_) => {}
            ManagerState::Reading(_) => self.transition(&geometry),
        }

        let end = self.readable_end(&geometry);
        if let ManagerState::Draining(_) = self.state {
            if self.cursor >= end {
                return Ok(self.complete());
            }
        }
        if self.cursor >= end {
            return Ok(StreamStep::Underrun);
        }

        match engine.decode_one_frame(&self.window[self.cursor..end]) {
            Ok(report) => {
                self.cursor += report.bytes_consumed;
                if let ManagerState::Draining(half) = self.state {
                    let far_end = match half {
                        Half::First => geometry.half_size(),
                        Half::Second => geometry.window_len(),
                    };
                    if self.cursor >= far_end {
                        self.state = ManagerState::Completed;
                    }
                } else {
                    self.transition(&geometry);
                }
                Ok(StreamStep::Decoded(report))
            }
            Err(e) if e.is_boundary() => match self.state {
                ManagerState::Draining(_) => Ok(self.complete()),
                _ if end < geometry.window_len() => Ok(StreamStep::Underrun),
                _ => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    fn complete(&mut self) -> StreamStep {
        log::debug!("StreamManager: stream completed at cursor {}", self.cursor);
        self.state = ManagerState::Completed;
        StreamStep::Completed
    }

    /// Half crossing and relocation after the cursor moved
    fn transition(&mut self, geometry: &StreamGeometry) {
        if self.state == ManagerState::Reading(Half::First) && self.cursor >= geometry.half_size() {
            self.vacate(Half::First);
            self.state = if self.final_half == Some(Half::Second) {
                ManagerState::Draining(Half::Second)
            } else {
                ManagerState::Reading(Half::Second)
            };
        }
        // A frame crossing into a small second half may already end past the boundary
        if self.state == ManagerState::Reading(Half::Second) && self.cursor > geometry.safe_boundary() {
            self.relocate(geometry);
        }
    }

    /// Move the unread tail of the second half into the relocation zone
    fn relocate(&mut self, geometry: &StreamGeometry) {
        let end = geometry.window_len();
        let dest = self.cursor - geometry.safe_boundary();
        self.window.copy_within(self.cursor..end, dest);
        log::trace!(
            "relocate: {} byte tail {} -> {}",
            end - self.cursor,
            self.cursor,
            dest
        );
        self.cursor = dest;
        self.relocations += 1;

        self.vacate(Half::Second);
        self.state = if self.final_half == Some(Half::First) {
            ManagerState::Draining(Half::First)
        } else {
            ManagerState::Reading(Half::First)
        };
    }

    /// Give `half` back to the main side and ask for new bytes
    fn vacate(&mut self, half: Half) {
        self.acquired[half.index()] = false;
        if self.final_half == Some(half) {
            self.final_half = None;
        }
        let Some(stream) = &self.stream else {
            return;
        };
        stream.buffer.retract(half, stream.session);
        if !self.eos_signaled {
            self.refill_requests.push_back(half);
        }
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}
