//! Shared encoded double buffer
//!
//! ```text
//!   window offsets     0        Δ                 H                  2H−Δ    2H
//!                      ├────────┼─────────────────┼────────────────────┼──────┤
//!   half A slot        │ reloc. │ write window A  │                           │
//!   half B slot                                   │ write window B            │
//!                      └─ written by the sound side only (relocated tail)
//! ```
//!
//! The main side writes a half's window into that half's slot and then
//! publishes it. The sound side copies a published half into its own
//! contiguous window and retracts it before asking for a refill, so the main
//! side never overwrites bytes the sound side has not consumed and the sound
//! side never reads a half while it is being written.
//!
//! Each slot carries a state word `[.. eos | published | session:32]`.
//! Publishing stores it with `Release`; acquiring loads it with `Acquire`,
//! copies under `try_lock`, and re-checks the word so a half that was
//! rewritten during the copy is never used.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::PackedGeometry;
use crate::types::Half;

use super::error::GeometryError;

const PUBLISHED: u64 = 1 << 32;
const END_OF_STREAM: u64 = 1 << 33;
const SESSION_MASK: u64 = 0xFFFF_FFFF;

#[inline]
fn pack_state(session: u32, published: bool, end_of_stream: bool) -> u64 {
    session as u64
        | if published { PUBLISHED } else { 0 }
        | if end_of_stream { END_OF_STREAM } else { 0 }
}

#[inline]
fn state_session(state: u64) -> u32 {
    (state & SESSION_MASK) as u32
}

/// Half size and frame-size upper bound (Δ) of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    half_size: usize,
    delta: usize,
    packed: PackedGeometry,
}

impl StreamGeometry {
    pub fn new(half_size: usize, delta: usize) -> Result<Self, GeometryError> {
        if delta == 0 || delta >= half_size {
            return Err(GeometryError::DeltaTooLarge { delta, half_size });
        }
        let packed = PackedGeometry::pack(half_size, delta)
            .ok_or(GeometryError::Unpackable { half_size, delta })?;
        Ok(Self {
            half_size,
            delta,
            packed,
        })
    }

    pub fn from_packed(packed: PackedGeometry) -> Result<Self, GeometryError> {
        Self::new(packed.half_size(), packed.delta())
    }

    /// The geometry as carried by a Play message
    pub fn packed(&self) -> PackedGeometry {
        self.packed
    }

    pub fn half_size(&self) -> usize {
        self.half_size
    }

    pub fn delta(&self) -> usize {
        self.delta
    }

    /// Size of the contiguous window (both halves)
    pub fn window_len(&self) -> usize {
        self.half_size * 2
    }

    /// Cursor position past which relocation is required (`2H − Δ`)
    pub fn safe_boundary(&self) -> usize {
        self.window_len() - self.delta
    }

    /// Window offsets the main side fills for `half`
    pub fn write_window(&self, half: Half) -> Range<usize> {
        match half {
            Half::First => self.delta..self.half_size,
            Half::Second => self.half_size..self.window_len(),
        }
    }

    /// Offsets within the half's slot that correspond to its write window
    pub fn slot_range(&self, half: Half) -> Range<usize> {
        match half {
            Half::First => self.delta..self.half_size,
            Half::Second => 0..self.half_size,
        }
    }

    /// Bytes the main side reads from the track for one fill of `half`
    pub fn fill_len(&self, half: Half) -> usize {
        self.write_window(half).len()
    }

    /// Where the read cursor starts when playback begins in `half`
    pub fn start_cursor(&self, half: Half) -> usize {
        self.write_window(half).start
    }
}

#[derive(Debug)]
struct HalfSlot {
    data: Mutex<Box<[u8]>>,
    state: AtomicU64,
}

impl HalfSlot {
    fn new(len: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; len].into_boxed_slice()),
            state: AtomicU64::new(0),
        }
    }
}

/// Encoded bytes shared between the stream supplier and the sound side
///
/// Allocated once when streaming is enabled and reused across tracks. The
/// half size is fixed for the buffer's lifetime; Δ is per track.
#[derive(Debug)]
pub struct EncodedDoubleBuffer {
    half_size: usize,
    slots: [HalfSlot; 2],
    session: AtomicU32,
}

impl EncodedDoubleBuffer {
    pub fn new(half_size: usize) -> Self {
        Self {
            half_size,
            slots: [HalfSlot::new(half_size), HalfSlot::new(half_size)],
            session: AtomicU32::new(0),
        }
    }

    pub fn half_size(&self) -> usize {
        self.half_size
    }

    /// Current session number
    pub fn session(&self) -> u32 {
        self.session.load(Ordering::Acquire)
    }

    /// Start a new session: both halves become unpublished for everyone
    ///
    /// Bytes published under an older session are never acquired again.
    pub fn begin_session(&self) -> u32 {
        let session = self.session.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        for slot in &self.slots {
            slot.state.store(pack_state(session, false, false), Ordering::Release);
        }
        session
    }

    /// Lock a half's slot for writing (main side)
    ///
    /// The half is marked unpublished for `session` before the lock is handed
    /// out.
    pub(crate) fn lock_for_write(&self, half: Half, session: u32) -> MutexGuard<'_, Box<[u8]>> {
        let slot = &self.slots[half.index()];
        slot.state
            .store(pack_state(session, false, false), Ordering::Release);
        match slot.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make a written half visible to the sound side
    pub(crate) fn publish(&self, half: Half, session: u32, end_of_stream: bool) {
        self.slots[half.index()]
            .state
            .store(pack_state(session, true, end_of_stream), Ordering::Release);
    }

    /// Whether `half` is published for `session`
    pub fn is_published(&self, half: Half, session: u32) -> bool {
        let state = self.slots[half.index()].state.load(Ordering::Acquire);
        state & PUBLISHED != 0 && state_session(state) == session
    }

    /// Copy a published half into `dest` (sound side)
    ///
    /// `range` selects the bytes within the half's slot. Returns the
    /// end-of-stream flag of the half, or `None` if it is not published for
    /// `session`, is being written, or changed during the copy.
    pub fn acquire(&self, half: Half, session: u32, range: Range<usize>, dest: &mut [u8]) -> Option<bool> {
        let slot = &self.slots[half.index()];
        let before = slot.state.load(Ordering::Acquire);
        if before & PUBLISHED == 0 || state_session(before) != session {
            return None;
        }

        {
            let data = slot.data.try_lock().ok()?;
            let src = data.get(range)?;
            if src.len() != dest.len() {
                return None;
            }
            dest.copy_from_slice(src);
        }

        let after = slot.state.load(Ordering::Acquire);
        if after != before {
            return None;
        }
        Some(before & END_OF_STREAM != 0)
    }

    /// Withdraw a half from publication before requesting its refill (sound side)
    ///
    /// Has no effect if the half already belongs to a newer session.
    pub fn retract(&self, half: Half, session: u32) {
        let slot = &self.slots[half.index()];
        let mut current = slot.state.load(Ordering::Acquire);
        while state_session(current) == session && current & PUBLISHED != 0 {
            match slot.state.compare_exchange_weak(
                current,
                current & !PUBLISHED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Buffer handle and half size created when streaming is enabled
///
/// Immutable for the lifetime of the buffer. The owning controller keeps the
/// arena index of its current track next to it.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    buffer: Arc<EncodedDoubleBuffer>,
}

impl StreamSettings {
    pub fn allocate(half_size: usize) -> Self {
        Self {
            buffer: Arc::new(EncodedDoubleBuffer::new(half_size)),
        }
    }

    pub fn buffer(&self) -> &Arc<EncodedDoubleBuffer> {
        &self.buffer
    }

    pub fn half_size(&self) -> usize {
        self.buffer.half_size()
    }

    /// Geometry for a track with frame-size bound `delta`
    pub fn geometry(&self, delta: usize) -> Result<StreamGeometry, GeometryError> {
        StreamGeometry::new(self.half_size(), delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(buffer: &EncodedDoubleBuffer, half: Half, session: u32, fill: u8, eos: bool) {
        {
            let mut data = buffer.lock_for_write(half, session);
            data.fill(fill);
        }
        buffer.publish(half, session, eos);
    }

    #[test]
    fn test_geometry_windows() {
        let geometry = StreamGeometry::new(4096, 600).unwrap();
        assert_eq!(geometry.write_window(Half::First), 600..4096);
        assert_eq!(geometry.write_window(Half::Second), 4096..8192);
        assert_eq!(geometry.safe_boundary(), 8192 - 600);
        assert_eq!(geometry.fill_len(Half::First), 3496);
        assert_eq!(geometry.fill_len(Half::Second), 4096);
        assert_eq!(geometry.start_cursor(Half::First), 600);
    }

    #[test]
    fn test_geometry_rejects_delta_not_below_half() {
        assert!(matches!(
            StreamGeometry::new(4096, 4096),
            Err(GeometryError::DeltaTooLarge { .. })
        ));
        assert!(StreamGeometry::new(4096, 0).is_err());
        assert!(matches!(
            StreamGeometry::new(2 << 20, 600),
            Err(GeometryError::Unpackable { .. })
        ));
    }

    #[test]
    fn test_geometry_round_trips_through_message_word() {
        let geometry = StreamGeometry::new(16384, 1441).unwrap();
        assert_eq!(StreamGeometry::from_packed(geometry.packed()).unwrap(), geometry);
    }

    #[test]
    fn test_acquire_requires_publish() {
        let buffer = EncodedDoubleBuffer::new(16);
        let session = buffer.begin_session();
        let mut dest = [0u8; 16];

        assert_eq!(buffer.acquire(Half::First, session, 0..16, &mut dest), None);
        write(&buffer, Half::First, session, 7, false);
        assert_eq!(buffer.acquire(Half::First, session, 0..16, &mut dest), Some(false));
        assert!(dest.iter().all(|b| *b == 7));
    }

    #[test]
    fn test_stale_session_is_never_acquired() {
        let buffer = EncodedDoubleBuffer::new(16);
        let old = buffer.begin_session();
        write(&buffer, Half::Second, old, 1, true);

        let new = buffer.begin_session();
        let mut dest = [0u8; 16];
        assert_eq!(buffer.acquire(Half::Second, old, 0..16, &mut dest), None);
        assert_eq!(buffer.acquire(Half::Second, new, 0..16, &mut dest), None);
    }

    #[test]
    fn test_retract_only_affects_own_session() {
        let buffer = EncodedDoubleBuffer::new(16);
        let old = buffer.begin_session();
        let new = buffer.begin_session();
        write(&buffer, Half::First, new, 3, false);

        buffer.retract(Half::First, old);
        assert!(buffer.is_published(Half::First, new));

        buffer.retract(Half::First, new);
        assert!(!buffer.is_published(Half::First, new));
    }

    #[test]
    fn test_acquire_fails_while_half_is_written() {
        let buffer = EncodedDoubleBuffer::new(16);
        let session = buffer.begin_session();
        write(&buffer, Half::First, session, 2, false);

        let _guard = buffer.lock_for_write(Half::First, session);
        let mut dest = [0u8; 16];
        assert_eq!(buffer.acquire(Half::First, session, 0..16, &mut dest), None);
    }

    #[test]
    fn test_end_of_stream_flag_travels_with_half() {
        let buffer = EncodedDoubleBuffer::new(8);
        let session = buffer.begin_session();
        write(&buffer, Half::Second, session, 0, true);
        let mut dest = [0u8; 4];
        assert_eq!(buffer.acquire(Half::Second, session, 2..6, &mut dest), Some(true));
    }
}
