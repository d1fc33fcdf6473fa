//! Loaded tracks, addressed by generational index

use std::fmt;

use crate::stream::{StreamGeometry, TrackInfo, TrackSource};
use crate::types::PlayCount;

/// Handle to a loaded track
///
/// The generation changes every time a slot is reused, so a handle to an
/// unloaded track never resolves to a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId {
    index: u32,
    generation: u32,
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}.{}", self.index, self.generation)
    }
}

/// Everything the main side keeps about one loaded track
pub struct TrackState {
    pub source: TrackSource,
    pub geometry: StreamGeometry,
    /// Plays left, including the one in progress
    pub play_count: PlayCount,
}

impl TrackState {
    pub fn new(source: TrackSource, geometry: StreamGeometry) -> Self {
        Self {
            source,
            geometry,
            play_count: PlayCount::ONCE,
        }
    }

    pub fn info(&self) -> &TrackInfo {
        self.source.info()
    }
}

struct Slot<T> {
    generation: u32,
    track: Option<T>,
}

/// Slot arena of loaded tracks
pub struct TrackSlots<T = TrackState> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for TrackSlots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> TrackSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: T) -> TrackId {
        if let Some(index) = self.slots.iter().position(|s| s.track.is_none()) {
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.track = Some(track);
            return TrackId {
                index: index as u32,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            track: Some(track),
        });
        TrackId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.track.as_ref())
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.track.as_mut())
    }

    pub fn remove(&mut self, id: TrackId) -> Option<T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.track.take())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.track.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tagged_track, FrameSpec};
    use std::io::Cursor;

    fn track() -> TrackState {
        let source =
            TrackSource::from_reader(Cursor::new(tagged_track(&FrameSpec::mpeg1_128k(), 4)), "slot")
                .unwrap();
        let geometry = StreamGeometry::new(4096, source.info().delta).unwrap();
        TrackState::new(source, geometry)
    }

    #[test]
    fn test_reused_slot_rejects_stale_id() {
        let mut slots: TrackSlots = TrackSlots::new();
        let first = slots.insert(track());
        assert!(slots.remove(first).is_some());

        let second = slots.insert(track());
        assert_ne!(first, second);
        assert!(slots.get(first).is_none());
        assert!(slots.get(second).is_some());
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_remove_twice() {
        let mut slots: TrackSlots = TrackSlots::new();
        let id = slots.insert(track());
        assert!(slots.remove(id).is_some());
        assert!(slots.remove(id).is_none());
        assert!(slots.is_empty());
    }
}
