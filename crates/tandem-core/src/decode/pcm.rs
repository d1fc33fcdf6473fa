//! Double-buffered PCM output
//!
//! The engine decodes into one half while the output channel may still be
//! reading the other. Each decode toggles the active half.

use crate::types::{Half, PcmFormat, MAX_SAMPLES_PER_FRAME};

pub struct PcmDoubleBuffer {
    halves: [Box<[i16]>; 2],
    filled: [usize; 2],
    active: Half,
}

impl PcmDoubleBuffer {
    pub fn new() -> Self {
        Self {
            halves: [
                vec![0i16; MAX_SAMPLES_PER_FRAME].into_boxed_slice(),
                vec![0i16; MAX_SAMPLES_PER_FRAME].into_boxed_slice(),
            ],
            filled: [0; 2],
            active: Half::First,
        }
    }

    /// Half the next frame will be decoded into
    pub fn active(&self) -> Half {
        self.active
    }

    /// Writable storage of the active half
    pub fn active_mut(&mut self) -> &mut [i16] {
        &mut self.halves[self.active.index()]
    }

    /// Mark `samples` interleaved samples as written to the active half and flip
    ///
    /// Returns the half that was just completed.
    pub fn commit(&mut self, samples: usize) -> Half {
        let done = self.active;
        self.filled[done.index()] = samples.min(MAX_SAMPLES_PER_FRAME);
        self.active = done.other();
        done
    }

    /// Decoded samples held by `half`
    pub fn samples(&self, half: Half) -> &[i16] {
        &self.halves[half.index()][..self.filled[half.index()]]
    }

    /// Samples of the most recently completed frame
    pub fn latest(&self) -> &[i16] {
        self.samples(self.active.other())
    }

    pub fn clear(&mut self) {
        self.filled = [0; 2];
        self.active = Half::First;
    }
}

impl Default for PcmDoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One decoded frame as seen by the output side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub format: PcmFormat,
    /// Samples per channel
    pub frame_len: u32,
    /// Interleaved samples written
    pub output_samples: usize,
    /// Encoded bytes consumed, including any skipped junk before the sync word
    pub bytes_consumed: usize,
    /// PCM half holding the samples
    pub pcm_half: Half,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_toggles_halves() {
        let mut pcm = PcmDoubleBuffer::new();
        assert_eq!(pcm.active(), Half::First);

        pcm.active_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pcm.commit(4), Half::First);
        assert_eq!(pcm.active(), Half::Second);
        assert_eq!(pcm.latest(), &[1, 2, 3, 4]);

        pcm.active_mut()[..2].copy_from_slice(&[9, 9]);
        pcm.commit(2);
        assert_eq!(pcm.latest(), &[9, 9]);
        // the first half is untouched until the next decode
        assert_eq!(pcm.samples(Half::First), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut pcm = PcmDoubleBuffer::new();
        pcm.commit(10);
        pcm.clear();
        assert_eq!(pcm.active(), Half::First);
        assert!(pcm.samples(Half::First).is_empty());
    }
}
