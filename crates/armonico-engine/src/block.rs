//! Planar multichannel output accumulator.
//!
//! Voices *add* into an [`AudioBlock`]; they never overwrite, so any number
//! of voices (and any outboard processing the host already did) can share
//! one block per callback.

use armonico_core::NUM_CHANNELS;

/// A planar, externally owned accumulator for one host callback's worth of
/// audio.
pub struct AudioBlock {
    channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    /// Creates a zeroed block with the given channel count and frame count.
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; num_frames]).collect(),
        }
    }

    /// Creates a zeroed block with the engine's native channel count.
    pub fn stereo(num_frames: usize) -> Self {
        Self::new(NUM_CHANNELS, num_frames)
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Read access to one channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    /// Mutable access to one channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    /// Adds `value` into the sample at (`channel`, `frame`).
    #[inline]
    pub fn add_sample(&mut self, channel: usize, frame: usize, value: f32) {
        self.channels[channel][frame] += value;
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0f32, |peak, &sample| peak.max(sample.abs()))
    }

    /// Interleaves the block into `out`, which must hold
    /// `num_channels() * num_frames()` samples.
    ///
    /// # Panics
    ///
    /// Panics if `out` has the wrong length.
    pub fn write_interleaved(&self, out: &mut [f32]) {
        let channels = self.num_channels();
        assert_eq!(out.len(), channels * self.num_frames());
        for (frame, out) in out.chunks_exact_mut(channels).enumerate() {
            for (ch, slot) in out.iter_mut().enumerate() {
                *slot = self.channels[ch][frame];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_block_is_zeroed() {
        let block = AudioBlock::new(2, 64);
        assert_eq!(block.num_channels(), 2);
        assert_eq!(block.num_frames(), 64);
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
        assert_eq!(block.peak(), 0.0);
    }

    #[test]
    fn add_sample_accumulates() {
        let mut block = AudioBlock::new(2, 4);
        block.add_sample(0, 1, 0.25);
        block.add_sample(0, 1, 0.25);
        block.add_sample(1, 3, -1.0);
        assert_eq!(block.channel(0)[1], 0.5);
        assert_eq!(block.channel(1)[3], -1.0);
        assert_eq!(block.peak(), 1.0);
    }

    #[test]
    fn clear_zeroes_all_channels() {
        let mut block = AudioBlock::new(2, 4);
        block.add_sample(0, 0, 1.0);
        block.add_sample(1, 2, 1.0);
        block.clear();
        assert_eq!(block.peak(), 0.0);
    }

    #[test]
    fn interleave_round_trip() {
        let mut block = AudioBlock::new(2, 3);
        for frame in 0..3 {
            block.add_sample(0, frame, frame as f32);
            block.add_sample(1, frame, -(frame as f32));
        }
        let mut out = vec![0.0; 6];
        block.write_interleaved(&mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0, -1.0, 2.0, -2.0]);
    }
}
