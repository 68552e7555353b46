//! Non-interleaved sample storage passed through every render call.

/// A buffer list: one `Vec<f32>` per channel, all the same length.
///
/// This is the unit of data exchanged between nodes, the ring buffer and the
/// tap. Samples are nominally in `[-1.0, 1.0]`; they may exceed that range
/// when an upstream unit overloads its output.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferList {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl BufferList {
    /// Allocate a zeroed buffer list of `channels` x `frames`.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn iter_channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(|c| c.as_slice())
    }

    pub fn iter_channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(|c| c.as_mut_slice())
    }

    /// Zero every sample.
    pub fn silence(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Change the frame count, reallocating channel storage. Existing
    /// samples are not preserved.
    pub fn resize_frames(&mut self, frames: usize) {
        if frames == self.frames {
            return;
        }
        for channel in &mut self.channels {
            channel.clear();
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Copy samples from `other`, channel by channel, up to the smaller of
    /// the two shapes. Channels or frames this buffer has beyond `other`'s
    /// are left untouched.
    pub fn copy_from(&mut self, other: &BufferList) {
        let frames = self.frames.min(other.frames);
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst[..frames].copy_from_slice(&src[..frames]);
        }
    }

    /// Add `other` into this buffer with a per-channel gain, used by summing
    /// mixers. Shapes are clipped to the smaller buffer.
    pub fn accumulate(&mut self, other: &BufferList, gains: &[f32]) {
        let frames = self.frames.min(other.frames);
        for (c, (dst, src)) in self.channels.iter_mut().zip(&other.channels).enumerate() {
            let gain = gains.get(c).copied().unwrap_or(1.0);
            for i in 0..frames {
                dst[i] += src[i] * gain;
            }
        }
    }

    /// Peak absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
