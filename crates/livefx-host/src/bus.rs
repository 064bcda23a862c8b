//! Multi-channel audio buffers for one render quantum.
//!
//! An [`AudioBus`] owns `capacity` pre-allocated channels of
//! [`RENDER_QUANTUM`](crate::RENDER_QUANTUM) frames and an *active* channel
//! count. A node input with no inbound connections has zero active channels;
//! mixing several upstream outputs widens the bus to the widest of them.
//! Nothing here allocates after construction.

/// Fixed-capacity multi-channel block buffer.
#[derive(Debug, Clone, Default)]
pub struct AudioBus {
    channels: Vec<Vec<f32>>,
    active: usize,
}

impl AudioBus {
    /// Creates a bus with `capacity` zeroed channels of `frames` samples and no active channels.
    pub fn new(capacity: usize, frames: usize) -> Self {
        Self {
            channels: (0..capacity).map(|_| vec![0.0; frames]).collect(),
            active: 0,
        }
    }

    /// Number of channels carrying signal in the current block.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.active
    }

    /// Maximum number of channels this bus can carry.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    #[inline]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sets the active channel count (clamped to capacity) and zeroes those channels.
    pub fn reset(&mut self, active: usize) {
        self.active = active.min(self.channels.len());
        for channel in &mut self.channels[..self.active] {
            channel.fill(0.0);
        }
    }

    /// Deactivates every channel.
    pub fn clear(&mut self) {
        self.active = 0;
    }

    /// Returns an active channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        assert!(index < self.active, "channel {index} is not active");
        &self.channels[index]
    }

    /// Returns an active channel's samples mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        assert!(index < self.active, "channel {index} is not active");
        &mut self.channels[index]
    }

    /// Adds `other` into this bus, widening the active channel count if needed.
    ///
    /// Newly activated channels are zeroed before accumulation.
    pub fn accumulate_from(&mut self, other: &AudioBus) {
        let wanted = other.active.min(self.channels.len());
        if wanted > self.active {
            for channel in &mut self.channels[self.active..wanted] {
                channel.fill(0.0);
            }
            self.active = wanted;
        }
        for (dst, src) in self.channels.iter_mut().zip(&other.channels[..wanted]) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    /// Copies `other` into this bus, taking over its active channel count.
    pub fn copy_from(&mut self, other: &AudioBus) {
        self.active = other.active.min(self.channels.len());
        for (dst, src) in self.channels.iter_mut().zip(&other.channels[..self.active]) {
            dst.copy_from_slice(src);
        }
    }

    /// Averages the active channels of `frame` into one sample (0 when inactive).
    #[inline]
    pub fn mono_sample(&self, frame: usize) -> f32 {
        if self.active == 0 {
            return 0.0;
        }
        let sum: f32 = self.channels[..self.active].iter().map(|c| c[frame]).sum();
        sum / self.active as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_has_no_active_channels() {
        let bus = AudioBus::new(2, 128);
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.capacity(), 2);
        assert_eq!(bus.frames(), 128);
        assert_eq!(bus.mono_sample(0), 0.0);
    }

    #[test]
    fn accumulate_widens_and_sums() {
        let mut a = AudioBus::new(2, 4);
        a.reset(1);
        a.channel_mut(0).fill(1.0);

        let mut b = AudioBus::new(2, 4);
        b.reset(2);
        b.channel_mut(0).fill(0.5);
        b.channel_mut(1).fill(0.25);

        let mut mix = AudioBus::new(2, 4);
        mix.reset(0);
        mix.accumulate_from(&a);
        mix.accumulate_from(&b);

        assert_eq!(mix.channel_count(), 2);
        assert_eq!(mix.channel(0), &[1.5; 4]);
        assert_eq!(mix.channel(1), &[0.25; 4]);
    }

    #[test]
    fn accumulate_clamps_to_capacity() {
        let mut wide = AudioBus::new(4, 2);
        wide.reset(4);
        let mut narrow = AudioBus::new(2, 2);
        narrow.accumulate_from(&wide);
        assert_eq!(narrow.channel_count(), 2);
    }

    #[test]
    fn reset_zeroes_stale_samples() {
        let mut bus = AudioBus::new(1, 3);
        bus.reset(1);
        bus.channel_mut(0).fill(9.0);
        bus.reset(1);
        assert_eq!(bus.channel(0), &[0.0; 3]);
    }

    #[test]
    fn mono_sample_averages_channels() {
        let mut bus = AudioBus::new(2, 1);
        bus.reset(2);
        bus.channel_mut(0)[0] = 1.0;
        bus.channel_mut(1)[0] = 0.0;
        assert_eq!(bus.mono_sample(0), 0.5);
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn inactive_channel_access_panics() {
        let bus = AudioBus::new(2, 4);
        let _ = bus.channel(0);
    }
}
