//! Media sources: the audio that feeds a context's source nodes.
//!
//! A [`MediaSource`] is moved onto the render thread when its source node is
//! created and renders one quantum at a time. Sources must not block or
//! allocate inside [`render`](MediaSource::render).

use crate::bus::AudioBus;
use std::f32::consts::TAU;

/// Audio producer driven by a source node.
pub trait MediaSource: Send {
    /// Number of channels this source produces.
    fn channel_count(&self) -> usize;

    /// Fills `output` with the next block. The bus arrives reset to
    /// `min(channel_count(), capacity)` zeroed channels.
    fn render(&mut self, output: &mut AudioBus);

    /// Whether the source has run out of material. Finished sources render silence.
    fn is_finished(&self) -> bool {
        false
    }
}

/// A source that produces silence forever.
#[derive(Debug, Clone, Copy)]
pub struct Silence {
    channels: usize,
}

impl Silence {
    /// Creates a silent source with `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl MediaSource for Silence {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn render(&mut self, _output: &mut AudioBus) {}
}

/// Sine oscillator, identical on every channel.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    sample_rate: f32,
    channels: usize,
}

impl Oscillator {
    /// Creates a sine oscillator.
    pub fn new(frequency: f32, amplitude: f32, sample_rate: f32, channels: usize) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
            sample_rate,
            channels,
        }
    }

    /// Oscillator frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl MediaSource for Oscillator {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn render(&mut self, output: &mut AudioBus) {
        let inc = self.frequency / self.sample_rate;
        let start = self.phase;
        for ch in 0..output.channel_count() {
            let mut phase = start;
            for sample in output.channel_mut(ch) {
                *sample = self.amplitude * (TAU * phase).sin();
                phase = (phase + inc).fract();
            }
            self.phase = phase;
        }
    }
}

/// Plays pre-decoded, de-interleaved audio.
#[derive(Debug, Clone)]
pub struct BufferSource {
    channels: Vec<Vec<f32>>,
    position: usize,
    looping: bool,
}

impl BufferSource {
    /// Creates a source from de-interleaved channel data.
    ///
    /// Channels shorter than the longest one are treated as zero-padded.
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self {
            channels,
            position: 0,
            looping: false,
        }
    }

    /// Restarts from the beginning whenever the end is reached.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Whether the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Playback position in frames.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl MediaSource for BufferSource {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn render(&mut self, output: &mut AudioBus) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let frames = output.frames();
        let mut written = 0;
        while written < frames {
            if self.position >= len {
                if !self.looping {
                    return;
                }
                self.position = 0;
            }
            let n = (frames - written).min(len - self.position);
            for ch in 0..output.channel_count() {
                let src = &self.channels[ch];
                let dst = &mut output.channel_mut(ch)[written..written + n];
                for (i, d) in dst.iter_mut().enumerate() {
                    *d = src.get(self.position + i).copied().unwrap_or(0.0);
                }
            }
            self.position += n;
            written += n;
        }
    }

    fn is_finished(&self) -> bool {
        !self.looping && self.position >= self.len()
    }
}
