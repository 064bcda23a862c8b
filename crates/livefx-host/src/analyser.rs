//! Analyser nodes: pass-through taps with byte-valued spectral snapshots.
//!
//! The render thread appends the mono down-mix of each block into a ring that
//! always holds the last [`MAX_FFT_SIZE`] frames. Reads happen on the control
//! side: take the newest `fft_size` frames, apply a Blackman window, FFT,
//! normalise magnitudes by `1/N`, smooth them over time, convert to dB and map
//! `[min_decibels, max_decibels]` linearly onto `0..=255`.

use crate::bus::AudioBus;
use crate::node::NodeId;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Smallest supported FFT size.
pub const MIN_FFT_SIZE: usize = 32;
/// Largest supported FFT size.
pub const MAX_FFT_SIZE: usize = 32768;

/// Display settings of an analyser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    /// FFT size; a power of two in `MIN_FFT_SIZE..=MAX_FFT_SIZE`.
    pub fft_size: usize,
    /// Time smoothing in `[0, 1]`.
    pub smoothing_time_constant: f32,
    /// Level mapped to byte 0.
    pub min_decibels: f32,
    /// Level mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserOptions {
    /// Checks the options, describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !valid_fft_size(self.fft_size) {
            return Err(format!(
                "fft_size {} must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}",
                self.fft_size
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(format!(
                "smoothing {} must be within [0, 1]",
                self.smoothing_time_constant
            ));
        }
        if self.min_decibels.is_nan() || self.max_decibels.is_nan() || self.min_decibels >= self.max_decibels {
            return Err(format!(
                "min_decibels {} must be below max_decibels {}",
                self.min_decibels, self.max_decibels
            ));
        }
        Ok(())
    }
}

/// Whether `n` is an allowed FFT size.
pub fn valid_fft_size(n: usize) -> bool {
    n.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&n)
}

struct Ring {
    samples: Vec<f32>,
    write: usize,
}

/// State shared between the render thread and analyser handles.
pub(crate) struct AnalyserShared {
    ring: Mutex<Ring>,
    has_input: AtomicBool,
}

impl AnalyserShared {
    pub(crate) fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                samples: vec![0.0; MAX_FFT_SIZE],
                write: 0,
            }),
            has_input: AtomicBool::new(false),
        }
    }

    /// Render thread: records one block. Skips the block rather than wait for a reader.
    pub(crate) fn record(&self, input: &AudioBus) {
        let Some(mut ring) = self.ring.try_lock() else {
            return;
        };
        for frame in 0..input.frames() {
            let w = ring.write;
            ring.samples[w] = input.mono_sample(frame);
            ring.write = (w + 1) % MAX_FFT_SIZE;
        }
    }

    pub(crate) fn set_has_input(&self, connected: bool) {
        self.has_input.store(connected, Ordering::Release);
    }

    fn has_input(&self) -> bool {
        self.has_input.load(Ordering::Acquire)
    }

    /// Copies the newest `out.len()` samples, oldest first.
    fn latest(&self, out: &mut [f32]) {
        let ring = self.ring.lock();
        let n = out.len();
        let start = (ring.write + MAX_FFT_SIZE - n) % MAX_FFT_SIZE;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = ring.samples[(start + i) % MAX_FFT_SIZE];
        }
    }
}

struct SpectrumState {
    options: AnalyserOptions,
    planner: FftPlanner<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumState {
    fn new(options: AnalyserOptions) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(options.fft_size);
        let mut state = Self {
            options,
            planner,
            fft,
            window: Vec::new(),
            time: Vec::new(),
            spectrum: Vec::new(),
            smoothed: Vec::new(),
        };
        state.resize(options.fft_size);
        state
    }

    fn resize(&mut self, n: usize) {
        self.fft = self.planner.plan_fft_forward(n);
        self.options.fft_size = n;
        self.window = blackman(n);
        self.time = vec![0.0; n];
        self.spectrum = vec![Complex::new(0.0, 0.0); n];
        self.smoothed = vec![0.0; n / 2];
    }
}

/// Blackman window coefficients.
fn blackman(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / n as f32;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

/// Control-side handle of an analyser node.
///
/// Clones share the same node and smoothing state.
#[derive(Clone)]
pub struct AnalyserHandle {
    node: NodeId,
    shared: Arc<AnalyserShared>,
    state: Arc<Mutex<SpectrumState>>,
}

impl std::fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserHandle")
            .field("node", &self.node)
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}

impl AnalyserHandle {
    pub(crate) fn new(node: NodeId, shared: Arc<AnalyserShared>, options: AnalyserOptions) -> Self {
        Self {
            node,
            shared,
            state: Arc::new(Mutex::new(SpectrumState::new(options))),
        }
    }

    /// The analyser's node in the render graph.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Current options.
    pub fn options(&self) -> AnalyserOptions {
        self.state.lock().options
    }

    /// Number of frequency bins: `fft_size / 2`.
    pub fn frequency_bin_count(&self) -> usize {
        self.state.lock().options.fft_size / 2
    }

    /// Changes the FFT size. Resets smoothing. Returns `false` for an invalid size.
    pub fn set_fft_size(&self, fft_size: usize) -> bool {
        if !valid_fft_size(fft_size) {
            return false;
        }
        let mut state = self.state.lock();
        if state.options.fft_size != fft_size {
            state.resize(fft_size);
        }
        true
    }

    /// Whether the node currently has an inbound connection.
    pub fn has_input(&self) -> bool {
        self.shared.has_input()
    }

    /// Writes the current byte spectrum into `out`, one byte per bin.
    ///
    /// Fills `min(out.len(), frequency_bin_count())` bytes. A node with no
    /// inbound connection reads as all zeros and its smoothing state resets.
    pub fn get_byte_frequency_data(&self, out: &mut [u8]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let bins = state.options.fft_size / 2;
        let count = out.len().min(bins);

        if !self.shared.has_input() {
            state.smoothed.fill(0.0);
            out[..count].fill(0);
            return;
        }

        self.shared.latest(&mut state.time);
        for ((c, &x), &w) in state.spectrum.iter_mut().zip(&state.time).zip(&state.window) {
            *c = Complex::new(x * w, 0.0);
        }
        state.fft.process(&mut state.spectrum);

        let n = state.options.fft_size as f32;
        let tau = state.options.smoothing_time_constant;
        let min_db = state.options.min_decibels;
        let range = state.options.max_decibels - min_db;
        for k in 0..bins {
            let magnitude = state.spectrum[k].norm() / n;
            let smoothed = tau * state.smoothed[k] + (1.0 - tau) * magnitude;
            // Non-finite input collapses to silence.
            let smoothed = if smoothed.is_finite() { smoothed } else { 0.0 };
            state.smoothed[k] = smoothed;
            if k < count {
                let db = 20.0 * smoothed.log10();
                let scaled = 255.0 * (db - min_db) / range;
                out[k] = if scaled.is_nan() { 0 } else { scaled.clamp(0.0, 255.0) as u8 };
            }
        }
    }
}
