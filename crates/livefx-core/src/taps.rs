//! Dry and wet analysis taps.

use livefx_host::{AnalyserHandle, AnalyserOptions, GraphError, NodeId, RenderContext};
use parking_lot::MutexGuard;

/// The two analysers around the processing unit, with reusable byte buffers.
#[derive(Debug)]
pub struct Taps {
    dry: AnalyserHandle,
    wet: AnalyserHandle,
    dry_bytes: Vec<u8>,
    wet_bytes: Vec<u8>,
}

impl Taps {
    /// Creates both analysers in `context`.
    pub fn new(context: &RenderContext, options: AnalyserOptions) -> Result<Self, GraphError> {
        Ok(Self {
            dry: context.create_analyser(options)?,
            wet: context.create_analyser(options)?,
            dry_bytes: Vec::new(),
            wet_bytes: Vec::new(),
        })
    }

    /// The pre-processing analyser node.
    pub fn dry_node(&self) -> NodeId {
        self.dry.node()
    }

    /// The post-processing analyser node.
    pub fn wet_node(&self) -> NodeId {
        self.wet.node()
    }

    /// Frequency bins per snapshot.
    pub fn bin_count(&self) -> usize {
        self.dry.frequency_bin_count()
    }

    /// Changes both analysers' FFT size. Returns `false` for an invalid size.
    pub fn set_fft_size(&mut self, fft_size: usize) -> bool {
        self.dry.set_fft_size(fft_size) && self.wet.set_fft_size(fft_size)
    }

    /// Reads both analysers into the reused buffers.
    pub fn refresh(&mut self) {
        let bins = self.bin_count();
        // Reallocate only when the bin count changed.
        if self.dry_bytes.len() != bins {
            self.dry_bytes.resize(bins, 0);
            self.wet_bytes.resize(bins, 0);
        }
        self.dry.get_byte_frequency_data(&mut self.dry_bytes);
        self.wet.get_byte_frequency_data(&mut self.wet_bytes);
    }

    /// Last dry snapshot.
    pub fn dry(&self) -> &[u8] {
        &self.dry_bytes
    }

    /// Last wet snapshot.
    pub fn wet(&self) -> &[u8] {
        &self.wet_bytes
    }
}

/// Byte spectra of both taps at the time of the call.
///
/// Holds the taps until dropped; the slices are overwritten by the next snapshot.
pub struct Snapshot<'a> {
    pub(crate) taps: MutexGuard<'a, Taps>,
}

impl Snapshot<'_> {
    /// Spectrum before the processing unit.
    pub fn dry(&self) -> &[u8] {
        self.taps.dry()
    }

    /// Spectrum after the processing unit; silent when bypassed.
    pub fn wet(&self) -> &[u8] {
        self.taps.wet()
    }
}

impl std::fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("bins", &self.taps.dry().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefx_host::ContextOptions;

    #[test]
    fn buffers_sized_to_bin_count() {
        let (ctx, _renderer) = RenderContext::new(ContextOptions::default());
        let mut taps = Taps::new(&ctx, AnalyserOptions::default()).unwrap();
        assert_ne!(taps.dry_node(), taps.wet_node());
        taps.refresh();
        assert_eq!(taps.dry().len(), 256);
        assert_eq!(taps.wet().len(), 256);
        let before = taps.dry().as_ptr();
        taps.refresh();
        assert_eq!(taps.dry().as_ptr(), before);
    }

    #[test]
    fn fft_size_change_resizes_lazily() {
        let (ctx, _renderer) = RenderContext::new(ContextOptions::default());
        let mut taps = Taps::new(&ctx, AnalyserOptions::default()).unwrap();
        taps.refresh();
        assert!(taps.set_fft_size(1024));
        assert_eq!(taps.dry().len(), 256);
        taps.refresh();
        assert_eq!(taps.dry().len(), 512);
        assert_eq!(taps.wet().len(), 512);
        assert!(!taps.set_fft_size(3));
    }

    #[test]
    fn unconnected_taps_read_silence() {
        let (ctx, _renderer) = RenderContext::new(ContextOptions::default());
        let mut taps = Taps::new(&ctx, AnalyserOptions::default()).unwrap();
        taps.refresh();
        assert!(taps.dry().iter().chain(taps.wet()).all(|&b| b == 0));
    }
}
