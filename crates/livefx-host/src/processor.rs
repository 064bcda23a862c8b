//! The block-processing contract between the render graph and a unit.

use crate::bus::AudioBus;

/// Everything a processor sees for one render quantum.
pub struct ProcessContext<'a> {
    /// Mixed input; zero channels when nothing is connected.
    pub input: &'a AudioBus,
    /// Output, pre-zeroed with as many channels as `input`.
    pub output: &'a mut AudioBus,
    /// Context sample rate in Hz.
    pub sample_rate: f32,
    /// Index of the first frame of this block since the context started.
    pub current_frame: u64,
}

/// A node implementation driven once per render quantum on the render thread.
///
/// Implementations must not block. Returning `false` from
/// [`process`](Self::process) reports "stop": the render graph skips the
/// node from then on and removes it at the next block boundary.
pub trait BlockProcessor: Send {
    /// Processes one block. Returns whether the node wants to keep running.
    fn process(&mut self, ctx: ProcessContext<'_>) -> bool;

    /// Receives a control message posted from the control thread.
    ///
    /// Delivered at a block boundary, before the next `process` call.
    fn on_message(&mut self, message: &str) {
        let _ = message;
    }
}
