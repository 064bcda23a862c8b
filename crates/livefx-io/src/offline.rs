//! Rendering without an audio device.

use crate::{Result, WavSpec, write_wav};
use livefx_host::Renderer;
use std::path::Path;

/// Pulls `frames` frames out of `renderer` as interleaved samples.
///
/// The output has [`Renderer::channels`] channels; a mono mix is duplicated
/// across them.
pub fn render_offline(renderer: &mut Renderer, frames: usize) -> Vec<f32> {
    let channels = renderer.channels();
    let mut out = vec![0.0; frames * channels];
    renderer.render_interleaved(&mut out, channels);
    out
}

/// Renders `frames` frames and writes them to a WAV file at `bits_per_sample`.
pub fn render_to_wav<P: AsRef<Path>>(
    renderer: &mut Renderer,
    frames: usize,
    path: P,
    bits_per_sample: u16,
) -> Result<WavSpec> {
    let spec = WavSpec {
        channels: renderer.channels() as u16,
        sample_rate: renderer.sample_rate() as u32,
        bits_per_sample,
    };
    let samples = render_offline(renderer, frames);
    write_wav(path.as_ref(), &samples, spec)?;
    tracing::info!(
        path = %path.as_ref().display(),
        frames,
        channels = spec.channels,
        "offline render written"
    );
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefx_host::{ContextOptions, Oscillator, RenderContext};

    #[test]
    fn renders_requested_frame_count() {
        let (ctx, mut renderer) = RenderContext::new(ContextOptions::default());
        let source = ctx
            .create_media_source(Box::new(Oscillator::new(440.0, 0.5, 48000.0, 1)))
            .unwrap();
        let mut tx = ctx.transaction();
        tx.connect(source, ctx.destination()).unwrap();
        tx.commit().unwrap();

        let samples = render_offline(&mut renderer, 300);
        assert_eq!(samples.len(), 600);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
        // Mono source on a stereo context lands on both channels.
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert_eq!(renderer.current_frame(), 384);
    }
}
