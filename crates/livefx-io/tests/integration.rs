//! Integration tests for livefx-io: WAV files, offline rendering and the
//! backend callback.

use livefx_host::{BufferSource, ContextOptions, MediaSource, RenderContext, Renderer};
use livefx_io::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle,
    WavFormat, WavSpec, read_wav, read_wav_info, render_to_wav, renderer_callback, wav_source,
    write_wav,
};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

fn sine(sample_rate: u32, freq_hz: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| 0.5 * (std::f32::consts::TAU * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// A context playing `source` straight into the destination.
fn playing(source: Box<dyn MediaSource>) -> (RenderContext, Renderer) {
    let (ctx, renderer) = RenderContext::new(ContextOptions::default());
    let node = ctx.create_media_source(source).unwrap();
    let mut tx = ctx.transaction();
    tx.connect(node, ctx.destination()).unwrap();
    tx.commit().unwrap();
    (ctx, renderer)
}

// ---------------------------------------------------------------------------
// WAV files
// ---------------------------------------------------------------------------

#[test]
fn stereo_f32_file_reads_back_deinterleaved() {
    let left = sine(48000, 440.0, 4800);
    let right: Vec<f32> = left.iter().map(|s| -s).collect();
    let interleaved = livefx_io::interleave(&[left.clone(), right.clone()]);
    let spec = WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 32,
    };

    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &interleaved, spec).unwrap();
    let (channels, loaded) = read_wav(file.path()).unwrap();

    assert_eq!(loaded, spec);
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0], left);
    assert_eq!(channels[1], right);
}

#[test]
fn pcm16_file_is_scaled_to_unit_range() {
    let samples = sine(44100, 1000.0, 441);
    let spec = WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
    };

    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &samples, spec).unwrap();
    let (channels, _) = read_wav(file.path()).unwrap();

    for (a, b) in samples.iter().zip(&channels[0]) {
        assert!((a - b).abs() < 1.0 / 16384.0, "{a} vs {b}");
    }
}

#[test]
fn wav_info_reports_frames_and_duration() {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 24,
    };
    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &vec![0.0; 48000 * 2], spec).unwrap();

    let info = read_wav_info(file.path()).unwrap();
    assert_eq!(info.num_frames, 48000);
    assert_eq!(info.channels, 2);
    assert_eq!(info.format, WavFormat::Pcm);
    assert!((info.duration_secs - 1.0).abs() < 1e-9);
}

#[test]
fn missing_file_is_a_wav_error() {
    let err = read_wav("/definitely/not/here.wav").unwrap_err();
    assert!(matches!(err, livefx_io::Error::Wav(_)));
}

// ---------------------------------------------------------------------------
// Sources and offline rendering
// ---------------------------------------------------------------------------

#[test]
fn wav_source_plays_file_contents() {
    let file = NamedTempFile::new().unwrap();
    write_wav(
        file.path(),
        &[0.25; 256],
        WavSpec {
            channels: 1,
            ..WavSpec::default()
        },
    )
    .unwrap();

    let (source, spec) = wav_source(file.path(), false).unwrap();
    assert_eq!(spec.channels, 1);
    assert_eq!(source.len(), 256);

    let (_ctx, mut renderer) = playing(Box::new(source));
    let out = renderer.render_quantum();
    assert_eq!(out.channel(0)[0], 0.25);
}

#[test]
fn render_to_wav_writes_the_mix() {
    let source = BufferSource::new(vec![vec![0.5; 1000], vec![-0.5; 1000]]);
    let (_ctx, mut renderer) = playing(Box::new(source));

    let file = NamedTempFile::new().unwrap();
    let spec = render_to_wav(&mut renderer, 1000, file.path(), 32).unwrap();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);

    let (channels, _) = read_wav(file.path()).unwrap();
    assert_eq!(channels[0].len(), 1000);
    assert!(channels[0].iter().all(|&s| s == 0.5));
    assert!(channels[1].iter().all(|&s| s == -0.5));
}

// ---------------------------------------------------------------------------
// Backend callback
// ---------------------------------------------------------------------------

/// A backend that hands its callback back to the test instead of a device.
#[derive(Default)]
struct ManualBackend {
    callback: Arc<Mutex<Option<OutputCallback>>>,
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn list_devices(&self) -> livefx_io::Result<Vec<AudioDevice>> {
        Ok(vec![AudioDevice {
            name: "manual".into(),
            is_output: true,
            default_sample_rate: 48000,
            default_channels: Some(2),
        }])
    }

    fn default_output_device(&self) -> livefx_io::Result<Option<AudioDevice>> {
        Ok(self.list_devices()?.into_iter().next())
    }

    fn build_output_stream(
        &self,
        _config: &BackendStreamConfig,
        callback: OutputCallback,
        _error_callback: ErrorCallback,
    ) -> livefx_io::Result<StreamHandle> {
        *self.callback.lock().unwrap() = Some(callback);
        Ok(StreamHandle::new(()))
    }
}

#[test]
fn renderer_callback_wraps_mix_across_device_channels() {
    let source = BufferSource::new(vec![vec![0.75; 64], vec![-0.75; 64]]).with_looping(true);
    let (_ctx, renderer) = playing(Box::new(source));

    let manual = ManualBackend::default();
    let slot = Arc::clone(&manual.callback);
    let backend: Box<dyn AudioBackend> = Box::new(manual);
    let config = BackendStreamConfig {
        channels: 4,
        ..BackendStreamConfig::default()
    };
    assert_eq!(backend.name(), "manual");
    assert_eq!(backend.actual_sample_rate(&config), 48000);
    let _stream = backend
        .build_output_stream(
            &config,
            renderer_callback(renderer, config.channels),
            Box::new(|_| {}),
        )
        .unwrap();

    let mut callback = slot.lock().unwrap().take().unwrap();
    let mut buffer = vec![0.0; 16 * 4];
    callback(&mut buffer);
    for frame in buffer.chunks_exact(4) {
        assert_eq!(frame, [0.75, -0.75, 0.75, -0.75]);
    }
}

#[test]
fn renderer_callback_straddles_quanta() {
    let source = BufferSource::new(vec![vec![0.75; 64]]).with_looping(true);
    let (_ctx, renderer) = playing(Box::new(source));

    let backend = ManualBackend::default();
    let slot = Arc::clone(&backend.callback);
    let _stream = backend
        .build_output_stream(
            &BackendStreamConfig::default(),
            renderer_callback(renderer, 2),
            Box::new(|_| {}),
        )
        .unwrap();

    let mut callback = slot.lock().unwrap().take().unwrap();
    // Odd buffer sizes straddle render quanta.
    for frames in [100, 37, 300] {
        let mut buffer = vec![0.0; frames * 2];
        callback(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.75), "buffer of {frames} frames");
    }
}
