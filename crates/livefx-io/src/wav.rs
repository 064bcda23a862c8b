//! WAV file reading and writing.
//!
//! Samples cross this module de-interleaved on the way in (one `Vec` per
//! channel, the layout [`BufferSource`] plays) and interleaved on the way out
//! (the layout a renderer fills).

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use livefx_host::BufferSource;
use std::path::Path;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Total number of frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Reads WAV metadata without decoding samples.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let num_frames = u64::from(reader.duration());
    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs: num_frames as f64 / f64::from(spec.sample_rate),
        format,
    })
}

/// WAV file specification.
///
/// 32-bit files are written as IEEE float, 16 and 24-bit files as PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample (16, 24 or 32).
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl WavSpec {
    fn to_hound(self) -> Result<hound::WavSpec> {
        let sample_format = match self.bits_per_sample {
            32 => SampleFormat::Float,
            16 | 24 => SampleFormat::Int,
            bits => {
                return Err(Error::UnsupportedFormat(format!(
                    "{bits}-bit output (use 16, 24 or 32)"
                )));
            }
        };
        if self.channels == 0 {
            return Err(Error::UnsupportedFormat("zero channels".into()));
        }
        Ok(hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format,
        })
    }
}

/// Reads a WAV file into de-interleaved `f32` channels along with its spec.
///
/// Integer samples are scaled to `[-1.0, 1.0)`.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<Vec<f32>>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let hound_spec = reader.spec();
    let spec = WavSpec::from(hound_spec);

    let interleaved: Vec<f32> = match hound_spec.sample_format {
        SampleFormat::Float if hound_spec.bits_per_sample == 32 => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Float => {
            return Err(Error::UnsupportedFormat(format!(
                "{}-bit float input",
                hound_spec.bits_per_sample
            )));
        }
        SampleFormat::Int => {
            let scale = (1i64 << (hound_spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    tracing::debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        samples = interleaved.len(),
        "wav decoded"
    );
    Ok((deinterleave(&interleaved, usize::from(spec.channels)), spec))
}

/// Writes interleaved samples to a WAV file.
///
/// `samples.len()` should be a multiple of `spec.channels`; a trailing
/// partial frame is written as is.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], spec: WavSpec) -> Result<()> {
    let hound_spec = spec.to_hound()?;
    let mut writer = WavWriter::create(path, hound_spec)?;

    if spec.bits_per_sample == 32 {
        for &sample in samples {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
        for &sample in samples {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Splits interleaved samples into one buffer per channel.
///
/// A trailing partial frame is dropped.
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let frames = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (buffer, &sample) in out.iter_mut().zip(frame) {
            buffer.push(sample);
        }
    }
    out
}

/// Joins per-channel buffers into one interleaved buffer.
///
/// Shorter channels are padded with zeros up to the longest one.
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        out.extend(channels.iter().map(|c| c.get(i).copied().unwrap_or(0.0)));
    }
    out
}

/// Loads a WAV file as a media source.
///
/// The returned spec tells the caller the file's sample rate; the source
/// itself does not resample.
pub fn wav_source<P: AsRef<Path>>(path: P, looping: bool) -> Result<(BufferSource, WavSpec)> {
    let (channels, spec) = read_wav(path)?;
    if channels.is_empty() {
        return Err(Error::UnsupportedFormat("file has no channels".into()));
    }
    Ok((BufferSource::new(channels).with_looping(looping), spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_splits_frames() {
        let split = deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0], 2);
        assert_eq!(split, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        assert!(deinterleave(&[1.0], 0).is_empty());
    }

    #[test]
    fn interleave_pads_short_channels() {
        let joined = interleave(&[vec![1.0, 2.0], vec![-1.0]]);
        assert_eq!(joined, vec![1.0, -1.0, 2.0, 0.0]);
    }

    #[test]
    fn unsupported_bit_depth_is_rejected() {
        let spec = WavSpec {
            bits_per_sample: 12,
            ..WavSpec::default()
        };
        assert!(matches!(spec.to_hound(), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn float_output_for_32_bits() {
        let spec = WavSpec::default().to_hound().unwrap();
        assert_eq!(spec.sample_format, SampleFormat::Float);
        let spec = WavSpec {
            bits_per_sample: 16,
            ..WavSpec::default()
        }
        .to_hound()
        .unwrap();
        assert_eq!(spec.sample_format, SampleFormat::Int);
    }
}
