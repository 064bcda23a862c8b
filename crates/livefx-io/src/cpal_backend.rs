//! cpal-based audio backend.
//!
//! ```rust,ignore
//! use livefx_io::{AudioBackend, BackendStreamConfig, CpalBackend, renderer_callback};
//!
//! let backend = CpalBackend::new();
//! let config = BackendStreamConfig::default();
//! let stream = backend.build_output_stream(
//!     &config,
//!     renderer_callback(renderer, config.channels),
//!     Box::new(|err| tracing::error!(%err, "audio stream error")),
//! )?;
//! // Plays until `stream` is dropped.
//! ```

use crate::backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle,
};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host};

const FALLBACK_SAMPLE_RATE: u32 = 48000;

fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

fn describe(device: &Device, name: String) -> AudioDevice {
    let config = device.default_output_config().ok();
    AudioDevice {
        name,
        is_output: config.is_some(),
        default_sample_rate: config
            .as_ref()
            .map_or(FALLBACK_SAMPLE_RATE, |c| c.sample_rate()),
        default_channels: config.as_ref().map(cpal::SupportedStreamConfig::channels),
    }
}

/// Audio backend over the platform's default cpal host
/// (ALSA on Linux, CoreAudio on macOS, WASAPI on Windows).
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Creates a backend on the default host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    /// Finds an output device whose name contains `name` (case-insensitive),
    /// or the default device when `name` is `None`.
    fn find_output_device(&self, name: Option<&str>) -> Result<Device> {
        let Some(search) = name else {
            return self.host.default_output_device().ok_or(Error::NoDevice);
        };
        let search_lower = search.to_lowercase();
        let devices = self
            .host
            .output_devices()
            .map_err(|e| Error::Stream(e.to_string()))?;

        for device in devices {
            if let Ok(dev_name) = device_name(&device)
                && dev_name.to_lowercase().contains(&search_lower)
            {
                return Ok(device);
            }
        }
        Err(Error::DeviceNotFound(format!(
            "no output device matching '{search}'"
        )))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        let mut devices = Vec::new();
        // Hosts without any output device report an error; treat it as empty.
        if let Ok(outputs) = self.host.output_devices() {
            for device in outputs {
                if let Ok(name) = device_name(&device)
                    && !devices.iter().any(|d: &AudioDevice| d.name == name)
                {
                    devices.push(describe(&device, name));
                }
            }
        }
        Ok(devices)
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self
            .host
            .default_output_device()
            .and_then(|d| device_name(&d).ok().map(|name| describe(&d, name))))
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_output_device(config.device_name.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = device_name(&device).unwrap_or_default(),
            channels = config.channels,
            sample_rate = config.sample_rate,
            buffer_size = config.buffer_size,
            "output stream started"
        );

        Ok(StreamHandle::new(stream))
    }

    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        let Ok(device) = self.find_output_device(config.device_name.as_deref()) else {
            return config.sample_rate;
        };
        let supported = device.supported_output_configs().is_ok_and(|mut ranges| {
            ranges.any(|r| {
                r.channels() == config.channels
                    && (r.min_sample_rate()..=r.max_sample_rate()).contains(&config.sample_rate)
            })
        });
        if supported {
            return config.sample_rate;
        }
        device
            .default_output_config()
            .map_or(config.sample_rate, |c| c.sample_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name() {
        assert_eq!(CpalBackend::new().name(), "cpal");
    }

    #[test]
    fn list_devices_never_fails() {
        // Device availability depends on the machine; enumeration must not error.
        assert!(CpalBackend::new().list_devices().is_ok());
    }

    #[test]
    fn unknown_device_name_is_reported() {
        let backend = CpalBackend::new();
        let found = backend.find_output_device(Some("no-such-device-7f3a9c"));
        assert!(matches!(
            found,
            Err(Error::DeviceNotFound(_) | Error::Stream(_))
        ));
    }
}
