//! Audio device enumeration and the cpal backend

use cpal::traits::{DeviceTrait, HostTrait};

use super::{AudioBackend, CpalInput, CpalOutput, InputDevice, OutputDevice};
use crate::config::AudioSettings;
use crate::error::AudioError;

/// Description of an audio device for listings
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Direction of a device lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// List all available audio devices
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices: Vec<DeviceInfo> = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device, Direction::Input);
                devices.push(DeviceInfo {
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);

                // Same hardware may show up in both lists
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                } else {
                    let (sample_rates, channels) =
                        get_device_capabilities(&device, Direction::Output);
                    devices.push(DeviceInfo {
                        name,
                        is_input: false,
                        is_output: true,
                        is_default,
                        sample_rates,
                        channels,
                    });
                }
            }
        }
    }

    devices
}

/// Sample rates (among the common voice rates) and channel counts a device supports
fn get_device_capabilities(device: &cpal::Device, direction: Direction) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut chans = Vec::new();

    let configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|c| c.collect())
            .unwrap_or_default(),
        Direction::Output => device
            .supported_output_configs()
            .map(|c| c.collect())
            .unwrap_or_default(),
    };

    for config in configs {
        for rate_val in [8000u32, 12000, 16000, 24000, 44100, 48000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= config.min_sample_rate()
                && rate <= config.max_sample_rate()
                && !rates.contains(&rate_val)
            {
                rates.push(rate_val);
            }
        }
        if !chans.contains(&config.channels()) {
            chans.push(config.channels());
        }
    }

    rates.sort();
    chans.sort();
    (rates, chans)
}

/// Find a device by name, or the host default when `name` is `None`
pub fn find_device(name: Option<&str>, direction: Direction) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceNotFound(format!("No default {:?} device", direction).to_lowercase())
        });
    };

    let devices = match direction {
        Direction::Input => host.input_devices(),
        Direction::Output => host.output_devices(),
    }
    .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().ok().as_deref() == Some(name) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Build a stream config for the requested rate using the device's channel layout
fn stream_config(
    device: &cpal::Device,
    direction: Direction,
    sample_rate: u32,
) -> Result<cpal::StreamConfig, AudioError> {
    let default_config = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    }
    .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;

    Ok(cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    })
}

/// Devices of the platform's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, settings: &AudioSettings) -> Result<Box<dyn InputDevice>, AudioError> {
        let device = find_device(settings.input_device.as_deref(), Direction::Input)?;
        let config = stream_config(&device, Direction::Input, settings.sample_rate)?;
        tracing::debug!(
            "Opening input {} at {} Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );
        Ok(Box::new(CpalInput::new(device, config, settings.format())))
    }

    fn open_output(&self, settings: &AudioSettings) -> Result<Box<dyn OutputDevice>, AudioError> {
        let device = find_device(settings.output_device.as_deref(), Direction::Output)?;
        let config = stream_config(&device, Direction::Output, settings.sample_rate)?;
        tracing::debug!(
            "Opening output {} at {} Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );
        Ok(Box::new(CpalOutput::new(device, config, settings.format())))
    }
}
