use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use parley_core::AudioError;

/// Name used in configuration for the host's default microphone.
pub const DEFAULT_DEVICE: &str = "default";

pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn list_input_devices(&self) -> Result<Vec<(String, Device)>, AudioError> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;

        Ok(devices
            .map(|device| {
                let name = device.name().unwrap_or_else(|_| "unknown".to_string());
                (name, device)
            })
            .collect())
    }

    pub fn input_device_names(&self) -> Result<Vec<String>, AudioError> {
        Ok(self
            .list_input_devices()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    pub fn default_input_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    pub fn get_input_device(&self, name: &str) -> Result<Device, AudioError> {
        if name == DEFAULT_DEVICE {
            return self
                .host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string()));
        }

        self.list_input_devices()?
            .into_iter()
            .find(|(dev_name, _)| dev_name == name)
            .map(|(_, device)| device)
            .ok_or_else(|| AudioError::DeviceNotFound(format!("input device not found: {}", name)))
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
