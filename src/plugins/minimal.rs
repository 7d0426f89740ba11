use std::convert::Infallible;

use log::debug;

use crate::device::{Device, DeviceClass, SetupError};
use crate::plugin::{DevicePlugin, SetupStatus};

/// Smallest possible plugin: accepts its one device class and offers no actions.
#[derive(Debug, Default)]
pub struct MinimalPlugin;

impl MinimalPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl DevicePlugin for MinimalPlugin {
    type InternalEvent = Infallible;

    fn name(&self) -> &'static str {
        "minimal"
    }

    fn supported_classes(&self) -> &'static [DeviceClass] {
        &[DeviceClass::Minimal]
    }

    fn setup_device(&mut self, device: &Device) -> Result<SetupStatus, SetupError> {
        if !self.supports(device.class()) {
            return Err(SetupError::DeviceClassNotFound(device.class()));
        }
        debug!(
            "Setting up {} ({}) with params {:?}",
            device.name(),
            device.id(),
            device.params()
        );
        Ok(SetupStatus::Success)
    }
}
