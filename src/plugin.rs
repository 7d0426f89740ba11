use core::fmt::Debug;

use crate::device::{Action, Device, DeviceClass, DeviceError, SetupError};

/// Outcome of a setup that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Success,
    /// The result follows later as [`crate::device::PluginEvent::SetupFinished`].
    Pending,
}

/// Outcome of an action that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Done,
    /// The result follows later as [`crate::device::PluginEvent::ActionFinished`], carrying the
    /// same action id.
    Pending,
}

/// Contract between the host's device manager and a plugin.  All methods are invoked from a
/// single task (see [`crate::runner::PluginRunner`]) and must never block; anything slow is
/// started here and reported through the plugin's [`crate::device::HostSender`] later on.
pub trait DevicePlugin: Send + 'static {
    /// Plugin specific events fed back into the plugin on the same task as host commands,
    /// typically transport completions.
    type InternalEvent: Debug + Send + 'static;

    fn name(&self) -> &'static str;

    fn supported_classes(&self) -> &'static [DeviceClass];

    fn setup_device(&mut self, device: &Device) -> Result<SetupStatus, SetupError>;

    fn execute_action(
        &mut self,
        device: &Device,
        action: &Action,
    ) -> Result<ActionStatus, DeviceError> {
        let _ = device;
        Err(DeviceError::ActionTypeNotFound(
            action.action_type().to_string(),
        ))
    }

    /// Called once the user removed a configured device.
    fn device_removed(&mut self, _device: &Device) {}

    fn handle_internal_event(&mut self, _event: Self::InternalEvent) {}

    fn supports(&self, class: DeviceClass) -> bool {
        self.supported_classes().contains(&class)
    }
}
