use std::convert::Infallible;

use log::debug;

use crate::device::{
    Action, Device, DeviceAction, DeviceClass, DeviceError, Event, HostSender, PowerAction,
    SetupError, SimpleButtonAction, StateType,
};
use crate::plugin::{ActionStatus, DevicePlugin, SetupStatus};

/// Virtual buttons: a stateless push button plus two power toggles that only mirror the requested
/// value into their state.
#[derive(Debug)]
pub struct ButtonsPlugin {
    host: HostSender,
}

impl ButtonsPlugin {
    pub fn new(host: HostSender) -> Self {
        Self { host }
    }

    fn set_power(&self, device: &Device, state: StateType, power: bool) {
        debug!("{} {} set {} to {power}", device.class(), device.name(), state.name());
        self.host.set_state_value(device.id(), state, power);
    }
}

impl DevicePlugin for ButtonsPlugin {
    type InternalEvent = Infallible;

    fn name(&self) -> &'static str {
        "buttons"
    }

    fn supported_classes(&self) -> &'static [DeviceClass] {
        &[
            DeviceClass::SimpleButton,
            DeviceClass::PowerButton,
            DeviceClass::AlternativePowerButton,
        ]
    }

    fn setup_device(&mut self, device: &Device) -> Result<SetupStatus, SetupError> {
        if !self.supports(device.class()) {
            return Err(SetupError::DeviceClassNotFound(device.class()));
        }
        debug!("Setting up {} {} ({})", device.class(), device.name(), device.id());
        Ok(SetupStatus::Success)
    }

    fn execute_action(
        &mut self,
        device: &Device,
        action: &Action,
    ) -> Result<ActionStatus, DeviceError> {
        if !self.supports(device.class()) {
            return Err(DeviceError::DeviceClassNotFound(device.class().to_string()));
        }

        match DeviceAction::parse(device.class(), action)? {
            DeviceAction::SimpleButton(SimpleButtonAction::Press) => {
                debug!("Simple button {} was pressed", device.name());
                self.host
                    .emit_event(Event::Pressed { device: device.id() });
            }
            DeviceAction::PowerButton(PowerAction::SetPower(power)) => {
                self.set_power(device, StateType::Power, power);
            }
            DeviceAction::AlternativePowerButton(PowerAction::SetPower(power)) => {
                self.set_power(device, StateType::AlternativePower, power);
            }
            DeviceAction::CoapClient(_) => {
                return Err(DeviceError::DeviceClassNotFound(device.class().to_string()));
            }
        }
        Ok(ActionStatus::Done)
    }
}
