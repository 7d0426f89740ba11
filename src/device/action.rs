use crate::device::{Action, DeviceClass, DeviceError};

pub const PRESS_ACTION: &str = "press";
pub const POWER_ACTION: &str = "power";
pub const NOTIFICATIONS_ACTION: &str = "notifications";
pub const UPLOAD_ACTION: &str = "upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleButtonAction {
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    SetPower(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoapClientAction {
    /// Enable (`true`) or disable observation of the device's notification resource.
    Notifications(bool),
    /// POST the message to the device's upload resource.
    Upload(Vec<u8>),
}

/// Typed action, one variant per device class that has any actions at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    SimpleButton(SimpleButtonAction),
    PowerButton(PowerAction),
    AlternativePowerButton(PowerAction),
    CoapClient(CoapClientAction),
}

impl DeviceAction {
    /// Interpret `action` in the context of `class`.  Fails with
    /// [`DeviceError::ActionTypeNotFound`] if the class has no such action and with
    /// [`DeviceError::InvalidParam`] if a required parameter is missing or mistyped.
    pub fn parse(class: DeviceClass, action: &Action) -> Result<Self, DeviceError> {
        let params = action.params();
        match (class, action.action_type()) {
            (DeviceClass::SimpleButton, PRESS_ACTION) => {
                Ok(Self::SimpleButton(SimpleButtonAction::Press))
            }
            (DeviceClass::PowerButton, POWER_ACTION) => Ok(Self::PowerButton(
                PowerAction::SetPower(params.bool_param("power")?),
            )),
            (DeviceClass::AlternativePowerButton, POWER_ACTION) => Ok(
                Self::AlternativePowerButton(PowerAction::SetPower(params.bool_param("power")?)),
            ),
            (DeviceClass::CoapClient, NOTIFICATIONS_ACTION) => Ok(Self::CoapClient(
                CoapClientAction::Notifications(params.bool_param("notification")?),
            )),
            (DeviceClass::CoapClient, UPLOAD_ACTION) => Ok(Self::CoapClient(
                CoapClientAction::Upload(params.bytes_param("message")?.to_vec()),
            )),
            (
                DeviceClass::Minimal
                | DeviceClass::SimpleButton
                | DeviceClass::PowerButton
                | DeviceClass::AlternativePowerButton
                | DeviceClass::CoapClient,
                other,
            ) => Err(DeviceError::ActionTypeNotFound(other.to_string())),
        }
    }
}
