//! Host-facing device model: identities, configuration parameters, incoming actions and the
//! outbound [`PluginEvent`] channel through which plugins report back.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

pub use action::{
    CoapClientAction, DeviceAction, PowerAction, SimpleButtonAction, NOTIFICATIONS_ACTION,
    POWER_ACTION, PRESS_ACTION, UPLOAD_ACTION,
};
pub use error::{DeviceError, SetupError};
pub use event::{Event, HostSender, PluginEvent, StateType};
pub use params::{Param, ParamList, ParamValue};

mod action;
mod error;
mod event;
mod params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Every device class known to this crate.  Plugins dispatch on this with an exhaustive `match`,
/// so adding a class forces each plugin to decide what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Minimal,
    SimpleButton,
    PowerButton,
    AlternativePowerButton,
    CoapClient,
}

impl DeviceClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::SimpleButton => "simpleButton",
            Self::PowerButton => "powerButton",
            Self::AlternativePowerButton => "alternativePowerButton",
            Self::CoapClient => "coapClient",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceClass {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Minimal,
            Self::SimpleButton,
            Self::PowerButton,
            Self::AlternativePowerButton,
            Self::CoapClient,
        ]
        .into_iter()
        .find(|class| class.name() == s)
        .ok_or_else(|| DeviceError::DeviceClassNotFound(s.to_string()))
    }
}

/// A configured device as handed to plugins by the host.  The host owns identity and parameter
/// storage; plugins only read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: DeviceId,
    class: DeviceClass,
    name: String,
    params: ParamList,
}

impl Device {
    pub fn new(class: DeviceClass, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(),
            class,
            name: name.into(),
            params: ParamList::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.set(name, value);
        self
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    pub fn param_value(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
}

/// Untyped action request as received from a client or the rule engine.  Plugins turn it into a
/// [`DeviceAction`] before acting on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    id: ActionId,
    action_type: String,
    params: ParamList,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            action_type: action_type.into(),
            params: ParamList::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.set(name, value);
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }
}
