use log::warn;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::device::{ActionId, DeviceError, DeviceId, ParamValue, SetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    Power,
    AlternativePower,
    Notifications,
}

impl StateType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::AlternativePower => "alternativePower",
            Self::Notifications => "notifications",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A simple button was pressed.
    Pressed { device: DeviceId },

    /// Notification pushed by an observed CoAP resource, payload passed through untouched.
    Time { device: DeviceId, time: Vec<u8> },
}

impl Event {
    pub fn device(&self) -> DeviceId {
        match self {
            Self::Pressed { device } | Self::Time { device, .. } => *device,
        }
    }
}

/// Everything a plugin reports to the host outside of the synchronous return values.
#[derive(Debug)]
pub enum PluginEvent {
    /// Terminal result of a setup that previously returned [`crate::SetupStatus::Pending`].
    SetupFinished {
        device: DeviceId,
        result: Result<(), SetupError>,
    },

    /// Terminal result of an action that previously returned [`crate::ActionStatus::Pending`].
    ActionFinished {
        action: ActionId,
        result: Result<(), DeviceError>,
    },

    StateChanged {
        device: DeviceId,
        state: StateType,
        value: ParamValue,
    },

    Emitted(Event),
}

/// Sending half of the host boundary.  Delivery is unbounded and at-most-once: if the host is
/// slow it simply falls behind, and once it is gone events are dropped with a warning.
#[derive(Debug, Clone)]
pub struct HostSender {
    tx: UnboundedSender<PluginEvent>,
}

impl HostSender {
    pub fn channel() -> (Self, UnboundedReceiver<PluginEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn setup_finished(&self, device: DeviceId, result: Result<(), SetupError>) {
        self.send(PluginEvent::SetupFinished { device, result });
    }

    pub fn action_finished(&self, action: ActionId, result: Result<(), DeviceError>) {
        self.send(PluginEvent::ActionFinished { action, result });
    }

    pub fn set_state_value(&self, device: DeviceId, state: StateType, value: impl Into<ParamValue>) {
        self.send(PluginEvent::StateChanged {
            device,
            state,
            value: value.into(),
        });
    }

    pub fn emit_event(&self, event: Event) {
        self.send(PluginEvent::Emitted(event));
    }

    fn send(&self, event: PluginEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Host is gone, dropping {:?}", e.0);
        }
    }
}
