use std::collections::HashMap;

use log::debug;
use url::Url;

use crate::device::{DeviceId, Event};
use crate::transport::Notification;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResource {
    pub device: DeviceId,
    pub url: Url,
    pub active: bool,
}

/// Which device, if any, a pushed notification belongs to.  Holds at most one resource per
/// device.
#[derive(Debug, Default)]
pub struct ObservationRegistry {
    resources: HashMap<DeviceId, ObservedResource>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&mut self, device: DeviceId, url: Url) {
        self.resources.insert(
            device,
            ObservedResource {
                device,
                url,
                active: true,
            },
        );
    }

    pub fn deactivate(&mut self, device: DeviceId) {
        if let Some(resource) = self.resources.get_mut(&device) {
            resource.active = false;
        }
    }

    pub fn remove(&mut self, device: DeviceId) -> Option<ObservedResource> {
        self.resources.remove(&device)
    }

    pub fn get(&self, device: DeviceId) -> Option<&ObservedResource> {
        self.resources.get(&device)
    }

    pub fn is_active(&self, device: DeviceId) -> bool {
        self.get(device).map_or(false, |resource| resource.active)
    }

    /// Route a notification to the device actively observing its url.  Anything else (late
    /// notifications after disabling, resources nobody asked for) is dropped.
    pub fn demultiplex(&self, notification: Notification) -> Option<Event> {
        let resource = self
            .resources
            .values()
            .find(|resource| resource.active && resource.url == notification.url);
        match resource {
            Some(resource) => Some(Event::Time {
                device: resource.device,
                time: notification.payload,
            }),
            None => {
                debug!(
                    "Dropping notification {:?} for unobserved {}",
                    notification.sequence, notification.url
                );
                None
            }
        }
    }
}
