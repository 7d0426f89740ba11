use std::collections::HashMap;

use url::Url;

use crate::device::{ActionId, DeviceId};
use crate::transport::RequestId;

/// What an outstanding request was issued for, and therefore who to tell once it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Discover {
        device: DeviceId,
    },
    EnableObserve {
        device: DeviceId,
        action: ActionId,
        url: Url,
    },
    DisableObserve {
        device: DeviceId,
        action: ActionId,
        url: Url,
    },
    Upload {
        device: DeviceId,
        action: ActionId,
    },
}

impl Intent {
    pub fn device(&self) -> DeviceId {
        match self {
            Self::Discover { device }
            | Self::EnableObserve { device, .. }
            | Self::DisableObserve { device, .. }
            | Self::Upload { device, .. } => *device,
        }
    }

    /// The action waiting on this request, `None` for setup traffic.
    pub fn action(&self) -> Option<ActionId> {
        match self {
            Self::Discover { .. } => None,
            Self::EnableObserve { action, .. }
            | Self::DisableObserve { action, .. }
            | Self::Upload { action, .. } => Some(*action),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Discover { .. } => "discovery",
            Self::EnableObserve { .. } => "enable notifications",
            Self::DisableObserve { .. } => "disable notifications",
            Self::Upload { .. } => "upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub intent: Intent,
}

/// Table of in-flight requests.  An id is present from the moment its request is issued until
/// its terminal completion is taken out again, and never in two places at once.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<RequestId, Intent>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly issued request.  Returns whatever was previously filed under the same id,
    /// which only happens with a transport that recycles ids too early.
    #[must_use]
    pub fn register(&mut self, id: RequestId, intent: Intent) -> Option<PendingRequest> {
        self.pending
            .insert(id, intent)
            .map(|intent| PendingRequest { id, intent })
    }

    pub fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.pending
            .remove(&id)
            .map(|intent| PendingRequest { id, intent })
    }

    /// Remove every request issued on behalf of `device`, oldest id first.
    pub fn drain_device(&mut self, device: DeviceId) -> Vec<PendingRequest> {
        let mut ids: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, intent)| intent.device() == device)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::device::{ActionId, DeviceId};
    use crate::plugins::coap_client::correlator::{Correlator, Intent};
    use crate::transport::RequestId;

    #[test]
    fn test_take_exactly_once() {
        let mut correlator = Correlator::new();
        let device = DeviceId::new();
        let action = ActionId::new();
        let id = RequestId::from_raw(1);

        assert!(correlator
            .register(id, Intent::Upload { device, action })
            .is_none());
        assert_eq!(correlator.len(), 1);

        let pending = correlator.take(id).unwrap();
        assert_eq!(pending.intent.action(), Some(action));
        assert_eq!(pending.intent.device(), device);
        assert!(correlator.take(id).is_none());
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_register_reports_displaced() {
        let mut correlator = Correlator::new();
        let device = DeviceId::new();
        let id = RequestId::from_raw(5);

        assert!(correlator.register(id, Intent::Discover { device }).is_none());
        let displaced = correlator
            .register(
                id,
                Intent::Upload {
                    device,
                    action: ActionId::new(),
                },
            )
            .unwrap();
        assert_eq!(displaced.intent, Intent::Discover { device });
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn test_drain_device() {
        let mut correlator = Correlator::new();
        let a = DeviceId::new();
        let b = DeviceId::new();

        for raw in [3, 1, 2] {
            let intent = Intent::Upload {
                device: a,
                action: ActionId::new(),
            };
            assert!(correlator.register(RequestId::from_raw(raw), intent).is_none());
        }
        assert!(correlator
            .register(RequestId::from_raw(4), Intent::Discover { device: b })
            .is_none());

        let drained: Vec<_> = correlator
            .drain_device(a)
            .into_iter()
            .map(|p| p.id.as_raw())
            .collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(correlator.len(), 1);
        assert_eq!(
            correlator.take(RequestId::from_raw(4)).map(|p| p.intent.device()),
            Some(b)
        );
        assert!(correlator.drain_device(a).is_empty());
    }
}
