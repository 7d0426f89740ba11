use coap_lite::{MessageClass, ResponseType};
use url::Url;

use crate::device::{ActionId, DeviceId};
use crate::plugins::coap_client::core_link::{self, CoreLink};
use crate::plugins::coap_client::correlator::Intent;
use crate::transport::{CompletionError, Reply, TransportError};

/// What a completed request means for the plugin's state and the host.
#[derive(Debug)]
pub enum Transition {
    SetupSucceeded {
        device: DeviceId,
        links: Vec<CoreLink>,
    },
    SetupFailed {
        device: DeviceId,
        error: CompletionError,
    },
    ObservationEnabled {
        device: DeviceId,
        action: ActionId,
        url: Url,
    },
    ObservationDisabled {
        device: DeviceId,
        action: ActionId,
        url: Url,
    },
    Uploaded {
        action: ActionId,
    },
    ActionFailed {
        action: ActionId,
        what: &'static str,
        error: CompletionError,
    },
}

pub fn expected_status(intent: &Intent) -> ResponseType {
    match intent {
        Intent::Upload { .. } => ResponseType::Created,
        Intent::Discover { .. } | Intent::EnableObserve { .. } | Intent::DisableObserve { .. } => {
            ResponseType::Content
        }
    }
}

/// Decide the outcome of `intent` given the transport's terminal result.  Transport errors and
/// unexpected status codes fail the same way.
pub fn classify(intent: Intent, result: Result<Reply, TransportError>) -> Transition {
    let expected = expected_status(&intent);
    let checked = result.map_err(CompletionError::from).and_then(|reply| {
        if reply.code == MessageClass::Response(expected) {
            Ok(reply)
        } else {
            Err(CompletionError::UnexpectedStatus {
                expected,
                actual: reply.code,
            })
        }
    });

    let what = intent.label();
    match (intent, checked) {
        (Intent::Discover { device }, Ok(reply)) => Transition::SetupSucceeded {
            device,
            links: core_link::parse_all(&reply.payload),
        },
        (Intent::Discover { device }, Err(error)) => Transition::SetupFailed { device, error },
        (Intent::EnableObserve { device, action, url }, Ok(_)) => {
            Transition::ObservationEnabled { device, action, url }
        }
        (Intent::DisableObserve { device, action, url }, Ok(_)) => {
            Transition::ObservationDisabled { device, action, url }
        }
        (Intent::Upload { action, .. }, Ok(_)) => Transition::Uploaded { action },
        (
            Intent::EnableObserve { action, .. }
            | Intent::DisableObserve { action, .. }
            | Intent::Upload { action, .. },
            Err(error),
        ) => Transition::ActionFailed {
            action,
            what,
            error,
        },
    }
}
