//! CoAP client device: discovers a constrained resource server, toggles observation of its
//! notification resource and uploads messages to it.
//!
//! Everything here runs on the plugin's task.  Requests are handed to a [`CoapTransport`] which
//! answers later with [`TransportEvent`]s; those are fed back in through
//! [`DevicePlugin::handle_internal_event`] and matched against the [`Correlator`] to find the
//! setup or action waiting on them.

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use url::Url;

use crate::device::{
    Action, CoapClientAction, Device, DeviceAction, DeviceClass, DeviceError, DeviceId,
    HostSender, SetupError, StateType,
};
use crate::plugin::{ActionStatus, DevicePlugin, SetupStatus};
use crate::transport::{
    CoapTransport, Notification, Reply, RequestId, TransportError, TransportEvent,
    TransportEventSender, TransportFactory,
};

pub use classifier::Transition;
pub use config::CoapClientConfig;
pub use core_link::CoreLink;
pub use correlator::{Correlator, Intent, PendingRequest};
pub use notifications::{ObservationRegistry, ObservedResource};
pub use session::{Session, SessionRegistry, SessionState};

mod classifier;
mod config;
mod core_link;
mod correlator;
mod notifications;
mod session;

pub struct CoapClientPlugin<F: TransportFactory> {
    config: CoapClientConfig,
    factory: F,
    transport: Option<F::Transport>,
    transport_events: TransportEventSender,
    host: HostSender,
    sessions: SessionRegistry,
    correlator: Correlator,
    observations: ObservationRegistry,
}

impl<F: TransportFactory> CoapClientPlugin<F> {
    /// Create the plugin along with the receiver of its transport events, which must be handed
    /// to the [`crate::runner::PluginRunner`] driving it.
    pub fn new(factory: F, host: HostSender) -> (Self, UnboundedReceiver<TransportEvent>) {
        Self::with_config(CoapClientConfig::default(), factory, host)
    }

    pub fn with_config(
        config: CoapClientConfig,
        factory: F,
        host: HostSender,
    ) -> (Self, UnboundedReceiver<TransportEvent>) {
        let (transport_events, events_rx) = mpsc::unbounded_channel();
        let plugin = Self {
            config,
            factory,
            transport: None,
            transport_events,
            host,
            sessions: SessionRegistry::new(),
            correlator: Correlator::new(),
            observations: ObservationRegistry::new(),
        };
        (plugin, events_rx)
    }

    /// Number of requests still waiting for their completion.
    pub fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    pub fn is_observing(&self, device: DeviceId) -> bool {
        self.observations.is_active(device)
    }

    pub fn session_state(&self, device: DeviceId) -> Option<SessionState> {
        self.sessions.get(device).map(|session| session.state)
    }

    pub fn discovered_links(&self, device: DeviceId) -> &[CoreLink] {
        self.sessions
            .get(device)
            .map(|session| session.links.as_slice())
            .unwrap_or_default()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    fn open_transport(&mut self) -> Result<(&mut F::Transport, bool), TransportError> {
        let opened = self.transport.is_none();
        if opened {
            let transport = self.factory.open(self.transport_events.clone())?;
            debug!("CoAP transport opened");
            self.transport = Some(transport);
        }
        match self.transport.as_mut() {
            Some(transport) => Ok((transport, opened)),
            None => Err(TransportError::Closed),
        }
    }

    fn start_discovery(&mut self, device: DeviceId, base_url: &Url) -> Result<(), SetupError> {
        let url = self.config.discovery_url(base_url);
        let (transport, opened) = self.open_transport()?;
        match transport.get(&url) {
            Ok(id) => {
                debug!("Discovering {url} as {id}");
                self.track(id, Intent::Discover { device });
                Ok(())
            }
            Err(e) => {
                if opened {
                    self.transport = None;
                }
                Err(e.into())
            }
        }
    }

    fn issue(
        &mut self,
        device: &Device,
        action: &Action,
        request: CoapClientAction,
    ) -> Result<(), DeviceError> {
        let base_url = match self.sessions.get(device.id()) {
            Some(session) => session.base_url.clone(),
            None => {
                debug!("No session for {}, rejecting {}", device.name(), action.action_type());
                return Err(DeviceError::HardwareNotAvailable);
            }
        };
        let transport = self
            .transport
            .as_mut()
            .ok_or(DeviceError::HardwareNotAvailable)?;

        let device_id = device.id();
        let action_id = action.id();
        let (issued, intent) = match request {
            CoapClientAction::Notifications(true) => {
                let url = self.config.observe_url(&base_url);
                let issued = transport.enable_notifications(&url);
                let intent = Intent::EnableObserve {
                    device: device_id,
                    action: action_id,
                    url,
                };
                (issued, intent)
            }
            CoapClientAction::Notifications(false) => {
                let url = self.config.observe_url(&base_url);
                let issued = transport.disable_notifications(&url);
                let intent = Intent::DisableObserve {
                    device: device_id,
                    action: action_id,
                    url,
                };
                (issued, intent)
            }
            CoapClientAction::Upload(message) => {
                let url = self.config.upload_url(&base_url);
                let issued = transport.post(&url, message);
                let intent = Intent::Upload {
                    device: device_id,
                    action: action_id,
                };
                (issued, intent)
            }
        };

        match issued {
            Ok(id) => {
                debug!("Issued {} for action {action_id} as {id}", intent.label());
                self.track(id, intent);
                Ok(())
            }
            Err(e) => {
                warn!("Transport refused {} for {}: {e}", intent.label(), device.name());
                Err(DeviceError::HardwareFailure)
            }
        }
    }

    fn track(&mut self, id: RequestId, intent: Intent) {
        if let Some(displaced) = self.correlator.register(id, intent) {
            warn!("Request id {id} reused while still pending, aborting its previous owner");
            self.abort(displaced.intent, SetupError::Removed, DeviceError::HardwareFailure);
        }
    }

    fn on_request_finished(&mut self, id: RequestId, result: Result<Reply, TransportError>) {
        match self.correlator.take(id) {
            Some(PendingRequest { intent, .. }) => {
                let transition = classifier::classify(intent, result);
                self.apply(transition);
            }
            None => debug!("Ignoring completion of unknown request {id}"),
        }
        self.release(id);
        self.close_transport_if_idle();
    }

    fn on_notification(&mut self, notification: Notification) {
        if let Some(event) = self.observations.demultiplex(notification) {
            self.host.emit_event(event);
        }
    }

    fn apply(&mut self, transition: Transition) {
        if let Transition::ObservationEnabled { device, action, .. }
        | Transition::ObservationDisabled { device, action, .. } = &transition
        {
            if self.sessions.get(*device).is_none() {
                debug!("Observation change for action {action} outlived the session of {device}");
                self.host
                    .action_finished(*action, Err(DeviceError::HardwareNotAvailable));
                return;
            }
        }

        match transition {
            Transition::SetupSucceeded { device, links } => {
                match self.sessions.get_mut(device) {
                    Some(session) => {
                        info!(
                            "Discovered {} resources on {}",
                            links.len(),
                            session.base_url
                        );
                        for link in &links {
                            debug!("  {link}");
                        }
                        session.state = SessionState::Ready;
                        session.links = links;
                        self.host.setup_finished(device, Ok(()));
                    }
                    None => debug!("Discovery finished for vanished device {device}"),
                }
            }
            Transition::SetupFailed { device, error } => {
                warn!("Discovery for {device} failed: {error}");
                self.host
                    .setup_finished(device, Err(SetupError::Discovery(error)));
                self.forget_device(device);
            }
            Transition::ObservationEnabled {
                device,
                action,
                url,
            } => {
                debug!("Observing {url} for {device}");
                self.observations.activate(device, url);
                self.host
                    .set_state_value(device, StateType::Notifications, true);
                self.host.action_finished(action, Ok(()));
            }
            Transition::ObservationDisabled {
                device,
                action,
                url,
            } => {
                debug!("Stopped observing {url} for {device}");
                self.observations.deactivate(device);
                self.host
                    .set_state_value(device, StateType::Notifications, false);
                self.host.action_finished(action, Ok(()));
            }
            Transition::Uploaded { action } => {
                self.host.action_finished(action, Ok(()));
            }
            Transition::ActionFailed {
                action,
                what,
                error,
            } => {
                warn!("{what} for action {action} failed: {error}");
                self.host
                    .action_finished(action, Err(DeviceError::HardwareFailure));
            }
        }
    }

    /// Report the terminal result of a request that will never complete normally.
    fn abort(&self, intent: Intent, setup_error: SetupError, action_error: DeviceError) {
        match intent.action() {
            Some(action) => self.host.action_finished(action, Err(action_error)),
            None => self
                .host
                .setup_finished(intent.device(), Err(setup_error)),
        }
    }

    /// Drop everything held for `device`: its session, its observation and every request still
    /// in flight, whose owners are told the hardware is gone.  Returns whether a session existed.
    fn forget_device(&mut self, device: DeviceId) -> bool {
        let drained = self.correlator.drain_device(device);
        if !drained.is_empty() {
            debug!(
                "Aborting {} pending requests of device {device}",
                drained.len()
            );
        }
        for pending in drained {
            self.release(pending.id);
            self.abort(
                pending.intent,
                SetupError::Removed,
                DeviceError::HardwareNotAvailable,
            );
        }
        self.observations.remove(device);
        self.sessions.remove(device).is_some()
    }

    fn release(&mut self, id: RequestId) {
        if let Some(transport) = self.transport.as_mut() {
            transport.release(id);
        }
    }

    fn close_transport_if_idle(&mut self) {
        if self.sessions.is_empty() && self.correlator.is_empty() && self.transport.take().is_some()
        {
            debug!("CoAP transport closed");
        }
    }
}

impl<F: TransportFactory> DevicePlugin for CoapClientPlugin<F> {
    type InternalEvent = TransportEvent;

    fn name(&self) -> &'static str {
        "coap-client"
    }

    fn supported_classes(&self) -> &'static [DeviceClass] {
        &[DeviceClass::CoapClient]
    }

    fn setup_device(&mut self, device: &Device) -> Result<SetupStatus, SetupError> {
        if !self.supports(device.class()) {
            return Err(SetupError::DeviceClassNotFound(device.class()));
        }
        let base_url = config::parse_device_url(device)?;
        self.sessions.register(device.id(), base_url.clone())?;

        info!("Setting up CoAP client {} for {base_url}", device.name());
        if let Err(e) = self.start_discovery(device.id(), &base_url) {
            warn!("Could not start discovery for {}: {e}", device.name());
            self.sessions.remove(device.id());
            return Err(e);
        }
        Ok(SetupStatus::Pending)
    }

    fn execute_action(
        &mut self,
        device: &Device,
        action: &Action,
    ) -> Result<ActionStatus, DeviceError> {
        if !self.supports(device.class()) {
            return Err(DeviceError::DeviceClassNotFound(device.class().to_string()));
        }
        let request = match DeviceAction::parse(device.class(), action)? {
            DeviceAction::CoapClient(request) => request,
            DeviceAction::SimpleButton(_)
            | DeviceAction::PowerButton(_)
            | DeviceAction::AlternativePowerButton(_) => {
                return Err(DeviceError::DeviceClassNotFound(device.class().to_string()));
            }
        };
        self.issue(device, action, request)?;
        Ok(ActionStatus::Pending)
    }

    fn device_removed(&mut self, device: &Device) {
        if self.forget_device(device.id()) {
            info!("Removed CoAP client {}", device.name());
        }
        self.close_transport_if_idle();
    }

    fn handle_internal_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Completed { id, result } => self.on_request_finished(id, result),
            TransportEvent::Notification(notification) => self.on_notification(notification),
        }
    }
}
