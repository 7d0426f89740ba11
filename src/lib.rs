//! Device plugins for a home automation host: virtual buttons, a minimal example device and an
//! async CoAP client that discovers a constrained resource server, observes its notification
//! resource and uploads messages to it.
//!
//! # Examples
//! ```no_run
//! use coap_device_plugins::{
//!     CoapClientPlugin, Device, DeviceClass, HostSender, PluginRunner, UdpTransportConfig,
//!     UdpTransportFactory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (host, mut host_rx) = HostSender::channel();
//!     let factory = UdpTransportFactory::new(UdpTransportConfig::default());
//!     let (plugin, transport_rx) = CoapClientPlugin::new(factory, host);
//!     let (runner, handle) = PluginRunner::new(plugin, Some(transport_rx));
//!     tokio::spawn(runner.run());
//!
//!     let device = Device::new(DeviceClass::CoapClient, "sensor")
//!         .with_param("url", "coap://127.0.0.1:5683");
//!     handle.setup_device(device).await?;
//!
//!     while let Some(event) = host_rx.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub use device::{
    Action, ActionId, Device, DeviceClass, DeviceError, DeviceId, Event, HostSender,
    PluginEvent, SetupError, StateType,
};
pub use plugin::{ActionStatus, DevicePlugin, SetupStatus};
pub use plugins::{ButtonsPlugin, CoapClientConfig, CoapClientPlugin, MinimalPlugin};
pub use runner::{FatalPluginError, PluginHandle, PluginRunner};
pub use transport::{CoapTransport, RequestId, TransportError, TransportEvent, TransportFactory};
pub use udp::{UdpTransport, UdpTransportConfig, UdpTransportFactory};

pub mod device;
pub mod plugin;
pub mod plugins;
pub mod runner;
pub mod transport;
pub mod udp;

#[cfg(test)]
mod test_util;
