//! Device plugins shipped with this crate.

pub use buttons::ButtonsPlugin;
pub use coap_client::{CoapClientConfig, CoapClientPlugin, SessionState};
pub use minimal::MinimalPlugin;

mod buttons;
pub mod coap_client;
mod minimal;
