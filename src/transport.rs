use std::fmt;
use std::time::Duration;

use coap_lite::error::MessageError;
use coap_lite::{MessageClass, Packet, ResponseType};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Opaque identifier handed out by a [`CoapTransport`] for every request it accepts.  The same
/// identifier is carried by the one terminal [`TransportEvent::Completed`] for that request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Client side generalization of the CoAP transport.  Only the primitives needed for resource
/// discovery, observation and uploads are modelled; confirmable retransmission, block-wise
/// transfer and friends are the business of the implementation (or not supported at all).
///
/// Every method returns immediately.  Results arrive later on the [`TransportEventSender`] the
/// transport was opened with: exactly one [`TransportEvent::Completed`] per returned
/// [`RequestId`], plus any number of [`TransportEvent::Notification`]s for resources that are
/// being observed.
pub trait CoapTransport: Send + 'static {
    /// Plain GET, used for `/.well-known/core` discovery.
    fn get(&mut self, url: &Url) -> Result<RequestId, TransportError>;

    /// POST the raw payload to `url`.
    fn post(&mut self, url: &Url, payload: Vec<u8>) -> Result<RequestId, TransportError>;

    /// GET with `Observe: 0`.  The first response completes the request, subsequent ones are
    /// delivered as notifications.
    fn enable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError>;

    /// GET with `Observe: 1`, cancelling a registration made through
    /// [`CoapTransport::enable_notifications`].
    fn disable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError>;

    /// Free whatever the transport still holds for `id`.  Callers must invoke this exactly once
    /// per request, after they are done with its completion.
    fn release(&mut self, id: RequestId);
}

/// Lazily creates transports.  Allows the client to defer socket creation until the first
/// device is actually set up.
pub trait TransportFactory: Send + 'static {
    type Transport: CoapTransport;

    fn open(&mut self, events: TransportEventSender) -> Result<Self::Transport, TransportError>;
}

pub type TransportEventSender = UnboundedSender<TransportEvent>;

/// Everything a transport can report back to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Terminal result for a previously issued request.
    Completed {
        id: RequestId,
        result: Result<Reply, TransportError>,
    },

    /// Out-of-band push data for an observed resource.  Not correlated with any pending request.
    Notification(Notification),
}

/// Response as seen by the client, stripped down to what the plugin layer cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: MessageClass,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn new(code: MessageClass, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    pub fn from_packet(packet: &Packet) -> Self {
        Self {
            code: packet.header.code,
            payload: packet.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub url: Url,
    pub sequence: Option<u32>,
    pub payload: Vec<u8>,
}

/// Generalized errors indicating a range of transport-related issues such as being unable to
/// bind, unreachable peers, malformed input, etc.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("packet was malformed: {0:?}")]
    MalformedPacket(MessageError),

    #[error("could not resolve {0}")]
    Unresolvable(String),

    #[error("reset message received")]
    Reset,

    #[error("no reply after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,

    #[error("unspecified: {0}")]
    Unspecified(String),
}

impl From<MessageError> for TransportError {
    fn from(x: MessageError) -> Self {
        Self::MalformedPacket(x)
    }
}

/// Why a completed request did not produce the reply its issuer was waiting for.
#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected status {actual:?}, expected {expected:?}")]
    UnexpectedStatus {
        expected: ResponseType,
        actual: MessageClass,
    },
}
