use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::anyhow;
use bytes::BytesMut;
use coap_lite::Packet;
use log::debug;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::udp::UdpFramed;
use url::Url;

use crate::transport::{
    CoapTransport, RequestId, TransportError, TransportEventSender, TransportFactory,
};
use crate::udp::driver::{Command, Driver, RequestKind};

mod driver;

pub const DEFAULT_COAP_PORT: u16 = 5683;

/// Default CoAP client transport as originally defined in RFC 7252.  Requests are sent as
/// Confirmable messages but never retransmitted; an optional response timeout bounds how long a
/// request may stay outstanding.
pub struct UdpTransport {
    commands_tx: UnboundedSender<Command>,
    local_addr: SocketAddr,
    next_id: u64,
}

#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    bind_addr: SocketAddr,
    default_port: u16,
    response_timeout: Option<Duration>,
}

/// [`TransportFactory`] binding a fresh [`UdpTransport`] each time one is requested.
#[derive(Debug, Clone, Default)]
pub struct UdpTransportFactory {
    config: UdpTransportConfig,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            default_port: DEFAULT_COAP_PORT,
            response_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl UdpTransportConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Port used for `coap://` URLs that don't carry one.
    pub fn set_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Complete outstanding requests with [`TransportError::Timeout`] if no response arrived in
    /// time.
    pub fn set_response_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        if timeout.is_zero() {
            return Err(anyhow!("Invalid response_timeout={timeout:?}"));
        }
        self.response_timeout = Some(timeout);
        Ok(self)
    }

    /// Leave requests outstanding for as long as it takes.  A peer that never answers will
    /// keep the request (and anything correlated with it) alive forever.
    pub fn disable_response_timeout(mut self) -> Self {
        self.response_timeout = None;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }
}

impl UdpTransportFactory {
    pub fn new(config: UdpTransportConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for UdpTransportFactory {
    type Transport = UdpTransport;

    fn open(&mut self, events: TransportEventSender) -> Result<UdpTransport, TransportError> {
        UdpTransport::bind(self.config.clone(), events)
    }
}

impl UdpTransport {
    /// Bind the socket and spawn the driver task onto the current tokio runtime.  The driver
    /// shuts down, closing the socket, once this transport is dropped.
    pub fn bind(
        config: UdpTransportConfig,
        events: TransportEventSender,
    ) -> Result<Self, TransportError> {
        let handle =
            Handle::try_current().map_err(|e| TransportError::Unspecified(e.to_string()))?;
        let _guard = handle.enter();

        let std_socket = std::net::UdpSocket::bind(config.bind_addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;
        debug!("CoAP client bound to {local_addr}");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let framed = UdpFramed::new(socket, Codec::default());
        let driver = Driver::new(framed, commands_rx, events, config);
        handle.spawn(driver.run());

        Ok(Self {
            commands_tx,
            local_addr,
            next_id: 1,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn submit(&mut self, url: &Url, kind: RequestKind) -> Result<RequestId, TransportError> {
        let id = RequestId::from_raw(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.commands_tx
            .send(Command::Issue {
                id,
                url: url.clone(),
                kind,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(id)
    }
}

impl CoapTransport for UdpTransport {
    fn get(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(url, RequestKind::Get)
    }

    fn post(&mut self, url: &Url, payload: Vec<u8>) -> Result<RequestId, TransportError> {
        self.submit(url, RequestKind::Post(payload))
    }

    fn enable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(url, RequestKind::Observe)
    }

    fn disable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(url, RequestKind::Unobserve)
    }

    fn release(&mut self, id: RequestId) {
        let _ = self.commands_tx.send(Command::Release(id));
    }
}

#[derive(Default)]
pub(crate) struct Codec;

impl Decoder for Codec {
    type Item = Packet;
    type Error = TransportError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Packet>, TransportError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let result = Packet::from_bytes(&buf[..])
            .map(Some)
            .map_err(TransportError::from);
        buf.clear();
        result
    }
}

impl Encoder<Packet> for Codec {
    type Error = TransportError;

    fn encode(&mut self, packet: Packet, buf: &mut BytesMut) -> Result<(), TransportError> {
        buf.extend_from_slice(&packet.to_bytes()?[..]);
        Ok(())
    }
}
