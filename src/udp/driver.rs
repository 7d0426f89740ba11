use std::collections::HashMap;
use std::net::SocketAddr;

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use rand::Rng;
use tokio::net::lookup_host;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time;
use tokio_util::udp::UdpFramed;
use url::{Host, Url};

use crate::transport::{
    Notification, Reply, RequestId, TransportError, TransportEvent, TransportEventSender,
};
use crate::udp::{Codec, UdpTransportConfig};

pub type MessageId = u16;

type Resolved = (RequestId, Result<SocketAddr, TransportError>);

/// Raw CoAP token value; always the id of the request that first used it.
type Token = u64;

const OBSERVE_REGISTER: u32 = 0;
const OBSERVE_DEREGISTER: u32 = 1;

#[derive(Debug)]
pub(crate) enum Command {
    Issue {
        id: RequestId,
        url: Url,
        kind: RequestKind,
    },
    Release(RequestId),
}

#[derive(Debug, Clone)]
pub(crate) enum RequestKind {
    Get,
    Post(Vec<u8>),
    Observe,
    Unobserve,
}

/// Book keeping for one issued request, kept until the owner releases it.
#[derive(Debug)]
struct Exchange {
    token: Token,
    message_id: MessageId,
    peer: Option<SocketAddr>,
    url: Url,
    kind: RequestKind,
    completed: bool,
}

#[derive(Debug)]
struct Observation {
    url: Url,
    peer: SocketAddr,
}

/// Owns the socket and all per-request state.  Lives until every [`super::UdpTransport`] handle
/// (i.e. the command sender) has been dropped.
pub(crate) struct Driver {
    sink: SplitSink<UdpFramed<Codec>, (Packet, SocketAddr)>,
    stream: SplitStream<UdpFramed<Codec>>,
    commands_rx: UnboundedReceiver<Command>,
    timeouts_tx: UnboundedSender<RequestId>,
    timeouts_rx: UnboundedReceiver<RequestId>,
    resolved_tx: UnboundedSender<Resolved>,
    resolved_rx: UnboundedReceiver<Resolved>,
    events: TransportEventSender,
    config: UdpTransportConfig,
    next_message_id: MessageId,
    exchanges: HashMap<RequestId, Exchange>,
    exchanges_by_token: HashMap<Token, RequestId>,
    observations: HashMap<Token, Observation>,
}

impl Driver {
    pub fn new(
        framed: UdpFramed<Codec>,
        commands_rx: UnboundedReceiver<Command>,
        events: TransportEventSender,
        config: UdpTransportConfig,
    ) -> Self {
        let (sink, stream) = framed.split();
        let (timeouts_tx, timeouts_rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            stream,
            commands_rx,
            timeouts_tx,
            timeouts_rx,
            resolved_tx,
            resolved_rx,
            events,
            config,
            next_message_id: rand::thread_rng().gen(),
            exchanges: HashMap::new(),
            exchanges_by_token: HashMap::new(),
            observations: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                Some(id) = self.timeouts_rx.recv() => {
                    self.handle_timeout(id);
                }
                Some((id, resolved)) = self.resolved_rx.recv() => {
                    match resolved {
                        Ok(peer) => self.send_request(id, peer).await,
                        Err(e) => self.fail_unsent(id, e),
                    }
                }
                incoming = self.stream.next() => {
                    match incoming {
                        Some(Ok((packet, peer))) => {
                            trace!("Incoming packet from {peer}: {packet:?}");
                            self.handle_packet(packet, peer).await;
                        }
                        Some(Err(e)) => warn!("Error reading from socket: {e}"),
                        None => break,
                    }
                }
            }
        }
        debug!(
            "CoAP transport shutting down with {} unreleased requests",
            self.exchanges.len()
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Issue { id, url, kind } => self.issue(id, url, kind).await,
            Command::Release(id) => {
                if let Some(exchange) = self.exchanges.remove(&id) {
                    if self.exchanges_by_token.get(&exchange.token) == Some(&id) {
                        self.exchanges_by_token.remove(&exchange.token);
                    }
                }
            }
        }
    }

    async fn issue(&mut self, id: RequestId, url: Url, kind: RequestKind) {
        // Observing a URL again refreshes the existing registration instead of adding another.
        let token = match kind {
            RequestKind::Observe => self.observation_token(&url),
            RequestKind::Unobserve => self.take_observation_token(&url),
            _ => None,
        }
        .unwrap_or_else(|| id.as_raw());

        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);

        self.exchanges.insert(
            id,
            Exchange {
                token,
                message_id,
                peer: None,
                url: url.clone(),
                kind,
                completed: false,
            },
        );
        self.exchanges_by_token.insert(token, id);

        let port = url.port().unwrap_or(self.config.default_port());
        match url.host() {
            Some(Host::Ipv4(addr)) => self.send_request(id, SocketAddr::from((addr, port))).await,
            Some(Host::Ipv6(addr)) => self.send_request(id, SocketAddr::from((addr, port))).await,
            Some(Host::Domain(domain)) => {
                // Name lookups may take a while and must not hold up other exchanges.
                let domain = domain.to_string();
                let resolved_tx = self.resolved_tx.clone();
                tokio::spawn(async move {
                    let resolved = resolve(&domain, port).await;
                    let _ = resolved_tx.send((id, resolved));
                });
            }
            None => self.complete(id, Err(TransportError::Unresolvable(url.to_string()))),
        }
    }

    async fn send_request(&mut self, id: RequestId, peer: SocketAddr) {
        let packet = match self.exchanges.get_mut(&id) {
            Some(exchange) if !exchange.completed => {
                exchange.peer = Some(peer);
                debug!(
                    "Sending {:?} {} as {id} (message ID {})",
                    exchange.kind, exchange.url, exchange.message_id
                );
                new_request_packet(
                    &exchange.url,
                    &exchange.kind,
                    exchange.token,
                    exchange.message_id,
                )
            }
            _ => {
                debug!("{id} was released before it could be sent");
                return;
            }
        };

        if let Err(e) = self.sink.send((packet, peer)).await {
            warn!("Error sending to {peer}: {e}");
            self.complete(id, Err(e));
            return;
        }

        if let Some(timeout) = self.config.response_timeout() {
            let timeouts_tx = self.timeouts_tx.clone();
            tokio::spawn(async move {
                time::sleep(timeout).await;
                let _ = timeouts_tx.send(id);
            });
        }
    }

    fn fail_unsent(&mut self, id: RequestId, error: TransportError) {
        let pending = self
            .exchanges
            .get(&id)
            .map_or(false, |exchange| !exchange.completed);
        if pending {
            debug!("Could not resolve the peer of {id}: {error}");
            self.complete(id, Err(error));
        }
    }

    fn observation_token(&self, url: &Url) -> Option<Token> {
        self.observations
            .iter()
            .find(|(_, observation)| &observation.url == url)
            .map(|(token, _)| *token)
    }

    fn take_observation_token(&mut self, url: &Url) -> Option<Token> {
        let token = self.observation_token(url)?;
        self.observations.remove(&token);
        Some(token)
    }

    fn handle_timeout(&mut self, id: RequestId) {
        let pending = self
            .exchanges
            .get(&id)
            .map_or(false, |exchange| !exchange.completed);
        if let (true, Some(timeout)) = (pending, self.config.response_timeout()) {
            debug!("No reply for {id} after {timeout:?}");
            self.complete(id, Err(TransportError::Timeout(timeout)));
        }
    }

    async fn handle_packet(&mut self, packet: Packet, peer: SocketAddr) {
        match packet.header.code {
            MessageClass::Response(_) => self.handle_response(packet, peer).await,
            MessageClass::Empty => match packet.header.get_type() {
                MessageType::Acknowledgement => {
                    // Separate response will follow, nothing to do until it arrives.
                    trace!("Empty ACK from {peer} for message ID {}", packet.header.message_id);
                }
                MessageType::Reset => self.handle_reset(packet.header.message_id, peer),
                MessageType::Confirmable => {
                    // CoAP ping, answered with a Reset as per RFC 7252 section 4.3.
                    self.reply(new_reset_message(&packet), peer).await;
                }
                MessageType::NonConfirmable => {
                    debug!("Ignoring Non-Confirmable Empty message from {peer}");
                }
            },
            MessageClass::Request(_) => {
                warn!("Spurious request from {peer}, ignoring...");
                if packet.header.get_type() == MessageType::Confirmable {
                    self.reply(new_reset_message(&packet), peer).await;
                }
            }
            code => warn!("Unhandled message code {code} from {peer}, ignoring..."),
        }
    }

    async fn handle_response(&mut self, packet: Packet, peer: SocketAddr) {
        let confirmable = packet.header.get_type() == MessageType::Confirmable;
        let token = token_from_bytes(packet.get_token());

        let exchange_id = token.and_then(|t| self.exchanges_by_token.get(&t).copied());
        let open_exchange = exchange_id.filter(|id| {
            self.exchanges
                .get(id)
                .map_or(false, |exchange| !exchange.completed)
        });

        if let (Some(id), Some(token)) = (open_exchange, token) {
            let registers = self
                .exchanges
                .get(&id)
                .map_or(false, |exchange| matches!(exchange.kind, RequestKind::Observe));
            let accepted = matches!(packet.header.code, MessageClass::Response(code) if is_success(code));
            if registers && accepted && packet.get_observe_value().is_some() {
                if let Some(exchange) = self.exchanges.get(&id) {
                    debug!("Observing {} via token {token:#x}", exchange.url);
                    let url = exchange.url.clone();
                    // Registrations raced for the same URL; only the latest one is kept.
                    self.observations
                        .retain(|other, observation| *other == token || observation.url != url);
                    self.observations.insert(token, Observation { url, peer });
                }
            }
            self.complete(id, Ok(Reply::from_packet(&packet)));
            if confirmable {
                self.reply(new_ack_message(&packet), peer).await;
            }
            return;
        }

        if let Some(observation) = token.and_then(|t| self.observations.get(&t)) {
            let notification = Notification {
                url: observation.url.clone(),
                sequence: packet.get_observe_value().and_then(Result::ok),
                payload: packet.payload.clone(),
            };
            let still_observing = matches!(packet.header.code, MessageClass::Response(code) if is_success(code));
            if !still_observing {
                debug!(
                    "Observation of {} ended by {peer} with {}",
                    notification.url, packet.header.code
                );
                if let Some(token) = token {
                    self.observations.remove(&token);
                }
            }
            let _ = self.events.send(TransportEvent::Notification(notification));
            if confirmable {
                self.reply(new_ack_message(&packet), peer).await;
            }
            return;
        }

        if exchange_id.is_some() {
            trace!("Duplicate response from {peer}, ignoring");
            if confirmable {
                self.reply(new_ack_message(&packet), peer).await;
            }
        } else {
            // Also rejects notifications of registrations that were superseded or cancelled,
            // which makes the server forget them (RFC 7641 section 3.6).
            debug!("Response from {peer} with unrecognized token, rejecting");
            if packet.header.get_type() != MessageType::Acknowledgement {
                self.reply(new_reset_message(&packet), peer).await;
            }
        }
    }

    fn handle_reset(&mut self, message_id: MessageId, peer: SocketAddr) {
        let id = self
            .exchanges
            .iter()
            .find(|(_, exchange)| {
                !exchange.completed
                    && exchange.message_id == message_id
                    && exchange.peer == Some(peer)
            })
            .map(|(id, _)| *id);
        match id {
            Some(id) => self.complete(id, Err(TransportError::Reset)),
            None => debug!("Got Reset from {peer} for unrecognized message ID {message_id}"),
        }
    }

    fn complete(&mut self, id: RequestId, result: Result<Reply, TransportError>) {
        if let Some(exchange) = self.exchanges.get_mut(&id) {
            exchange.completed = true;
        }
        if self
            .events
            .send(TransportEvent::Completed { id, result })
            .is_err()
        {
            debug!("Completion for {id} dropped, nobody is listening");
        }
    }

    async fn reply(&mut self, packet: Packet, peer: SocketAddr) {
        trace!("Outgoing packet to {peer}: {packet:?}");
        if let Err(e) = self.sink.send((packet, peer)).await {
            warn!("Error sending to {peer}: {e}");
        }
    }
}

async fn resolve(domain: &str, port: u16) -> Result<SocketAddr, TransportError> {
    lookup_host((domain, port))
        .await?
        .next()
        .ok_or_else(|| TransportError::Unresolvable(domain.to_string()))
}

fn new_request_packet(url: &Url, kind: &RequestKind, token: Token, message_id: MessageId) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Confirmable);
    packet.header.message_id = message_id;
    packet.set_token(token.to_be_bytes().to_vec());

    let method = match kind {
        RequestKind::Post(_) => RequestType::Post,
        _ => RequestType::Get,
    };
    packet.header.code = MessageClass::Request(method);

    match kind {
        RequestKind::Observe => packet.set_observe_value(OBSERVE_REGISTER),
        RequestKind::Unobserve => packet.set_observe_value(OBSERVE_DEREGISTER),
        _ => {}
    }

    for segment in url.path_segments().into_iter().flatten() {
        if !segment.is_empty() {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
    }
    if let Some(query) = url.query() {
        for param in query.split('&').filter(|q| !q.is_empty()) {
            packet.add_option(CoapOption::UriQuery, param.as_bytes().to_vec());
        }
    }

    if let RequestKind::Post(payload) = kind {
        packet.payload = payload.clone();
    }
    packet
}

fn token_from_bytes(bytes: &[u8]) -> Option<Token> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(Token::from_be_bytes(raw))
}

fn is_success(code: ResponseType) -> bool {
    matches!(
        code,
        ResponseType::Created
            | ResponseType::Deleted
            | ResponseType::Valid
            | ResponseType::Changed
            | ResponseType::Content
    )
}

fn new_ack_message(packet: &Packet) -> Packet {
    new_empty_message(packet, MessageType::Acknowledgement)
}

fn new_reset_message(packet: &Packet) -> Packet {
    new_empty_message(packet, MessageType::Reset)
}

fn new_empty_message(packet: &Packet, message_type: MessageType) -> Packet {
    let mut reply = Packet::new();
    reply.header.set_type(message_type);
    reply.header.code = MessageClass::Empty;
    reply.header.message_id = packet.header.message_id;
    reply
}
