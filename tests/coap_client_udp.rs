use std::net::SocketAddr;
use std::time::Duration;

use coap_device_plugins::device::ParamValue;
use coap_device_plugins::transport::CompletionError;
use coap_device_plugins::{
    Action, ActionStatus, CoapClientPlugin, CoapTransport, Device, DeviceClass, DeviceError,
    Event, HostSender, PluginEvent, PluginRunner, SetupError, SetupStatus, StateType,
    TransportError, TransportEvent, UdpTransport, UdpTransportConfig, UdpTransportFactory,
};
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use url::Url;

const LINKS: &[u8] = br#"</obs>;rt="time",</test>;ct=0"#;

/// Loopback CoAP server serving the resources the client plugin expects.
async fn spawn_fake_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        let mut next_message_id = 0x4000u16;
        loop {
            let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
            let request = Packet::from_bytes(&buf[..n]).unwrap();
            if request.header.code == MessageClass::Empty {
                continue;
            }
            for reply in respond(&request, &mut next_message_id) {
                socket
                    .send_to(&reply.to_bytes().unwrap(), peer)
                    .await
                    .unwrap();
            }
        }
    });
    addr
}

/// Server that swallows everything.
async fn spawn_silent_server() -> (SocketAddr, UdpSocket) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    (socket.local_addr().unwrap(), socket)
}

fn respond(request: &Packet, next_message_id: &mut u16) -> Vec<Packet> {
    let path = request
        .get_option(CoapOption::UriPath)
        .map(|segments| {
            segments
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();
    let observe = request.get_observe_value().and_then(Result::ok);
    let method = request.header.code;

    match (method, path.as_str(), observe) {
        (MessageClass::Request(RequestType::Get), ".well-known/core", _) => {
            let mut reply = piggybacked(request, ResponseType::Content);
            reply.payload = LINKS.to_vec();
            vec![reply]
        }
        (MessageClass::Request(RequestType::Get), "obs", Some(0)) => {
            let mut ack = piggybacked(request, ResponseType::Content);
            ack.set_observe_value(1);
            ack.payload = b"t0".to_vec();

            let mut notification = Packet::new();
            notification.header.set_type(MessageType::NonConfirmable);
            notification.header.code = MessageClass::Response(ResponseType::Content);
            notification.header.message_id = *next_message_id;
            *next_message_id = next_message_id.wrapping_add(1);
            notification.set_token(request.get_token().to_vec());
            notification.set_observe_value(2);
            notification.payload = b"t1".to_vec();

            vec![ack, notification]
        }
        (MessageClass::Request(RequestType::Get), "obs", _) => {
            vec![piggybacked(request, ResponseType::Content)]
        }
        (MessageClass::Request(RequestType::Post), "test", _) => {
            if request.payload == b"fail" {
                vec![piggybacked(request, ResponseType::NotFound)]
            } else {
                vec![piggybacked(request, ResponseType::Created)]
            }
        }
        (_, "reset", _) => {
            let mut reset = Packet::new();
            reset.header.set_type(MessageType::Reset);
            reset.header.code = MessageClass::Empty;
            reset.header.message_id = request.header.message_id;
            vec![reset]
        }
        _ => vec![piggybacked(request, ResponseType::NotFound)],
    }
}

fn piggybacked(request: &Packet, code: ResponseType) -> Packet {
    let mut reply = Packet::new();
    reply.header.set_type(MessageType::Acknowledgement);
    reply.header.code = MessageClass::Response(code);
    reply.header.message_id = request.header.message_id;
    reply.set_token(request.get_token().to_vec());
    reply
}

async fn next_event(host_rx: &mut UnboundedReceiver<PluginEvent>) -> PluginEvent {
    time::timeout(Duration::from_secs(5), host_rx.recv())
        .await
        .expect("timed out waiting for plugin event")
        .expect("host channel closed")
}

fn loopback_config() -> UdpTransportConfig {
    UdpTransportConfig::new("127.0.0.1:0".parse().unwrap())
}

#[tokio::test]
async fn test_client_against_fake_server() {
    env_logger::builder().is_test(true).try_init().ok();

    let server = spawn_fake_server().await;
    let (host, mut host_rx) = HostSender::channel();
    let factory = UdpTransportFactory::new(loopback_config());
    let (plugin, transport_rx) = CoapClientPlugin::new(factory, host);
    let (runner, handle) = PluginRunner::new(plugin, Some(transport_rx));
    let join = tokio::spawn(runner.run());

    let device = Device::new(DeviceClass::CoapClient, "fake server")
        .with_param("url", format!("coap://{server}"));
    assert_eq!(
        handle.setup_device(device.clone()).await.unwrap(),
        SetupStatus::Pending
    );
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::SetupFinished { result: Ok(()), .. }
    ));

    let enable = Action::new("notifications").with_param("notification", true);
    assert_eq!(
        handle
            .execute_action(device.clone(), enable.clone())
            .await
            .unwrap(),
        ActionStatus::Pending
    );
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::StateChanged {
            state: StateType::Notifications,
            value: ParamValue::Bool(true),
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::ActionFinished { action, result: Ok(()) } if action == enable.id()
    ));
    match next_event(&mut host_rx).await {
        PluginEvent::Emitted(Event::Time { device: id, time }) => {
            assert_eq!(id, device.id());
            assert_eq!(time, b"t1".to_vec());
        }
        other => panic!("expected notification, got {other:?}"),
    }

    let upload = Action::new("upload").with_param("message", "hello");
    handle
        .execute_action(device.clone(), upload.clone())
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::ActionFinished { action, result: Ok(()) } if action == upload.id()
    ));

    let rejected = Action::new("upload").with_param("message", "fail");
    handle
        .execute_action(device.clone(), rejected.clone())
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::ActionFinished { action, result: Err(DeviceError::HardwareFailure) }
            if action == rejected.id()
    ));

    let disable = Action::new("notifications").with_param("notification", false);
    handle
        .execute_action(device.clone(), disable.clone())
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::StateChanged {
            value: ParamValue::Bool(false),
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::ActionFinished { action, result: Ok(()) } if action == disable.id()
    ));

    handle.device_removed(device.clone()).await;
    assert_eq!(
        handle
            .execute_action(device, Action::new("upload").with_param("message", "x"))
            .await,
        Err(DeviceError::HardwareNotAvailable)
    );

    drop(handle);
    let plugin = join.await.unwrap().unwrap();
    assert_eq!(plugin.pending_requests(), 0);
    assert!(!plugin.has_transport());
}

#[tokio::test]
async fn test_discovery_times_out() {
    let (server, _socket) = spawn_silent_server().await;
    let (host, mut host_rx) = HostSender::channel();
    let config = loopback_config()
        .set_response_timeout(Duration::from_millis(200))
        .unwrap();
    let (plugin, transport_rx) = CoapClientPlugin::new(UdpTransportFactory::new(config), host);
    let (runner, handle) = PluginRunner::new(plugin, Some(transport_rx));
    tokio::spawn(runner.run());

    let device = Device::new(DeviceClass::CoapClient, "silent")
        .with_param("url", format!("coap://{server}"));
    handle.setup_device(device.clone()).await.unwrap();

    assert!(matches!(
        next_event(&mut host_rx).await,
        PluginEvent::SetupFinished {
            result: Err(SetupError::Discovery(CompletionError::Transport(
                TransportError::Timeout(_)
            ))),
            ..
        }
    ));

    // The failed session is gone, so a second attempt is accepted.
    assert_eq!(
        handle.setup_device(device).await.unwrap(),
        SetupStatus::Pending
    );
}

#[tokio::test]
async fn test_transport_reports_reset() {
    let server = spawn_fake_server().await;
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut transport = UdpTransport::bind(loopback_config(), events_tx).unwrap();

    let url = Url::parse(&format!("coap://{server}/reset")).unwrap();
    let id = transport.get(&url).unwrap();

    let event = time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        TransportEvent::Completed {
            id: completed,
            result: Err(TransportError::Reset),
        } => assert_eq!(completed, id),
        other => panic!("expected reset, got {other:?}"),
    }
    transport.release(id);
}

async fn recv_packet(socket: &UdpSocket) -> (Packet, SocketAddr) {
    let mut buf = [0u8; 1500];
    let (n, peer) = time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for the client")
        .unwrap();
    (Packet::from_bytes(&buf[..n]).unwrap(), peer)
}

async fn next_transport_event(events_rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport channel closed")
}

fn observe_ack(request: &Packet) -> Packet {
    let mut ack = piggybacked(request, ResponseType::Content);
    ack.set_observe_value(1);
    ack
}

#[tokio::test]
async fn test_reregistration_reuses_token() {
    let (server, socket) = spawn_silent_server().await;
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut transport = UdpTransport::bind(loopback_config(), events_tx).unwrap();
    let url = Url::parse(&format!("coap://{server}/obs")).unwrap();

    let first = transport.enable_notifications(&url).unwrap();
    let (register, client) = recv_packet(&socket).await;
    socket
        .send_to(&observe_ack(&register).to_bytes().unwrap(), client)
        .await
        .unwrap();
    assert!(matches!(
        next_transport_event(&mut events_rx).await,
        TransportEvent::Completed { id, result: Ok(_) } if id == first
    ));
    transport.release(first);

    transport.enable_notifications(&url).unwrap();
    let (refresh, _) = recv_packet(&socket).await;
    assert_eq!(refresh.get_token(), register.get_token());
}

#[tokio::test]
async fn test_cancelled_observation_stays_quiet() {
    let (server, socket) = spawn_silent_server().await;
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut transport = UdpTransport::bind(loopback_config(), events_tx).unwrap();
    let url = Url::parse(&format!("coap://{server}/obs")).unwrap();

    // Both registrations are in flight before either is acknowledged.
    transport.enable_notifications(&url).unwrap();
    transport.enable_notifications(&url).unwrap();
    let (older, client) = recv_packet(&socket).await;
    let (newer, _) = recv_packet(&socket).await;
    assert_ne!(older.get_token(), newer.get_token());
    for register in [&older, &newer] {
        socket
            .send_to(&observe_ack(register).to_bytes().unwrap(), client)
            .await
            .unwrap();
    }
    for _ in 0..2 {
        match next_transport_event(&mut events_rx).await {
            TransportEvent::Completed { id, result: Ok(_) } => transport.release(id),
            other => panic!("expected registration, got {other:?}"),
        }
    }

    let disable = transport.disable_notifications(&url).unwrap();
    let (cancel, _) = recv_packet(&socket).await;
    assert_eq!(cancel.get_token(), newer.get_token());
    assert_eq!(cancel.get_observe_value().unwrap().unwrap(), 1);
    socket
        .send_to(
            &piggybacked(&cancel, ResponseType::Content).to_bytes().unwrap(),
            client,
        )
        .await
        .unwrap();
    assert!(matches!(
        next_transport_event(&mut events_rx).await,
        TransportEvent::Completed { id, result: Ok(_) } if id == disable
    ));
    transport.release(disable);

    // Commands are handled in order, so once this arrives the release above has been applied.
    let ping = Url::parse(&format!("coap://{server}/ping")).unwrap();
    transport.get(&ping).unwrap();
    recv_packet(&socket).await;

    for (i, register) in [&older, &newer].into_iter().enumerate() {
        let mut late = Packet::new();
        late.header.set_type(MessageType::NonConfirmable);
        late.header.code = MessageClass::Response(ResponseType::Content);
        late.header.message_id = 0x7000 + i as u16;
        late.set_token(register.get_token().to_vec());
        late.set_observe_value(5);
        late.payload = b"late".to_vec();
        socket
            .send_to(&late.to_bytes().unwrap(), client)
            .await
            .unwrap();

        let (reply, _) = recv_packet(&socket).await;
        assert_eq!(reply.header.get_type(), MessageType::Reset);
        assert_eq!(reply.header.message_id, late.header.message_id);
    }

    assert!(
        time::timeout(Duration::from_millis(200), events_rx.recv())
            .await
            .is_err(),
        "no notification may be delivered after cancelling"
    );
}

#[tokio::test]
async fn test_name_lookup_does_not_block_other_requests() {
    let (server, socket) = spawn_silent_server().await;
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut transport = UdpTransport::bind(loopback_config(), events_tx).unwrap();

    let by_name = Url::parse("coap://unresolvable.invalid/test").unwrap();
    let by_name_id = transport.get(&by_name).unwrap();
    let direct = Url::parse(&format!("coap://{server}/test")).unwrap();
    let direct_id = transport.get(&direct).unwrap();

    let (request, client) = recv_packet(&socket).await;
    socket
        .send_to(
            &piggybacked(&request, ResponseType::Content).to_bytes().unwrap(),
            client,
        )
        .await
        .unwrap();

    loop {
        match next_transport_event(&mut events_rx).await {
            TransportEvent::Completed { id, result } if id == direct_id => {
                assert!(result.is_ok());
                break;
            }
            TransportEvent::Completed { id, result } => {
                assert_eq!(id, by_name_id);
                assert!(result.is_err());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
