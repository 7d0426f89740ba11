use anyhow::Context;
use coap_device_plugins::{
    Action, CoapClientPlugin, Device, DeviceClass, HostSender, PluginEvent, PluginRunner,
    UdpTransportConfig, UdpTransportFactory,
};
use log::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "coap://127.0.0.1:5683".to_string());

    let (host, mut host_rx) = HostSender::channel();
    let factory = UdpTransportFactory::new(UdpTransportConfig::default());
    let (plugin, transport_rx) = CoapClientPlugin::new(factory, host);
    let (runner, handle) = PluginRunner::new(plugin, Some(transport_rx));
    let runner = tokio::spawn(runner.run());

    let device = Device::new(DeviceClass::CoapClient, "demo").with_param("url", url.as_str());
    handle
        .setup_device(device.clone())
        .await
        .with_context(|| format!("Setting up {url}"))?;

    loop {
        tokio::select! {
            event = host_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    PluginEvent::SetupFinished { result: Ok(()), .. } => {
                        info!("{url} is ready, enabling notifications");
                        let enable = Action::new("notifications").with_param("notification", true);
                        handle.execute_action(device.clone(), enable).await?;
                        let upload = Action::new("upload").with_param("message", "hello from rust");
                        handle.execute_action(device.clone(), upload).await?;
                    }
                    PluginEvent::SetupFinished { result: Err(e), .. } => {
                        warn!("Setup failed: {e}");
                        break;
                    }
                    other => info!("{other:?}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.device_removed(device).await;
    drop(handle);
    runner.await??;
    Ok(())
}
