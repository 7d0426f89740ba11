use futures::future;
use log::{debug, trace, warn};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver};
use tokio::sync::oneshot;

use crate::device::{Action, Device, DeviceError, SetupError};
use crate::plugin::{ActionStatus, DevicePlugin, SetupStatus};

const COMMAND_CHANNEL_SIZE: usize = 32;

#[derive(Debug)]
enum Command {
    Setup {
        device: Device,
        reply_tx: oneshot::Sender<Result<SetupStatus, SetupError>>,
    },
    Execute {
        device: Device,
        action: Action,
        reply_tx: oneshot::Sender<Result<ActionStatus, DeviceError>>,
    },
    Remove {
        device: Device,
        reply_tx: oneshot::Sender<()>,
    },
}

/// Single logical actor for one plugin instance.  Host commands and the plugin's internal events
/// are processed strictly one at a time so the plugin never sees concurrent mutation.
pub struct PluginRunner<P: DevicePlugin> {
    plugin: P,
    commands_rx: Receiver<Command>,
    internal_rx: Option<UnboundedReceiver<P::InternalEvent>>,
}

/// Cheaply cloneable front end used by the host to talk to a running [`PluginRunner`].
#[derive(Debug, Clone)]
pub struct PluginHandle {
    commands_tx: Sender<Command>,
}

impl<P: DevicePlugin> PluginRunner<P> {
    pub fn new(
        plugin: P,
        internal_rx: Option<UnboundedReceiver<P::InternalEvent>>,
    ) -> (Self, PluginHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let runner = Self {
            plugin,
            commands_rx,
            internal_rx,
        };
        (runner, PluginHandle { commands_tx })
    }

    /// Run until every [`PluginHandle`] has been dropped, then hand the plugin back.
    pub async fn run(mut self) -> Result<P, FatalPluginError> {
        let name = self.plugin.name();
        debug!("Plugin {name} running");
        loop {
            // Completions already queued are applied before the next host command.
            tokio::select! {
                biased;

                event = recv_internal(&mut self.internal_rx) => {
                    match event {
                        Some(event) => {
                            trace!("Plugin {name} internal event: {event:?}");
                            self.plugin.handle_internal_event(event);
                        }
                        None => {
                            warn!("Internal event source of plugin {name} closed");
                            return Err(FatalPluginError::InternalEventsClosed(name));
                        }
                    }
                }
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
            }
        }
        debug!("Plugin {name} stopped");
        Ok(self.plugin)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Setup { device, reply_tx } => {
                let _ = reply_tx.send(self.plugin.setup_device(&device));
            }
            Command::Execute {
                device,
                action,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.plugin.execute_action(&device, &action));
            }
            Command::Remove { device, reply_tx } => {
                self.plugin.device_removed(&device);
                let _ = reply_tx.send(());
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FatalPluginError {
    /// Outstanding operations of the plugin can no longer complete.
    #[error("internal event source of plugin {0} closed")]
    InternalEventsClosed(&'static str),
}

async fn recv_internal<E>(internal_rx: &mut Option<UnboundedReceiver<E>>) -> Option<E> {
    match internal_rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

impl PluginHandle {
    pub async fn setup_device(&self, device: Device) -> Result<SetupStatus, SetupError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(Command::Setup { device, reply_tx })
            .await
            .map_err(|_| SetupError::PluginUnavailable)?;
        reply_rx.await.map_err(|_| SetupError::PluginUnavailable)?
    }

    pub async fn execute_action(
        &self,
        device: Device,
        action: Action,
    ) -> Result<ActionStatus, DeviceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(Command::Execute {
                device,
                action,
                reply_tx,
            })
            .await
            .map_err(|_| DeviceError::HardwareNotAvailable)?;
        reply_rx
            .await
            .map_err(|_| DeviceError::HardwareNotAvailable)?
    }

    /// Inform the plugin that `device` was removed.  Returns once the plugin has processed it.
    pub async fn device_removed(&self, device: Device) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands_tx
            .send(Command::Remove { device, reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}
