use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, mpsc, watch, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    attached::{AttachedDevice, HubLink, Motor},
    ble::{BleManager, Transport},
    error::{HubError, Result},
    hub::HubState,
    protocol::{is_disconnect_frame, Command, FrameAssembler, HubProperty},
    types::{ButtonState, ConnectionParams, HubEvent, HubInfo, HubType, TimeoutConfig},
};

/// Property requests sent once the hub characteristic is ready
const STARTUP_COMMANDS: [Command; 6] = [
    Command::SubscribeHubProperty(HubProperty::Button),
    Command::RequestHubProperty(HubProperty::FirmwareVersion),
    Command::RequestHubProperty(HubProperty::HardwareVersion),
    Command::SubscribeHubProperty(HubProperty::Rssi),
    Command::SubscribeHubProperty(HubProperty::BatteryVoltage),
    Command::RequestHubProperty(HubProperty::PrimaryMacAddress),
];

/// Main interface to one connected Powered UP hub
///
/// `LegoHub` owns the per-hub event loop: notification chunks from the
/// transport are assembled into frames and dispatched strictly in arrival
/// order, and every resulting [`HubEvent`] is published on a broadcast
/// channel in that same order. Outbound commands, from the hub itself or
/// from attached devices, are queued and written by a separate task.
///
/// # Examples
///
/// ```no_run
/// use powered_up::LegoHub;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hub = LegoHub::connect_first().await?;
///     println!("Firmware: {}", hub.firmware().await);
///
///     if let Some(motor) = hub.wait_for_attached_motor("B").await {
///         motor.set_power(50)?;
///         hub.wait(Duration::from_secs(3)).await;
///         motor.brake()?;
///     }
///
///     hub.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct LegoHub {
    info: HubInfo,
    state: Arc<RwLock<HubState>>,
    link: HubLink,
    transport: Arc<dyn Transport>,
    ready: watch::Receiver<bool>,
    flushed: watch::Receiver<bool>,
    timeout_config: TimeoutConfig,
    inbound_task: JoinHandle<()>,
    outbound_task: JoinHandle<()>,
    ready_task: JoinHandle<()>,
}

impl LegoHub {
    /// Connect to the hub with the strongest signal, with default settings
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubNotFound`] if no hub is found during the scan,
    /// or any connection error from the underlying transport.
    pub async fn connect_first() -> Result<Self> {
        Self::connect_first_with_params(ConnectionParams::default(), TimeoutConfig::default())
            .await
    }

    /// Connect to the hub with the strongest signal
    ///
    /// # Errors
    ///
    /// Returns [`HubError::HubNotFound`] if no hub is found during the scan,
    /// or any connection error from the underlying transport.
    pub async fn connect_first_with_params(
        params: ConnectionParams,
        timeout_config: TimeoutConfig,
    ) -> Result<Self> {
        let ble_manager = BleManager::new().await?;
        let hub_info = ble_manager
            .scan_for_hubs(&params)
            .await?
            .into_iter()
            .max_by_key(|info| info.rssi)
            .ok_or(HubError::HubNotFound)?;

        Self::connect_with_manager(&ble_manager, hub_info, params, timeout_config).await
    }

    /// Connect to a specific hub using an existing scanner
    ///
    /// Returns once the startup property requests were answered or the
    /// ready delay elapsed.
    ///
    /// # Errors
    ///
    /// Returns any connection error from the underlying transport.
    pub async fn connect_with_manager(
        ble_manager: &BleManager,
        hub_info: HubInfo,
        params: ConnectionParams,
        timeout_config: TimeoutConfig,
    ) -> Result<Self> {
        let connection = ble_manager.connect_to_hub(&hub_info, &params).await?;
        let hub = Self::from_transport(hub_info, Arc::new(connection), &params, timeout_config)
            .await?;
        hub.wait_ready().await;
        Ok(hub)
    }

    /// Start the event loop over an already connected transport.
    ///
    /// Sends the startup property requests and returns immediately; the
    /// [`HubEvent::Ready`] event follows after `params.ready_delay_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot provide its notification
    /// stream.
    pub async fn from_transport(
        info: HubInfo,
        transport: Arc<dyn Transport>,
        params: &ConnectionParams,
        timeout_config: TimeoutConfig,
    ) -> Result<Self> {
        let notifications = transport.notifications().await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(params.event_capacity.max(1));
        let link = HubLink::new(command_tx, event_tx);
        let state = Arc::new(RwLock::new(HubState::new(
            info.name.clone(),
            info.hub_type,
            link.clone(),
        )));

        let inbound_task = tokio::spawn(run_inbound(
            notifications,
            Arc::clone(&state),
            link.clone(),
        ));
        let (flushed_tx, flushed) = watch::channel(false);
        let outbound_task = tokio::spawn(run_outbound(
            command_rx,
            Arc::clone(&transport),
            flushed_tx,
        ));

        for command in &STARTUP_COMMANDS {
            link.send(command)?;
        }

        let (ready_tx, ready) = watch::channel(false);
        let ready_delay = Duration::from_millis(params.ready_delay_ms);
        let ready_link = link.clone();
        let ready_task = tokio::spawn(async move {
            tokio::time::sleep(ready_delay).await;
            let _ = ready_tx.send(true);
            ready_link.notify(HubEvent::Ready);
        });

        info!("Hub \"{}\" ({}) event loop started", info.name, info.hub_type);

        Ok(Self {
            info,
            state,
            link,
            transport,
            ready,
            flushed,
            timeout_config,
            inbound_task,
            outbound_task,
            ready_task,
        })
    }

    /// Wait until the hub has emitted [`HubEvent::Ready`]
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.clone();
        // The sender only goes away after signalling or when the hub is dropped.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Get hub information gathered while scanning
    #[must_use]
    pub const fn info(&self) -> &HubInfo {
        &self.info
    }

    /// Get the waiting helper timeouts
    #[must_use]
    pub const fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeout_config
    }

    /// Subscribe to hub events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.link.subscribe()
    }

    /// Hub name
    pub async fn name(&self) -> String {
        self.state.read().await.name().to_string()
    }

    /// Hub family
    pub async fn hub_type(&self) -> HubType {
        self.state.read().await.hub_type()
    }

    /// Firmware version
    pub async fn firmware(&self) -> String {
        self.state.read().await.firmware().to_string()
    }

    /// Hardware version
    pub async fn hardware(&self) -> String {
        self.state.read().await.hardware().to_string()
    }

    /// MAC address as reported by the hub
    pub async fn address(&self) -> String {
        self.state.read().await.address().to_string()
    }

    /// Battery level in percent
    pub async fn battery(&self) -> u8 {
        self.state.read().await.battery()
    }

    /// Signal strength
    pub async fn rssi(&self) -> i8 {
        self.state.read().await.rssi()
    }

    /// Last reported button state
    pub async fn button(&self) -> ButtonState {
        self.state.read().await.button()
    }

    /// Devices currently attached, in port order
    pub async fn attached_devices(&self) -> Vec<Arc<AttachedDevice>> {
        self.state.read().await.registry().devices().cloned().collect()
    }

    /// Device attached at a named port, without waiting
    pub async fn device_by_name(&self, name: &str) -> Option<Arc<AttachedDevice>> {
        self.state.read().await.registry().lookup_by_name(name)
    }

    /// Wait for a device to be attached at the port called `name`.
    ///
    /// Returns at once if one is already attached. Otherwise waits for a
    /// matching attach event until `timeout` (or the configured default)
    /// elapses or the hub disconnects. Frame processing continues while
    /// waiting.
    pub async fn wait_for_device_by_name(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Option<Arc<AttachedDevice>> {
        let timeout = timeout
            .unwrap_or_else(|| Duration::from_millis(self.timeout_config.wait_for_device_ms));

        // Subscribe before looking so an attach in between is not missed.
        let mut events = self.link.subscribe();
        if let Some(device) = self.device_by_name(name).await {
            return Some(device);
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(HubEvent::DeviceAttached(device)) => {
                        let state = self.state.read().await;
                        if state.registry().lookup_port_id_by_name(name) == Some(device.port_id()) {
                            return Some(device);
                        }
                    }
                    Ok(HubEvent::Disconnected) | Err(RecvError::Closed) => return None,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Missed {skipped} events while waiting for {name}");
                        if let Some(device) = self.device_by_name(name).await {
                            return Some(device);
                        }
                    }
                }
            }
        };

        let device = tokio::time::timeout(timeout, wait).await.ok().flatten();
        if device.is_none() {
            debug!("No device attached at {name} within {timeout:?}");
        }
        device
    }

    /// Wait for a motor to be attached at the port called `port`, using the
    /// configured timeout. A non-motor device yields `None`.
    pub async fn wait_for_attached_motor(&self, port: &str) -> Option<Motor> {
        self.wait_for_device_by_name(port, None)
            .await
            .and_then(|device| device.as_motor())
    }

    /// Suspend the caller for `duration` while frames keep being processed
    pub async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Request the mode list and mode combinations of a port
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn request_port_information(&self, port: u8) -> Result<()> {
        for command in &Command::port_information_requests(port) {
            self.link.send(command)?;
        }
        Ok(())
    }

    /// Request information about one mode of a port
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn request_mode_information(&self, port: u8, mode: u8, info_type: u8) -> Result<()> {
        self.link.send(&Command::ModeInformationRequest {
            port,
            mode,
            info_type,
        })
    }

    /// Ask the hub to disconnect and drop the transport.
    ///
    /// The disconnect command is queued behind every command sent before
    /// it; the transport is only dropped once the queue is written out.
    /// Commands sent afterwards fail with [`HubError::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the transport disconnect fails.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from hub \"{}\"", self.info.name);
        self.ready_task.abort();

        let queued = match self.link.send(&Command::Disconnect) {
            Ok(()) => true,
            Err(e) if e.is_connection_error() => {
                debug!("Command queue already closed");
                false
            }
            Err(e) => return Err(e),
        };

        let mut flushed = self.flushed.clone();
        // The writer also counts as flushed once it is gone.
        let _ = flushed.wait_for(|flushed| *flushed).await;

        self.transport.disconnect().await?;

        if queued && !self.inbound_task.is_finished() {
            self.inbound_task.abort();
            self.link.notify(HubEvent::Disconnected);
        }
        Ok(())
    }
}

impl Drop for LegoHub {
    fn drop(&mut self) {
        self.inbound_task.abort();
        self.outbound_task.abort();
        self.ready_task.abort();
    }
}

/// Assemble notification chunks into frames and dispatch them in order
async fn run_inbound(
    mut notifications: BoxStream<'static, Vec<u8>>,
    state: Arc<RwLock<HubState>>,
    link: HubLink,
) {
    let mut assembler = FrameAssembler::new();

    while let Some(chunk) = notifications.next().await {
        let mut hub = state.write().await;
        assembler.feed(&chunk, |frame| {
            debug!("Received frame: {:02X?}", &frame[..]);
            hub.dispatch(&frame);
        });
    }

    info!("Hub notification stream ended");
    link.notify(HubEvent::Disconnected);
}

/// Write queued commands to the transport in queue order, up to and
/// including the disconnect command
async fn run_outbound(
    mut commands: mpsc::UnboundedReceiver<Bytes>,
    transport: Arc<dyn Transport>,
    flushed: watch::Sender<bool>,
) {
    while let Some(data) = commands.recv().await {
        if let Err(e) = transport.write(&data).await {
            warn!("Failed to write command {:02X?}: {e}", &data[..]);
        }
        if is_disconnect_frame(&data) {
            break;
        }
    }

    commands.close();
    let _ = flushed.send(true);
}
