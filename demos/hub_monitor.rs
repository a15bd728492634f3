use tracing::{error, info};
use powered_up::{ButtonState, HubEvent, LegoHub, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Powered UP Hub Monitor Example");

    let hub = match LegoHub::connect_first().await {
        Ok(hub) => hub,
        Err(e) => {
            error!("Failed to connect to hub: {}", e);
            return Err(e);
        }
    };

    info!("Connected to {} ({})", hub.info().name, hub.hub_type().await);
    for device in hub.attached_devices().await {
        info!("  Port {}: {}", device.port_id(), device.device_type());
    }

    info!("Press the hub button to stop monitoring");
    let mut events = hub.subscribe();
    while let Ok(event) = events.recv().await {
        match event {
            HubEvent::DeviceAttached(device) => {
                info!("Attached {} on port {}", device.device_type(), device.port_id());
            }
            HubEvent::DeviceDetached(device) => {
                info!("Detached {} from port {}", device.device_type(), device.port_id());
            }
            HubEvent::BatteryLevel(level) => info!("Battery: {level}%"),
            HubEvent::Button(state) => {
                info!("Button: {state:?}");
                if state == ButtonState::Pressed {
                    break;
                }
            }
            HubEvent::Disconnected => {
                info!("Hub disconnected");
                return Ok(());
            }
            HubEvent::Ready | HubEvent::PowerChanged { .. } => {}
        }
    }

    hub.disconnect().await
}
