use std::time::Duration;
use tracing::{error, info, warn};
use powered_up::{LegoHub, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Powered UP Motor Control Example");
    info!("Searching for hubs...");

    let hub = match LegoHub::connect_first().await {
        Ok(hub) => {
            info!("Connected to: {}", hub.info().name);
            hub
        }
        Err(e) => {
            error!("Failed to connect to hub: {}", e);
            return Err(e);
        }
    };

    info!("  Address:  {}", hub.address().await);
    info!("  Firmware: {}", hub.firmware().await);
    info!("  Hardware: {}", hub.hardware().await);
    info!("  Battery:  {}%", hub.battery().await);

    match hub.wait_for_attached_motor("B").await {
        Some(motor) => {
            info!("Running motor on port B");
            motor.set_power(50)?;
            info!("Waiting 3 seconds");
            hub.wait(Duration::from_secs(3)).await;
            info!("Done waiting");
            motor.brake()?;
        }
        None => warn!("No motor attached to port B"),
    }

    hub.disconnect().await?;
    info!("Disconnected");

    Ok(())
}
