#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Powered UP
//!
//! A Rust library for controlling LEGO Powered UP hubs (BOOST Move Hub and
//! Technic Hub) via Bluetooth Low Energy.
//!
//! The hub speaks the LEGO Wireless Protocol over a single GATT
//! characteristic. This library covers:
//!
//! - **Framing**: reassembly of length-prefixed frames from notification chunks
//! - **Hub properties**: firmware and hardware versions, battery, RSSI, button, MAC
//! - **Port events**: attach and detach of physical and virtual ports
//! - **Devices**: a registry of attached devices, with motors driven by power level
//! - **Waiting**: awaiting a device on a named port without stalling frame processing
//!
//! ## Quick Start
//!
//! ```no_run
//! use powered_up::LegoHub;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to the nearest hub
//!     let hub = LegoHub::connect_first().await?;
//!
//!     // Drive the motor on port A for two seconds
//!     if let Some(motor) = hub.wait_for_attached_motor("A").await {
//!         motor.set_power(60)?;
//!         hub.wait(Duration::from_secs(2)).await;
//!         motor.stop()?;
//!     }
//!
//!     hub.disconnect().await?;
//!     Ok(())
//! }
//! ```

/// Attached devices and motors
pub mod attached;
/// Bluetooth Low Energy communication module
pub mod ble;
/// Main hub control interface
pub mod device;
/// Error types and handling
pub mod error;
/// Hub state and inbound message decoding
pub mod hub;
/// Protocol framing and command encoding
pub mod protocol;
/// Port names and attached device registry
pub mod registry;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use attached::{AttachedDevice, HubLink, Motor};
pub use ble::Transport;
pub use device::LegoHub;
pub use error::{HubError, Result};
pub use hub::HubState;
pub use protocol::{Command, FrameAssembler};
pub use registry::PortRegistry;
pub use types::{
    ButtonState, ConnectionParams, DeviceType, HubEvent, HubInfo, HubType, TimeoutConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// LEGO Wireless Protocol hub service UUID
///
/// Every Powered UP hub advertises this service; it is also the scan filter.
pub const LPF2_SERVICE_UUID: &str = "00001623-1212-efde-1623-785feabcd123";

/// LEGO Wireless Protocol characteristic UUID
///
/// Carries both directions: commands are written to it and hub messages
/// arrive as notifications on it.
pub const LPF2_CHARACTERISTIC_UUID: &str = "00001624-1212-efde-1623-785feabcd123";

/// LEGO manufacturer ID in BLE advertisement data
///
/// The manufacturer data under this ID carries the hub system type used to
/// tell hub families apart.
pub const LEGO_MANUFACTURER_ID: u16 = 0x0397;
