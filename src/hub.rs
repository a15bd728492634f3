use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    attached::{AttachedDevice, HubLink},
    protocol::{decode_version, format_mac, HubProperty, MessageType, PortEvent, COMMAND_OFFSET},
    registry::PortRegistry,
    types::{ButtonState, HubEvent, HubType},
};

/// Version string reported before the hub answers
pub const DEFAULT_VERSION: &str = "0.0.00.0000";

/// Address reported before the hub answers
pub const DEFAULT_ADDRESS: &str = "00:00:00:00:00:00";

/// Battery level assumed before the first report
pub const DEFAULT_BATTERY: u8 = 100;

/// Signal strength assumed before the first report
pub const DEFAULT_RSSI: i8 = -60;

const PROPERTY_ID_OFFSET: usize = 3;
const PROPERTY_PAYLOAD_OFFSET: usize = 5;
const PORT_ID_OFFSET: usize = 3;
const PORT_EVENT_OFFSET: usize = 4;
const DEVICE_TYPE_OFFSET: usize = 5;
const VIRTUAL_FIRST_PORT_OFFSET: usize = 7;
const VIRTUAL_SECOND_PORT_OFFSET: usize = 8;

/// Protocol state of one connected hub.
///
/// Every inbound frame goes through [`HubState::dispatch`]; it is the only
/// path that mutates the hub attributes and the port registry. Frames that
/// are too short for the fields they should carry are dropped.
#[derive(Debug)]
pub struct HubState {
    name: String,
    hub_type: HubType,
    firmware: String,
    hardware: String,
    address: String,
    battery: u8,
    rssi: i8,
    button: ButtonState,
    registry: PortRegistry,
    link: HubLink,
}

impl HubState {
    /// Fresh state for a hub of `hub_type`
    #[must_use]
    pub fn new(name: impl Into<String>, hub_type: HubType, link: HubLink) -> Self {
        Self {
            name: name.into(),
            hub_type,
            firmware: DEFAULT_VERSION.to_string(),
            hardware: DEFAULT_VERSION.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            battery: DEFAULT_BATTERY,
            rssi: DEFAULT_RSSI,
            button: ButtonState::Released,
            registry: PortRegistry::new(hub_type),
            link,
        }
    }

    /// Hub name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hub family
    #[must_use]
    pub const fn hub_type(&self) -> HubType {
        self.hub_type
    }

    /// Firmware version, `major.minor.bugfix.build`
    #[must_use]
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Hardware version, `major.minor.bugfix.build`
    #[must_use]
    pub fn hardware(&self) -> &str {
        &self.hardware
    }

    /// MAC address as reported by the hub
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Battery level in percent
    #[must_use]
    pub const fn battery(&self) -> u8 {
        self.battery
    }

    /// Signal strength
    #[must_use]
    pub const fn rssi(&self) -> i8 {
        self.rssi
    }

    /// Last reported button state
    #[must_use]
    pub const fn button(&self) -> ButtonState {
        self.button
    }

    /// Ports and attached devices
    #[must_use]
    pub const fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    /// Outbound link of this hub
    #[must_use]
    pub const fn link(&self) -> &HubLink {
        &self.link
    }

    /// Route one complete frame to its decoder. Unknown message types are
    /// ignored.
    pub fn dispatch(&mut self, frame: &[u8]) {
        let Some(&command) = frame.get(COMMAND_OFFSET) else {
            return;
        };

        match MessageType::from_u8(command) {
            Some(MessageType::HubProperties) => self.parse_hub_property_response(frame),
            Some(MessageType::HubAttachedIo) => self.parse_port_message(frame),
            Some(MessageType::PortInformation) => Self::parse_port_information_response(frame),
            Some(MessageType::PortModeInformation) => {
                Self::parse_mode_information_response(frame);
            }
            Some(MessageType::PortValueSingle) => Self::parse_sensor_message(frame),
            Some(MessageType::PortOutputCommandFeedback) => Self::parse_port_action(frame),
            _ => {}
        }
    }

    fn parse_hub_property_response(&mut self, frame: &[u8]) {
        let Some(property) = frame
            .get(PROPERTY_ID_OFFSET)
            .and_then(|&id| HubProperty::from_u8(id))
        else {
            return;
        };
        let payload = frame.get(PROPERTY_PAYLOAD_OFFSET..).unwrap_or_default();

        match property {
            HubProperty::Button => {
                if let Some(state) = payload.first().and_then(|&v| ButtonState::from_report(v)) {
                    self.button = state;
                    self.link.notify(HubEvent::Button(state));
                }
            }
            HubProperty::FirmwareVersion => {
                if let Some(version) = decode_version(payload) {
                    debug!("Firmware version: {version}");
                    self.firmware = version;
                }
            }
            HubProperty::HardwareVersion => {
                if let Some(version) = decode_version(payload) {
                    debug!("Hardware version: {version}");
                    self.hardware = version;
                }
            }
            HubProperty::Rssi => {
                // A zero reading cannot be told apart from a failed decode
                // and never updates the stored value.
                if let Some(rssi) = decode_rssi(payload).filter(|&rssi| rssi != 0) {
                    self.rssi = rssi;
                }
            }
            HubProperty::PrimaryMacAddress => {
                self.address = format_mac(payload);
            }
            HubProperty::BatteryVoltage => {
                if let Some(&battery) = payload.first() {
                    if battery != self.battery {
                        debug!("Battery level: {battery}%");
                        self.battery = battery;
                        self.link.notify(HubEvent::BatteryLevel(battery));
                    }
                }
            }
        }
    }

    fn parse_port_message(&mut self, frame: &[u8]) {
        let (Some(&port_id), Some(&event)) =
            (frame.get(PORT_ID_OFFSET), frame.get(PORT_EVENT_OFFSET))
        else {
            return;
        };

        match PortEvent::from_u8(event) {
            Some(PortEvent::Detached) => {
                if let Some(device) = self.registry.unregister(port_id) {
                    info!(
                        "Device {} detached from port {port_id}",
                        device.device_type()
                    );
                    self.link.notify(HubEvent::DeviceDetached(device));
                }
            }
            Some(PortEvent::Attached) => {
                if let Some(type_code) = device_type_code(frame) {
                    self.attach_device(port_id, type_code);
                }
            }
            Some(PortEvent::AttachedVirtual) => {
                let (Some(type_code), Some(&first), Some(&second)) = (
                    device_type_code(frame),
                    frame.get(VIRTUAL_FIRST_PORT_OFFSET),
                    frame.get(VIRTUAL_SECOND_PORT_OFFSET),
                ) else {
                    return;
                };
                let name = self.registry.add_virtual_port(port_id, first, second);
                debug!("Virtual port {name:?} created as {port_id}");
                self.attach_device(port_id, type_code);
            }
            None => {}
        }
    }

    fn attach_device(&mut self, port_id: u8, type_code: u16) {
        let device = Arc::new(AttachedDevice::new(type_code, port_id, self.link.clone()));
        if self.registry.register(Arc::clone(&device)) {
            info!(
                "Device {} attached to port {port_id}",
                device.device_type()
            );
            self.link.notify(HubEvent::DeviceAttached(device));
        }
    }

    fn parse_port_information_response(frame: &[u8]) {
        let (Some(&port_id), Some(&info_type)) = (frame.get(3), frame.get(4)) else {
            return;
        };
        if info_type == 2 {
            return;
        }
        if let Some(&mode_count) = frame.get(6) {
            debug!("Port {port_id} information: {mode_count} modes {frame:02X?}");
        }
    }

    fn parse_mode_information_response(frame: &[u8]) {
        debug!("Mode information: {frame:02X?}");
    }

    fn parse_sensor_message(frame: &[u8]) {
        if let Some(port_id) = frame.get(3) {
            debug!("Sensor message for port {port_id}");
        }
    }

    fn parse_port_action(frame: &[u8]) {
        if let Some(port_id) = frame.get(3) {
            debug!("Port action for port {port_id}");
        }
    }
}

/// Device type id of an attach event, low byte first
fn device_type_code(frame: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = frame
        .get(DEVICE_TYPE_OFFSET..DEVICE_TYPE_OFFSET + 2)?
        .try_into()
        .ok()?;
    Some(u16::from_le_bytes(bytes))
}

/// Up to two RSSI payload bytes read big-endian; values that do not fit a
/// signed 16 bit number are rejected, the low byte is the reading.
fn decode_rssi(payload: &[u8]) -> Option<i8> {
    let bytes = payload.get(..2).or_else(|| payload.get(..1))?;
    let value = bytes
        .iter()
        .fold(0u16, |acc, &b| (acc << 8) | u16::from(b));
    let value = i16::try_from(value).ok()?;
    Some(i8::from_le_bytes([value.to_le_bytes()[0]]))
}
