use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::attached::AttachedDevice;

/// Hub family, as advertised in the BLE manufacturer data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubType {
    /// Not a recognized hub
    Unknown = 0,
    /// LEGO Boost Move hub
    Boost = 2,
    /// LEGO Technic Control+ hub
    Technic = 6,
}

impl HubType {
    /// System type byte of a Boost Move hub advertisement
    pub const MOVE_HUB_SYSTEM_ID: u8 = 0x40;
    /// System type byte of a Technic hub advertisement
    pub const TECHNIC_HUB_SYSTEM_ID: u8 = 0x80;

    /// Classify a hub from its manufacturer-specific advertisement payload.
    ///
    /// The payload excludes the company identifier; byte 1 is the system type.
    #[must_use]
    pub fn from_manufacturer_data(data: &[u8]) -> Self {
        match data.get(1) {
            Some(&Self::MOVE_HUB_SYSTEM_ID) => Self::Boost,
            Some(&Self::TECHNIC_HUB_SYSTEM_ID) => Self::Technic,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for HubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Boost => write!(f, "Boost Move Hub"),
            Self::Technic => write!(f, "Technic Hub"),
        }
    }
}

/// Hub button state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonState {
    /// Button released
    Released = 0,
    /// Up button (remote controls)
    Up = 1,
    /// Button pressed
    Pressed = 2,
    /// Stop button (remote controls)
    Stop = 127,
    /// Down button (remote controls)
    Down = 255,
}

impl ButtonState {
    /// Map the payload byte of a button report.
    ///
    /// Hubs only report 1 (pressed) and 0 (released); other values are not
    /// a recognized state.
    #[must_use]
    pub const fn from_report(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Released),
            1 => Some(Self::Pressed),
            _ => None,
        }
    }
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Released => write!(f, "Released"),
            Self::Up => write!(f, "Up"),
            Self::Pressed => write!(f, "Pressed"),
            Self::Stop => write!(f, "Stop"),
            Self::Down => write!(f, "Down"),
        }
    }
}

/// Kind of device reported in an attach event.
///
/// The numeric values are the IO type ids sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum DeviceType {
    /// Not a recognized device
    Unknown = 0,
    /// Powered UP medium linear motor
    SimpleMediumLinearMotor = 1,
    /// Powered UP train motor
    TrainMotor = 2,
    /// Powered UP lights
    Light = 8,
    /// Hub internal voltage sensor
    VoltageSensor = 20,
    /// Hub internal current sensor
    CurrentSensor = 21,
    /// Hub internal piezo buzzer
    PiezoBuzzer = 22,
    /// Hub RGB LED
    HubLed = 23,
    /// WeDo 2.0 tilt sensor
    TiltSensor = 34,
    /// WeDo 2.0 motion sensor
    MotionSensor = 35,
    /// Boost color and distance sensor
    ColorDistanceSensor = 37,
    /// Boost interactive medium linear motor
    MediumLinearMotor = 38,
    /// Built-in motor of the Boost Move hub
    MoveHubMediumLinearMotor = 39,
    /// Built-in tilt sensor of the Boost Move hub
    MoveHubTiltSensor = 40,
    /// Duplo train base motor
    DuploTrainMotor = 41,
    /// Duplo train base speaker
    DuploTrainSpeaker = 42,
    /// Duplo train base color sensor
    DuploTrainColorSensor = 43,
    /// Duplo train base speedometer
    DuploTrainSpeedometer = 44,
    /// Technic Control+ large linear motor
    TechnicLargeLinearMotor = 46,
    /// Technic Control+ extra large linear motor
    TechnicXLargeLinearMotor = 47,
    /// Spike Prime medium angular motor
    SpikePrimeMediumAngularMotor = 48,
    /// Spike Prime large angular motor
    SpikePrimeLargeAngularMotor = 49,
    /// Technic hub gesture sensor
    TechnicMediumHubGestSensor = 54,
    /// Remote control button
    RemoteControlButton = 55,
    /// Remote control signal strength
    RemoteControlRssi = 56,
    /// Technic hub accelerometer
    TechnicMediumHubAccelerometer = 57,
    /// Technic hub gyro sensor
    TechnicMediumHubGyroSensor = 58,
    /// Technic hub tilt sensor
    TechnicMediumHubTiltSensor = 59,
    /// Technic hub temperature sensor
    TechnicMediumHubTemperatureSensor = 60,
    /// Spike Prime color sensor
    SpikePrimeColorSensor = 61,
    /// Spike Prime distance sensor
    SpikePrimeDistanceSensor = 62,
    /// Spike Prime force sensor
    SpikePrimeForceSensor = 63,
    /// Technic Control+ medium angular motor
    TechnicMediumAngularMotor = 75,
    /// Technic Control+ large angular motor
    TechnicLargeAngularMotor = 76,
}

impl DeviceType {
    /// Convert from the wire code
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::SimpleMediumLinearMotor,
            2 => Self::TrainMotor,
            8 => Self::Light,
            20 => Self::VoltageSensor,
            21 => Self::CurrentSensor,
            22 => Self::PiezoBuzzer,
            23 => Self::HubLed,
            34 => Self::TiltSensor,
            35 => Self::MotionSensor,
            37 => Self::ColorDistanceSensor,
            38 => Self::MediumLinearMotor,
            39 => Self::MoveHubMediumLinearMotor,
            40 => Self::MoveHubTiltSensor,
            41 => Self::DuploTrainMotor,
            42 => Self::DuploTrainSpeaker,
            43 => Self::DuploTrainColorSensor,
            44 => Self::DuploTrainSpeedometer,
            46 => Self::TechnicLargeLinearMotor,
            47 => Self::TechnicXLargeLinearMotor,
            48 => Self::SpikePrimeMediumAngularMotor,
            49 => Self::SpikePrimeLargeAngularMotor,
            54 => Self::TechnicMediumHubGestSensor,
            55 => Self::RemoteControlButton,
            56 => Self::RemoteControlRssi,
            57 => Self::TechnicMediumHubAccelerometer,
            58 => Self::TechnicMediumHubGyroSensor,
            59 => Self::TechnicMediumHubTiltSensor,
            60 => Self::TechnicMediumHubTemperatureSensor,
            61 => Self::SpikePrimeColorSensor,
            62 => Self::SpikePrimeDistanceSensor,
            63 => Self::SpikePrimeForceSensor,
            75 => Self::TechnicMediumAngularMotor,
            76 => Self::TechnicLargeAngularMotor,
            _ => return None,
        })
    }

    /// Wire code of this device type
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether devices of this type accept motor power commands
    #[must_use]
    pub const fn is_motor(self) -> bool {
        matches!(
            self,
            Self::SimpleMediumLinearMotor
                | Self::TrainMotor
                | Self::MediumLinearMotor
                | Self::MoveHubMediumLinearMotor
                | Self::DuploTrainMotor
                | Self::TechnicLargeLinearMotor
                | Self::TechnicXLargeLinearMotor
                | Self::SpikePrimeMediumAngularMotor
                | Self::SpikePrimeLargeAngularMotor
                | Self::TechnicMediumAngularMotor
                | Self::TechnicLargeAngularMotor
        )
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Hub information gathered while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubInfo {
    /// Advertised hub name
    pub name: String,
    /// Bluetooth address as reported by the adapter
    pub address: String,
    /// Signal strength (RSSI) at scan time
    pub rssi: i16,
    /// Hub family
    pub hub_type: HubType,
}

impl HubInfo {
    /// Create new hub info
    #[must_use]
    pub fn new(name: impl Into<String>, hub_type: HubType) -> Self {
        Self {
            name: name.into(),
            address: String::new(),
            rssi: 0,
            hub_type,
        }
    }
}

/// Notification emitted by a hub, in the order the triggering frames arrived
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Startup property requests were sent and the settle delay elapsed
    Ready,
    /// The connection to the hub was dropped or lost
    Disconnected,
    /// The hub button changed state
    Button(ButtonState),
    /// The battery level changed
    BatteryLevel(u8),
    /// A device was attached to a port
    DeviceAttached(Arc<AttachedDevice>),
    /// A device was detached from a port
    DeviceDetached(Arc<AttachedDevice>),
    /// A motor power level was set
    PowerChanged {
        /// Port the motor is attached to
        port_id: u8,
        /// Power level after mapping
        power: i8,
    },
}

/// Connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
    /// Scan duration in milliseconds
    pub scan_timeout_ms: u64,
    /// Delay between the startup property requests and the `Ready` event
    pub ready_delay_ms: u64,
    /// Capacity of the per-hub event channel
    pub event_capacity: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            scan_timeout_ms: 5_000,
            ready_delay_ms: 400,
            event_capacity: 64,
        }
    }
}

/// Timeouts for the waiting helpers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Default timeout of `wait_for_device_by_name` in milliseconds
    pub wait_for_device_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wait_for_device_ms: 5_000,
        }
    }
}
