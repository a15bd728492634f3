use bytes::Bytes;
use std::sync::{
    atomic::{AtomicBool, AtomicI8, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::{
    error::{HubError, Result},
    protocol::Command,
    types::{DeviceType, HubEvent},
};

/// Motor power that stops the motor and lets it coast
pub const MOTOR_STOP: i8 = 0;

/// Motor power sentinel that actively holds the motor in place
pub const MOTOR_BRAKE: i8 = 127;

/// Highest power magnitude accepted by motors
pub const MOTOR_MAX_POWER: i32 = 100;

/// Map a requested power level onto the byte motors accept.
///
/// [`MOTOR_BRAKE`] passes through untouched; anything else is clamped to
/// `-100..=100`, negative values meaning reverse.
#[must_use]
pub fn map_power(power: i32) -> i8 {
    if power == i32::from(MOTOR_BRAKE) {
        return MOTOR_BRAKE;
    }
    let clamped = power.clamp(-MOTOR_MAX_POWER, MOTOR_MAX_POWER);
    i8::try_from(clamped).unwrap_or(MOTOR_STOP)
}

/// Outbound side of one hub connection.
///
/// Attached devices hold a clone so they can issue commands and notify
/// listeners without a reference back to the hub.
#[derive(Debug, Clone)]
pub struct HubLink {
    commands: mpsc::UnboundedSender<Bytes>,
    events: broadcast::Sender<HubEvent>,
}

impl HubLink {
    /// Create a link from the outbound command queue and the event channel
    #[must_use]
    pub const fn new(
        commands: mpsc::UnboundedSender<Bytes>,
        events: broadcast::Sender<HubEvent>,
    ) -> Self {
        Self { commands, events }
    }

    /// Frame a command and queue it for the transport
    ///
    /// # Errors
    ///
    /// Returns [`HubError::FrameTooLong`] if the command does not fit a frame,
    /// or [`HubError::Disconnected`] once the transport side is gone.
    pub fn send(&self, command: &Command) -> Result<()> {
        let data = command.to_bytes()?;
        debug!("Queueing command: {:02X?}", &data[..]);
        self.commands
            .send(data)
            .map_err(|_| HubError::Disconnected)
    }

    /// Publish an event to every current subscriber
    pub fn notify(&self, event: HubEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Subscribe to events published after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }
}

/// State carried by a motor
#[derive(Debug, Default)]
pub struct MotorState {
    power: AtomicI8,
}

/// Device specializations
#[derive(Debug)]
pub enum DeviceKind {
    /// Any device without a dedicated model
    Generic,
    /// A motor accepting power commands
    Motor(MotorState),
}

/// A device plugged into (or virtually combined onto) a hub port
#[derive(Debug)]
pub struct AttachedDevice {
    type_code: u16,
    port_id: u8,
    attached: AtomicBool,
    kind: DeviceKind,
    link: HubLink,
}

impl AttachedDevice {
    /// Build the record for a device type code reported at `port_id`
    #[must_use]
    pub fn new(type_code: u16, port_id: u8, link: HubLink) -> Self {
        let kind = match DeviceType::from_code(type_code) {
            Some(device_type) if device_type.is_motor() => DeviceKind::Motor(MotorState::default()),
            _ => DeviceKind::Generic,
        };
        Self {
            type_code,
            port_id,
            attached: AtomicBool::new(true),
            kind,
            link,
        }
    }

    /// Device type, `Unknown` for codes outside the known table
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        DeviceType::from_code(self.type_code).unwrap_or(DeviceType::Unknown)
    }

    /// Raw device type code as reported by the hub
    #[must_use]
    pub const fn type_code(&self) -> u16 {
        self.type_code
    }

    /// Port the device is attached to
    #[must_use]
    pub const fn port_id(&self) -> u8 {
        self.port_id
    }

    /// Specialization of this device
    #[must_use]
    pub const fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    /// Whether the device is still attached
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Whether the device is a motor
    #[must_use]
    pub const fn is_motor(&self) -> bool {
        matches!(self.kind, DeviceKind::Motor(_))
    }

    /// Whether the device is a sensor.
    ///
    /// Sensor values are not decoded, so no record carries the sensor
    /// capability.
    #[must_use]
    pub const fn is_sensor(&self) -> bool {
        false
    }

    /// Drop the connection to the port. The device stays physically
    /// attached until removed.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Write raw data to one mode of this device
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn write_direct(&self, mode: u8, data: &[u8]) -> Result<()> {
        self.link.send(&Command::WriteDirect {
            port_id: self.port_id,
            mode,
            payload: data.to_vec(),
        })
    }

    /// Motor handle for this device, if it is a motor
    #[must_use]
    pub fn as_motor(self: &Arc<Self>) -> Option<Motor> {
        self.is_motor().then(|| Motor {
            device: Arc::clone(self),
        })
    }
}

/// Handle to an attached motor
#[derive(Debug, Clone)]
pub struct Motor {
    device: Arc<AttachedDevice>,
}

impl Motor {
    /// The underlying attached device
    #[must_use]
    pub const fn device(&self) -> &Arc<AttachedDevice> {
        &self.device
    }

    /// Port the motor is attached to
    #[must_use]
    pub fn port_id(&self) -> u8 {
        self.device.port_id()
    }

    /// Last power level set
    #[must_use]
    pub fn power(&self) -> i8 {
        match &self.device.kind {
            DeviceKind::Motor(state) => state.power.load(Ordering::Acquire),
            DeviceKind::Generic => MOTOR_STOP,
        }
    }

    /// Set the motor power, see [`map_power`] for the accepted range.
    ///
    /// The stored power and [`HubEvent::PowerChanged`] only change once the
    /// command was queued.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn set_power(&self, power: i32) -> Result<()> {
        let DeviceKind::Motor(state) = &self.device.kind else {
            return Err(HubError::InvalidParameters(format!(
                "device on port {} is not a motor",
                self.port_id()
            )));
        };

        let power = map_power(power);
        self.device.write_direct(0x00, &power.to_le_bytes())?;

        state.power.store(power, Ordering::Release);
        debug!(port_id = self.port_id(), power, "Motor power set");
        self.device.link.notify(HubEvent::PowerChanged {
            port_id: self.port_id(),
            power,
        });
        Ok(())
    }

    /// Stop the motor and let it coast
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn stop(&self) -> Result<()> {
        self.set_power(i32::from(MOTOR_STOP))
    }

    /// Brake the motor
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Disconnected`] if the hub link is gone.
    pub fn brake(&self) -> Result<()> {
        self.set_power(i32::from(MOTOR_BRAKE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_link() -> (
        HubLink,
        mpsc::UnboundedReceiver<Bytes>,
        broadcast::Receiver<HubEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(16);
        (HubLink::new(command_tx, event_tx), command_rx, event_rx)
    }

    #[test]
    fn test_map_power() {
        assert_eq!(map_power(50), 50);
        assert_eq!(map_power(-50), -50);
        assert_eq!(map_power(150), 100);
        assert_eq!(map_power(-150), -100);
        assert_eq!(map_power(127), MOTOR_BRAKE);
        assert_eq!(map_power(0), MOTOR_STOP);
        assert_eq!(map_power(i32::MAX), 100);
    }

    #[test]
    fn test_motor_record_capabilities() {
        let (link, _commands, _events) = test_link();
        let device = Arc::new(AttachedDevice::new(39, 0x00, link));

        assert_eq!(device.device_type(), DeviceType::MoveHubMediumLinearMotor);
        assert!(device.is_motor());
        assert!(!device.is_sensor());
        assert!(device.is_attached());
        assert!(device.as_motor().is_some());
    }

    #[test]
    fn test_generic_record_capabilities() {
        let (link, _commands, _events) = test_link();
        let device = Arc::new(AttachedDevice::new(23, 0x32, link.clone()));
        assert!(!device.is_motor());
        assert!(!device.is_sensor());
        assert!(device.as_motor().is_none());

        let unknown = AttachedDevice::new(999, 0x01, link);
        assert_eq!(unknown.device_type(), DeviceType::Unknown);
        assert_eq!(unknown.type_code(), 999);
        assert!(matches!(unknown.kind(), DeviceKind::Generic));
    }

    #[test]
    fn test_set_power_clamps_and_writes_once() {
        let (link, mut commands, mut events) = test_link();
        let motor = Arc::new(AttachedDevice::new(39, 0x01, link))
            .as_motor()
            .unwrap();

        motor.set_power(150).unwrap();

        assert_eq!(motor.power(), 100);
        let frame = commands.try_recv().unwrap();
        assert_eq!(&frame[..], &[0x08, 0x00, 0x81, 0x01, 0x11, 0x51, 0x00, 100]);
        assert!(commands.try_recv().is_err());

        match events.try_recv().unwrap() {
            HubEvent::PowerChanged { port_id, power } => {
                assert_eq!(port_id, 0x01);
                assert_eq!(power, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reverse_power_encoding() {
        let (link, mut commands, _events) = test_link();
        let motor = Arc::new(AttachedDevice::new(38, 0x00, link))
            .as_motor()
            .unwrap();

        motor.set_power(-100).unwrap();
        let frame = commands.try_recv().unwrap();
        assert_eq!(frame[7], 0x9C);
    }

    #[test]
    fn test_stop_and_brake() {
        let (link, mut commands, _events) = test_link();
        let motor = Arc::new(AttachedDevice::new(39, 0x00, link))
            .as_motor()
            .unwrap();

        motor.brake().unwrap();
        assert_eq!(motor.power(), MOTOR_BRAKE);
        assert_eq!(commands.try_recv().unwrap()[7], 127);

        motor.stop().unwrap();
        assert_eq!(motor.power(), MOTOR_STOP);
        assert_eq!(commands.try_recv().unwrap()[7], 0);
    }

    #[test]
    fn test_write_after_link_closed() {
        let (link, commands, mut events) = test_link();
        drop(commands);
        let motor = Arc::new(AttachedDevice::new(39, 0x00, link))
            .as_motor()
            .unwrap();
        assert!(matches!(motor.set_power(10), Err(HubError::Disconnected)));

        assert_eq!(motor.power(), MOTOR_STOP);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_detach_clears_flag() {
        let (link, _commands, _events) = test_link();
        let device = AttachedDevice::new(1, 0x02, link);
        device.detach();
        assert!(!device.is_attached());
    }
}
