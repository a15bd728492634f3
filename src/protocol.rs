//! LEGO Wireless Protocol framing and codes.
//!
//! Every message on the hub characteristic is a frame:
//!
//! ```text
//! +--------+----------+---------+----------------------+
//! | length | reserved | command | command payload ...  |
//! +--------+----------+---------+----------------------+
//! ```
//!
//! `length` is a single unsigned byte counting the whole frame, header
//! included. `reserved` is the hub id and always `0x00`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::error::{HubError, Result};

/// Size of the outbound envelope (length byte and reserved byte)
pub const ENVELOPE_SIZE: usize = 2;

/// Offset of the command byte in a frame
pub const COMMAND_OFFSET: usize = 2;

/// Largest frame a single length byte can describe
pub const MAX_FRAME_SIZE: usize = u8::MAX as usize;

/// Message types carried in the command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Hub property report or response
    HubProperties = 0x01,
    /// Hub action (disconnect, switch off)
    HubActions = 0x02,
    /// Attach, detach and virtual port events
    HubAttachedIo = 0x04,
    /// Port information request
    PortInformationRequest = 0x21,
    /// Port mode information request
    PortModeInformationRequest = 0x22,
    /// Port information response
    PortInformation = 0x43,
    /// Port mode information response
    PortModeInformation = 0x44,
    /// Single sensor value
    PortValueSingle = 0x45,
    /// Port output command
    PortOutputCommand = 0x81,
    /// Port output command feedback
    PortOutputCommandFeedback = 0x82,
}

impl MessageType {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::HubProperties),
            0x02 => Some(Self::HubActions),
            0x04 => Some(Self::HubAttachedIo),
            0x21 => Some(Self::PortInformationRequest),
            0x22 => Some(Self::PortModeInformationRequest),
            0x43 => Some(Self::PortInformation),
            0x44 => Some(Self::PortModeInformation),
            0x45 => Some(Self::PortValueSingle),
            0x81 => Some(Self::PortOutputCommand),
            0x82 => Some(Self::PortOutputCommandFeedback),
            _ => None,
        }
    }
}

/// Hub property ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubProperty {
    /// Button state
    Button = 0x02,
    /// Firmware version
    FirmwareVersion = 0x03,
    /// Hardware version
    HardwareVersion = 0x04,
    /// Signal strength
    Rssi = 0x05,
    /// Battery level in percent
    BatteryVoltage = 0x06,
    /// Primary MAC address
    PrimaryMacAddress = 0x0D,
}

impl HubProperty {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(Self::Button),
            0x03 => Some(Self::FirmwareVersion),
            0x04 => Some(Self::HardwareVersion),
            0x05 => Some(Self::Rssi),
            0x06 => Some(Self::BatteryVoltage),
            0x0D => Some(Self::PrimaryMacAddress),
            _ => None,
        }
    }
}

/// Hub property operation: enable periodic reports
pub const PROPERTY_ENABLE_UPDATES: u8 = 0x02;
/// Hub property operation: request the current value once
pub const PROPERTY_REQUEST_UPDATE: u8 = 0x05;

/// Hub action: disconnect
pub const ACTION_DISCONNECT: u8 = 0x01;

/// Port information type: mode list
pub const PORT_INFO_MODE_INFO: u8 = 0x01;
/// Port information type: possible mode combinations
pub const PORT_INFO_MODE_COMBINATIONS: u8 = 0x02;

/// Output command startup/completion flags: execute immediately, request feedback
pub const OUTPUT_STARTUP_FLAGS: u8 = 0x11;
/// Output sub-command: write direct mode data
pub const OUTPUT_WRITE_DIRECT_MODE_DATA: u8 = 0x51;

/// Port attachment events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PortEvent {
    /// A device was removed
    Detached = 0x00,
    /// A device was plugged in
    Attached = 0x01,
    /// The hub combined two ports into a virtual port
    AttachedVirtual = 0x02,
}

impl PortEvent {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Detached),
            0x01 => Some(Self::Attached),
            0x02 => Some(Self::AttachedVirtual),
            _ => None,
        }
    }
}

/// Accumulates notification chunks into complete frames.
///
/// Chunks carry no alignment guarantee: one chunk may hold a partial frame,
/// one frame, or several frames back to back.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Append received bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame off the head of the buffer.
    ///
    /// Returns `None` while the declared length exceeds what is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let len = usize::from(*self.buffer.first()?);
            if len == 0 {
                // A zero length never advances the stream.
                warn!("Discarding zero-length frame header");
                self.buffer.advance(1);
                continue;
            }
            if len > self.buffer.len() {
                return None;
            }
            return Some(self.buffer.split_to(len).freeze());
        }
    }

    /// Append `data` and hand every frame it completes to `on_frame`, in
    /// arrival order, before looking at the following bytes.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(Bytes)) {
        self.push(data);
        while let Some(frame) = self.next_frame() {
            on_frame(frame);
        }
    }

    /// Number of bytes waiting for the rest of their frame
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received frame
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Outbound commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the hub to drop the connection
    Disconnect,
    /// Request the current value of a hub property
    RequestHubProperty(HubProperty),
    /// Subscribe to reports of a hub property
    SubscribeHubProperty(HubProperty),
    /// Request port information of one type
    PortInformationRequest {
        /// Port id
        port: u8,
        /// Information type
        info_type: u8,
    },
    /// Request information about one mode of a port
    ModeInformationRequest {
        /// Port id
        port: u8,
        /// Mode number
        mode: u8,
        /// Information type
        info_type: u8,
    },
    /// Write raw mode data to the device attached at a port
    WriteDirect {
        /// Port id
        port_id: u8,
        /// Device mode
        mode: u8,
        /// Mode data
        payload: Vec<u8>,
    },
}

impl Command {
    /// The two requests sent for a port: mode list, then mode combinations
    #[must_use]
    pub const fn port_information_requests(port: u8) -> [Self; 2] {
        [
            Self::PortInformationRequest {
                port,
                info_type: PORT_INFO_MODE_INFO,
            },
            Self::PortInformationRequest {
                port,
                info_type: PORT_INFO_MODE_COMBINATIONS,
            },
        ]
    }

    /// Command bytes without the envelope
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        match self {
            Self::Disconnect => vec![MessageType::HubActions as u8, ACTION_DISCONNECT],
            Self::RequestHubProperty(property) => vec![
                MessageType::HubProperties as u8,
                *property as u8,
                PROPERTY_REQUEST_UPDATE,
            ],
            Self::SubscribeHubProperty(property) => vec![
                MessageType::HubProperties as u8,
                *property as u8,
                PROPERTY_ENABLE_UPDATES,
            ],
            Self::PortInformationRequest { port, info_type } => {
                vec![MessageType::PortInformationRequest as u8, *port, *info_type]
            }
            Self::ModeInformationRequest {
                port,
                mode,
                info_type,
            } => vec![
                MessageType::PortModeInformationRequest as u8,
                *port,
                *mode,
                *info_type,
            ],
            Self::WriteDirect {
                port_id,
                mode,
                payload,
            } => {
                let mut body = Vec::with_capacity(payload.len() + 5);
                body.extend_from_slice(&[
                    MessageType::PortOutputCommand as u8,
                    *port_id,
                    OUTPUT_STARTUP_FLAGS,
                    OUTPUT_WRITE_DIRECT_MODE_DATA,
                    *mode,
                ]);
                body.extend_from_slice(payload);
                body
            }
        }
    }

    /// Serialize the command into a complete frame
    ///
    /// # Errors
    ///
    /// Returns [`HubError::FrameTooLong`] if the frame exceeds 255 bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        encode_frame(&self.body())
    }
}

/// Prefix command bytes with the length and reserved bytes
///
/// # Errors
///
/// Returns [`HubError::FrameTooLong`] if the frame exceeds 255 bytes.
pub fn encode_frame(body: &[u8]) -> Result<Bytes> {
    let len = body.len() + ENVELOPE_SIZE;
    let len_byte = u8::try_from(len).map_err(|_| HubError::FrameTooLong { len })?;

    let mut buf = BytesMut::with_capacity(len);
    buf.put_u8(len_byte);
    buf.put_u8(0x00);
    buf.extend_from_slice(body);
    Ok(buf.freeze())
}

/// Decode a 4 byte version field into `major.minor.bugfix.build`.
///
/// The field is a little-endian Int32 in BCD: the top nibble is the major
/// version, the next nibble the minor, the next byte the bugfix number and
/// the low 16 bits the build number.
#[must_use]
pub fn decode_version(bytes: &[u8]) -> Option<String> {
    let mut raw = bytes.get(..4)?;
    let value = raw.get_u32_le();
    Some(format!(
        "{:x}.{:x}.{:02x}.{:04x}",
        value >> 28,
        (value >> 24) & 0x0F,
        (value >> 16) & 0xFF,
        value & 0xFFFF
    ))
}

/// Whether `frame` is the hub disconnect action. Nothing may be written to
/// the hub after it.
#[must_use]
pub fn is_disconnect_frame(frame: &[u8]) -> bool {
    frame.get(COMMAND_OFFSET..) == Some(&[MessageType::HubActions as u8, ACTION_DISCONNECT][..])
}

/// Format raw bytes as colon separated lowercase hex octets
#[must_use]
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(assembler: &mut FrameAssembler, data: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        assembler.feed(data, |frame| frames.push(frame));
        frames
    }

    #[test]
    fn test_assembler_batched_frames() {
        let mut assembler = FrameAssembler::new();
        let data = [
            0x06, 0x00, 0x01, 0x06, 0x06, 0x64, // battery report
            0x05, 0x00, 0x04, 0x00, 0x00, // detach port 0
        ];
        let frames = collect(&mut assembler, &data);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &data[..6]);
        assert_eq!(&frames[1][..], &data[6..]);
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn test_assembler_waits_for_partial_frame() {
        let mut assembler = FrameAssembler::new();
        assert!(collect(&mut assembler, &[0x06, 0x00, 0x01]).is_empty());
        assert_eq!(assembler.buffered_len(), 3);

        let frames = collect(&mut assembler, &[0x06, 0x06, 0x64, 0x05]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x06, 0x00, 0x01, 0x06, 0x06, 0x64]);
        assert_eq!(assembler.buffered_len(), 1);
    }

    #[test]
    fn test_assembler_chunk_boundary_independence() {
        let data = [
            0x09, 0x00, 0x01, 0x03, 0x06, 0x02, 0x00, 0x00, 0x10, // firmware
            0x0F, 0x00, 0x04, 0x00, 0x01, 0x27, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, // attach
            0x05, 0x00, 0x04, 0x00, 0x00, // detach
        ];

        let expected = collect(&mut FrameAssembler::new(), &data);
        assert_eq!(expected.len(), 3);

        for chunk_size in 1..data.len() {
            let mut assembler = FrameAssembler::new();
            let mut frames = Vec::new();
            for chunk in data.chunks(chunk_size) {
                assembler.feed(chunk, |frame| frames.push(frame));
            }
            assert_eq!(frames, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_assembler_frame_length_matches_slice() {
        let mut assembler = FrameAssembler::new();
        let data = [0x03, 0x00, 0x45, 0x04, 0x00, 0x82, 0x00];
        for frame in collect(&mut assembler, &data) {
            assert_eq!(usize::from(frame[0]), frame.len());
        }
    }

    #[test]
    fn test_assembler_skips_zero_length() {
        let mut assembler = FrameAssembler::new();
        let frames = collect(&mut assembler, &[0x00, 0x00, 0x05, 0x00, 0x04, 0x00, 0x00]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x05, 0x00, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_disconnect() {
        let bytes = Command::Disconnect.to_bytes().unwrap();
        assert_eq!(&bytes[..], &[0x04, 0x00, 0x02, 0x01]);
    }

    #[test]
    fn test_encode_hub_property_commands() {
        let request = Command::RequestHubProperty(HubProperty::FirmwareVersion)
            .to_bytes()
            .unwrap();
        assert_eq!(&request[..], &[0x05, 0x00, 0x01, 0x03, 0x05]);

        let subscribe = Command::SubscribeHubProperty(HubProperty::BatteryVoltage)
            .to_bytes()
            .unwrap();
        assert_eq!(&subscribe[..], &[0x05, 0x00, 0x01, 0x06, 0x02]);
    }

    #[test]
    fn test_encode_port_information_requests() {
        let [modes, combinations] = Command::port_information_requests(0x32);
        assert_eq!(&modes.to_bytes().unwrap()[..], &[0x05, 0x00, 0x21, 0x32, 0x01]);
        assert_eq!(
            &combinations.to_bytes().unwrap()[..],
            &[0x05, 0x00, 0x21, 0x32, 0x02]
        );
    }

    #[test]
    fn test_encode_mode_information_request() {
        let command = Command::ModeInformationRequest {
            port: 0x01,
            mode: 0x00,
            info_type: 0x80,
        };
        assert_eq!(
            &command.to_bytes().unwrap()[..],
            &[0x06, 0x00, 0x22, 0x01, 0x00, 0x80]
        );
    }

    #[test]
    fn test_encode_write_direct_header() {
        let payload = vec![0x32, 0x10, 0x00];
        let command = Command::WriteDirect {
            port_id: 0x02,
            mode: 0x00,
            payload: payload.clone(),
        };

        assert_eq!(command.body().len(), payload.len() + 5);

        let bytes = command.to_bytes().unwrap();
        assert_eq!(usize::from(bytes[0]), payload.len() + 5 + ENVELOPE_SIZE);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[COMMAND_OFFSET], 0x81);
        assert_eq!(bytes[3], 0x02);
        assert_eq!(&bytes[4..7], &[0x11, 0x51, 0x00]);
        assert_eq!(&bytes[7..], &payload[..]);
    }

    #[test]
    fn test_encode_frame_too_long() {
        let body = vec![0u8; MAX_FRAME_SIZE];
        assert!(matches!(
            encode_frame(&body),
            Err(HubError::FrameTooLong { len: 257 })
        ));
        assert!(encode_frame(&body[..MAX_FRAME_SIZE - ENVELOPE_SIZE]).is_ok());
    }

    #[test]
    fn test_decode_version() {
        assert_eq!(
            decode_version(&[0x02, 0x00, 0x00, 0x10]).as_deref(),
            Some("1.0.00.0002")
        );
        assert_eq!(
            decode_version(&[0x17, 0x00, 0x00, 0x20]).as_deref(),
            Some("2.0.00.0017")
        );
        assert_eq!(decode_version(&[0x02, 0x00, 0x00]), None);
    }

    #[test]
    fn test_is_disconnect_frame() {
        let frame = Command::Disconnect.to_bytes().unwrap();
        assert!(is_disconnect_frame(&frame));

        let request = Command::RequestHubProperty(HubProperty::Button)
            .to_bytes()
            .unwrap();
        assert!(!is_disconnect_frame(&request));
        assert!(!is_disconnect_frame(&[0x05, 0x00, 0x02, 0x01, 0x00]));
        assert!(!is_disconnect_frame(&[0x04, 0x00]));
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(
            format_mac(&[0x00, 0x16, 0x53, 0xA1, 0xB2, 0xC3]),
            "00:16:53:a1:b2:c3"
        );
        assert_eq!(format_mac(&[]), "");
    }

    #[test]
    fn test_message_type_from_u8() {
        assert_eq!(MessageType::from_u8(0x04), Some(MessageType::HubAttachedIo));
        assert_eq!(MessageType::from_u8(0x99), None);
        assert_eq!(HubProperty::from_u8(0x0D), Some(HubProperty::PrimaryMacAddress));
        assert_eq!(PortEvent::from_u8(0x03), None);
    }
}
