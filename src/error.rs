use thiserror::Error;

/// Errors that can occur when working with Powered UP hubs
#[derive(Error, Debug)]
pub enum HubError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Hub not found during scanning
    #[error("Powered UP hub not found")]
    HubNotFound,

    /// Hub connection failed
    #[error("Failed to connect to hub: {0}")]
    ConnectionFailed(String),

    /// The hub link is gone, outbound commands can no longer be delivered
    #[error("Hub disconnected")]
    Disconnected,

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Invalid command parameters
    #[error("Invalid command parameters: {0}")]
    InvalidParameters(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Outbound frame does not fit the single length byte
    #[error("Frame of {len} bytes exceeds the 255 byte limit")]
    FrameTooLong {
        /// Total length the frame would have had
        len: usize,
    },
}

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::Disconnected | Self::HubNotFound
        )
    }

    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::InvalidParameters(_) | Self::FrameTooLong { .. }
        )
    }
}
