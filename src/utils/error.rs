use thiserror::Error;

/// Failures of the serial link itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Port unavailable: {port}: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("Invalid serial configuration: {0}")]
    InvalidConfig(String),

    #[error("Write timed out after {timeout_ms} ms")]
    WriteTimeout { timeout_ms: u64 },

    #[error("Serial link is closed")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(String),
}

/// Inbound frame validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("CRC mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    CrcMismatch { calculated: u16, received: u16 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MasterError {
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected to RS485")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No slave bound to label '{0}'")]
    UnknownLabel(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported baud rate {0} (expected 9600 or 115200)")]
    UnsupportedBaudRate(u32),

    #[error("Invalid slave address {0} (must be 1-247)")]
    InvalidSlaveAddress(u8),

    #[error("Duplicate slave address {0}")]
    DuplicateSlave(u8),

    #[error("Light output is disabled (set enabled = true in the config)")]
    Disabled,

    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::InvalidInput => TransportError::InvalidConfig(err.description),
            _ => TransportError::Io(err.description),
        }
    }
}
