use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::time::Duration;

use crate::config::settings::ParityConfig;
use crate::utils::error::{ConfigError, TransportError};

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Line speeds the slave firmware is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B9600,
    B115200,
}

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            9600 => Ok(BaudRate::B9600),
            115_200 => Ok(BaudRate::B115200),
            other => Err(ConfigError::UnsupportedBaudRate(other)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> Self {
        baud.as_u32()
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Settings for one connection attempt. Data bits (8) and stop bits (1) are
/// fixed by the slave firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub port: String,
    pub baud_rate: BaudRate,
    pub parity: ParityConfig,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(port: impl Into<String>, baud_rate: BaudRate) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            parity: ParityConfig::None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// An open serial handle. Dropping or closing it releases the OS port.
pub trait SerialLink: Send {
    /// One physical transmission of the whole frame, no retries.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens links and enumerates ports on the host platform.
pub trait PortDriver: Send + Sync {
    fn list_ports(&self) -> Result<Vec<String>, TransportError>;

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialLink>, TransportError>;
}

/// `PortDriver` backed by the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortDriver;

impl PortDriver for SerialPortDriver {
    fn list_ports(&self) -> Result<Vec<String>, TransportError> {
        let mut names: Vec<String> = serialport::available_ports()?
            .into_iter()
            .map(|info| info.port_name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialLink>, TransportError> {
        info!("🔌 Opening serial port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, {:?} parity, 8 data bits, 1 stop bit",
            config.baud_rate, config.parity
        );

        let serial_parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(config.port.as_str(), config.baud_rate.as_u32())
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.write_timeout())
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                open_error(&config.port, e)
            })?;

        Ok(Box::new(SerialPortLink {
            port: Some(port),
            port_name: config.port.clone(),
            write_timeout_ms: config.write_timeout_ms,
        }))
    }
}

fn open_error(port: &str, err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::InvalidInput => TransportError::InvalidConfig(err.description),
        _ => TransportError::PortUnavailable {
            port: port.to_string(),
            reason: err.description,
        },
    }
}

fn write_error(err: std::io::Error, timeout_ms: u64) -> TransportError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::WriteTimeout { timeout_ms },
        ErrorKind::BrokenPipe | ErrorKind::NotConnected => TransportError::Disconnected,
        _ => TransportError::from(err),
    }
}

pub struct SerialPortLink {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    write_timeout_ms: u64,
}

impl SerialLink for SerialPortLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let timeout_ms = self.write_timeout_ms;
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;

        port.write_all(frame)
            .map_err(|e| write_error(e, timeout_ms))?;
        port.flush().map_err(|e| write_error(e, timeout_ms))?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port {} released", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory link that records every frame it is asked to send.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockState {
        ports: Vec<String>,
        open_error: Option<TransportError>,
        write_errors: VecDeque<TransportError>,
        frames: Vec<Vec<u8>>,
        opened: usize,
        closed: usize,
        writes_after_close: usize,
        notifier: Option<mpsc::UnboundedSender<Vec<u8>>>,
    }

    #[derive(Clone, Default)]
    pub struct MockDriver {
        state: Arc<Mutex<MockState>>,
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every successfully written frame is also pushed to the returned receiver.
        pub fn with_notifier() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
            let driver = Self::new();
            let (tx, rx) = mpsc::unbounded_channel();
            driver.state.lock().unwrap().notifier = Some(tx);
            (driver, rx)
        }

        pub fn set_ports(&self, ports: &[&str]) {
            self.state.lock().unwrap().ports = ports.iter().map(|p| p.to_string()).collect();
        }

        pub fn fail_open(&self, err: TransportError) {
            self.state.lock().unwrap().open_error = Some(err);
        }

        pub fn fail_next_write(&self, err: TransportError) {
            self.state.lock().unwrap().write_errors.push_back(err);
        }

        pub fn frames(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().frames.clone()
        }

        pub fn opened(&self) -> usize {
            self.state.lock().unwrap().opened
        }

        pub fn closed(&self) -> usize {
            self.state.lock().unwrap().closed
        }

        pub fn writes_after_close(&self) -> usize {
            self.state.lock().unwrap().writes_after_close
        }
    }

    impl PortDriver for MockDriver {
        fn list_ports(&self) -> Result<Vec<String>, TransportError> {
            Ok(self.state.lock().unwrap().ports.clone())
        }

        fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn SerialLink>, TransportError> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.open_error.clone() {
                return Err(err);
            }
            state.opened += 1;
            Ok(Box::new(MockLink {
                state: Arc::clone(&self.state),
                open: true,
            }))
        }
    }

    pub struct MockLink {
        state: Arc<Mutex<MockState>>,
        open: bool,
    }

    impl SerialLink for MockLink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            if !self.open {
                state.writes_after_close += 1;
                return Err(TransportError::Disconnected);
            }
            if let Some(err) = state.write_errors.pop_front() {
                return Err(err);
            }
            state.frames.push(frame.to_vec());
            if let Some(tx) = &state.notifier {
                let _ = tx.send(frame.to_vec());
            }
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.state.lock().unwrap().closed += 1;
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }
}
