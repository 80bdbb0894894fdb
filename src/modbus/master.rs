use log::{debug, log, Level};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::events::{LogChannel, LogEvent};
use super::protocol::{CoilCommand, SlaveId};
use super::transport::{BaudRate, ConnectionConfig, PortDriver, SerialLink, SerialPortDriver};
use crate::config::settings::{find_slave_by_address, find_slave_by_label, Config, SlaveBinding};
use crate::utils::error::{MasterError, TransportError};

const EVENT_CAPACITY: usize = 256;

/// Log target used when mirroring events to the `log` facade.
pub const EVENT_LOG_TARGET: &str = "rs485_lights::events";

pub enum ConnectionState {
    Disconnected,
    Connected {
        config: ConnectionConfig,
        link: Box<dyn SerialLink>,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Result of switching several slaves in one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoilBatch {
    pub sent: usize,
    pub failed: Vec<(SlaveId, TransportError)>,
}

impl CoilBatch {
    pub fn first_error(&self) -> Option<&TransportError> {
        self.failed.first().map(|(_, e)| e)
    }
}

/// Modbus RTU master for the light actuators.
///
/// The serial link lives inside [`ConnectionState`] behind a single mutex and
/// never leaves this type. Every write happens with the lock held, so frames
/// are strictly serialized and a disconnect can never race a write onto a
/// released handle.
pub struct ModbusMaster {
    driver: Box<dyn PortDriver>,
    slaves: Vec<SlaveBinding>,
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<LogEvent>,
}

impl ModbusMaster {
    pub fn new(driver: Box<dyn PortDriver>, slaves: Vec<SlaveBinding>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            driver,
            slaves,
            state: Mutex::new(ConnectionState::Disconnected),
            events,
        }
    }

    /// Master on the host's serial ports, bound to the configured slaves.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Box::new(SerialPortDriver), config.slaves.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub fn slave_ids(&self) -> Vec<SlaveId> {
        self.slaves.iter().map(|s| s.address).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().is_connected()
    }

    pub fn connection_config(&self) -> Option<ConnectionConfig> {
        match &*self.lock_state() {
            ConnectionState::Connected { config, .. } => Some(config.clone()),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn list_ports(&self) -> Result<Vec<String>, MasterError> {
        match self.driver.list_ports() {
            Ok(ports) if ports.is_empty() => {
                self.emit(LogChannel::General, Level::Warn, "⚠ No serial ports found");
                Ok(ports)
            }
            Ok(ports) => {
                self.emit(
                    LogChannel::General,
                    Level::Info,
                    format!("🔌 Found: {}", ports.join(", ")),
                );
                Ok(ports)
            }
            Err(e) => {
                self.emit(
                    LogChannel::General,
                    Level::Error,
                    format!("❌ Port discovery failed: {}", e),
                );
                Err(e.into())
            }
        }
    }

    pub fn connect(&self, config: ConnectionConfig) -> Result<(), MasterError> {
        let mut state = self.lock_state();

        if state.is_connected() {
            self.emit(
                LogChannel::General,
                Level::Warn,
                format!("⚠ Already connected, ignoring connect to {}", config.port),
            );
            return Err(MasterError::AlreadyConnected);
        }

        let link = match self.driver.open(&config) {
            Ok(link) => link,
            Err(e) => {
                self.emit(
                    LogChannel::General,
                    Level::Error,
                    format!("❌ Failed to connect {}: {}", config.port, e),
                );
                return Err(e.into());
            }
        };

        self.emit(
            LogChannel::General,
            Level::Info,
            format!("🔗 RS485 connected on {}", config.port),
        );
        self.emit(
            LogChannel::ModbusTrace,
            Level::Info,
            format!("[CONNECTED] {} @ {}", config.port, config.baud_rate),
        );
        for slave in &self.slaves {
            self.emit(
                LogChannel::ModbusTrace,
                Level::Info,
                format!("Slave {}: {}", slave.address, slave.display_name()),
            );
        }

        *state = ConnectionState::Connected { config, link };
        Ok(())
    }

    /// [`connect`](Self::connect) with default timeouts and 8N1 framing.
    pub fn connect_port(&self, port: &str, baud_rate: BaudRate) -> Result<(), MasterError> {
        self.connect(ConnectionConfig::new(port, baud_rate))
    }

    /// Switches every bound light off, then releases the port. Coil-off
    /// failures are logged and dropped; the state always ends Disconnected.
    pub fn disconnect(&self) {
        let mut state = self.lock_state();
        let ConnectionState::Connected { config, mut link } =
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        else {
            return;
        };

        for slave in &self.slaves {
            let _ = self.write_coil(link.as_mut(), slave.address, false);
        }
        link.close();

        self.emit(
            LogChannel::General,
            Level::Info,
            format!("❌ RS485 disconnected from {}", config.port),
        );
    }

    /// Releases the port without touching the coils, so another process can
    /// take over the bus while the lights keep their state.
    pub fn release_port(&self) {
        let mut state = self.lock_state();
        let ConnectionState::Connected { config, mut link } =
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        else {
            return;
        };

        link.close();
        self.emit(
            LogChannel::General,
            Level::Info,
            format!("🔌 Released {} (lights left as they are)", config.port),
        );
    }

    pub fn set_coil(&self, slave: SlaveId, on: bool) -> Result<(), MasterError> {
        let mut state = self.lock_state();
        match &mut *state {
            ConnectionState::Connected { link, .. } => {
                Ok(self.write_coil(link.as_mut(), slave, on)?)
            }
            ConnectionState::Disconnected => Err(self.not_connected(&format!("Slave {}", slave))),
        }
    }

    /// Writes `on` to each slave in order under one lock. Only a missing
    /// connection fails the whole batch; write failures are collected.
    pub fn set_many(&self, slaves: &[SlaveId], on: bool) -> Result<CoilBatch, MasterError> {
        let mut state = self.lock_state();
        match &mut *state {
            ConnectionState::Connected { link, .. } => Ok(self.write_batch(link.as_mut(), slaves, on)),
            ConnectionState::Disconnected => {
                Err(self.not_connected(&format!("{} slave(s)", slaves.len())))
            }
        }
    }

    /// Like [`set_many`](Self::set_many), but a missing connection is not an
    /// error and is not logged: `None` means nothing was attempted.
    pub fn set_many_if_connected(&self, slaves: &[SlaveId], on: bool) -> Option<CoilBatch> {
        let mut state = self.lock_state();
        match &mut *state {
            ConnectionState::Connected { link, .. } => Some(self.write_batch(link.as_mut(), slaves, on)),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn set_all(&self, on: bool) -> Result<(), MasterError> {
        let batch = self.set_many(&self.slave_ids(), on)?;
        match batch.first_error() {
            Some(e) => Err(MasterError::Transport(e.clone())),
            None => Ok(()),
        }
    }

    pub fn set_light_for_label(&self, label: &str, on: bool) -> Result<(), MasterError> {
        let Some(slave) = find_slave_by_label(&self.slaves, label) else {
            self.emit(
                LogChannel::General,
                Level::Warn,
                format!("⚠ No light bound to label '{}'", label),
            );
            return Err(MasterError::UnknownLabel(label.to_string()));
        };
        self.set_coil(slave.address, on)
    }

    pub(crate) fn emit(&self, channel: LogChannel, level: Level, message: impl Into<String>) {
        let event = LogEvent::new(channel, message);
        log!(target: EVENT_LOG_TARGET, level, "[{}] {}", channel, event.message);
        // No subscribers is fine; the collaborator may not be listening yet.
        let _ = self.events.send(event);
    }

    fn write_coil(
        &self,
        link: &mut dyn SerialLink,
        slave: SlaveId,
        on: bool,
    ) -> Result<(), TransportError> {
        let frame = CoilCommand::light(slave, on).encode();
        debug!("📤 Write Single Coil frame: [{}]", frame);

        match link.write_frame(frame.as_bytes()) {
            Ok(()) => {
                self.emit(
                    LogChannel::ModbusTrace,
                    Level::Info,
                    format!(
                        "[TX] Slave {}: {} - {}",
                        slave,
                        if on { "ON" } else { "OFF" },
                        self.device_name(slave)
                    ),
                );
                Ok(())
            }
            Err(e) => {
                self.emit(
                    LogChannel::ModbusTrace,
                    Level::Error,
                    format!("[ERROR] Slave {}: {}", slave, e),
                );
                Err(e)
            }
        }
    }

    fn write_batch(&self, link: &mut dyn SerialLink, slaves: &[SlaveId], on: bool) -> CoilBatch {
        let mut batch = CoilBatch::default();
        for &slave in slaves {
            match self.write_coil(link, slave, on) {
                Ok(()) => batch.sent += 1,
                Err(e) => batch.failed.push((slave, e)),
            }
        }
        batch
    }

    fn not_connected(&self, target: &str) -> MasterError {
        self.emit(
            LogChannel::ModbusTrace,
            Level::Warn,
            format!("[ERROR] {}: not connected", target),
        );
        MasterError::NotConnected
    }

    fn device_name(&self, slave: SlaveId) -> String {
        find_slave_by_address(&self.slaves, slave)
            .map(SlaveBinding::display_name)
            .unwrap_or_else(|| "unbound device".to_string())
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ModbusMaster {
    fn drop(&mut self) {
        self.disconnect();
    }
}
