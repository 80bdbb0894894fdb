//! Modbus RTU master for RS485 light actuators.
//!
//! Opens a serial link to the light slaves, builds "Write Single Coil"
//! frames with a CRC16 check, switches lights on and off and runs a timed
//! blink test. Log events are pushed to whoever subscribes to the master.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, SlaveBinding};
pub use modbus::{
    BaudRate, ConnectionConfig, LogChannel, LogEvent, ModbusMaster, RtuFrame, SlaveId,
};
pub use services::{run_blink_test, BlinkPlan, BlinkReport, BlinkTask, LightZones, Zone};
pub use utils::error::{ConfigError, FrameError, MasterError, TransportError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
