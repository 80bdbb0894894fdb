pub mod crc;
pub mod events;
pub mod master;
pub mod protocol;
pub mod transport;

pub use crc::{crc16_modbus, crc16_wire_bytes};
pub use events::{LogChannel, LogEvent};
pub use master::{CoilBatch, ConnectionState, ModbusMaster};
pub use protocol::{decode_response, encode_write_single_coil, CoilCommand, ParsedResponse, RtuFrame, SlaveId};
pub use transport::{BaudRate, ConnectionConfig, PortDriver, SerialLink, SerialPortDriver};
